//! Property-based tests for order assignment.
//!
//! These verify the laws replay convergence relies on:
//!  - Join of order positions is commutative, associative and idempotent
//!  - Bottom is the identity of join
//!  - Successor is strictly greater than its input
//!  - Sorting by merge key is independent of arrival order

use proptest::prelude::*;
use tessera_core::{ChangeSetId, Lattice, OrderId, OrderKey};

fn order_strategy() -> impl Strategy<Value = OrderId> {
    (0u64..10_000).prop_map(OrderId::from_position)
}

fn order_key_strategy() -> impl Strategy<Value = OrderKey> {
    (0u64..5, "[a-c]{1,2}", "[a-z]{1,4}").prop_map(|(order, creator, id)| {
        OrderKey::new(
            OrderId::from_position(order),
            creator,
            ChangeSetId::from_string(id),
        )
    })
}

proptest! {
    #[test]
    fn order_join_commutative(a in order_strategy(), b in order_strategy()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn order_join_associative(
        a in order_strategy(),
        b in order_strategy(),
        c in order_strategy()
    ) {
        prop_assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }

    #[test]
    fn order_join_idempotent(a in order_strategy()) {
        prop_assert_eq!(a.join(&a), a);
    }

    #[test]
    fn order_bottom_identity(a in order_strategy()) {
        prop_assert_eq!(a.join(&OrderId::bottom()), a);
    }

    #[test]
    fn successor_is_greater(a in order_strategy()) {
        let next = a.successor().unwrap();
        prop_assert!(next > a);
        prop_assert!(next.to_string() > a.to_string());
    }

    #[test]
    fn merge_order_independent_of_arrival(
        keys in prop::collection::vec(order_key_strategy(), 0..20)
    ) {
        let mut forward = keys.clone();
        let mut backward: Vec<OrderKey> = keys.into_iter().rev().collect();
        forward.sort();
        backward.sort();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn folded_max_independent_of_arrival(
        orders in prop::collection::vec(order_strategy(), 0..20)
    ) {
        let forward = orders.iter().fold(OrderId::bottom(), |acc, o| acc.join(o));
        let backward = orders.iter().rev().fold(OrderId::bottom(), |acc, o| acc.join(o));
        prop_assert_eq!(forward, backward);
    }
}
