use async_stream::stream;
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{Change, ChangeSet, ChangeSetId, DocumentId, KeyModify, KeyPath, ModifyOp, OrderId};
use tessera_sdk::chat::COLLECTION;
use tessera_sdk::{
    ChatConfigBuilder, ChatMessage, ChatObject, MemoryBackend, MemorySource, MessageDraft,
    ReplayConfig, ReplayQueue, Result,
};
use tracing::{debug, warn};

const EMOJIS: [&str; 4] = ["👍", "🥰", "🤔", "🎉"];

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_writers: usize,
    pub operations_per_writer: usize,
    pub total_applies: usize,
    pub total_time: Duration,
    pub avg_apply_time: Duration,
    pub ops_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Writers:         {:>38} ║", self.num_writers);
        println!("║  Operations per Writer:     {:>38} ║", self.operations_per_writer);
        println!("║  Total Change Sets Applied: {:>38} ║", self.total_applies);
        println!("║  Total Time:                {:>39}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Apply Time:        {:>36}µs ║", self.avg_apply_time.as_micros());
        println!("║  Operations/Second:         {:>38.0} ║", self.ops_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn open_chat(identity: &str) -> Result<ChatObject> {
    let config = ChatConfigBuilder::new()
        .chat_id("stress-chat")
        .identity(identity)
        .event_capacity(1024)
        .build();
    ChatObject::open(Arc::new(MemoryBackend::new()), config)
}

fn average(times: &[Duration]) -> Duration {
    if times.is_empty() {
        Duration::ZERO
    } else {
        times.iter().sum::<Duration>() / times.len() as u32
    }
}

/// Concurrent local writers sharing one chat.
///
/// Every add must get its own order position; the final list must hold all
/// messages in strictly increasing order.
pub async fn stress_test_local_writers(
    num_writers: usize,
    messages_per_writer: usize,
) -> Result<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Local Writers Stress Test                           ║");
    println!("║  Writers: {} | Messages/Writer: {} ║", num_writers, messages_per_writer);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let chat = Arc::new(open_chat("local")?);

    println!("\n[Phase 1/2] Adding messages and reactions...");

    let mut handles = vec![];
    for writer in 0..num_writers {
        let chat = Arc::clone(&chat);
        // Writers hold the store lock synchronously.
        let handle = tokio::task::spawn_blocking(move || -> Result<Vec<Duration>> {
            let mut rng = StdRng::seed_from_u64(writer as u64);
            let mut times = Vec::with_capacity(messages_per_writer);
            let mut own = Vec::new();
            for i in 0..messages_per_writer {
                let op_start = Instant::now();
                if !own.is_empty() && rng.gen_bool(0.25) {
                    let target: &String = &own[rng.gen_range(0..own.len())];
                    let emoji = EMOJIS[rng.gen_range(0..EMOJIS.len())];
                    chat.toggle_reaction(target, emoji)?;
                } else {
                    let id = chat.add_message(MessageDraft::text(format!("w{}-{}", writer, i)))?;
                    own.push(id);
                }
                times.push(op_start.elapsed());
            }
            Ok(times)
        });
        handles.push(handle);
    }

    let mut apply_times = vec![];
    for handle in handles {
        match handle.await {
            Ok(times) => apply_times.extend(times?),
            Err(e) => warn!(error = %e, "writer task failed"),
        }
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Verifying order positions...");

    let messages = chat.get_messages();
    let orders: Vec<OrderId> = messages
        .iter()
        .filter_map(|m| OrderId::parse(&m.order_id).ok())
        .collect();
    let strictly_increasing = orders.windows(2).all(|w| w[0] < w[1]);
    let max_order = chat.store().max_order()?;
    println!(
        "  Messages: {} | Strictly ordered: {} | Max order: {}",
        messages.len(),
        strictly_increasing,
        max_order
    );
    if !strictly_increasing || max_order.position() as usize != apply_times.len() {
        warn!(%max_order, applies = apply_times.len(), "order positions are not dense");
    }

    let total_time = start.elapsed();
    let total_applies = apply_times.len();
    println!("[Phase 2/2] ✓ Completed");

    Ok(StressTestStats {
        num_writers,
        operations_per_writer: messages_per_writer,
        total_applies,
        total_time,
        avg_apply_time: average(&apply_times),
        ops_per_second: total_applies as f64 / total_time.as_secs_f64(),
    })
}

/// Change sets one device authored while offline, in authoring order.
fn offline_device_sets(device: usize, count: usize, rng: &mut StdRng) -> Vec<ChangeSet> {
    let creator = format!("device-{}", device);
    let base = chrono::Utc::now().timestamp_millis();
    let mut sets = Vec::with_capacity(count);
    let mut own: Vec<String> = Vec::new();

    for position in 1..=count as u64 {
        let set_id = format!("d{}-{}", device, position);
        let change = if !own.is_empty() && rng.gen_bool(0.3) {
            let target = &own[rng.gen_range(0..own.len())];
            let emoji = EMOJIS[rng.gen_range(0..EMOJIS.len())];
            let path = KeyPath::new(["reactions", emoji]);
            match path {
                Ok(path) => Change::modify(
                    COLLECTION,
                    DocumentId::from_string(target.as_str()),
                    vec![KeyModify::new(path, ModifyOp::AddToSet(json!(creator)))],
                ),
                Err(_) => continue,
            }
        } else {
            own.push(set_id.clone());
            Change::create(
                COLLECTION,
                DocumentId::from_string(set_id.as_str()),
                json!({ "content": { "message": { "text": format!("{} #{}", creator, position) } } }),
            )
        };

        let set = ChangeSet::builder(ChangeSetId::from_string(set_id), creator.as_str())
            .order(OrderId::from_position(position))
            .timestamp(base + position as i64)
            .change(change)
            .build();
        match set {
            Ok(set) => sets.push(set),
            Err(e) => warn!(error = %e, "skipping malformed change set"),
        }
    }
    sets
}

/// Generator that yields a random interleaving of per-device queues,
/// keeping each device's own order.
fn interleaving_generator(lengths: Vec<usize>, seed: u64) -> impl Stream<Item = usize> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut remaining = lengths;
        loop {
            let live: Vec<usize> = (0..remaining.len()).filter(|&d| remaining[d] > 0).collect();
            if live.is_empty() {
                break;
            }
            let device = live[rng.gen_range(0..live.len())];
            remaining[device] -= 1;
            yield device;
        }
    }
}

/// Offline devices replayed on several replicas in different orders.
///
/// Every replica must end with the same message list.
pub async fn stress_test_replay_convergence(
    num_devices: usize,
    sets_per_device: usize,
    num_replicas: usize,
) -> Result<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Replay Convergence Stress Test                      ║");
    println!("║  Devices: {} | Sets/Device: {} | Replicas: {} ║",
             num_devices, sets_per_device, num_replicas);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let mut rng = StdRng::from_entropy();

    println!("\n[Phase 1/2] Authoring offline change sets...");
    let devices: Vec<Vec<ChangeSet>> = (0..num_devices)
        .map(|d| offline_device_sets(d, sets_per_device, &mut rng))
        .collect();
    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Replaying on replicas...");

    let mut apply_times = vec![];
    let mut lists: Vec<Vec<ChatMessage>> = Vec::with_capacity(num_replicas);
    for replica in 0..num_replicas {
        let chat = Arc::new(open_chat(&format!("replica-{}", replica))?);
        let (queue, mut failures) = ReplayQueue::start(chat.clone(), ReplayConfig::default());

        let mut cursors = vec![0usize; num_devices];
        let mut order = Vec::new();
        let lengths = devices.iter().map(Vec::len).collect();
        let mut interleaving = Box::pin(interleaving_generator(lengths, rng.gen()));
        while let Some(device) = interleaving.next().await {
            order.push(devices[device][cursors[device]].clone());
            cursors[device] += 1;
        }

        let replay_start = Instant::now();
        let mut source = MemorySource::from_sets(order);
        let applied = queue.drain(&mut source).await?;
        queue.shutdown().await?;
        let elapsed = replay_start.elapsed();
        if applied > 0 {
            apply_times.extend(std::iter::repeat(elapsed / applied as u32).take(applied));
        }

        while let Ok(failure) = failures.try_recv() {
            warn!(change_set = %failure.change_set_id, error = %failure.error, "replay failure");
        }
        debug!(replica, applied, "replica replayed");
        lists.push(chat.get_messages());
    }

    let converged = lists.windows(2).all(|w| w[0] == w[1]);
    let distinct: HashSet<usize> = lists.iter().map(Vec::len).collect();
    println!(
        "  Replicas converged: {} | Messages per replica: {:?}",
        converged, distinct
    );
    if !converged {
        warn!("replicas diverged");
    }
    println!("[Phase 2/2] ✓ Completed");

    let total_time = start.elapsed();
    let total_applies = apply_times.len();
    Ok(StressTestStats {
        num_writers: num_devices,
        operations_per_writer: sets_per_device,
        total_applies,
        total_time,
        avg_apply_time: average(&apply_times),
        ops_per_second: total_applies as f64 / total_time.as_secs_f64(),
    })
}

/// Scaling analysis for concurrent local writers
pub async fn stress_test_scaling(max_writers: usize, step_size: usize) -> Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Local Writers vs Throughput        ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!("\n  Writers | Applies | Time (s) | Ops/sec");
    println!("  --------+---------+----------+---------");

    let mut writers = step_size.max(1);
    while writers <= max_writers {
        let stats = stress_test_local_writers(writers, 100).await?;
        println!(
            "  {:>7} | {:>7} | {:>8.3} | {:>7.0}",
            writers,
            stats.total_applies,
            stats.total_time.as_secs_f64(),
            stats.ops_per_second
        );
        writers += step_size.max(1);
    }
    Ok(())
}
