use stress_test::{stress_test_local_writers, stress_test_replay_convergence, stress_test_scaling};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("info");
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())?;
    Ok(())
}

async fn async_main() -> tessera_sdk::Result<()> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CHAT STORE STRESS TESTS                          ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: local writers, small scale
    let stats = stress_test_local_writers(4, 100).await?;
    stats.print();

    // Test 2: offline replay, small scale
    let stats = stress_test_replay_convergence(4, 50, 3).await?;
    stats.print();

    // Test 3: local writers, medium scale
    let stats = stress_test_local_writers(10, 500).await?;
    stats.print();

    // Test 4: offline replay, medium scale
    let stats = stress_test_replay_convergence(10, 200, 4).await?;
    stats.print();

    // Test 5: Scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (local writers)                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(20, 4).await?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
