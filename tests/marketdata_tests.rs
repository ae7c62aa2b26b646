// Feed keepalive cadence

use std::time::Duration;
use trading_agent::marketdata::keepalive_interval;

#[tokio::test(start_paused = true)]
async fn first_keepalive_waits_a_full_period() {
    let start = tokio::time::Instant::now();
    let mut ticker = keepalive_interval();
    ticker.tick().await;
    assert!(
        start.elapsed() >= Duration::from_secs(30),
        "first ping must not fire at connect time"
    );
}
