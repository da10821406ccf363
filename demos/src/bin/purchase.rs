//! Buy socks from a locally running mock shop (`cargo run -p mock-service`) while printing
//! the live run status.
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use surge::prelude::*;
use surge::ReqwestClient;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("surge=info"))
        .init();

    let profile = RampProfile::new(vec![
        Stage::new(Duration::from_secs(10), 50),
        Stage::new(Duration::from_secs(20), 200),
        Stage::new(Duration::from_secs(10), 0),
    ])?;

    let load_test = LoadTest::new(
        Arc::new(ReqwestClient::new()?),
        "http://localhost:8080".parse()?,
        profile,
        Scenario::purchase(&Credentials::new("user1", "user1"), "socks"),
    )
    .threshold(Threshold::parse("http_req_duration", "p(99)<50")?)
    .threshold(Threshold::parse("http_req_failed", "rate<0.0001")?)
    .graceful_stop(Duration::from_secs(5));

    let status = load_test.status();
    let watcher = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let status = status.load();
            println!(
                "[{:>5.1}s] {} target={} running={}",
                status.elapsed.as_secs_f64(),
                status.state,
                status.target,
                status.running
            );
            if status.state.is_terminal() {
                break;
            }
        }
    });

    let result = load_test.await?;
    watcher.abort();
    println!("{result}");
    Ok(())
}
