//! A hand-built scenario: log in with a bearer token, buy a few items, then read the
//! inventory back.
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use surge::core::TokenConfig;
use surge::prelude::*;
use surge::ReqwestClient;
use tracing_subscriber::EnvFilter;

const ITEMS: [&str; 3] = ["cup", "pen", "umbrella"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("surge=debug"))
        .init();

    let login = RequestStep::post("login", "/api/auth")
        .json(serde_json::json!({ "username": "browser", "password": "hunter2" }));

    let mut scenario = Scenario::new("browse")
        .authenticate(login, TokenConfig::Json("/response/accessToken".into()));
    for item in ITEMS {
        scenario = scenario.request(
            RequestStep::post(format!("buy {item}"), format!("/api/buy/{item}")).authenticated(),
        );
    }
    let scenario = scenario
        .request(RequestStep::get("info", "/api/info").authenticated())
        .check(Check::status(200).and(Check::body_contains("umbrella")))
        .pause(Duration::from_millis(500));

    let profile = RampProfile::new(vec![
        Stage::new(Duration::from_secs(5), 20),
        Stage::new(Duration::from_secs(5), 0),
    ])?;

    let result = LoadTest::new(
        Arc::new(ReqwestClient::new()?),
        "http://localhost:8080".parse()?,
        profile,
        scenario,
    )
    .threshold(Threshold::parse("checks", "rate==1")?)
    .threshold(Threshold::parse("http_req_duration{info}", "p(95)<100")?)
    .max_rps(std::num::NonZeroU32::new(500).ok_or_else(|| anyhow::anyhow!("zero rps"))?)
    .await?;

    println!("{result}");
    Ok(())
}
