mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use surge::core::{RunConfig, SampleKind};
    use surge::prelude::*;
    use surge::ReqwestClient;

    fn profile() -> RampProfile {
        RampProfile::new(vec![
            Stage::new(Duration::from_secs(3), 20),
            Stage::new(Duration::from_secs(5), 20),
            Stage::new(Duration::from_secs(2), 0),
        ])
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn purchase_against_mock_shop() {
        init().await;

        let client = Arc::new(ReqwestClient::new().unwrap());
        let scenario = Scenario::purchase(&Credentials::new("user1", "user1"), "socks");
        let result = LoadTest::new(
            client,
            shop_url(SHOP_PORT).parse().unwrap(),
            profile(),
            scenario,
        )
        .threshold(Threshold::parse("http_req_failed", "rate<0.0001").unwrap())
        .threshold(Threshold::parse("http_req_duration", "p(99)<200").unwrap())
        .await
        .unwrap();

        println!("{result}");
        assert!(result.pass, "{result}");
        assert!(result.max_concurrency <= 20 + surge::core::CONCURRENCY_SLACK);
        assert!(result.requests.p99 >= Duration::from_millis(5));

        let buys = result
            .aggregates
            .operation(SampleKind::Request, "buy")
            .unwrap();
        assert_eq!(buys.failures(), 0);
        assert!(buys.count() > 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn rejected_logins_fail_the_run() {
        init().await;

        let client = Arc::new(ReqwestClient::new().unwrap());
        let scenario = Scenario::purchase(&Credentials::new("user1", "user1"), "socks");
        let result = LoadTest::new(
            client,
            shop_url(LOCKED_SHOP_PORT).parse().unwrap(),
            profile(),
            scenario,
        )
        .threshold(Threshold::parse("http_req_failed", "rate<0.0001").unwrap())
        .await
        .unwrap();

        assert!(!result.pass);
        assert_eq!(result.aggregates.requests().error_rate(), Some(1.0));
        assert_eq!(result.iterations.count, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ntest::timeout(60_000)]
    async fn yaml_scenario_with_bearer_token() {
        init().await;

        let config = RunConfig::from_yaml(&format!(
            r#"
base_url: {}
credentials: {{ username: user2, password: secret }}
stages:
  - {{ duration: 2s, target: 5 }}
  - {{ duration: 1s, target: 0 }}
thresholds:
  http_req_failed: ["rate==0"]
  "checks{{has socks}}": ["rate==1"]
scenario:
  name: browse
  steps:
    - type: authenticate
      name: login
      method: POST
      path: /api/auth
      body: {{ username: "{{{{username}}}}", password: "{{{{password}}}}" }}
      token: {{ json: /response/accessToken }}
    - type: request
      name: buy
      method: POST
      path: /api/buy/socks
      authenticated: true
    - type: request
      name: info
      path: /api/info
      authenticated: true
    - type: check
      name: has socks
      condition: {{ body_contains: socks }}
    - type: pause
      duration: 250ms
"#,
            shop_url(SHOP_PORT)
        ))
        .unwrap();

        let client = Arc::new(ReqwestClient::new().unwrap());
        let result = LoadTest::from_config(client, &config)
            .unwrap()
            .await
            .unwrap();

        assert!(result.pass, "{result}");
        assert!(result.checks_passed > 0);
        assert_eq!(result.checks_failed, 0);
    }
}
