//! Scripted user iterations.
use crate::check::Check;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{Credentials, Method, RequestConfig, ScenarioConfig, StepConfig, TokenConfig};

/// One network call of an iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStep {
    pub(crate) name: Arc<str>,
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) authenticated: bool,
    pub(crate) expect_status: Option<u16>,
    pub(crate) timeout: Option<Duration>,
}

impl RequestStep {
    pub fn new(name: impl Into<Arc<str>>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            headers: vec![],
            body: None,
            authenticated: false,
            expect_status: None,
            timeout: None,
        }
    }

    pub fn get(name: impl Into<Arc<str>>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Get, path)
    }

    pub fn post(name: impl Into<Arc<str>>, path: impl Into<String>) -> Self {
        Self::new(name, Method::Post, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Forward the token obtained by the last authenticate step.
    pub fn authenticated(mut self) -> Self {
        self.authenticated = true;
        self
    }

    /// Status that counts as success, instead of any 2xx.
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expect_status = Some(status);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn from_config(config: &RequestConfig, credentials: &Credentials) -> Self {
        Self {
            name: config.name.as_str().into(),
            method: config.method,
            path: credentials.interpolate(&config.path),
            headers: config
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), credentials.interpolate(value)))
                .collect(),
            body: config
                .body
                .as_ref()
                .map(|body| interpolate_json(body, credentials)),
            authenticated: config.authenticated,
            expect_status: config.expect_status,
            timeout: config.timeout,
        }
    }
}

fn interpolate_json(value: &serde_json::Value, credentials: &Credentials) -> serde_json::Value {
    use serde_json::Value;
    match value {
        Value::String(s) => Value::String(credentials.interpolate(s)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_json(item, credentials))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), interpolate_json(item, credentials)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// A request whose response carries the token later requests forward.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStep {
    pub(crate) request: RequestStep,
    pub(crate) token: TokenConfig,
}

#[derive(Debug, Clone)]
pub enum Step {
    Authenticate(AuthStep),
    Request(RequestStep),
    Check(Check),
    Pause(Duration),
}

impl Step {
    pub fn from_config(config: &StepConfig, credentials: &Credentials) -> Self {
        match config {
            StepConfig::Authenticate { request, token } => Step::Authenticate(AuthStep {
                request: RequestStep::from_config(request, credentials),
                token: token.clone(),
            }),
            StepConfig::Request(request) => {
                Step::Request(RequestStep::from_config(request, credentials))
            }
            StepConfig::Check { name, condition } => Step::Check(Check::from_config(name, condition)),
            StepConfig::Pause { duration } => Step::Pause(*duration),
        }
    }
}

/// An ordered list of steps executed once per iteration by every virtual user.
#[derive(Debug, Clone)]
pub struct Scenario {
    name: Arc<str>,
    steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            steps: vec![],
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn authenticate(self, request: RequestStep, token: TokenConfig) -> Self {
        self.step(Step::Authenticate(AuthStep { request, token }))
    }

    pub fn request(self, request: RequestStep) -> Self {
        self.step(Step::Request(request))
    }

    pub fn check(self, check: Check) -> Self {
        self.step(Step::Check(check))
    }

    pub fn pause(self, duration: Duration) -> Self {
        self.step(Step::Pause(duration))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn operation(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn from_config(config: &ScenarioConfig, credentials: &Credentials) -> Self {
        config
            .steps
            .iter()
            .fold(Scenario::new(config.name.as_str()), |scenario, step| {
                scenario.step(Step::from_config(step, credentials))
            })
    }

    /// Log in, buy `item` with the session cookie, then think for a second.
    pub fn purchase(credentials: &Credentials, item: &str) -> Self {
        let login = RequestStep::post("auth", "/api/auth").json(serde_json::json!({
            "username": credentials.username,
            "password": credentials.password,
        }));

        Scenario::new("purchase")
            .authenticate(login, TokenConfig::Cookie("accessToken".into()))
            .request(RequestStep::post("buy", format!("/api/buy/{item}")).authenticated())
            .check(Check::status(200))
            .check(Check::duration_below(Duration::from_millis(50)))
            .pause(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use surge_core::CheckCondition;

    #[test]
    fn purchase_scenario_shape() {
        let scenario = Scenario::purchase(&Credentials::new("user1", "user1"), "socks");

        assert_eq!(scenario.name(), "purchase");
        assert_eq!(scenario.steps().len(), 5);
        assert!(matches!(
            &scenario.steps()[0],
            Step::Authenticate(AuthStep { request, token: TokenConfig::Cookie(cookie) })
                if request.path == "/api/auth" && cookie == "accessToken"
        ));
        assert!(matches!(
            &scenario.steps()[1],
            Step::Request(request) if request.authenticated && request.path == "/api/buy/socks"
        ));
        assert!(matches!(&scenario.steps()[3], Step::Check(c) if c.name() == "response time < 50ms"));
        assert!(matches!(scenario.steps()[4], Step::Pause(d) if d == Duration::from_secs(1)));
    }

    #[test]
    fn config_steps_interpolate_credentials() {
        let config = ScenarioConfig {
            name: "login".into(),
            steps: vec![
                StepConfig::Authenticate {
                    request: RequestConfig {
                        name: "auth".into(),
                        method: Method::Post,
                        path: "/api/auth".into(),
                        headers: BTreeMap::from([("X-User".into(), "{{username}}".into())]),
                        body: Some(serde_json::json!({
                            "username": "{{username}}",
                            "secrets": ["{{password}}"],
                            "remember": true,
                        })),
                        authenticated: false,
                        expect_status: None,
                        timeout: None,
                    },
                    token: TokenConfig::Json("/response/accessToken".into()),
                },
                StepConfig::Check {
                    name: "ok".into(),
                    condition: CheckCondition::Status(200),
                },
            ],
        };

        let scenario = Scenario::from_config(&config, &Credentials::new("alice", "hunter2"));
        let Step::Authenticate(auth) = &scenario.steps()[0] else {
            panic!("expected an authenticate step");
        };

        assert_eq!(auth.request.headers, vec![("X-User".into(), "alice".into())]);
        assert_eq!(
            auth.request.body,
            Some(serde_json::json!({
                "username": "alice",
                "secrets": ["hunter2"],
                "remember": true,
            }))
        );
        assert!(matches!(&scenario.steps()[1], Step::Check(c) if c.name() == "ok"));
    }
}
