//! Run configuration, loaded from YAML.
//!
//! ```yaml
//! base_url: http://localhost:8080
//! credentials: { username: user1, password: user1 }
//! stages:
//!   - { duration: 10s, target: 100 }
//!   - { duration: 30s, target: 1000 }
//!   - { duration: 10s, target: 0 }
//! thresholds:
//!   http_req_duration: ["p(99)<50"]
//!   http_req_failed: ["rate<0.0001"]
//! ```
use crate::{
    duration_str, ConfigError, RampProfile, Stage, Threshold, DEFAULT_GRACEFUL_STOP,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_SCENARIO_NAME, DEFAULT_TICK,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

const ENV_PREFIX: &str = "SURGE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Replace `{{username}}` and `{{password}}` placeholders in `template`.
    pub fn interpolate(&self, template: &str) -> String {
        template
            .replace("{{username}}", &self.username)
            .replace("{{password}}", &self.password)
    }
}

/// Where the authenticate step finds the token in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenConfig {
    /// Value of the named `Set-Cookie`; forwarded as a `Cookie` header.
    Cookie(String),
    /// JSON pointer into the body (e.g. `/response/accessToken`); forwarded as a bearer token.
    Json(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCondition {
    Status(u16),
    DurationBelow(#[serde(with = "duration_str")] Duration),
    BodyContains(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    pub name: String,
    #[serde(default)]
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Sent as JSON. String values may contain credential placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Forward the token obtained by the last authenticate step.
    #[serde(default)]
    pub authenticated: bool,
    /// Status that counts as success; any 2xx when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_status: Option<u16>,
    #[serde(
        default,
        with = "duration_str::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Authenticate {
        #[serde(flatten)]
        request: RequestConfig,
        token: TokenConfig,
    },
    Request(RequestConfig),
    Check {
        name: String,
        condition: CheckCondition,
    },
    Pause {
        #[serde(with = "duration_str")]
        duration: Duration,
    },
}

impl StepConfig {
    pub fn name(&self) -> &str {
        match self {
            StepConfig::Authenticate { request, .. } | StepConfig::Request(request) => {
                &request.name
            }
            StepConfig::Check { name, .. } => name,
            StepConfig::Pause { .. } => "pause",
        }
    }

    fn validate(&self, base_url: &Url) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Step {
            step: self.name().to_string(),
            reason,
        };

        match self {
            StepConfig::Authenticate { request, .. } | StepConfig::Request(request) => {
                if request.name.trim().is_empty() {
                    return Err(invalid("request steps need a name".into()));
                }
                base_url
                    .join(&request.path)
                    .map_err(|e| invalid(format!("path `{}`: {e}", request.path)))?;
                if request.timeout.is_some_and(|t| t.is_zero()) {
                    return Err(invalid("timeout must be greater than zero".into()));
                }
            }
            StepConfig::Check { name, .. } if name.trim().is_empty() => {
                return Err(invalid("checks need a name".into()));
            }
            StepConfig::Check { .. } | StepConfig::Pause { .. } => {}
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    #[serde(default = "default_scenario_name")]
    pub name: String,
    pub steps: Vec<StepConfig>,
}

fn default_scenario_name() -> String {
    DEFAULT_SCENARIO_NAME.to_string()
}

fn default_tick() -> Duration {
    DEFAULT_TICK
}

fn default_graceful_stop() -> Duration {
    DEFAULT_GRACEFUL_STOP
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub base_url: Url,
    #[serde(default)]
    pub credentials: Credentials,
    pub stages: Vec<Stage>,
    /// Metric name to threshold expressions, k6 style.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    /// Steps executed once before the first stage; any failure aborts the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<StepConfig>,
    /// The per-iteration script. The purchase scenario is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioConfig>,
    #[serde(default = "default_request_timeout", with = "duration_str")]
    pub request_timeout: Duration,
    #[serde(default = "default_graceful_stop", with = "duration_str")]
    pub graceful_stop: Duration,
    #[serde(default = "default_tick", with = "duration_str")]
    pub tick: Duration,
    /// Global cap on requests per second across all virtual users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rps: Option<NonZeroU32>,
}

impl RunConfig {
    /// Load a YAML file, apply `SURGE_*` environment overrides and validate the result.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading run configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override base URL and credentials from `lookup` (keys are `SURGE_BASE_URL`,
    /// `SURGE_USERNAME` and `SURGE_PASSWORD`).
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}_{name}"));

        if let Some(base_url) = var("BASE_URL") {
            self.base_url = Url::parse(&base_url)?;
        }
        if let Some(username) = var("USERNAME") {
            self.credentials.username = username;
        }
        if let Some(password) = var("PASSWORD") {
            self.credentials.password = password;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "`{}` cannot be used as a base URL",
                self.base_url
            )));
        }
        if self.tick.is_zero() {
            return Err(ConfigError::Invalid("tick must be greater than zero".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than zero".into(),
            ));
        }

        self.profile()?;
        self.parsed_thresholds()?;

        let scenario_steps = self.scenario.iter().flat_map(|s| s.steps.iter());
        for step in self.setup.iter().chain(scenario_steps) {
            step.validate(&self.base_url)?;
        }

        if self.scenario.as_ref().is_some_and(|s| s.steps.is_empty()) {
            return Err(ConfigError::Invalid("scenario has no steps".into()));
        }

        Ok(())
    }

    pub fn profile(&self) -> Result<RampProfile, ConfigError> {
        RampProfile::new(self.stages.clone())
    }

    pub fn parsed_thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        self.thresholds
            .iter()
            .flat_map(|(metric, expressions)| {
                expressions
                    .iter()
                    .map(move |expression| Threshold::parse(metric, expression))
            })
            .collect()
    }
}
