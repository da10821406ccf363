#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod check;
mod collector;
mod error;
mod executor;
mod http;
mod measurement;
mod scenario;
mod scheduler;
mod timed;

#[cfg(test)]
mod testing;

pub use check::Check;
pub use collector::MetricsCollector;
pub use error::{RunError, StepError};
pub use executor::{Iteration, ScenarioExecutor};
#[cfg(feature = "client")]
pub use http::ReqwestClient;
pub use http::{HttpClient, LocalHttpClient, Request, Response};
pub use load_test::LoadTest;
pub use measurement::Measurement;
pub use scenario::{AuthStep, RequestStep, Scenario, Step};
pub use scheduler::{RampScheduler, RunState, RunStatus, StatusHandle};

/// Data types shared with configuration and reporting.
pub use surge_core as core;

pub mod prelude {
    pub use crate::{Check, HttpClient, LoadTest, RequestStep, Scenario};
    pub use surge_core::{Credentials, RampProfile, RunConfig, RunResult, Stage, Threshold};
}
