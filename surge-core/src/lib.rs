mod config;
mod constants;
mod data;
mod error;
mod metrics;
mod stage;
mod stats;
mod threshold;

pub mod duration_str;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use error::*;
pub use metrics::*;
pub use stage::*;
pub use stats::*;
pub use threshold::*;
