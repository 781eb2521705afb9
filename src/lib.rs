pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::adapters::catalog::{CatalogClient, LabelRequest};
pub use crate::adapters::http::{ApiRequest, ResponseBody, ResponseMode, RetryPolicy, RetryingClient};
pub use crate::adapters::storage::LocalStorage;
pub use crate::config::AppConfig;
pub use crate::core::stable::{poll_until_stable, poll_until_stable_unique, PollProgress, StablePollOptions};
pub use crate::core::{etl::EtlEngine, pipeline::ReportPipeline};
pub use crate::utils::error::{ReportError, Result};
