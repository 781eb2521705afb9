pub mod etl;
pub mod pipeline;
pub mod stable;

pub use crate::domain::model::{BundleRecord, ReportResult};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;
