pub mod client;
pub mod config;
pub mod error;
pub mod ipc;
pub mod models;
pub mod report;

pub use client::{ClientError, ScanClient};
pub use config::EchowatchConfig;
pub use error::EchowatchError;
pub use models::{DetectionTrace, PinIssued, Report, ScanListEntry, ScanRecord};
pub use report::{build_report, day_delta, match_ready_entry, DayDelta, FormatterError};
