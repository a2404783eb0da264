//! Raw payload models for the Echo scan API, plus the derived `Report`.
//!
//! Everything the remote returns is treated as optional: the API fills scan
//! fields in progressively while the scan runs, and the formatter decides
//! what counts as "ready" (see `report::build_report`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response of `GET /v1/user/pin` — a freshly issued one-time scan PIN.
#[derive(Debug, Clone, Deserialize)]
pub struct PinIssued {
    pub pin: String,
    #[serde(default)]
    pub links: Option<PinLinks>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinLinks {
    #[serde(default)]
    pub fivem: Option<String>,
}

/// One element of the by-pin list response. A scan is only addressable once
/// an entry carries both the expected game tag and a uuid.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanListEntry {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub game: Option<String>,
}

/// Raw decoded payload of the by-identifier fetch. Transient — never
/// persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRecord {
    /// Detection verdict. Absent until the scan has finished.
    #[serde(default)]
    pub detection: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    /// Colon-delimited triples: `ignored:platform-id:display-name`.
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub results: ScanResults,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanResults {
    #[serde(default)]
    pub info: ScanInfo,
    #[serde(default)]
    pub traces: Vec<DetectionTrace>,
    /// Per-process start timestamps, epoch seconds keyed by slot name.
    #[serde(default)]
    pub start_time: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanInfo {
    #[serde(rename = "installationDate", default)]
    pub installation_date: Option<String>,
    #[serde(rename = "recycleBinModified", default)]
    pub recycle_bin_modified: Option<String>,
    /// Scan duration in milliseconds.
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionTrace {
    #[serde(rename = "in_instance", default)]
    pub severity: Option<String>,
    #[serde(rename = "name", default)]
    pub description: Option<String>,
}

/// Rendered scan report — derived, never stored. A pure function of a
/// `ScanRecord` at a fixed instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub color: u32,
    pub title: String,
    pub fields: Vec<String>,
}
