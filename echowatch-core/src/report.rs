//! Report formatter — pure transforms from a raw `ScanRecord` to a `Report`.
//!
//! No I/O, no side effects. Two records with identical field values render
//! byte-identical reports at a fixed instant; the `*_at` variants take an
//! explicit `now` so tests can pin it.
//!
//! `IncompleteScan` doubles as the polling engine's readiness signal: a
//! record without a detection verdict is "not ready yet", not an error.

use chrono::{DateTime, Local, LocalResult, NaiveDate, TimeZone};
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{DetectionTrace, Report, ScanListEntry, ScanRecord};

/// Fixed slot order for per-process start timestamps. Output order never
/// depends on input key order.
const START_TIME_SLOTS: [&str; 5] = ["dps", "pca", "dgt", "sys", "explorer"];

const NO_ACCOUNTS: &str = "No Steam accounts found.";
const NO_DETECTIONS: &str = "No detections found.";

pub const REPORT_COLOR: u32 = 0x0099ff;
pub const REPORT_TITLE: &str = "Scan Report";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatterError {
    #[error("scan has no results yet")]
    IncompleteScan,

    #[error("malformed scan payload: {0}")]
    Malformed(String),
}

// ============================================================================
// Date-delta rendering
// ============================================================================

/// Day count and display date derived from an ISO-8601 timestamp. The
/// sentinel (both fields `None`, rendered "N/A" / "unavailable") is a valid
/// non-error result that callers must pass through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDelta {
    pub days: Option<i64>,
    pub display_date: Option<String>,
}

impl DayDelta {
    pub fn unavailable() -> Self {
        Self {
            days: None,
            display_date: None,
        }
    }

    pub fn days_label(&self) -> String {
        match self.days {
            Some(d) => d.to_string(),
            None => "N/A".to_string(),
        }
    }

    pub fn date_label(&self) -> &str {
        self.display_date.as_deref().unwrap_or("unavailable")
    }
}

/// Parse the date-only prefix of `iso` (before the `T` separator) and count
/// whole days elapsed since that date's **local** midnight.
///
/// The day count floors against local calendar midnight, so results vary
/// with the host time zone. Intentional: reports have always been read in
/// the operator's local time.
pub fn day_delta(iso: &str) -> DayDelta {
    day_delta_at(iso, Local::now())
}

pub fn day_delta_at(iso: &str, now: DateTime<Local>) -> DayDelta {
    let Some((date_part, _)) = iso.split_once('T') else {
        return DayDelta::unavailable();
    };
    let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
        return DayDelta::unavailable();
    };

    // Midnight always exists for a NaiveDate.
    let midnight = match date.and_hms_opt(0, 0, 0) {
        Some(m) => m,
        None => return DayDelta::unavailable(),
    };
    let local_midnight = match Local.from_local_datetime(&midnight) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
        // DST gap swallowed the midnight; treat as unavailable.
        LocalResult::None => return DayDelta::unavailable(),
    };

    let diff_ms = now.signed_duration_since(local_midnight).num_milliseconds();
    let days = diff_ms.div_euclid(86_400_000);

    DayDelta {
        days: Some(days),
        display_date: Some(date.format("%d/%m/%Y").to_string()),
    }
}

// ============================================================================
// Field rendering
// ============================================================================

/// Render one markdown profile link per account triple
/// (`ignored:platform-id:display-name`).
pub fn render_account_links(accounts: &[String]) -> String {
    if accounts.is_empty() {
        return NO_ACCOUNTS.to_string();
    }

    accounts
        .iter()
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let _ignored = parts.next();
            let id = parts.next().filter(|s| !s.is_empty()).unwrap_or("0");
            let name = parts.next().filter(|s| !s.is_empty()).unwrap_or("Unknown");
            format!("[{name}](https://steamcommunity.com/profiles/{id})")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render detection traces as two-line blocks separated by a blank line.
pub fn render_detections(traces: &[DetectionTrace]) -> String {
    if traces.is_empty() {
        return NO_DETECTIONS.to_string();
    }

    traces
        .iter()
        .map(|trace| {
            format!(
                "**Severity**: `{}`\n**Description**: {}",
                trace.severity.as_deref().unwrap_or("Unknown"),
                trace.description.as_deref().unwrap_or("Unnamed"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render the fixed five start-time slots in order. A slot renders `N/A`
/// unless its value is a positive epoch-seconds number; unknown input keys
/// are ignored.
pub fn render_start_times(start_time: &HashMap<String, serde_json::Value>) -> String {
    START_TIME_SLOTS
        .iter()
        .map(|slot| {
            let rendered = start_time
                .get(*slot)
                .and_then(serde_json::Value::as_i64)
                .filter(|ts| *ts > 0)
                .and_then(format_epoch_seconds);
            match rendered {
                Some(ts) => format!("**{}**: {}", slot.to_uppercase(), ts),
                None => format!("**{}**: N/A", slot.to_uppercase()),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_epoch_seconds(secs: i64) -> Option<String> {
    match Local.timestamp_opt(secs, 0) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
            Some(dt.format("%d/%m/%Y %H:%M:%S").to_string())
        }
        LocalResult::None => None,
    }
}

// ============================================================================
// Report assembly
// ============================================================================

/// Pick the list entry the polling loop should follow up on: the first one
/// carrying the expected game tag and a uuid. Anything else means the scan
/// is not addressable yet.
pub fn match_ready_entry<'a>(
    entries: &'a [ScanListEntry],
    game_tag: &str,
) -> Result<&'a ScanListEntry, FormatterError> {
    entries
        .iter()
        .find(|e| e.game.as_deref() == Some(game_tag) && e.uuid.is_some())
        .ok_or(FormatterError::IncompleteScan)
}

/// Compose the full report. `IncompleteScan` when the record lacks a
/// detection verdict — the caller treats that as "keep waiting".
pub fn build_report(record: &ScanRecord) -> Result<Report, FormatterError> {
    build_report_at(record, Local::now())
}

pub fn build_report_at(record: &ScanRecord, now: DateTime<Local>) -> Result<Report, FormatterError> {
    let detection = record
        .detection
        .as_deref()
        .filter(|d| !d.is_empty())
        .ok_or(FormatterError::IncompleteScan)?;

    let uuid = record
        .uuid
        .as_deref()
        .ok_or_else(|| FormatterError::Malformed("scan record has no uuid".to_string()))?;

    let install = day_delta_at(
        record.results.info.installation_date.as_deref().unwrap_or(""),
        now,
    );
    let recycle_bin = day_delta_at(
        record.results.info.recycle_bin_modified.as_deref().unwrap_or(""),
        now,
    );

    let duration = match record.results.info.speed {
        Some(ms) if ms > 0.0 => format!("{:.2} minutes", ms / 60_000.0),
        _ => "N/A".to_string(),
    };

    let fields = vec![
        format!("**Result:** {detection}"),
        format!("**Pin:** {}", record.pin.as_deref().unwrap_or("N/A")),
        format!("**Duration:** {duration}"),
        format!(
            "**Steam accounts:**\n{}",
            render_account_links(&record.accounts)
        ),
        format!(
            "**Recycle bin:** {} days ({})",
            recycle_bin.days_label(),
            recycle_bin.date_label()
        ),
        format!(
            "**Installation:** {} days ({})",
            install.days_label(),
            install.date_label()
        ),
        format!("**Detections:**\n{}", render_detections(&record.results.traces)),
        format!(
            "**Start times:**\n{}",
            render_start_times(&record.results.start_time)
        ),
        format!("**Full report:** [View more](https://scan.echo.ac/{uuid})"),
    ];

    Ok(Report {
        color: REPORT_COLOR,
        title: REPORT_TITLE.to_string(),
        fields,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScanInfo, ScanResults};

    fn fixed_now() -> DateTime<Local> {
        // Local midnight, ten days after 2024-03-01.
        match Local.with_ymd_and_hms(2024, 3, 11, 12, 0, 0) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            LocalResult::None => panic!("fixed test instant does not exist locally"),
        }
    }

    // ------------------------------------------------------------------
    // day_delta
    // ------------------------------------------------------------------

    #[test]
    fn test_day_delta_counts_whole_days_since_local_midnight() {
        let delta = day_delta_at("2024-03-01T15:30:00Z", fixed_now());
        assert_eq!(delta.days, Some(10));
        assert_eq!(delta.display_date.as_deref(), Some("01/03/2024"));
        assert_eq!(delta.days_label(), "10");
        assert_eq!(delta.date_label(), "01/03/2024");
    }

    #[test]
    fn test_day_delta_same_day_is_zero() {
        let delta = day_delta_at("2024-03-11T00:00:00Z", fixed_now());
        assert_eq!(delta.days, Some(0));
    }

    #[test]
    fn test_day_delta_sentinel_for_malformed_inputs() {
        for input in ["", "not-a-date", "2024-03-01", "xxxx-yy-zzT00:00:00", "T"] {
            let delta = day_delta_at(input, fixed_now());
            assert_eq!(delta, DayDelta::unavailable(), "input: {input:?}");
            assert_eq!(delta.days_label(), "N/A");
            assert_eq!(delta.date_label(), "unavailable");
        }
    }

    #[test]
    fn test_day_delta_future_date_floors_negative() {
        // 12:00 on the day before the parsed date: -0.5 days floors to -1.
        let delta = day_delta_at("2024-03-12T00:00:00Z", fixed_now());
        assert_eq!(delta.days, Some(-1));
    }

    // ------------------------------------------------------------------
    // render_account_links
    // ------------------------------------------------------------------

    #[test]
    fn test_account_links_render_one_line_per_account() {
        let accounts = vec![
            "x:76561198000000001:PlayerOne".to_string(),
            "y:76561198000000002:PlayerTwo".to_string(),
        ];
        let out = render_account_links(&accounts);
        assert_eq!(
            out,
            "[PlayerOne](https://steamcommunity.com/profiles/76561198000000001)\n\
             [PlayerTwo](https://steamcommunity.com/profiles/76561198000000002)"
        );
    }

    #[test]
    fn test_account_links_placeholders_for_missing_parts() {
        let accounts = vec!["x:76561198000000001:".to_string(), "x::Name".to_string()];
        let out = render_account_links(&accounts);
        assert_eq!(
            out,
            "[Unknown](https://steamcommunity.com/profiles/76561198000000001)\n\
             [Name](https://steamcommunity.com/profiles/0)"
        );
    }

    #[test]
    fn test_account_links_empty_input_renders_sentinel() {
        assert_eq!(render_account_links(&[]), "No Steam accounts found.");
    }

    // ------------------------------------------------------------------
    // render_detections
    // ------------------------------------------------------------------

    #[test]
    fn test_detections_render_blocks_with_blank_line() {
        let traces = vec![
            DetectionTrace {
                severity: Some("high".to_string()),
                description: Some("cheat.dll".to_string()),
            },
            DetectionTrace {
                severity: None,
                description: None,
            },
        ];
        let out = render_detections(&traces);
        assert_eq!(
            out,
            "**Severity**: `high`\n**Description**: cheat.dll\n\n\
             **Severity**: `Unknown`\n**Description**: Unnamed"
        );
    }

    #[test]
    fn test_detections_empty_input_renders_sentinel() {
        assert_eq!(render_detections(&[]), "No detections found.");
    }

    // ------------------------------------------------------------------
    // render_start_times
    // ------------------------------------------------------------------

    #[test]
    fn test_start_times_fixed_slot_order_and_na() {
        // Insert in a scrambled order with junk keys; output order is fixed.
        let mut map = HashMap::new();
        map.insert("explorer".to_string(), serde_json::json!(1_700_000_100));
        map.insert("bogus".to_string(), serde_json::json!(1_700_000_000));
        map.insert("dps".to_string(), serde_json::json!(1_700_000_000));

        let out = render_start_times(&map);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("**DPS**: "));
        assert_eq!(lines[1], "**PCA**: N/A");
        assert_eq!(lines[2], "**DGT**: N/A");
        assert_eq!(lines[3], "**SYS**: N/A");
        assert!(lines[4].starts_with("**EXPLORER**: "));
        assert!(!lines[0].ends_with("N/A"));
    }

    #[test]
    fn test_start_times_rejects_non_positive_and_non_numeric() {
        let mut map = HashMap::new();
        map.insert("dps".to_string(), serde_json::json!(0));
        map.insert("pca".to_string(), serde_json::json!(-5));
        map.insert("dgt".to_string(), serde_json::json!("soon"));
        map.insert("sys".to_string(), serde_json::Value::Null);

        let out = render_start_times(&map);
        for line in out.lines() {
            assert!(line.ends_with("N/A"), "line: {line}");
        }
    }

    // ------------------------------------------------------------------
    // match_ready_entry / build_report
    // ------------------------------------------------------------------

    fn entry(uuid: Option<&str>, game: Option<&str>) -> ScanListEntry {
        ScanListEntry {
            uuid: uuid.map(str::to_string),
            game: game.map(str::to_string),
        }
    }

    #[test]
    fn test_match_ready_entry_requires_game_tag_and_uuid() {
        let entries = vec![
            entry(Some("uuid-0"), Some("Other Game")),
            entry(None, Some("GTA-V RP")),
            entry(Some("uuid-1"), Some("GTA-V RP")),
        ];
        let found = match_ready_entry(&entries, "GTA-V RP").unwrap();
        assert_eq!(found.uuid.as_deref(), Some("uuid-1"));

        let miss = match_ready_entry(&entries[..2], "GTA-V RP");
        assert_eq!(miss.unwrap_err(), FormatterError::IncompleteScan);
    }

    fn complete_record() -> ScanRecord {
        ScanRecord {
            detection: Some("Clean".to_string()),
            pin: Some("ABC123".to_string()),
            uuid: Some("uuid-1".to_string()),
            accounts: vec!["x:76561198000000001:PlayerOne".to_string()],
            results: ScanResults {
                info: ScanInfo {
                    installation_date: Some("2024-03-01T10:00:00Z".to_string()),
                    recycle_bin_modified: None,
                    speed: Some(120_000.0),
                },
                traces: vec![],
                start_time: HashMap::new(),
            },
        }
    }

    #[test]
    fn test_build_report_without_detection_is_incomplete() {
        let mut record = complete_record();
        record.detection = None;
        assert_eq!(
            build_report_at(&record, fixed_now()).unwrap_err(),
            FormatterError::IncompleteScan
        );

        record.detection = Some(String::new());
        assert_eq!(
            build_report_at(&record, fixed_now()).unwrap_err(),
            FormatterError::IncompleteScan
        );
    }

    #[test]
    fn test_build_report_without_uuid_is_malformed() {
        let mut record = complete_record();
        record.uuid = None;
        assert!(matches!(
            build_report_at(&record, fixed_now()),
            Err(FormatterError::Malformed(_))
        ));
    }

    #[test]
    fn test_build_report_field_order_and_content() {
        let report = build_report_at(&complete_record(), fixed_now()).unwrap();

        assert_eq!(report.color, 0x0099ff);
        assert_eq!(report.title, "Scan Report");
        assert_eq!(report.fields.len(), 9);
        assert_eq!(report.fields[0], "**Result:** Clean");
        assert_eq!(report.fields[1], "**Pin:** ABC123");
        assert_eq!(report.fields[2], "**Duration:** 2.00 minutes");
        assert!(report.fields[3].starts_with("**Steam accounts:**\n[PlayerOne]"));
        assert_eq!(report.fields[4], "**Recycle bin:** N/A days (unavailable)");
        assert_eq!(report.fields[5], "**Installation:** 10 days (01/03/2024)");
        assert_eq!(
            report.fields[6],
            "**Detections:**\nNo detections found."
        );
        assert_eq!(
            report.fields[8],
            "**Full report:** [View more](https://scan.echo.ac/uuid-1)"
        );
    }

    #[test]
    fn test_build_report_is_deterministic() {
        let a = build_report_at(&complete_record(), fixed_now()).unwrap();
        let b = build_report_at(&complete_record(), fixed_now()).unwrap();
        assert_eq!(a, b);
    }
}
