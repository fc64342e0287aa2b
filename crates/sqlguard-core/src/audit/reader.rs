//! Bulk scanning of JSON-lines audit logs.
//!
//! Meant for analysis and tests, not the hot path. Lines that do not decode
//! are skipped instead of failing the scan.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};

use super::event::{AuditEvent, AuditEventType, AuditResult};
use crate::error::SecurityResult;

/// Optional narrowing applied on top of the time range.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Match this username, case-insensitively.
    pub username: Option<String>,
    /// Match this category.
    pub event_type: Option<AuditEventType>,
    /// Match this outcome.
    pub result: Option<AuditResult>,
}

impl AuditFilter {
    /// Whether `event` passes every set criterion.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.username
            .as_ref()
            .map_or(true, |u| u.eq_ignore_ascii_case(&event.username))
            && self.event_type.map_or(true, |t| t == event.event_type)
            && self.result.map_or(true, |r| r == event.result)
    }
}

/// Events whose timestamp lies in `[start, end]`, in file order.
pub fn get_events(
    path: impl AsRef<Path>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SecurityResult<Vec<AuditEvent>> {
    get_events_filtered(path, start, end, &AuditFilter::default())
}

/// Like [`get_events`], with an additional filter.
pub fn get_events_filtered(
    path: impl AsRef<Path>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter: &AuditFilter,
) -> SecurityResult<Vec<AuditEvent>> {
    let file = File::open(path.as_ref())?;
    read_events(BufReader::new(file), start, end, filter)
}

/// Scan any line-oriented reader.
pub fn read_events<R: BufRead>(
    reader: R,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter: &AuditFilter,
) -> SecurityResult<Vec<AuditEvent>> {
    let mut events = Vec::new();
    let mut skipped = 0usize;

    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let event: AuditEvent = match serde_json::from_slice(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(line = index + 1, error = %e, "skipping malformed audit line");
                skipped += 1;
                continue;
            }
        };
        if event.timestamp >= start && event.timestamp <= end && filter.matches(&event) {
            events.push(event);
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "malformed audit lines skipped during scan");
    }
    Ok(events)
}
