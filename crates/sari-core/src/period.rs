//! Time-windowed grants.
//!
//! A grant is active iff `now >= not_valid_before` (when set) and
//! `now <= not_valid_after` (when set). [`TransitionTracker`] evaluates many
//! windows against one reference instant and remembers the earliest strictly
//! future boundary it saw, which becomes the model's next-transition marker.

use crate::error::{Result, SariError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

// ---------------------------------------------------------------------------
// Timestamp parsing
// ---------------------------------------------------------------------------

/// Parse a timezone-aware timestamp from configuration.
///
/// Accepts RFC 3339 and the YAML spelling `2020-05-26 10:22:00 +01:00`.
/// A timestamp without an offset is rejected as naive.
pub fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    let normalized = normalize(raw);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").is_ok();
    if naive {
        Err(SariError::NaiveTimestamp {
            field: field.to_string(),
            value: raw.to_string(),
        })
    } else {
        Err(SariError::InvalidTimestamp {
            field: field.to_string(),
            value: raw.to_string(),
        })
    }
}

fn normalize(raw: &str) -> String {
    let mut parts = raw.split_whitespace();
    let Some(date) = parts.next() else {
        return String::new();
    };
    match parts.next() {
        Some(time) => {
            let offset: String = parts.collect();
            format!("{date}T{time}{offset}")
        }
        None => date.to_string(),
    }
}

// ---------------------------------------------------------------------------
// GrantWindow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrantWindow {
    pub not_valid_before: Option<DateTime<Utc>>,
    pub not_valid_after: Option<DateTime<Utc>>,
}

impl GrantWindow {
    /// Build a window, rejecting one whose end precedes its start.
    pub fn new(
        not_valid_before: Option<DateTime<Utc>>,
        not_valid_after: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if let (Some(start), Some(end)) = (not_valid_before, not_valid_after) {
            if end < start {
                return Err(SariError::InvertedWindow {
                    not_valid_before: start.to_rfc3339_opts(SecondsFormat::Secs, true),
                    not_valid_after: end.to_rfc3339_opts(SecondsFormat::Secs, true),
                });
            }
        }
        Ok(Self {
            not_valid_before,
            not_valid_after,
        })
    }

    /// Parse both bounds from their raw configuration strings.
    pub fn parse(not_valid_before: Option<&str>, not_valid_after: Option<&str>) -> Result<Self> {
        let start = not_valid_before
            .map(|raw| parse_timestamp("not_valid_before", raw))
            .transpose()?;
        let end = not_valid_after
            .map(|raw| parse_timestamp("not_valid_after", raw))
            .transpose()?;
        Self::new(start, end)
    }

    pub fn is_unbounded(&self) -> bool {
        self.not_valid_before.is_none() && self.not_valid_after.is_none()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.not_valid_before.map_or(true, |start| now >= start)
            && self.not_valid_after.map_or(true, |end| now <= end)
    }

    /// The earliest bound strictly after `now`.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        [self.not_valid_before, self.not_valid_after]
            .into_iter()
            .flatten()
            .filter(|t| *t > now)
            .min()
    }
}

// ---------------------------------------------------------------------------
// TransitionTracker
// ---------------------------------------------------------------------------

/// Evaluates grant windows against a fixed instant and keeps the earliest
/// future boundary. The marker only ever moves earlier.
#[derive(Debug, Clone)]
pub struct TransitionTracker {
    now: DateTime<Utc>,
    next: Option<DateTime<Utc>>,
}

impl TransitionTracker {
    /// `current` is the marker already present in the model, if any.
    pub fn new(now: DateTime<Utc>, current: Option<DateTime<Utc>>) -> Self {
        let mut tracker = Self { now, next: None };
        if let Some(t) = current {
            tracker.record(t);
        }
        tracker
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Whether `window` is active now. Future bounds feed the marker.
    pub fn evaluate(&mut self, window: &GrantWindow) -> bool {
        if let Some(boundary) = window.next_boundary(self.now) {
            self.record(boundary);
        }
        window.is_active(self.now)
    }

    fn record(&mut self, t: DateTime<Utc>) {
        if self.next.map_or(true, |current| t < current) {
            self.next = Some(t);
        }
    }

    pub fn next_transition(&self) -> Option<DateTime<Utc>> {
        self.next
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
