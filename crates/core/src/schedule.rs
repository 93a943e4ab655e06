//! Recurrence expressions and next-run computation.
//!
//! Two forms are accepted:
//!
//! - `every N minutes` / `every N hours` — a fixed interval;
//! - a 5-field cron expression (`minute hour day-of-month month day-of-week`)
//!   supporting `*`, `*/step`, single values, ranges, and comma lists.
//!
//! The next run is always computed relative to the instant the expression is
//! evaluated, never relative to the previous scheduled time, so a task that
//! was down for a week fires once on restart instead of replaying the
//! backlog.

use chrono::{Datelike, Duration, Timelike};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Upper bound on the cron scan, in minutes (366 days). An expression with
/// no occurrence within a year is rejected at parse time by this bound.
const MAX_SCAN_MINUTES: i64 = 366 * 24 * 60;

/// A parsed recurrence expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recurrence {
    /// Fixed interval in minutes.
    Every { minutes: u32 },
    /// 5-field cron expression.
    Cron(CronExpr),
}

impl Recurrence {
    /// Parse a recurrence expression string.
    ///
    /// Returns `CoreError::Validation` describing the first problem found.
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Validation(
                "Schedule expression must not be empty".to_string(),
            ));
        }

        if let Some(rest) = trimmed.strip_prefix("every ") {
            return parse_interval(rest);
        }

        CronExpr::parse(trimmed).map(Recurrence::Cron)
    }

    /// Compute the next occurrence strictly after `now`.
    pub fn next_after(&self, now: Timestamp) -> Timestamp {
        match self {
            Recurrence::Every { minutes } => now + Duration::minutes(*minutes as i64),
            Recurrence::Cron(cron) => cron.next_after(now),
        }
    }
}

/// Parse the tail of an `every ...` expression, e.g. `15 minutes`, `1 hour`.
fn parse_interval(rest: &str) -> Result<Recurrence, CoreError> {
    let mut parts = rest.split_whitespace();
    let count: u32 = parts
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            CoreError::Validation(format!("Invalid interval count in 'every {rest}'"))
        })?;
    if count == 0 {
        return Err(CoreError::Validation(
            "Interval count must be at least 1".to_string(),
        ));
    }

    let unit = parts.next().unwrap_or("");
    if parts.next().is_some() {
        return Err(CoreError::Validation(format!(
            "Unexpected trailing tokens in 'every {rest}'"
        )));
    }

    let minutes = match unit {
        "minute" | "minutes" => count,
        "hour" | "hours" => count
            .checked_mul(60)
            .ok_or_else(|| CoreError::Validation("Interval too large".to_string()))?,
        other => {
            return Err(CoreError::Validation(format!(
                "Unknown interval unit: '{other}'. Valid units: minutes, hours"
            )))
        }
    };

    Ok(Recurrence::Every { minutes })
}

// ---------------------------------------------------------------------------
// Cron
// ---------------------------------------------------------------------------

/// One cron field: `*`, `*/step`, or an explicit set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Any,
    Step(u32),
    Values(Vec<u32>),
}

impl Field {
    fn matches(&self, value: u32) -> bool {
        match self {
            Field::Any => true,
            Field::Step(step) => value % step == 0,
            Field::Values(values) => values.contains(&value),
        }
    }

    fn is_any(&self) -> bool {
        matches!(self, Field::Any)
    }
}

/// A parsed 5-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronExpr {
    /// Parse `minute hour day-of-month month day-of-week`.
    pub fn parse(expr: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CoreError::Validation(format!(
                "Cron expression must have 5 fields, got {}: '{expr}'",
                parts.len()
            )));
        }

        Ok(Self {
            minute: parse_field(parts[0], 0, 59, "minute")?,
            hour: parse_field(parts[1], 0, 23, "hour")?,
            day_of_month: parse_field(parts[2], 1, 31, "day-of-month")?,
            month: parse_field(parts[3], 1, 12, "month")?,
            day_of_week: parse_field(parts[4], 0, 6, "day-of-week")?,
        })
    }

    /// Whether the expression matches a given instant (minute resolution).
    fn matches(&self, t: Timestamp) -> bool {
        if !self.minute.matches(t.minute())
            || !self.hour.matches(t.hour())
            || !self.month.matches(t.month())
        {
            return false;
        }

        let dom_ok = self.day_of_month.matches(t.day());
        // chrono: Monday=0 in weekday().num_days_from_monday; cron uses
        // Sunday=0, so convert via num_days_from_sunday.
        let dow_ok = self.day_of_week.matches(t.weekday().num_days_from_sunday());

        // Standard cron semantics: when both day fields are restricted,
        // either may match; otherwise both (the unrestricted one is always
        // true anyway).
        if !self.day_of_month.is_any() && !self.day_of_week.is_any() {
            dom_ok || dow_ok
        } else {
            dom_ok && dow_ok
        }
    }

    /// Next matching instant strictly after `now`, scanned at minute
    /// resolution.
    fn next_after(&self, now: Timestamp) -> Timestamp {
        let mut candidate = truncate_to_minute(now) + Duration::minutes(1);
        for _ in 0..MAX_SCAN_MINUTES {
            if self.matches(candidate) {
                return candidate;
            }
            candidate += Duration::minutes(1);
        }
        // Unreachable for any expression this parser accepts: every field
        // has at least one admissible value per year.
        candidate
    }
}

fn truncate_to_minute(t: Timestamp) -> Timestamp {
    t - Duration::seconds(t.second() as i64)
        - Duration::nanoseconds(t.timestamp_subsec_nanos() as i64)
}

/// Parse a single cron field within `[min, max]`.
fn parse_field(raw: &str, min: u32, max: u32, name: &str) -> Result<Field, CoreError> {
    if raw == "*" {
        return Ok(Field::Any);
    }

    if let Some(step) = raw.strip_prefix("*/") {
        let step: u32 = step.parse().map_err(|_| {
            CoreError::Validation(format!("Invalid step in cron {name} field: '{raw}'"))
        })?;
        if step == 0 || step > max {
            return Err(CoreError::Validation(format!(
                "Step out of range in cron {name} field: '{raw}'"
            )));
        }
        return Ok(Field::Step(step));
    }

    let mut values = Vec::new();
    for token in raw.split(',') {
        if let Some((lo, hi)) = token.split_once('-') {
            let lo: u32 = parse_bounded(lo, min, max, name)?;
            let hi: u32 = parse_bounded(hi, min, max, name)?;
            if lo > hi {
                return Err(CoreError::Validation(format!(
                    "Empty range in cron {name} field: '{token}'"
                )));
            }
            values.extend(lo..=hi);
        } else {
            values.push(parse_bounded(token, min, max, name)?);
        }
    }

    if values.is_empty() {
        return Err(CoreError::Validation(format!(
            "Empty cron {name} field"
        )));
    }
    Ok(Field::Values(values))
}

fn parse_bounded(token: &str, min: u32, max: u32, name: &str) -> Result<u32, CoreError> {
    let value: u32 = token.parse().map_err(|_| {
        CoreError::Validation(format!("Invalid value in cron {name} field: '{token}'"))
    })?;
    if value < min || value > max {
        return Err(CoreError::Validation(format!(
            "Value {value} out of range {min}..={max} in cron {name} field"
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
