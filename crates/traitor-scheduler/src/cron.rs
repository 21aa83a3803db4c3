//! Cron expression evaluation.
//!
//! Expressions have exactly six fields, seconds first:
//! `sec min hour day-of-month month day-of-week`. Evaluation is pure: the
//! only notion of "now" is the reference instant passed in, and matches are
//! computed in that instant's UTC offset.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, TimeZone};
use cron::Schedule;
use thiserror::Error;

/// Field count every accepted expression must have.
pub const CRON_FIELDS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("cron expression is empty")]
    Empty,

    #[error("expected 6 fields (sec min hour day month weekday), got {0}")]
    FieldCount(usize),

    #[error("{0}")]
    Parse(String),
}

/// A parsed, validated cron expression.
#[derive(Debug, Clone)]
pub struct CronExpr {
    source: String,
    schedule: Schedule,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(CronError::Empty);
        }

        // The cron crate also accepts an optional trailing year field.
        let fields = trimmed.split_whitespace().count();
        if fields != CRON_FIELDS {
            return Err(CronError::FieldCount(fields));
        }

        let schedule = Schedule::from_str(trimmed).map_err(|e| CronError::Parse(e.to_string()))?;
        Ok(Self {
            source: trimmed.to_string(),
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First match strictly after `from`, in `from`'s timezone.
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(from).next()
    }

    /// Latest match at or before `at`, in `at`'s timezone.
    pub fn latest_until<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        // Cron has second resolution; start one second past `at` and walk
        // back to the first match that is not in the future.
        let start = at.clone() + chrono::Duration::seconds(1);
        self.schedule.after(&start).rev().find(|t| t <= at)
    }

    /// Up to `count` matches strictly after `from`, in increasing order.
    pub fn upcoming<Tz: TimeZone>(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        self.schedule.after(from).take(count).collect()
    }
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Next `count` fire times of `expr` strictly after `from`.
///
/// An expression that can never fire again (e.g. February 30th) yields an
/// empty vector, not an error.
pub fn next_matches(
    expr: &str,
    from: DateTime<FixedOffset>,
    count: usize,
) -> Result<Vec<DateTime<FixedOffset>>, CronError> {
    Ok(CronExpr::parse(expr)?.upcoming(&from, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn every_five_minutes_from_midnight() {
        let got = next_matches("0 */5 * * * *", at("2024-01-01T00:00:00Z"), 3).unwrap();
        let expected = vec![
            at("2024-01-01T00:05:00Z"),
            at("2024-01-01T00:10:00Z"),
            at("2024-01-01T00:15:00Z"),
        ];
        assert_eq!(got, expected);
    }

    #[test]
    fn matches_strictly_increase_and_follow_from() {
        let from = at("2024-03-10T12:34:56Z");
        let got = next_matches("*/7 * * * * *", from, 20).unwrap();
        assert_eq!(got.len(), 20);
        assert!(got[0] > from);
        assert!(got.windows(2).all(|w| w[0] < w[1]));
        assert!(got.iter().all(|t| t.second() % 7 == 0));
    }

    #[test]
    fn reference_instant_is_excluded() {
        let from = at("2024-01-01T00:05:00Z");
        let got = next_matches("0 */5 * * * *", from, 1).unwrap();
        assert_eq!(got, vec![at("2024-01-01T00:10:00Z")]);
    }

    #[test]
    fn evaluated_in_the_reference_offset() {
        // 09:00 local at +08:00 is 01:00 UTC.
        let from = at("2024-01-01T08:00:00+08:00");
        let got = next_matches("0 0 9 * * *", from, 1).unwrap();
        assert_eq!(got[0], at("2024-01-01T09:00:00+08:00"));
        assert_eq!(got[0].with_timezone(&Utc).hour(), 1);
        assert_eq!(got[0].offset(), from.offset());
    }

    #[test]
    fn impossible_date_yields_empty() {
        let got = next_matches("0 0 0 30 2 *", at("2024-01-01T00:00:00Z"), 5).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn wrong_field_count_rejected() {
        assert_eq!(
            CronExpr::parse("*/5 * * * *").unwrap_err(),
            CronError::FieldCount(5)
        );
        assert_eq!(
            CronExpr::parse("0 0 0 1 1 * 2030").unwrap_err(),
            CronError::FieldCount(7)
        );
        assert_eq!(CronExpr::parse("   ").unwrap_err(), CronError::Empty);
    }

    #[test]
    fn garbage_rejected() {
        assert!(matches!(
            CronExpr::parse("a b c d e f"),
            Err(CronError::Parse(_))
        ));
        assert!(matches!(
            next_matches("x y z 1 1 *", at("2024-01-01T00:00:00Z"), 1),
            Err(CronError::Parse(_))
        ));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let expr = CronExpr::parse("  0 0 * * * *  ").unwrap();
        assert_eq!(expr.as_str(), "0 0 * * * *");
        assert!(CronExpr::parse(expr.as_str()).is_ok());
    }

    #[test]
    fn latest_until_finds_most_recent_match() {
        let expr = CronExpr::parse("0 */5 * * * *").unwrap();
        assert_eq!(
            expr.latest_until(&at("2024-01-01T00:17:30Z")),
            Some(at("2024-01-01T00:15:00Z"))
        );
        // A match exactly at the reference instant counts.
        assert_eq!(
            expr.latest_until(&at("2024-01-01T00:15:00Z")),
            Some(at("2024-01-01T00:15:00Z"))
        );
    }
}
