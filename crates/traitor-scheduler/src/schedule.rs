use chrono::{DateTime, FixedOffset, Utc};

use crate::{
    cron::{CronError, CronExpr},
    types::{ExecType, Job},
};

/// The fire instant that makes `job` due at `now`, if any.
///
/// Timing jobs are due when the first cron match strictly after their last
/// dispatch (or the Unix epoch, if never dispatched) is not in the future.
/// However many instants were missed, one dispatch covers them all and the
/// most recent of them is reported.
///
/// Delay jobs are due once `execAt` has passed and they have not fired yet.
///
/// State (enabled/disabled) is not considered here.
pub fn due_fire_time(
    job: &Job,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<Option<DateTime<Utc>>, CronError> {
    match job.exec_type {
        ExecType::Timing => {
            let expr = CronExpr::parse(job.cron.as_deref().unwrap_or_default())?;
            let baseline = job.last_exec_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            let Some(first) = expr.next_after(&baseline.with_timezone(&offset)) else {
                return Ok(None);
            };
            let first = first.with_timezone(&Utc);
            if first > now {
                return Ok(None);
            }
            // Report the most recent missed instant; it is never earlier than
            // the first one after the baseline.
            let latest = expr
                .latest_until(&now.with_timezone(&offset))
                .map(|t| t.with_timezone(&Utc))
                .map_or(first, |t| t.max(first));
            Ok(Some(latest))
        }
        ExecType::Delay => Ok(job.exec_at.filter(|at| *at <= now && !job.fired())),
    }
}

/// Next instant `job` will fire after `now`, for display.
///
/// Timing jobs report their next cron match; delay jobs report `execAt`
/// until they have fired. Jobs with an unusable schedule report nothing.
pub fn next_exec_time(job: &Job, now: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
    match job.exec_type {
        ExecType::Timing => {
            let expr = CronExpr::parse(job.cron.as_deref()?).ok()?;
            expr.next_after(&now.with_timezone(&offset))
                .map(|t| t.with_timezone(&Utc))
        }
        ExecType::Delay => job.exec_at.filter(|_| !job.fired()),
    }
}
