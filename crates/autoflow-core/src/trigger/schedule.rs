//! `scheduled` trigger config: interval, daily and cron schedules.
//!
//! Supported shapes (exactly one schedule key is used, first match wins):
//! - `interval`: milliseconds between firings
//! - `schedule: {type: "daily", hour, minute}` or `daily_at: "HH:MM"` (UTC)
//! - `cron` (or a string `schedule`): a 5/6-field cron expression or a
//!   human-readable form such as `every 5 minutes` / `every day at 09:30`
//!
//! An optional `query: {table, filters?, order_by?, limit?}` turns each firing
//! into one execution per returned row.

use std::time::Duration;

use autoflow_types::record::RecordQuery;
use autoflow_types::workflow::ActionKind;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::TriggerError;
use crate::action::record::record_query;

// ---------------------------------------------------------------------------
// Schedule normalization
// ---------------------------------------------------------------------------

/// Normalize a schedule string to a 6-field cron expression (with seconds).
///
/// Accepts standard 5-field cron (seconds are prepended as `0`), 6-field cron
/// as-is, and human-readable forms:
/// - `every minute` / `minutely`, `every hour` / `hourly`, `every day` / `daily`
/// - `every N seconds|minutes|hours`
/// - `every day at HH:MM`
pub fn normalize_schedule(input: &str) -> Result<String, TriggerError> {
    let trimmed = input.trim();
    let invalid = || TriggerError::InvalidSchedule(input.to_string());

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    match parts.len() {
        5 => return Ok(format!("0 {trimmed}")),
        6 => return Ok(trimmed.to_string()),
        _ => {}
    }

    let lower = trimmed.to_lowercase();
    match lower.as_str() {
        "every minute" | "minutely" => return Ok("0 * * * * *".to_string()),
        "every hour" | "hourly" => return Ok("0 0 * * * *".to_string()),
        "every day" | "daily" => return Ok("0 0 0 * * *".to_string()),
        _ => {}
    }

    let rest = lower.strip_prefix("every ").ok_or_else(invalid)?;
    if let Some(at) = rest.strip_prefix("day at ") {
        let (hour, minute) = parse_hh_mm(at).ok_or_else(invalid)?;
        return Ok(format!("0 {minute} {hour} * * *"));
    }

    let words: Vec<&str> = rest.split_whitespace().collect();
    let [count, unit] = words.as_slice() else {
        return Err(invalid());
    };
    let n: u32 = count.parse().map_err(|_| invalid())?;
    if n == 0 {
        return Err(TriggerError::InvalidSchedule("interval must be > 0".to_string()));
    }
    match unit.trim_end_matches('s') {
        "second" => Ok(format!("*/{n} * * * * *")),
        "minute" => Ok(format!("0 */{n} * * * *")),
        "hour" => Ok(format!("0 0 */{n} * * *")),
        _ => Err(invalid()),
    }
}

/// Parse `HH:MM` with range checks.
fn parse_hh_mm(input: &str) -> Option<(u32, u32)> {
    let (hour, minute) = input.trim().split_once(':')?;
    let hour: u32 = hour.trim().parse().ok()?;
    let minute: u32 = minute.trim().parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

// ---------------------------------------------------------------------------
// ScheduleSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    Interval(Duration),
    /// Once a day at `hour:minute` UTC.
    Daily { hour: u32, minute: u32 },
    /// Normalized 6-field cron expression, evaluated in UTC.
    Cron(String),
}

/// Table query whose rows fan out into one execution each.
#[derive(Debug, Clone)]
pub struct ScheduledQuery {
    pub table: String,
    pub query: RecordQuery,
}

#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub schedule: Schedule,
    pub query: Option<ScheduledQuery>,
}

impl ScheduleSpec {
    pub fn from_config(config: &Value) -> Result<Self, TriggerError> {
        let schedule = Self::parse_schedule(config)?;
        let query = match config.get("query") {
            None | Some(Value::Null) => None,
            Some(query @ Value::Object(_)) => {
                let table = query
                    .get("table")
                    .and_then(Value::as_str)
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| TriggerError::InvalidConfig("'query.table' is required".to_string()))?
                    .to_string();
                let query = record_query(query, ActionKind::QueryRecords)
                    .map_err(|e| TriggerError::InvalidConfig(format!("query: {e}")))?;
                Some(ScheduledQuery { table, query })
            }
            Some(_) => return Err(TriggerError::InvalidConfig("'query' must be an object".to_string())),
        };
        Ok(Self { schedule, query })
    }

    fn parse_schedule(config: &Value) -> Result<Schedule, TriggerError> {
        if let Some(interval) = config.get("interval") {
            let ms = match interval {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            }
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                TriggerError::InvalidConfig("'interval' must be a positive number of milliseconds".to_string())
            })?;
            return Ok(Schedule::Interval(Duration::from_millis(ms)));
        }

        match config.get("schedule") {
            Some(Value::Object(daily)) => {
                let kind = daily.get("type").and_then(Value::as_str).unwrap_or("daily");
                if kind != "daily" {
                    return Err(TriggerError::InvalidConfig(format!("unsupported schedule type '{kind}'")));
                }
                let field = |key: &str, max: u64| {
                    daily
                        .get(key)
                        .and_then(Value::as_u64)
                        .filter(|v| *v < max)
                        .map(|v| v as u32)
                };
                let hour = field("hour", 24)
                    .ok_or_else(|| TriggerError::InvalidConfig("'schedule.hour' must be 0-23".to_string()))?;
                let minute = match daily.get("minute") {
                    None => 0,
                    Some(_) => field("minute", 60)
                        .ok_or_else(|| TriggerError::InvalidConfig("'schedule.minute' must be 0-59".to_string()))?,
                };
                return Ok(Schedule::Daily { hour, minute });
            }
            Some(Value::String(expr)) => return Self::parse_cron(expr),
            Some(_) => return Err(TriggerError::InvalidConfig("'schedule' must be an object or string".to_string())),
            None => {}
        }

        if let Some(at) = config.get("daily_at") {
            let (hour, minute) = at
                .as_str()
                .and_then(parse_hh_mm)
                .ok_or_else(|| TriggerError::InvalidConfig("'daily_at' must be HH:MM".to_string()))?;
            return Ok(Schedule::Daily { hour, minute });
        }

        if let Some(expr) = config.get("cron") {
            let expr = expr
                .as_str()
                .ok_or_else(|| TriggerError::InvalidConfig("'cron' must be a string".to_string()))?;
            return Self::parse_cron(expr);
        }

        Err(TriggerError::InvalidConfig(
            "scheduled trigger needs one of 'interval', 'schedule', 'daily_at' or 'cron'".to_string(),
        ))
    }

    fn parse_cron(expr: &str) -> Result<Schedule, TriggerError> {
        let normalized = normalize_schedule(expr)?;
        normalized
            .parse::<croner::Cron>()
            .map_err(|e| TriggerError::InvalidSchedule(format!("{expr}: {e}")))?;
        Ok(Schedule::Cron(normalized))
    }

    /// Time to wait from `now` until the next firing.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Result<Duration, TriggerError> {
        let next = match &self.schedule {
            Schedule::Interval(every) => return Ok(*every),
            Schedule::Daily { hour, minute } => {
                let today = now
                    .date_naive()
                    .and_hms_opt(*hour, *minute, 0)
                    .ok_or_else(|| TriggerError::InvalidSchedule(format!("{hour}:{minute}")))?
                    .and_utc();
                if today > now {
                    today
                } else {
                    today + chrono::Duration::days(1)
                }
            }
            Schedule::Cron(expr) => {
                let cron = expr
                    .parse::<croner::Cron>()
                    .map_err(|e| TriggerError::InvalidSchedule(format!("{expr}: {e}")))?;
                cron.iter_after(now)
                    .next()
                    .ok_or_else(|| TriggerError::InvalidSchedule(format!("{expr}: no upcoming occurrence")))?
            }
        };
        Ok((next - now).to_std().unwrap_or(Duration::ZERO))
    }

    pub fn describe(&self) -> String {
        let schedule = match &self.schedule {
            Schedule::Interval(every) => format!("every {}ms", every.as_millis()),
            Schedule::Daily { hour, minute } => format!("daily at {hour:02}:{minute:02} UTC"),
            Schedule::Cron(expr) => format!("cron '{expr}'"),
        };
        match &self.query {
            Some(query) => format!("{schedule}, one run per row of {}", query.table),
            None => schedule,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_normalize_schedule_forms() {
        assert_eq!(normalize_schedule("*/5 * * * *").unwrap(), "0 */5 * * * *");
        assert_eq!(normalize_schedule("30 0 9 * * *").unwrap(), "30 0 9 * * *");
        assert_eq!(normalize_schedule("every 15 minutes").unwrap(), "0 */15 * * * *");
        assert_eq!(normalize_schedule("every day at 09:30").unwrap(), "0 30 9 * * *");
        assert_eq!(normalize_schedule("Hourly").unwrap(), "0 0 * * * *");
        assert!(normalize_schedule("every 0 hours").is_err());
        assert!(normalize_schedule("every day at 25:00").is_err());
        assert!(normalize_schedule("whenever").is_err());
    }

    #[test]
    fn test_interval_and_daily_forms() {
        let spec = ScheduleSpec::from_config(&json!({"interval": 60000})).unwrap();
        assert_eq!(spec.schedule, Schedule::Interval(Duration::from_secs(60)));

        let spec = ScheduleSpec::from_config(&json!({"schedule": {"type": "daily", "hour": 9, "minute": 30}})).unwrap();
        assert_eq!(spec.schedule, Schedule::Daily { hour: 9, minute: 30 });

        let spec = ScheduleSpec::from_config(&json!({"daily_at": "18:05"})).unwrap();
        assert_eq!(spec.schedule, Schedule::Daily { hour: 18, minute: 5 });

        assert!(ScheduleSpec::from_config(&json!({"interval": 0})).is_err());
        assert!(ScheduleSpec::from_config(&json!({"schedule": {"type": "weekly", "hour": 1}})).is_err());
        assert!(ScheduleSpec::from_config(&json!({"daily_at": "9am"})).is_err());
        assert!(ScheduleSpec::from_config(&json!({})).is_err());
    }

    #[test]
    fn test_daily_next_delay_rolls_over() {
        let spec = ScheduleSpec::from_config(&json!({"daily_at": "09:00"})).unwrap();

        let before = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(spec.next_delay(before).unwrap(), Duration::from_secs(3600));

        let after = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(spec.next_delay(after).unwrap(), Duration::from_secs(23 * 3600));
    }

    #[test]
    fn test_cron_next_delay() {
        let spec = ScheduleSpec::from_config(&json!({"cron": "every day at 12:00"})).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 11, 30, 0).unwrap();
        assert_eq!(spec.next_delay(now).unwrap(), Duration::from_secs(1800));
    }

    #[test]
    fn test_query_parsing() {
        let spec = ScheduleSpec::from_config(&json!({
            "interval": 1000,
            "query": {"table": "jobs", "filters": {"status": "open"}, "limit": 5}
        }))
        .unwrap();
        let query = spec.query.unwrap();
        assert_eq!(query.table, "jobs");
        assert_eq!(query.query.limit, Some(5));

        assert!(ScheduleSpec::from_config(&json!({"interval": 1000, "query": {"filters": {}}})).is_err());
    }
}
