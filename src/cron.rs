//! 5-field cron expression parsing and next-occurrence computation.
//!
//! Supports the classic `minute hour day-of-month month day-of-week`
//! syntax with `*`, lists, ranges, `/step`, month and weekday names, and
//! the `@hourly`/`@daily`/`@weekly`/`@monthly`/`@yearly` shorthands.
//! Day-of-month and day-of-week combine with the traditional cron OR rule
//! when both are restricted. All computation is in UTC.

use chrono::{DateTime, Datelike, Days, Duration, TimeZone, Timelike, Utc};

/// A parsed, immutable cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days: u64,
    months: u64,
    weekdays: u64,
}

/// A cron expression that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid cron expression `{expression}`: {reason}")]
pub struct CronParseError {
    /// The offending expression, verbatim.
    pub expression: String,
    /// What was wrong with it.
    pub reason: String,
}

/// Value domain of one cron field.
struct Field {
    name: &'static str,
    min: u8,
    max: u8,
    names: &'static [&'static str],
}

const MINUTE: Field = Field { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: Field = Field { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: Field = Field { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ],
};
// Weekday 7 is accepted during parsing and folded onto 0 (both Sunday).
const DAY_OF_WEEK: Field = Field {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
};

/// Iteration bound for the next-occurrence scan; only calendar-impossible
/// expressions such as `0 0 30 2 *` ever reach it.
const MAX_SCAN_STEPS: u32 = 200_000;

/// Weekday mask after folding 7 onto 0: bits 0 (Sunday) through 6 (Saturday).
const WEEKDAY_FULL: u64 = 0b0111_1111;

impl CronSchedule {
    /// Parse a cron expression or `@` shorthand.
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let trimmed = expression.trim();
        let fields_src = match trimmed {
            "@yearly" | "@annually" => "0 0 1 1 *",
            "@monthly" => "0 0 1 * *",
            "@weekly" => "0 0 * * 0",
            "@daily" | "@midnight" => "0 0 * * *",
            "@hourly" => "0 * * * *",
            other => other,
        };

        let err = |reason: String| CronParseError {
            expression: expression.to_string(),
            reason,
        };

        let parts: Vec<&str> = fields_src.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(err(format!("expected 5 fields, found {}", parts.len())));
        }

        let minutes = parse_field(parts[0], &MINUTE).map_err(&err)?;
        let hours = parse_field(parts[1], &HOUR).map_err(&err)?;
        let days = parse_field(parts[2], &DAY_OF_MONTH).map_err(&err)?;
        let months = parse_field(parts[3], &MONTH).map_err(&err)?;
        let mut weekdays = parse_field(parts[4], &DAY_OF_WEEK).map_err(&err)?;
        if weekdays & bit(7) != 0 {
            weekdays = (weekdays & !bit(7)) | bit(0);
        }

        Ok(Self {
            expression: trimmed.to_string(),
            minutes,
            hours,
            days,
            months,
            weekdays,
        })
    }

    /// The expression as written (shorthands are not expanded).
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Unix timestamp of the next matching minute strictly after `after`.
    ///
    /// Returns `None` when no minute within the scan horizon matches, which
    /// only happens for calendar-impossible expressions such as `0 0 30 2 *`.
    pub fn next_after(&self, after: i64) -> Option<i64> {
        let start = Utc.timestamp_opt(after, 0).single()?;
        let mut t = start.with_second(0)?.checked_add_signed(Duration::minutes(1))?;

        for _ in 0..MAX_SCAN_STEPS {
            if self.months & bit(t.month() as u8) == 0 {
                t = first_minute_of_next_month(&t)?;
                continue;
            }
            if !self.day_matches(&t) {
                let next_day = t.date_naive().checked_add_days(Days::new(1))?;
                t = Utc.from_utc_datetime(&next_day.and_hms_opt(0, 0, 0)?);
                continue;
            }
            if self.hours & bit(t.hour() as u8) == 0 {
                t = t.with_minute(0)?.checked_add_signed(Duration::hours(1))?;
                continue;
            }
            if self.minutes & bit(t.minute() as u8) == 0 {
                t = t.checked_add_signed(Duration::minutes(1))?;
                continue;
            }
            return Some(t.timestamp());
        }
        None
    }

    /// Classic cron day rule: when both day fields are restricted the match
    /// is the union, otherwise only the restricted field applies.
    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom = self.days & bit(t.day() as u8) != 0;
        let dow = self.weekdays & bit(t.weekday().num_days_from_sunday() as u8) != 0;
        let dom_restricted = self.days != full_mask(&DAY_OF_MONTH);
        let dow_restricted = self.weekdays != WEEKDAY_FULL;
        match (dom_restricted, dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

fn bit(n: u8) -> u64 {
    1u64 << n
}

fn full_mask(field: &Field) -> u64 {
    let mut mask = 0u64;
    for v in field.min..=field.max {
        mask |= bit(v);
    }
    mask
}

fn first_minute_of_next_month(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()
}

/// Parse one field (a comma list of `*`, values, ranges, each with an
/// optional `/step`) into a bitmask over the field's domain.
fn parse_field(spec: &str, field: &Field) -> Result<u64, String> {
    let mut mask = 0u64;
    for item in spec.split(',') {
        mask |= parse_item(item, field)?;
    }
    Ok(mask)
}

fn parse_item(item: &str, field: &Field) -> Result<u64, String> {
    if item.is_empty() {
        return Err(format!("empty {} entry", field.name));
    }
    let (base, step) = match item.split_once('/') {
        Some((base, step_src)) => {
            let step: u8 = step_src
                .parse()
                .map_err(|_| format!("bad step `{step_src}` in {} field", field.name))?;
            if step == 0 {
                return Err(format!("step 0 in {} field", field.name));
            }
            (base, Some(step))
        }
        None => (item, None),
    };

    let (start, end) = if base == "*" {
        (field.min, field.max)
    } else if let Some((lo, hi)) = base.split_once('-') {
        (field_value(lo, field)?, field_value(hi, field)?)
    } else {
        let v = field_value(base, field)?;
        // A bare value with a step means "from v to the end", cron-style.
        match step {
            Some(_) => (v, field.max),
            None => (v, v),
        }
    };

    if start > end {
        return Err(format!(
            "reversed range {start}-{end} in {} field",
            field.name
        ));
    }

    let step = step.unwrap_or(1);
    let mut mask = 0u64;
    let mut v = start;
    loop {
        mask |= bit(v);
        match v.checked_add(step) {
            Some(next) if next <= end => v = next,
            _ => break,
        }
    }
    Ok(mask)
}

fn field_value(src: &str, field: &Field) -> Result<u8, String> {
    if !field.names.is_empty() {
        let lowered = src.to_ascii_lowercase();
        if let Some(idx) = field.names.iter().position(|n| *n == lowered) {
            // Name tables start at the field minimum, except weekdays where
            // `sun` is 0 regardless of the accepted 0-7 numeric domain.
            let base = if field.name == "day-of-week" { 0 } else { field.min };
            return Ok(base + idx as u8);
        }
    }
    let v: u8 = src
        .parse()
        .map_err(|_| format!("bad {} value `{src}`", field.name))?;
    if v < field.min || v > field.max {
        return Err(format!(
            "{} value {v} outside {}-{}",
            field.name, field.min, field.max
        ));
    }
    Ok(v)
}
