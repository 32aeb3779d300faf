use crate::error::{FleetError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;
use std::str::FromStr;

/// How far ahead `next_after` searches before giving up.
const SEARCH_DAYS: i64 = 5 * 366;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    name_base: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAY_OF_MONTH: FieldSpec =
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTH: FieldSpec =
    FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES, name_base: 1 };
const DAY_OF_WEEK: FieldSpec =
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: DAY_NAMES, name_base: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Field {
    bits: u64,
    /// Written as a bare `*` or `?`.
    star: bool,
}

impl Field {
    const fn contains(self, value: u32) -> bool {
        self.bits & (1 << value) != 0
    }
}

/// Five-field cron expression (`minute hour day-of-month month day-of-week`),
/// evaluated in UTC.
///
/// When both day fields are restricted, a day matching either one fires.
/// Day-of-week accepts 0-7 with both 0 and 7 meaning Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minute: Field,
    hour: Field,
    day_of_month: Field,
    month: Field,
    day_of_week: Field,
}

impl CronSchedule {
    /// # Errors
    /// `Cron` naming the expression and the offending field.
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let invalid = |reason: String| FleetError::Cron {
            expression: trimmed.to_string(),
            reason,
        };

        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 1 1 *".to_string(),
            "@monthly" => "0 0 1 * *".to_string(),
            "@weekly" => "0 0 * * 0".to_string(),
            "@daily" | "@midnight" => "0 0 * * *".to_string(),
            "@hourly" => "0 * * * *".to_string(),
            other if other.starts_with('@') => {
                return Err(invalid(format!("unknown descriptor {other}")));
            }
            _ => trimmed.to_string(),
        };

        let fields = expanded.split_whitespace().collect::<Vec<_>>();
        let [minute, hour, day_of_month, month, day_of_week] = fields.as_slice() else {
            return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
        };

        let mut day_of_week = parse_field(day_of_week, &DAY_OF_WEEK).map_err(invalid)?;
        if day_of_week.contains(7) {
            day_of_week.bits |= 1;
        }

        Ok(Self {
            expression: trimmed.to_string(),
            minute: parse_field(minute, &MINUTE).map_err(invalid)?,
            hour: parse_field(hour, &HOUR).map_err(invalid)?,
            day_of_month: parse_field(day_of_month, &DAY_OF_MONTH).map_err(invalid)?,
            month: parse_field(month, &MONTH).map_err(invalid)?,
            day_of_week,
        })
    }

    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the minute containing `instant` fires.
    #[must_use]
    pub fn matches(&self, instant: DateTime<Utc>) -> bool {
        let naive = instant.naive_utc();
        self.month.contains(naive.month())
            && self.day_matches(naive.date())
            && self.hour.contains(naive.hour())
            && self.minute.contains(naive.minute())
    }

    /// First firing time strictly after `after`, at whole-minute precision.
    /// `None` when nothing fires within the search window.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = start + Duration::days(SEARCH_DAYS);
        let mut t = start;

        while t <= limit {
            if !self.month.contains(t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hour.contains(t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minute.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.day_of_month.contains(date.day());
        let dow = self
            .day_of_week
            .contains(date.weekday().num_days_from_sunday());
        if self.day_of_month.star || self.day_of_week.star {
            dom && dow
        } else {
            dom || dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(text: &str, spec: &FieldSpec) -> std::result::Result<Field, String> {
    let mut field = Field { bits: 0, star: false };

    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<u32>()
                    .ok()
                    .filter(|step| *step > 0)
                    .ok_or_else(|| format!("{}: invalid step in {part:?}", spec.name))?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" || range == "?" {
            if step.map_or(true, |step| step == 1) {
                field.star = true;
            }
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, spec)?, parse_value(high, spec)?)
        } else {
            let value = parse_value(range, spec)?;
            (value, if step.is_some() { spec.max } else { value })
        };

        if low > high {
            return Err(format!("{}: range {low}-{high} is reversed", spec.name));
        }
        let step = usize::try_from(step.unwrap_or(1)).unwrap_or(usize::MAX);
        for value in (low..=high).step_by(step) {
            field.bits |= 1 << value;
        }
    }

    Ok(field)
}

fn parse_value(text: &str, spec: &FieldSpec) -> std::result::Result<u32, String> {
    let lowered = text.to_ascii_lowercase();
    let value = match spec.names.iter().position(|name| *name == lowered) {
        Some(index) => u32::try_from(index).map_err(|e| e.to_string())? + spec.name_base,
        None => text
            .parse::<u32>()
            .map_err(|_| format!("{}: {text:?} is not a number", spec.name))?,
    };
    if value < spec.min || value > spec.max {
        return Err(format!(
            "{}: {value} outside {}-{}",
            spec.name, spec.min, spec.max
        ));
    }
    Ok(value)
}
