//! Expansion of a recurring-event definition into dated occurrences.
//!
//! The walk is a day/month cursor over an inclusive date range. Generation is
//! capped at a two-year span so a bad request can never materialize an
//! unbounded series.

use std::collections::HashSet;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceUnit {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceUnit {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "daily" => Some(RecurrenceUnit::Daily),
            "weekly" => Some(RecurrenceUnit::Weekly),
            "monthly" => Some(RecurrenceUnit::Monthly),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceUnit::Daily => "daily",
            RecurrenceUnit::Weekly => "weekly",
            RecurrenceUnit::Monthly => "monthly",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecurrenceError {
    #[error("Recurrence end date cannot be before the start date")]
    EndBeforeStart,

    #[error("Recurrence span cannot exceed 2 years")]
    SpanTooLong,

    #[error("Recurrence interval must be at least 1")]
    ZeroInterval,

    #[error("Unknown weekday code: {0}")]
    UnknownWeekday(String),
}

/// When and how often a series repeats. `weekdays` only applies to weekly
/// rules; an empty selection is normalized to `None` at parse time.
#[derive(Debug, Clone)]
pub struct RecurrenceRule {
    pub unit: RecurrenceUnit,
    pub interval: u32,
    pub weekdays: Option<HashSet<Weekday>>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccurrenceTimes {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Parse `MO,TU,WE,TH,FR,SA,SU` style codes (case-insensitive).
pub fn parse_weekday_codes(codes: &[String]) -> Result<HashSet<Weekday>, RecurrenceError> {
    let mut weekdays = HashSet::new();
    for code in codes {
        let day = match code.trim().to_uppercase().as_str() {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            other => return Err(RecurrenceError::UnknownWeekday(other.to_string())),
        };
        weekdays.insert(day);
    }
    Ok(weekdays)
}

/// Expand a rule into concrete occurrence times, inclusive of both range ends.
///
/// Daily advances the cursor by `interval` days. Monthly advances by
/// `interval` calendar months with end-of-month clamping (Jan 31 + 1 month is
/// Feb 28/29, and the clamped day carries forward). Weekly emits on the
/// selected weekdays of every `interval`-th week counted from the week
/// containing the start date (weeks begin on Monday); with no weekday
/// selection it repeats on the start date's weekday every `interval` weeks.
pub fn expand(
    rule: &RecurrenceRule,
    start_clock: NaiveTime,
    end_clock: NaiveTime,
) -> Result<Vec<OccurrenceTimes>, RecurrenceError> {
    if rule.interval == 0 {
        return Err(RecurrenceError::ZeroInterval);
    }
    if rule.end_date < rule.start_date {
        return Err(RecurrenceError::EndBeforeStart);
    }
    let span_cap = rule
        .start_date
        .checked_add_months(Months::new(24))
        .ok_or(RecurrenceError::SpanTooLong)?;
    if rule.end_date > span_cap {
        return Err(RecurrenceError::SpanTooLong);
    }

    let mut occurrences = Vec::new();

    match rule.unit {
        RecurrenceUnit::Daily => {
            let mut cursor = rule.start_date;
            while cursor <= rule.end_date {
                occurrences.push(occurrence_on(cursor, start_clock, end_clock));
                cursor += Duration::days(i64::from(rule.interval));
            }
        }
        RecurrenceUnit::Weekly => match &rule.weekdays {
            Some(weekdays) if !weekdays.is_empty() => {
                // Weeks are aligned to the Monday of the start date's week so
                // the interval skips whole calendar weeks.
                let week_anchor = rule.start_date
                    - Duration::days(i64::from(rule.start_date.weekday().num_days_from_monday()));
                let mut cursor = rule.start_date;
                while cursor <= rule.end_date {
                    let week_index = (cursor - week_anchor).num_days() / 7;
                    if week_index % i64::from(rule.interval) == 0
                        && weekdays.contains(&cursor.weekday())
                    {
                        occurrences.push(occurrence_on(cursor, start_clock, end_clock));
                    }
                    cursor += Duration::days(1);
                }
            }
            _ => {
                let mut cursor = rule.start_date;
                while cursor <= rule.end_date {
                    occurrences.push(occurrence_on(cursor, start_clock, end_clock));
                    cursor += Duration::days(7 * i64::from(rule.interval));
                }
            }
        },
        RecurrenceUnit::Monthly => {
            let mut cursor = rule.start_date;
            while cursor <= rule.end_date {
                occurrences.push(occurrence_on(cursor, start_clock, end_clock));
                match cursor.checked_add_months(Months::new(rule.interval)) {
                    Some(next) => cursor = next,
                    None => break,
                }
            }
        }
    }

    Ok(occurrences)
}

fn occurrence_on(date: NaiveDate, start_clock: NaiveTime, end_clock: NaiveTime) -> OccurrenceTimes {
    OccurrenceTimes {
        start_time: NaiveDateTime::new(date, start_clock),
        end_time: NaiveDateTime::new(date, end_clock),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn rule(
        unit: RecurrenceUnit,
        interval: u32,
        weekdays: Option<&[Weekday]>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> RecurrenceRule {
        RecurrenceRule {
            unit,
            interval,
            weekdays: weekdays.map(|days| days.iter().copied().collect()),
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn daily_interval_two_over_ten_days_yields_five() {
        let rule = rule(
            RecurrenceUnit::Daily,
            2,
            None,
            date(2026, 3, 1),
            date(2026, 3, 10),
        );
        let occurrences = expand(&rule, clock(9, 0), clock(10, 0)).unwrap();
        assert_eq!(occurrences.len(), 5);
        assert_eq!(occurrences[0].start_time.date(), date(2026, 3, 1));
        assert_eq!(occurrences[4].start_time.date(), date(2026, 3, 9));
    }

    #[test]
    fn daily_single_day_range_yields_one() {
        let rule = rule(
            RecurrenceUnit::Daily,
            1,
            None,
            date(2026, 3, 1),
            date(2026, 3, 1),
        );
        assert_eq!(expand(&rule, clock(9, 0), clock(10, 0)).unwrap().len(), 1);
    }

    #[test]
    fn weekly_mo_we_over_two_weeks_yields_four() {
        // 2026-03-02 is a Monday; the range spans exactly two ISO weeks.
        let rule = rule(
            RecurrenceUnit::Weekly,
            1,
            Some(&[Weekday::Mon, Weekday::Wed]),
            date(2026, 3, 2),
            date(2026, 3, 15),
        );
        let occurrences = expand(&rule, clock(9, 0), clock(10, 0)).unwrap();
        let dates: Vec<NaiveDate> = occurrences.iter().map(|o| o.start_time.date()).collect();
        assert_eq!(
            dates,
            vec![
                date(2026, 3, 2),
                date(2026, 3, 4),
                date(2026, 3, 9),
                date(2026, 3, 11),
            ]
        );
    }

    #[test]
    fn weekly_interval_two_skips_alternate_weeks() {
        let rule = rule(
            RecurrenceUnit::Weekly,
            2,
            Some(&[Weekday::Mon]),
            date(2026, 3, 2),
            date(2026, 3, 29),
        );
        let occurrences = expand(&rule, clock(9, 0), clock(10, 0)).unwrap();
        let dates: Vec<NaiveDate> = occurrences.iter().map(|o| o.start_time.date()).collect();
        assert_eq!(dates, vec![date(2026, 3, 2), date(2026, 3, 16)]);
    }

    #[test]
    fn weekly_without_weekday_set_repeats_on_start_weekday() {
        // 2026-03-03 is a Tuesday.
        let rule = rule(
            RecurrenceUnit::Weekly,
            1,
            None,
            date(2026, 3, 3),
            date(2026, 3, 31),
        );
        let occurrences = expand(&rule, clock(14, 0), clock(15, 0)).unwrap();
        assert_eq!(occurrences.len(), 5);
        assert!(occurrences
            .iter()
            .all(|o| o.start_time.date().weekday() == Weekday::Tue));
    }

    #[test]
    fn monthly_from_jan_31_clamps_to_end_of_february() {
        let rule = rule(
            RecurrenceUnit::Monthly,
            1,
            None,
            date(2026, 1, 31),
            date(2026, 3, 31),
        );
        let occurrences = expand(&rule, clock(9, 0), clock(10, 0)).unwrap();
        let dates: Vec<NaiveDate> = occurrences.iter().map(|o| o.start_time.date()).collect();
        // The clamped day carries forward: once on Feb 28 the cursor stays on
        // the 28th in later months.
        assert_eq!(
            dates,
            vec![date(2026, 1, 31), date(2026, 2, 28), date(2026, 3, 28)]
        );
    }

    #[test]
    fn monthly_respects_leap_february() {
        let rule = rule(
            RecurrenceUnit::Monthly,
            1,
            None,
            date(2024, 1, 31),
            date(2024, 2, 29),
        );
        let occurrences = expand(&rule, clock(9, 0), clock(10, 0)).unwrap();
        let dates: Vec<NaiveDate> = occurrences.iter().map(|o| o.start_time.date()).collect();
        assert_eq!(dates, vec![date(2024, 1, 31), date(2024, 2, 29)]);
    }

    #[test]
    fn occurrences_carry_the_clock_times() {
        let rule = rule(
            RecurrenceUnit::Daily,
            1,
            None,
            date(2026, 3, 1),
            date(2026, 3, 2),
        );
        let occurrences = expand(&rule, clock(9, 15), clock(10, 45)).unwrap();
        assert_eq!(
            occurrences[1].start_time,
            date(2026, 3, 2).and_time(clock(9, 15))
        );
        assert_eq!(
            occurrences[1].end_time,
            date(2026, 3, 2).and_time(clock(10, 45))
        );
    }

    #[test]
    fn rejects_end_before_start() {
        let rule = rule(
            RecurrenceUnit::Daily,
            1,
            None,
            date(2026, 3, 10),
            date(2026, 3, 1),
        );
        assert_eq!(
            expand(&rule, clock(9, 0), clock(10, 0)),
            Err(RecurrenceError::EndBeforeStart)
        );
    }

    #[test]
    fn rejects_span_longer_than_two_years() {
        let rule = rule(
            RecurrenceUnit::Daily,
            1,
            None,
            date(2026, 1, 1),
            date(2028, 1, 2),
        );
        assert_eq!(
            expand(&rule, clock(9, 0), clock(10, 0)),
            Err(RecurrenceError::SpanTooLong)
        );
    }

    #[test]
    fn accepts_exactly_two_year_span() {
        let rule = rule(
            RecurrenceUnit::Monthly,
            1,
            None,
            date(2026, 1, 1),
            date(2028, 1, 1),
        );
        let occurrences = expand(&rule, clock(9, 0), clock(10, 0)).unwrap();
        assert_eq!(occurrences.len(), 25);
    }

    #[test]
    fn rejects_zero_interval() {
        let rule = rule(
            RecurrenceUnit::Daily,
            0,
            None,
            date(2026, 3, 1),
            date(2026, 3, 10),
        );
        assert_eq!(
            expand(&rule, clock(9, 0), clock(10, 0)),
            Err(RecurrenceError::ZeroInterval)
        );
    }

    #[test]
    fn weekday_codes_parse_case_insensitively() {
        let parsed =
            parse_weekday_codes(&["mo".to_string(), " WE ".to_string(), "su".to_string()])
                .unwrap();
        assert_eq!(
            parsed,
            [Weekday::Mon, Weekday::Wed, Weekday::Sun].into_iter().collect()
        );
        assert_eq!(
            parse_weekday_codes(&["XX".to_string()]),
            Err(RecurrenceError::UnknownWeekday("XX".to_string()))
        );
    }

    #[test]
    fn unit_parses_from_strings() {
        assert_eq!(RecurrenceUnit::from_str("Weekly"), Some(RecurrenceUnit::Weekly));
        assert_eq!(RecurrenceUnit::from_str("yearly"), None);
        assert_eq!(RecurrenceUnit::Monthly.as_str(), "monthly");
    }
}
