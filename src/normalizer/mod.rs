//! Local time string -> UTC instant normalization.
//!
//! Scraped schedule pages render class times as short, site-specific local
//! strings ("Mon 6:00 PM", "Wednesday 18:00", "tomorrow 9am"). This module
//! splits an optional day token from a time token, resolves the day token to
//! a calendar date relative to a reference instant, parses the time token
//! against one of three accepted shapes, and combines both in the location's
//! IANA zone before converting to UTC. Unlike the teacher's `DateTime<Utc>`
//! plumbing (which only ever formats timestamps it already owns in UTC),
//! this is genuine wall-clock parsing, grounded the same way `elisplash-paw`
//! resolves user-local times against a named zone via `chrono-tz`.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ScrapeError;

static DAY_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(monday|mon|tuesday|tue|wednesday|wed|thursday|thu|friday|fri|saturday|sat|sunday|sun|today|tomorrow)\b",
    )
    .expect("static regex")
});

static TIME_12H_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*([ap]m)$").expect("static regex"));

static TIME_24H_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("static regex"));

/// Successful normalization: the resolved UTC instant plus an optional
/// non-fatal warning (e.g. an unrecognized day token that fell back to the
/// reference date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutcome {
    pub instant: DateTime<Utc>,
    pub warning: Option<String>,
}

/// Parse a raw local-time string into a UTC instant in `tz`, relative to
/// `reference` (defaults to now when `None`).
///
/// # Errors
/// Returns [`ScrapeError::NormalizationFailed`] when the time portion
/// matches none of the three accepted shapes, or the resolved local
/// date/time has no single UTC mapping in `tz` (a DST-gap wall-clock value).
pub fn normalize(
    raw: &str,
    tz: Tz,
    reference: Option<DateTime<Utc>>,
) -> Result<NormalizeOutcome, ScrapeError> {
    let reference = reference.unwrap_or_else(Utc::now);
    let reference_date = reference.with_timezone(&tz).date_naive();

    let (day_token, time_part) = split_day_token(raw);
    let mut warning = None;

    let target_date = match day_token {
        None => reference_date,
        Some(ref w) if w.eq_ignore_ascii_case("today") => reference_date,
        Some(ref w) if w.eq_ignore_ascii_case("tomorrow") => reference_date + Duration::days(1),
        Some(ref w) => match day_word_to_weekday(w) {
            Some(target) => reference_date + Duration::days(forward_offset(reference_date.weekday(), target)),
            None => {
                warning = Some(format!("unrecognized day token {w:?}, using reference date"));
                reference_date
            }
        },
    };

    let time = parse_time_token(time_part.trim()).ok_or_else(|| {
        ScrapeError::NormalizationFailed(raw.to_string(), "no recognized time shape".to_string())
    })?;

    let naive = NaiveDateTime::new(target_date, time);
    let local = tz
        .from_local_datetime(&naive)
        .single()
        .or_else(|| tz.from_local_datetime(&naive).earliest())
        .ok_or_else(|| {
            ScrapeError::NormalizationFailed(
                raw.to_string(),
                "local time has no unambiguous mapping in timezone".to_string(),
            )
        })?;

    Ok(NormalizeOutcome {
        instant: local.with_timezone(&Utc),
        warning,
    })
}

/// Days to add to `from` to reach the nearest forthcoming (or same-day)
/// occurrence of `target`.
fn forward_offset(from: Weekday, target: Weekday) -> i64 {
    let from = from.num_days_from_monday() as i64;
    let target = target.num_days_from_monday() as i64;
    (target - from).rem_euclid(7)
}

fn day_word_to_weekday(word: &str) -> Option<Weekday> {
    match word.to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Pull the first recognized day token out of `raw`, returning it alongside
/// whatever remains (trimmed) as the candidate time token.
fn split_day_token(raw: &str) -> (Option<String>, String) {
    match DAY_TOKEN_RE.find(raw) {
        Some(m) => {
            let token = m.as_str().to_string();
            let mut rest = String::with_capacity(raw.len());
            rest.push_str(&raw[..m.start()]);
            rest.push_str(&raw[m.end()..]);
            (Some(token), rest.trim().to_string())
        }
        None => (None, raw.trim().to_string()),
    }
}

fn parse_time_token(token: &str) -> Option<NaiveTime> {
    if let Some(caps) = TIME_12H_RE.captures(token) {
        let mut hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let is_pm = caps[3].eq_ignore_ascii_case("pm");
        if hour == 12 {
            hour = if is_pm { 12 } else { 0 };
        } else if is_pm {
            hour += 12;
        }
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(caps) = TIME_24H_RE.captures(token) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reference() -> DateTime<Utc> {
        // A known Wednesday.
        Utc.with_ymd_and_hms(2026, 7, 22, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_12h_with_space() {
        let out = normalize("Mon 6:00 PM", chrono_tz::America::New_York, Some(reference())).unwrap();
        assert!(out.warning.is_none());
        // Monday following (and including the week of) 2026-07-22 is 2026-07-27.
        let local = out.instant.with_timezone(&chrono_tz::America::New_York);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-07-27 18:00");
    }

    #[test]
    fn parses_12h_without_space() {
        let out = normalize("9am", chrono_tz::UTC, Some(reference())).unwrap();
        let local = out.instant.with_timezone(&chrono_tz::UTC);
        assert_eq!(local.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn parses_24h() {
        let out = normalize("Wednesday 18:30", chrono_tz::UTC, Some(reference())).unwrap();
        let local = out.instant.with_timezone(&chrono_tz::UTC);
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2026-07-22 18:30");
    }

    #[test]
    fn today_and_tomorrow_resolve_relative_to_reference() {
        let today = normalize("today 5:00 PM", chrono_tz::UTC, Some(reference())).unwrap();
        let tomorrow = normalize("tomorrow 5:00 PM", chrono_tz::UTC, Some(reference())).unwrap();
        assert_eq!(
            tomorrow.instant.with_timezone(&chrono_tz::UTC).date_naive(),
            today.instant.with_timezone(&chrono_tz::UTC).date_naive() + Duration::days(1)
        );
    }

    #[test]
    fn twelve_am_and_pm_are_midnight_and_noon() {
        let midnight = normalize("12:00 AM", chrono_tz::UTC, Some(reference())).unwrap();
        let noon = normalize("12:00 PM", chrono_tz::UTC, Some(reference())).unwrap();
        assert_eq!(midnight.instant.with_timezone(&chrono_tz::UTC).format("%H:%M").to_string(), "00:00");
        assert_eq!(noon.instant.with_timezone(&chrono_tz::UTC).format("%H:%M").to_string(), "12:00");
    }

    #[test]
    fn unrecognized_day_word_warns_and_uses_reference_date() {
        let out = normalize("Someday 6:00 PM", chrono_tz::UTC, Some(reference())).unwrap();
        assert!(out.warning.is_some());
        assert_eq!(out.instant.with_timezone(&chrono_tz::UTC).date_naive(), reference().date_naive());
    }

    #[test]
    fn unparseable_time_is_an_error() {
        let err = normalize("Monday whenever", chrono_tz::UTC, Some(reference())).unwrap_err();
        assert!(matches!(err, ScrapeError::NormalizationFailed(_, _)));
    }

    #[test]
    fn round_trip_through_24h_rendering_is_stable() {
        let first = normalize("Fri 14:15", chrono_tz::America::Chicago, Some(reference())).unwrap();
        let local = first.instant.with_timezone(&chrono_tz::America::Chicago);
        let rerendered = local.format("%H:%M").to_string();
        let second = normalize(&rerendered, chrono_tz::America::Chicago, Some(first.instant)).unwrap();
        assert_eq!(first.instant, second.instant);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    fn arb_reference() -> impl Strategy<Value = DateTime<Utc>> {
        (2020i32..2030, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60)
            .prop_map(|(y, mo, d, h, m)| Utc.with_ymd_and_hms(y, mo, d, h, m, 0).unwrap())
    }

    fn fixed_reference() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 22, 12, 0, 0).unwrap()
    }

    proptest! {
        // spec §8: normalize(normalize(x, tz), tz) = normalize(x, tz) for all
        // parseable x -- re-running normalization on a value already
        // expressed as an unambiguous 24h local rendering must not drift.
        #[test]
        fn normalize_is_idempotent_on_its_own_24h_rendering(
            reference in arb_reference(),
            hour in 0u32..24,
            minute in 0u32..60,
        ) {
            let tz = chrono_tz::America::New_York;
            let raw = format!("{hour:02}:{minute:02}");
            if let Ok(first) = normalize(&raw, tz, Some(reference)) {
                let rerendered = first.instant.with_timezone(&tz).format("%H:%M").to_string();
                let second = normalize(&rerendered, tz, Some(first.instant)).unwrap();
                prop_assert_eq!(first.instant, second.instant);
            }
        }

        #[test]
        fn twelve_hour_hour_is_always_in_range(hour in 1u32..=12, minute in 0u32..60, is_pm in any::<bool>()) {
            let suffix = if is_pm { "PM" } else { "AM" };
            let raw = format!("{hour}:{minute:02} {suffix}");
            let out = normalize(&raw, chrono_tz::UTC, Some(fixed_reference())).unwrap();
            let rendered_hour = out.instant.with_timezone(&chrono_tz::UTC).hour();
            prop_assert!(rendered_hour < 24);
        }
    }
}
