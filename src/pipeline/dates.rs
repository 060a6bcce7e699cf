//! Free-text date and time parsing for French agenda pages.

use crate::util::fold;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})").expect("valid regex"));

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[/.](\d{1,2})(?:[/.](\d{2,4}))?\b").expect("valid regex"));

// Matched against folded (lowercase, accent-free) text; longer month forms come first.
static FRENCH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2})(?:er)?\s*(janvier|fevrier|mars|avril|mai|juin|juillet|aout|septembre|octobre|novembre|decembre|janv|jan|fevr|fev|mar|avr|juil|sept|sep|oct|nov|dec)\b\.?(?:\s*(\d{4}))?",
    )
    .expect("valid regex")
});

static ISO_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}[tT ](\d{2}):(\d{2})").expect("valid regex"));

// The hour may not follow a digit or a colon, so seconds and UTC offsets never count as hours.
static TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\d:])(\d{1,2})\s*(?::\s*(\d{2})|h\s*(\d{2})?)").expect("valid regex")
});

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "janvier" | "janv" | "jan" => 1,
        "fevrier" | "fevr" | "fev" => 2,
        "mars" | "mar" => 3,
        "avril" | "avr" => 4,
        "mai" => 5,
        "juin" => 6,
        "juillet" | "juil" => 7,
        "aout" => 8,
        "septembre" | "sept" | "sep" => 9,
        "octobre" | "oct" => 10,
        "novembre" | "nov" => 11,
        "decembre" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn expand_year(raw: Option<&str>, today: NaiveDate) -> Option<i32> {
    match raw {
        None => Some(today.year()),
        Some(y) if y.len() == 2 => y.parse::<i32>().ok().map(|y| 2000 + y),
        Some(y) => y.parse().ok(),
    }
}

/// Parses `2025-10-09`, `09/10/2025`, `9 octobre 2025` or `9 oct.`; a missing year means
/// the year of `today`. Returns `None` when nothing date-like is found.
pub fn parse_event_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = fold(raw);
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = ISO_DATE.captures(&text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        );
        if date.is_some() {
            return date;
        }
    }

    if let Some(caps) = FRENCH_DATE.captures(&text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = expand_year(caps.get(3).map(|m| m.as_str()), today)?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Some(caps) = NUMERIC_DATE.captures(&text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = expand_year(caps.get(3).map(|m| m.as_str()), today)?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// First `HH:MM`, `HHhMM` or `HHh` in the text, normalised to `HH:MM`. An ISO datetime
/// (`2025-07-12T21:00:00+02:00`) yields its clock time.
pub fn parse_event_time(raw: &str) -> Option<String> {
    if let Some(caps) = ISO_TIME.captures(raw) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        if hour < 24 && minute < 60 {
            return Some(format!("{hour:02}:{minute:02}"));
        }
    }
    let text = raw.to_lowercase();
    TIME.captures_iter(&text).find_map(|caps| {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().parse().ok())
            .unwrap_or(Some(0))?;
        (hour < 24 && minute < 60).then(|| format!("{hour:02}:{minute:02}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_and_numeric_formats() {
        assert_eq!(parse_event_date("2025-10-09T20:00:00", today()), Some(ymd(2025, 10, 9)));
        assert_eq!(parse_event_date("le 09/10/2025", today()), Some(ymd(2025, 10, 9)));
        assert_eq!(parse_event_date("14.07.26", today()), Some(ymd(2026, 7, 14)));
    }

    #[test]
    fn test_french_month_names() {
        assert_eq!(parse_event_date("Samedi 9 octobre 2026", today()), Some(ymd(2026, 10, 9)));
        assert_eq!(parse_event_date("1er août", today()), Some(ymd(2025, 8, 1)));
        assert_eq!(parse_event_date("12 déc.", today()), Some(ymd(2025, 12, 12)));
        assert_eq!(parse_event_date("3 FÉVRIER", today()), Some(ymd(2025, 2, 3)));
        assert_eq!(parse_event_date("21 sept 2025", today()), Some(ymd(2025, 9, 21)));
    }

    #[test]
    fn test_unparseable_dates() {
        assert_eq!(parse_event_date("", today()), None);
        assert_eq!(parse_event_date("bientôt", today()), None);
        assert_eq!(parse_event_date("31 février", today()), None);
    }

    #[test]
    fn test_times() {
        assert_eq!(parse_event_time("à 20h30"), Some("20:30".into()));
        assert_eq!(parse_event_time("9:05 - 12:00"), Some("09:05".into()));
        assert_eq!(parse_event_time("dès 14h"), Some("14:00".into()));
        assert_eq!(parse_event_time("ouverture 25h"), None);
        assert_eq!(parse_event_time("toute la journée"), None);
    }

    #[test]
    fn test_iso_datetime_times() {
        assert_eq!(parse_event_time("2025-07-12T21:00:00"), Some("21:00".into()));
        assert_eq!(parse_event_time("2025-07-12T21:30+02:00"), Some("21:30".into()));
        assert_eq!(parse_event_time("2025-07-12 09:15:00"), Some("09:15".into()));
        assert_eq!(parse_event_time("12 juillet à 21h"), Some("21:00".into()));
        assert_eq!(parse_event_time("2025-07-12"), None);
    }
}
