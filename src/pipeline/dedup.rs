//! Advisory duplicate detection. Records are flagged, never dropped.
//!
//! Matching is case-insensitive trimmed equality or containment and favours recall.

use crate::constants::ACTOR_ADDRESS_PREFIX_CHARS;
use crate::domain::{Actor, Event, ExtractedEvent, NewActor, ScrapedEvent, ScrapedEventCandidate};
use crate::metrics::ReviewMetrics;
use crate::pipeline::dates::parse_event_date;
use crate::util::{fold, truncate_chars};
use chrono::{Local, NaiveDate};
use tracing::debug;

/// The fields duplicate checks look at.
pub trait Dedupable {
    fn title(&self) -> &str;
    fn date(&self) -> Option<NaiveDate>;
    fn location(&self) -> &str;
    fn address(&self) -> &str;
}

impl Dedupable for Event {
    fn title(&self) -> &str {
        &self.title
    }
    fn date(&self) -> Option<NaiveDate> {
        Some(self.date)
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn address(&self) -> &str {
        &self.address
    }
}

impl Dedupable for ExtractedEvent {
    fn title(&self) -> &str {
        &self.title
    }
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn address(&self) -> &str {
        &self.address
    }
}

impl Dedupable for ScrapedEventCandidate {
    fn title(&self) -> &str {
        &self.title
    }
    fn date(&self) -> Option<NaiveDate> {
        self.date
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn address(&self) -> &str {
        ""
    }
}

impl Dedupable for ScrapedEvent {
    fn title(&self) -> &str {
        &self.title
    }
    fn date(&self) -> Option<NaiveDate> {
        parse_event_date(&self.date, Local::now().date_naive())
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn address(&self) -> &str {
        ""
    }
}

fn same(a: &str, b: &str) -> bool {
    let (a, b) = (fold(a), fold(b));
    !a.is_empty() && a == b
}

fn contains_either(a: &str, b: &str) -> bool {
    let (a, b) = (fold(a), fold(b));
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// True when `candidate` and `existing` look like the same happening.
pub fn is_duplicate<A: Dedupable + ?Sized, B: Dedupable + ?Sized>(candidate: &A, existing: &B) -> bool {
    match (candidate.date(), existing.date()) {
        (Some(a), Some(b)) => {
            a == b
                && (same(candidate.location(), existing.location())
                    || contains_either(candidate.address(), existing.address())
                    || same(candidate.title(), existing.title()))
        }
        _ => {
            same(candidate.title(), existing.title())
                || (same(candidate.location(), existing.location())
                    && contains_either(candidate.title(), existing.title()))
        }
    }
}

/// First reference event matching `candidate`.
pub fn find_duplicate<'a, A: Dedupable + ?Sized>(candidate: &A, existing: &'a [Event]) -> Option<&'a Event> {
    existing.iter().find(|e| is_duplicate(candidate, *e))
}

/// Flags extracted records against persisted events; duplicates come back deselected.
pub fn flag_extracted(events: &mut [ExtractedEvent], existing: &[Event]) -> usize {
    let mut flagged = 0;
    for event in events.iter_mut() {
        let hit = find_duplicate(&*event, existing).map(|e| e.id);
        event.is_duplicate = hit.is_some();
        event.duplicate_of = hit;
        event.selected = hit.is_none();
        if let Some(id) = hit {
            debug!(title = %event.title, duplicate_of = id, "duplicate flagged");
            flagged += 1;
        }
    }
    ReviewMetrics::duplicates_flagged(flagged);
    flagged
}

/// Same as [`flag_extracted`] for raw scraped records.
pub fn flag_scraped(events: &mut [ScrapedEvent], existing: &[Event]) -> usize {
    let mut flagged = 0;
    for event in events.iter_mut() {
        let hit = find_duplicate(&*event, existing).map(|e| e.id);
        event.is_duplicate = hit.is_some();
        event.duplicate_of = hit;
        if hit.is_some() {
            flagged += 1;
        }
    }
    ReviewMetrics::duplicates_flagged(flagged);
    flagged
}

/// An existing actor with the same name, or whose address starts like the new one.
pub fn find_duplicate_actor<'a>(candidate: &NewActor, existing: &'a [Actor]) -> Option<&'a Actor> {
    let address_prefix = fold(truncate_chars(candidate.address.trim(), ACTOR_ADDRESS_PREFIX_CHARS));
    existing.iter().find(|actor| {
        same(&candidate.name, &actor.name)
            || (!address_prefix.is_empty() && fold(&actor.address).contains(&address_prefix))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewEvent;
    use chrono::Utc;

    fn ymd(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn event(id: i64, title: &str, date: NaiveDate, location: &str, address: &str) -> Event {
        let mut new = NewEvent::new(title, date);
        new.location = location.into();
        new.address = address.into();
        new.into_event(id, Utc::now())
    }

    fn extracted(title: &str, date: Option<NaiveDate>, location: &str, address: &str) -> ExtractedEvent {
        ExtractedEvent {
            id: 0,
            title: title.into(),
            category: Default::default(),
            description: String::new(),
            date,
            time: String::new(),
            location: location.into(),
            address: address.into(),
            price: String::new(),
            organizer: String::new(),
            contact: String::new(),
            website: String::new(),
            image: String::new(),
            lat: None,
            lng: None,
            premium_level: Default::default(),
            is_duplicate: false,
            duplicate_of: None,
            selected: true,
        }
    }

    #[test]
    fn test_same_date_and_location_is_duplicate() {
        let existing = vec![event(9, "Marché de Noël", ymd(12, 14), "Ganges", "")];
        let candidate = extracted("Un autre titre", Some(ymd(12, 14)), " GANGES ", "");
        assert_eq!(find_duplicate(&candidate, &existing).map(|e| e.id), Some(9));
    }

    #[test]
    fn test_address_containment_either_way() {
        let existing = vec![event(3, "Concert", ymd(6, 21), "", "Place de la Mairie, 30170 Saint-Hippolyte-du-Fort")];
        let candidate = extracted("Fête", Some(ymd(6, 21)), "", "place de la mairie");
        assert!(find_duplicate(&candidate, &existing).is_some());
    }

    #[test]
    fn test_different_date_is_not_duplicate() {
        let existing = vec![event(1, "Concert", ymd(6, 21), "Ganges", "")];
        let candidate = extracted("Concert", Some(ymd(6, 22)), "Ganges", "");
        assert!(find_duplicate(&candidate, &existing).is_none());
    }

    #[test]
    fn test_undated_candidates_match_on_title_or_location_and_partial_title() {
        let existing = vec![event(4, "Bal trad du 14 juillet", ymd(7, 14), "Sumène", "")];
        assert!(find_duplicate(&extracted("bal trad du 14 juillet", None, "", ""), &existing).is_some());
        assert!(find_duplicate(&extracted("Bal trad", None, "Sumène", ""), &existing).is_some());
        assert!(find_duplicate(&extracted("Bal trad", None, "Ganges", ""), &existing).is_none());
    }

    #[test]
    fn test_empty_fields_never_match() {
        let existing = vec![event(1, "Concert", ymd(5, 1), "", "")];
        let candidate = extracted("Autre", Some(ymd(5, 1)), "", "");
        assert!(find_duplicate(&candidate, &existing).is_none());
    }

    #[test]
    fn test_flagging_deselects_duplicates() {
        let existing = vec![event(7, "Vide-grenier", ymd(4, 6), "Anduze", "")];
        let mut batch = vec![
            extracted("Vide-grenier", Some(ymd(4, 6)), "Anduze", ""),
            extracted("Conférence", Some(ymd(4, 6)), "Florac", ""),
        ];
        assert_eq!(flag_extracted(&mut batch, &existing), 1);
        assert!(batch[0].is_duplicate && !batch[0].selected);
        assert_eq!(batch[0].duplicate_of, Some(7));
        assert!(!batch[1].is_duplicate && batch[1].selected);
    }

    #[test]
    fn test_actor_duplicates() {
        let now = Utc::now();
        let mut existing = NewActor::named("La Boulangerie du Pont");
        existing.address = "12 rue du Pont, 30120 Le Vigan".into();
        let existing = vec![existing.into_actor("a1".into(), now)];

        assert!(find_duplicate_actor(&NewActor::named("la boulangerie du pont"), &existing).is_some());

        let mut same_address = NewActor::named("Chez Paul");
        same_address.address = "12 rue du Pont, 30120 Le Vigan (Gard)".into();
        assert!(find_duplicate_actor(&same_address, &existing).is_some());

        let mut other = NewActor::named("Chez Paul");
        other.address = "3 avenue Jean Jaurès".into();
        assert!(find_duplicate_actor(&other, &existing).is_none());
    }
}
