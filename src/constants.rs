/// Reference town centre (Ganges) used whenever an address cannot be resolved.
pub const FALLBACK_LAT: f64 = 43.9339;
pub const FALLBACK_LNG: f64 = 3.7086;

/// Structural selectors tried in priority order to find repeating event blocks.
pub const EVENT_BLOCK_SELECTORS: &[&str] = &[
    "article",
    ".event",
    ".event-item",
    "[class*=\"event\"]",
    "[itemtype*=\"Event\"]",
    ".agenda-item",
    "[class*=\"agenda\"]",
];

pub const TITLE_SELECTOR: &str = "h1, h2, h3, h4, .title, [class*=\"title\"], [itemprop=\"name\"]";
pub const DATE_SELECTOR: &str = "time, .date, [class*=\"date\"], [itemprop=\"startDate\"]";
pub const LOCATION_SELECTOR: &str = ".location, .lieu, .place, [class*=\"lieu\"], [class*=\"location\"], [itemprop=\"location\"]";
pub const DESCRIPTION_SELECTOR: &str = ".description, .excerpt, .summary, p, [itemprop=\"description\"]";

/// Words that mark a generic container as event-like when no structured block was found.
pub const EVENT_KEYWORDS_PATTERN: &str =
    r"(?i)(concert|festival|exposition|spectacle|atelier|conférence|conference|marché|marche)";

pub const MAX_CANDIDATES_PER_URL: usize = 50;
pub const MIN_TITLE_CHARS: usize = 4;
pub const MAX_FALLBACK_TITLE_CHARS: usize = 200;
pub const BLOCK_DESCRIPTION_CHARS: usize = 500;
pub const FALLBACK_DESCRIPTION_CHARS: usize = 300;
pub const DETAIL_DESCRIPTION_CHARS: usize = 800;

/// Excerpt of a bad completion kept for diagnosis.
pub const RAW_EXCERPT_CHARS: usize = 300;

pub const DEFAULT_EXTRACTED_TIME: &str = "14:00";
pub const DEFAULT_VALIDATED_TIME: &str = "00:00";
pub const DEFAULT_VALIDATED_PRICE: &str = "Gratuit";

/// Locations too vague to place an event on the map.
pub const GENERIC_LOCATIONS: &[&str] = &["cévennes", "cevennes", "gard", "france", "sud", "région", "region", "territoire"];

/// Address prefix length used when comparing actor addresses.
pub const ACTOR_ADDRESS_PREFIX_CHARS: usize = 20;

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const DEFAULT_PENDING_PAGE_LIMIT: usize = 50;

pub const PLACEHOLDER_FESTIVAL: &str = "https://images.unsplash.com/photo-1533174072545-7a4b6ad7a6c3?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
pub const PLACEHOLDER_MARCHE: &str = "https://images.unsplash.com/photo-1488459716781-31db52582fe9?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
pub const PLACEHOLDER_CULTURE: &str = "https://images.unsplash.com/photo-1492684223066-81342ee5ff30?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
pub const PLACEHOLDER_SPORT: &str = "https://images.unsplash.com/photo-1461896836934-ffe607ba8211?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
pub const PLACEHOLDER_ATELIER: &str = "https://images.unsplash.com/photo-1556761175-4b46a572b786?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
pub const PLACEHOLDER_THEATRE: &str = "https://images.unsplash.com/photo-1503095396549-807759245b35?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
pub const PLACEHOLDER_ACTOR: &str = "https://images.unsplash.com/photo-1441986300917-64674bd600d8?ixlib=rb-4.0.3&auto=format&fit=crop&w=800&q=80";
