// Ingestion, review and publication stages

pub mod catalog;
pub mod dates;
pub mod dedup;
pub mod extractor;
pub mod geocoder;
pub mod ingest;
pub mod publish;
pub mod review_queue;
pub mod schedule;
pub mod scraper;

pub use catalog::Catalog;
pub use extractor::{ExtractionInput, Extractor};
pub use geocoder::{GeocodeOutcome, GeocodeSource, GeocoderAdapter};
pub use ingest::Ingestor;
pub use publish::Publisher;
pub use review_queue::ReviewQueue;
pub use schedule::{RunReport, ScheduleRegistry};
pub use scraper::{ScrapeReport, Scraper};
