pub mod geocoding;
pub mod github;
pub mod http_client;
pub mod openai;
pub mod ports;

pub use geocoding::GoogleGeocoder;
pub use github::GitHubPublisher;
pub use http_client::ReqwestFetcher;
pub use openai::OpenAiClient;
pub use ports::*;
