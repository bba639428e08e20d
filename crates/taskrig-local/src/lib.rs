use std::time::Duration;

pub mod exa;
pub mod fixtures;
pub mod resolver;
pub mod scrape;
pub mod textprep;

pub use exa::ExaClient;
pub use fixtures::FixtureStore;
pub use resolver::Resolver;
pub use scrape::DirectFetcher;

/// Default provider timeout. Provider requests can hang indefinitely without
/// an explicit timeout; callers may override but values are clamped.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub(crate) fn clamp_timeout_ms(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_TIMEOUT_MS).clamp(1_000, 60_000)
}

/// Shared HTTP client used by all providers in one environment process.
pub fn http_client() -> taskrig_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| taskrig_core::Error::Provider(e.to_string()))
}
