//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Set the `count` query parameter on an endpoint, keeping other parameters.
pub fn with_count(endpoint: &str, count: u32) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "count")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("count", &count.to_string());
    Ok(url)
}

/// Milliseconds since the Unix epoch, as used in analytics events.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
