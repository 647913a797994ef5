//! Endpoint URL construction
//!
//! Joins a base URL and an endpoint path without ever producing double
//! slashes, whatever mix of trailing/leading slashes the inputs carry.

pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
