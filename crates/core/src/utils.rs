use chrono::Utc;
use url::Url;

use crate::constants::SESSION_COOKIE_NAME;

/// Accepts absolute http(s) URLs with a host
pub fn is_valid_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Current time as Unix milliseconds
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Name of the session cookie for a company
pub fn company_cookie_name(company_id: impl std::fmt::Display) -> String {
    format!("{}_{}", SESSION_COOKIE_NAME, company_id)
}

/// Join a base URL and an absolute path without doubling the slash
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
