//! Platform-wide constants

/// Production cluster used when the extension config does not name one
pub const DEFAULT_CLUSTER: &str = "https://api.fynd.com";

/// Prefix of the per-company session cookie (`ext_session_{company_id}`)
pub const SESSION_COOKIE_NAME: &str = "ext_session";

/// Lifetime of the online session created on the install redirect
pub const SESSION_EXPIRY_IN_SECONDS: i64 = 900;

/// Access tokens with this many seconds (or fewer) left are renewed before use
pub const TOKEN_RENEWAL_THRESHOLD_SECS: i64 = 120;

/// Event name the platform sends when testing a webhook endpoint
pub const TEST_WEBHOOK_EVENT_NAME: &str = "ping";

/// Header carrying the HMAC signature of inbound webhook bodies
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-fp-signature";

/// Header used to pass the company id between redirects
pub const COMPANY_ID_HEADER: &str = "x-company-id";

pub mod routes {
    pub const INSTALL: &str = "/fp/install";
    pub const AUTH: &str = "/fp/auth";
    pub const UNINSTALL: &str = "/fp/uninstall";
    pub const AUTO_INSTALL: &str = "/fp/auto_install";
}
