//! Request signing for outbound platform calls
//!
//! Every request carries `x-fp-date` and `x-fp-signature`. The signature is
//! an HMAC-SHA256 over a canonical form of the request:
//!
//! ```text
//! METHOD \n path \n sorted query \n host:..\nx-fp-date:..\n \n host;x-fp-date \n hex(sha256(body))
//! ```
//!
//! The string that gets signed is `date \n hex(sha256(canonical request))`.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

const SIGNING_KEY: &str = "1234567";
const SIGNATURE_VERSION: &str = "v1.1";
const SIGNED_HEADERS: &str = "host;x-fp-date";

pub const DATE_HEADER: &str = "x-fp-date";
pub const SIGNATURE_HEADER: &str = "x-fp-signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSignature {
    pub date: String,
    pub signature: String,
}

pub fn sign_request(
    method: &str,
    url: &Url,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<RequestSignature, InvalidLength> {
    let date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let canonical = canonical_request(method, url, body, &date);
    let string_to_sign = format!("{}\n{}", date, sha256_hex(canonical.as_bytes()));

    let mut mac = Hmac::<Sha256>::new_from_slice(SIGNING_KEY.as_bytes())?;
    mac.update(string_to_sign.as_bytes());

    Ok(RequestSignature {
        date,
        signature: format!(
            "{}:{}",
            SIGNATURE_VERSION,
            hex::encode(mac.finalize().into_bytes())
        ),
    })
}

fn canonical_request(method: &str, url: &Url, body: &[u8], date: &str) -> String {
    let mut query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    query.sort();
    let query = query
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let host = match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    };

    format!(
        "{}\n{}\n{}\nhost:{}\nx-fp-date:{}\n\n{}\n{}",
        method.to_uppercase(),
        url.path(),
        query,
        host,
        date,
        SIGNED_HEADERS,
        sha256_hex(body)
    )
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
