//! HMAC-SHA256 request signing for ACS REST calls.
//!
//! ACS authenticates access-key requests by signing
//! `VERB\npath?query\n{x-ms-date};{host};{x-ms-content-sha256}` with the
//! base64-decoded access key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

use super::AcsError;

type HmacSha256 = Hmac<Sha256>;

pub const DATE_HEADER: &str = "x-ms-date";
pub const CONTENT_HASH_HEADER: &str = "x-ms-content-sha256";

/// Parsed `endpoint=...;accesskey=...` connection string
#[derive(Clone)]
pub struct AcsCredentials {
    pub endpoint: Url,
    access_key: Vec<u8>,
}

impl std::fmt::Debug for AcsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcsCredentials")
            .field("endpoint", &self.endpoint.as_str())
            .field("access_key", &"<redacted>")
            .finish()
    }
}

impl AcsCredentials {
    /// Parse an ACS connection string. Keys are case-insensitive.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, AcsError> {
        let mut endpoint = None;
        let mut access_key = None;

        for part in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let Some((key, value)) = part.split_once('=') else {
                return Err(AcsError::InvalidConnectionString(format!(
                    "segment without '=': {part}"
                )));
            };
            match key.trim().to_lowercase().as_str() {
                "endpoint" => endpoint = Some(value.trim().to_string()),
                "accesskey" => access_key = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or_else(|| {
            AcsError::InvalidConnectionString("missing endpoint".to_string())
        })?;
        let access_key = access_key.ok_or_else(|| {
            AcsError::InvalidConnectionString("missing accesskey".to_string())
        })?;

        let endpoint = Url::parse(&endpoint)
            .map_err(|e| AcsError::InvalidConnectionString(format!("bad endpoint: {e}")))?;
        let access_key = BASE64
            .decode(access_key.as_bytes())
            .map_err(|e| AcsError::InvalidConnectionString(format!("bad accesskey: {e}")))?;

        Ok(Self {
            endpoint,
            access_key,
        })
    }

    /// Headers that authenticate one request: (x-ms-date, x-ms-content-sha256, Authorization).
    pub fn sign(
        &self,
        method: &str,
        url: &Url,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> (String, String, String) {
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let content_hash = BASE64.encode(Sha256::digest(body));

        let host = match url.port() {
            Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
            None => url.host_str().unwrap_or_default().to_string(),
        };
        let path_and_query = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };

        let string_to_sign = format!(
            "{}\n{path_and_query}\n{date};{host};{content_hash}",
            method.to_uppercase()
        );

        // HMAC accepts keys of any length, so new_from_slice cannot fail here.
        let signature = match HmacSha256::new_from_slice(&self.access_key) {
            Ok(mut mac) => {
                mac.update(string_to_sign.as_bytes());
                BASE64.encode(mac.finalize().into_bytes())
            }
            Err(_) => String::new(),
        };

        let authorization = format!(
            "HMAC-SHA256 SignedHeaders={DATE_HEADER};host;{CONTENT_HASH_HEADER}&Signature={signature}"
        );

        (date, content_hash, authorization)
    }
}
