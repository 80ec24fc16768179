//! Client IP extraction from proxy headers

use axum::http::HeaderMap;

use crate::analytics::models::UNKNOWN;

/// Extract the client address as reported by the fronting proxy.
///
/// Takes the first entry of `X-Forwarded-For`, then `X-Real-IP`, and
/// reports "unknown" when neither is present.
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}
