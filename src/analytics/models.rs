//! Data models for visitor analytics

use serde::{Deserialize, Serialize};

use crate::storage::Row;

/// Placeholder for any classified or located field that could not be derived
pub const UNKNOWN: &str = "unknown";

/// Referrer recorded when the visit carries none
pub const DIRECT_REFERER: &str = "direct";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
            DeviceClass::Unknown => UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Browser {
    Edge,
    Firefox,
    Chrome,
    Safari,
    Unknown,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Edge => "Edge",
            Browser::Firefox => "Firefox",
            Browser::Chrome => "Chrome",
            Browser::Safari => "Safari",
            Browser::Unknown => UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingSystem {
    Windows,
    Ios,
    Android,
    MacOs,
    Linux,
    Unknown,
}

impl OperatingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Windows => "Windows",
            OperatingSystem::Ios => "iOS",
            OperatingSystem::Android => "Android",
            OperatingSystem::MacOs => "macOS",
            OperatingSystem::Linux => "Linux",
            OperatingSystem::Unknown => UNKNOWN,
        }
    }
}

/// Fields derived from a raw user-agent string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub device: DeviceClass,
    pub browser: Browser,
    pub os: OperatingSystem,
}

impl ClientInfo {
    pub const fn unknown() -> Self {
        Self {
            device: DeviceClass::Unknown,
            browser: Browser::Unknown,
            os: OperatingSystem::Unknown,
        }
    }
}

/// Geographic location attached to a visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub region: String,
    pub city: String,
}

impl GeoLocation {
    /// Static location used until a lookup source provides a real one
    pub fn placeholder() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
        }
    }
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// One page view, written once and never updated.
/// `visited_at` is assigned by the store on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitEvent {
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub referer: String,
    pub client: ClientInfo,
    pub location: GeoLocation,
    pub session_id: String,
}

/// Public projection of a visit. IP and user agent are left out on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorSummary {
    pub id: i64,
    pub country: String,
    pub region: String,
    pub city: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub visited_at: String,
}

impl VisitorSummary {
    pub fn from_row(row: &Row) -> Self {
        let text = |column: &str| row.get_str(column).unwrap_or(UNKNOWN).to_string();

        Self {
            id: row.get_i64("id").unwrap_or_default(),
            country: text("country"),
            region: text("region"),
            city: text("city"),
            device_type: text("device_type"),
            browser: text("browser"),
            os: text("os"),
            visited_at: row.get_str("visited_at").unwrap_or_default().to_string(),
        }
    }
}

/// Headline numbers plus the latest visits, most recent first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorStats {
    /// Distinct sessions ever seen
    pub total: i64,
    /// Distinct sessions on the current calendar day
    pub today: i64,
    pub recent: Vec<VisitorSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedVisitors {
    pub visitors: Vec<VisitorSummary>,
    /// Raw row count, not distinct sessions
    pub total: i64,
    pub has_more: bool,
}

/// Outcome of a store health probe
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub healthy: bool,
    pub backend: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}
