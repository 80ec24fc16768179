//! Visitor analytics
//!
//! Records page visits and serves cached visitor statistics: distinct
//! session counts, the latest visits and paginated visit history.

pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod queries;
pub mod service;
pub mod user_agent;

pub use geoip::GeoLocator;
pub use ip_extractor::extract_client_ip;
pub use models::{
    Browser, ClientInfo, DeviceClass, GeoLocation, HealthReport, OperatingSystem,
    PaginatedVisitors, VisitEvent, VisitorStats, VisitorSummary,
};
pub use service::{CachedRead, VisitorService};
pub use user_agent::classify;
