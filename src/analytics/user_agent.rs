//! User-agent classification
//!
//! Each field is resolved against an ordered signature table with a
//! case-insensitive substring match. The first matching signature wins, so
//! more specific tokens sit before the generic ones they overlap with
//! (Edge UAs also contain "Chrome", iPhone UAs also contain "Mac OS").

use crate::analytics::models::{Browser, ClientInfo, DeviceClass, OperatingSystem};

const DEVICE_SIGNATURES: &[(&str, DeviceClass)] = &[
    ("ipad", DeviceClass::Tablet),
    ("tablet", DeviceClass::Tablet),
    ("iphone", DeviceClass::Mobile),
    ("mobile", DeviceClass::Mobile),
    ("android", DeviceClass::Mobile),
    ("windows nt", DeviceClass::Desktop),
    ("macintosh", DeviceClass::Desktop),
    ("x11", DeviceClass::Desktop),
];

const BROWSER_SIGNATURES: &[(&str, Browser)] = &[
    ("edg", Browser::Edge),
    ("firefox", Browser::Firefox),
    ("fxios", Browser::Firefox),
    ("chrome", Browser::Chrome),
    ("crios", Browser::Chrome),
    ("safari", Browser::Safari),
];

const OS_SIGNATURES: &[(&str, OperatingSystem)] = &[
    ("windows", OperatingSystem::Windows),
    ("iphone", OperatingSystem::Ios),
    ("ipad", OperatingSystem::Ios),
    ("android", OperatingSystem::Android),
    ("macintosh", OperatingSystem::MacOs),
    ("mac os", OperatingSystem::MacOs),
    ("linux", OperatingSystem::Linux),
];

fn first_match<T: Copy>(haystack: &str, table: &[(&str, T)], fallback: T) -> T {
    table
        .iter()
        .find(|(signature, _)| haystack.contains(*signature))
        .map(|(_, class)| *class)
        .unwrap_or(fallback)
}

/// Classify a raw user-agent header. An absent or blank header is unknown on every field.
pub fn classify(user_agent: Option<&str>) -> ClientInfo {
    let ua = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua.to_lowercase(),
        _ => return ClientInfo::unknown(),
    };

    ClientInfo {
        device: first_match(&ua, DEVICE_SIGNATURES, DeviceClass::Unknown),
        browser: first_match(&ua, BROWSER_SIGNATURES, Browser::Unknown),
        os: first_match(&ua, OS_SIGNATURES, OperatingSystem::Unknown),
    }
}
