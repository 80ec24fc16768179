//! Visit geolocation
//!
//! Without a database every visit gets the static placeholder location.
//! With a MaxMind GeoLite2-City / GeoIP2-City MMDB the country, region and
//! city are filled in, and any field the database lacks stays "unknown".

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

use crate::analytics::models::GeoLocation;

#[derive(Clone, Default)]
pub struct GeoLocator {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoLocator {
    /// Locator that always answers with the placeholder location
    pub fn placeholder() -> Self {
        Self { city_reader: None }
    }

    /// Create a locator, memory-mapping the City database when a path is given
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = match city_path {
            Some(path) => {
                let reader = unsafe { Reader::open_mmap(path) }
                    .with_context(|| format!("Failed to open GeoIP City database at {}", path))?;
                Some(Arc::new(reader))
            }
            None => None,
        };

        Ok(Self { city_reader })
    }

    pub fn is_enabled(&self) -> bool {
        self.city_reader.is_some()
    }

    /// Locate a textual client address; unparsable addresses such as
    /// "unknown" get the placeholder
    pub fn locate(&self, ip_address: &str) -> GeoLocation {
        let mut location = GeoLocation::placeholder();

        let (Some(reader), Ok(ip)) = (&self.city_reader, ip_address.parse::<IpAddr>()) else {
            return location;
        };

        if let Ok(result) = reader.lookup(ip) {
            if let Ok(Some(city)) = result.decode::<geoip2::City>() {
                if let Some(country) = city.country.names.english {
                    location.country = country.to_string();
                }
                if let Some(region) = city
                    .subdivisions
                    .first()
                    .and_then(|subdivision| subdivision.names.english)
                {
                    location.region = region.to_string();
                }
                if let Some(name) = city.city.names.english {
                    location.city = name.to_string();
                }
            }
        }

        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geoip_creation_invalid_path() {
        assert!(GeoLocator::new(Some("/nonexistent/path.mmdb")).is_err());
    }

    #[test]
    fn test_placeholder_locator() {
        let locator = GeoLocator::new(None).unwrap();
        assert!(!locator.is_enabled());
        assert_eq!(locator.locate("203.0.113.9"), GeoLocation::placeholder());
        assert_eq!(locator.locate("unknown"), GeoLocation::placeholder());
    }
}
