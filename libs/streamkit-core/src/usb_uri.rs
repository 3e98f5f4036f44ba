//! Parser for the one reserved stream URI format (SPEC_FULL.md §6).
//!
//! Grounded on `OpenNIPlugin::on_host_event`'s `sscanf(resourceUri,
//! "usb/%u/%u/%u/%u", &vid, &pid, &bus, &address)`, which plugins use on
//! device-connect host events to translate a resource URI into a
//! device-specific form.

use crate::error::{Result, StreamError};

/// A parsed `usb/<vid>/<pid>/<bus>/<address>` resource URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbResourceUri {
    pub vendor_id: u32,
    pub product_id: u32,
    pub bus: u32,
    pub address: u32,
}

impl UsbResourceUri {
    /// Parses `usb/<vid>/<pid>/<bus>/<address>` (all decimal). Any other
    /// shape is `InvalidParameter`; this is not a general URI parser.
    pub fn parse(uri: &str) -> Result<Self> {
        let mut parts = uri.split('/');
        let scheme = parts.next();
        if scheme != Some("usb") {
            return Err(StreamError::InvalidParameter(format!("not a usb resource uri: {uri}")));
        }

        let fields: Vec<&str> = parts.collect();
        let [vid, pid, bus, address] = fields[..] else {
            return Err(StreamError::InvalidParameter(format!(
                "usb resource uri must have exactly 4 fields after 'usb/': {uri}"
            )));
        };

        let parse_field = |name: &str, value: &str| {
            value
                .parse::<u32>()
                .map_err(|_| StreamError::InvalidParameter(format!("usb resource uri field {name} is not a decimal integer: {value}")))
        };

        Ok(Self {
            vendor_id: parse_field("vid", vid)?,
            product_id: parse_field("pid", pid)?,
            bus: parse_field("bus", bus)?,
            address: parse_field("address", address)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_uri() {
        let parsed = UsbResourceUri::parse("usb/1155/22000/2/5").unwrap();
        assert_eq!(parsed, UsbResourceUri { vendor_id: 1155, product_id: 22000, bus: 2, address: 5 });
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!(UsbResourceUri::parse("device/0").is_err());
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(UsbResourceUri::parse("usb/1/2/3").is_err());
    }

    #[test]
    fn rejects_non_decimal_field() {
        assert!(UsbResourceUri::parse("usb/1/2/3/xx").is_err());
    }
}
