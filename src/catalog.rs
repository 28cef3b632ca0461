//! Static catalog of device types and the measuring points requested for each.
//!
//! Point lists may use compact range notation (`"p96-p113"`), expanded on lookup.

use log::{debug, warn};

/// Canonical name returned when a device cannot be classified.
pub const UNKNOWN_DEVICE_TYPE: &str = "unknown";

#[derive(Debug)]
pub struct DeviceTypeEntry {
    pub name: &'static str,
    /// Literal points or ranges, in request order.
    pub points: &'static [&'static str],
    /// Vendor `device_type` code used when the label is not recognised.
    pub api_device_type_code: i64,
    /// Lower-case label fragments (several languages) identifying this type.
    pub label_keywords: &'static [&'static str],
}

/// Matching order matters: the first entry whose keyword occurs in the label wins.
pub const CATALOG: &[DeviceTypeEntry] = &[
    DeviceTypeEntry {
        name: "inverter",
        points: &["p1", "p96-p113", "p70-p93"],
        api_device_type_code: 1,
        label_keywords: &["inverter", "逆变器"],
    },
    DeviceTypeEntry {
        name: "meteo_station",
        points: &["p2003"],
        api_device_type_code: 5,
        label_keywords: &["meteo_station", "meteo", "气象站"],
    },
    DeviceTypeEntry {
        name: "meter",
        points: &["p8030-p8033", "p8018", "p8014"],
        api_device_type_code: 7,
        label_keywords: &["meter", "电表"],
    },
];

pub fn entry(name: &str) -> Option<&'static DeviceTypeEntry> {
    CATALOG.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

/// Expand `"p96-p98"` (or `"p96-98"`) into `["p96", "p97", "p98"]`.
///
/// Literal tokens come back as a single-element list. Anything that does not parse
/// as an ascending range is returned unchanged rather than rejected.
pub fn expand_point_range(token: &str) -> Vec<String> {
    let Some((start, end)) = token.split_once('-') else {
        return vec![token.to_string()];
    };

    let prefix_len = start.find(|c: char| c.is_ascii_digit()).unwrap_or(start.len());
    let (prefix, start_digits) = start.split_at(prefix_len);
    let end_digits = end.strip_prefix(prefix).unwrap_or(end);

    match (start_digits.parse::<u32>(), end_digits.parse::<u32>()) {
        (Ok(first), Ok(last)) if first <= last => (first..=last).map(|n| format!("{prefix}{n}")).collect(),
        _ => {
            warn!("Could not parse point range {:?}; using it verbatim", token);
            vec![token.to_string()]
        }
    }
}

/// Flat, expanded point list for a catalog type name (case-insensitive).
/// Unknown types yield an empty list.
pub fn points_for_device_type(name: &str) -> Vec<String> {
    let Some(entry) = entry(name) else {
        warn!("No measuring point configuration for device type {:?}", name);
        return Vec::new();
    };
    entry.points.iter().flat_map(|p| expand_point_range(p)).collect()
}

/// Classify a device into a catalog type name.
///
/// Order: keyword match on the human-readable label, exact label match against catalog
/// names, then the numeric vendor type code. Falls back to [`UNKNOWN_DEVICE_TYPE`].
pub fn resolve_device_type(type_label: Option<&str>, type_code: Option<i64>) -> &'static str {
    if let Some(label) = type_label {
        let lower = label.to_lowercase();
        if let Some(e) = CATALOG
            .iter()
            .find(|e| e.label_keywords.iter().any(|k| lower.contains(k)))
        {
            return e.name;
        }
        if let Some(e) = CATALOG.iter().find(|e| e.name == lower) {
            return e.name;
        }
        debug!("Type label {:?} not in catalog; trying vendor type code", label);
    }

    type_code
        .and_then(|code| CATALOG.iter().find(|e| e.api_device_type_code == code))
        .map(|e| e.name)
        .unwrap_or(UNKNOWN_DEVICE_TYPE)
}
