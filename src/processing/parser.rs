use crate::core::{Anchor, Position};
use serde::Deserialize;
use std::collections::HashSet;

/// Anchor reference as the server serializes it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnchorPayload {
    network_id: String,
}

#[derive(Debug, Deserialize)]
struct AnchorPositionPayload {
    anchor: AnchorPayload,
    xposition: f64,
    yposition: f64,
    zposition: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementPayload {
    #[serde(default)]
    name: Option<String>,
    anchor_positions: Vec<AnchorPositionPayload>,
}

/// Active measurement as needed to configure the sensors
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMeasurement {
    pub name: Option<String>,
    pub anchors: Vec<Anchor>,
}

/// Errors that can occur while parsing a measurement payload
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// Body is not JSON or misses required fields
    #[error("malformed measurement payload: {details}")]
    InvalidFormat { details: String },
    /// Anchor network ID is not a 16-bit hex number
    #[error("invalid anchor network id '{value}'")]
    InvalidNetworkId { value: String },
    /// Same anchor listed twice
    #[error("anchor 0x{network_id:04x} listed more than once")]
    DuplicateAnchor { network_id: u16 },
}

/// Parse a hex network ID such as `6e4e` or `0x6E4E`
pub fn parse_network_id(raw: &str) -> Result<u16, ParseError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if digits.is_empty() {
        return Err(ParseError::InvalidNetworkId { value: raw.to_string() });
    }

    u16::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidNetworkId { value: raw.to_string() })
}

/// Parse the body of `GET /measurements/active`.
///
/// Either every anchor parses or an error is returned; callers never see a
/// partial anchor set.
pub fn parse_active_measurement(body: &str) -> Result<ActiveMeasurement, ParseError> {
    let payload: MeasurementPayload = serde_json::from_str(body).map_err(|e| ParseError::InvalidFormat {
        details: e.to_string(),
    })?;

    let mut seen = HashSet::new();
    let mut anchors = Vec::with_capacity(payload.anchor_positions.len());

    for entry in payload.anchor_positions {
        let network_id = parse_network_id(&entry.anchor.network_id)?;
        if !seen.insert(network_id) {
            return Err(ParseError::DuplicateAnchor { network_id });
        }
        anchors.push(Anchor::new(
            network_id,
            Position::new(entry.xposition, entry.yposition, entry.zposition),
        ));
    }

    Ok(ActiveMeasurement {
        name: payload.name,
        anchors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEASUREMENT: &str = r#"{
        "name": "Office floor 2",
        "anchorPositions": [
            {"anchor": {"networkId": "6e4e"}, "xposition": -100, "yposition": 100, "zposition": 1150},
            {"anchor": {"networkId": "0x6964"}, "xposition": 8450, "yposition": 1200, "zposition": 2150},
            {"anchor": {"networkId": "6E5F"}, "xposition": 1250, "yposition": 12000, "zposition": 1150},
            {"anchor": {"networkId": "6e62"}, "xposition": 7350, "yposition": 11660, "zposition": 1590}
        ]
    }"#;

    #[test]
    fn test_parse_active_measurement() {
        let measurement = parse_active_measurement(MEASUREMENT).unwrap();
        assert_eq!(measurement.name.as_deref(), Some("Office floor 2"));
        assert_eq!(measurement.anchors.len(), 4);
        assert_eq!(measurement.anchors[0], Anchor::new(0x6e4e, Position::new(-100.0, 100.0, 1150.0)));
        assert_eq!(measurement.anchors[1].network_id, 0x6964);
        assert_eq!(measurement.anchors[2].network_id, 0x6e5f);
        assert_eq!(measurement.anchors[3].position.z, 1590.0);
    }

    #[test]
    fn test_network_id_formats() {
        assert_eq!(parse_network_id("6e4e").unwrap(), 0x6e4e);
        assert_eq!(parse_network_id("0x6E4E").unwrap(), 0x6e4e);
        assert_eq!(parse_network_id(" 1 ").unwrap(), 1);
        assert!(parse_network_id("").is_err());
        assert!(parse_network_id("0x").is_err());
        assert!(parse_network_id("zz12").is_err());
        assert!(parse_network_id("1ffff").is_err());
    }

    #[test]
    fn test_malformed_json() {
        let result = parse_active_measurement("{not json");
        assert!(matches!(result, Err(ParseError::InvalidFormat { .. })));
    }

    #[test]
    fn test_missing_fields() {
        let body = r#"{"anchorPositions": [{"anchor": {"networkId": "6e4e"}, "xposition": 1, "yposition": 2}]}"#;
        assert!(matches!(parse_active_measurement(body), Err(ParseError::InvalidFormat { .. })));

        assert!(matches!(parse_active_measurement("{}"), Err(ParseError::InvalidFormat { .. })));
    }

    #[test]
    fn test_bad_anchor_rejects_whole_payload() {
        let body = r#"{"anchorPositions": [
            {"anchor": {"networkId": "6e4e"}, "xposition": 1, "yposition": 2, "zposition": 3},
            {"anchor": {"networkId": "not-hex"}, "xposition": 1, "yposition": 2, "zposition": 3}
        ]}"#;
        let result = parse_active_measurement(body);
        assert_eq!(result, Err(ParseError::InvalidNetworkId { value: "not-hex".to_string() }));
    }

    #[test]
    fn test_duplicate_anchor() {
        let body = r#"{"anchorPositions": [
            {"anchor": {"networkId": "6e4e"}, "xposition": 1, "yposition": 2, "zposition": 3},
            {"anchor": {"networkId": "0x6E4E"}, "xposition": 4, "yposition": 5, "zposition": 6}
        ]}"#;
        let result = parse_active_measurement(body);
        assert_eq!(result, Err(ParseError::DuplicateAnchor { network_id: 0x6e4e }));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let body = r#"{"measurementId": 7, "anchorPositions": [], "creator": "admin"}"#;
        let measurement = parse_active_measurement(body).unwrap();
        assert!(measurement.anchors.is_empty());
        assert!(measurement.name.is_none());
    }
}
