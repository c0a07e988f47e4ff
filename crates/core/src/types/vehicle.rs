//! Resolved vehicle records.

use serde::{Deserialize, Serialize};

use super::registration::Registration;

/// Vehicle details resolved from a registration lookup.
///
/// Produced once per successful lookup and cached verbatim as JSON, so the
/// serialized field names are part of the cache format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleData {
    pub registration: Registration,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vin: Option<String>,
}

impl VehicleData {
    /// Human-readable label, e.g. `2019 Tesla Model 3 Long Range`.
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut name = format!("{} {} {}", self.year, self.make, self.model);
        if let Some(variant) = &self.variant {
            name.push(' ');
            name.push_str(variant);
        }
        name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> VehicleData {
        VehicleData {
            registration: Registration::parse("AB12CDE").unwrap(),
            make: "Tesla".to_string(),
            model: "Model 3".to_string(),
            year: 2019,
            variant: Some("Long Range".to_string()),
            body_style: Some("Saloon".to_string()),
            fuel_type: None,
            vin: None,
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(sample().display_name(), "2019 Tesla Model 3 Long Range");
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["registration"], "AB12CDE");
        assert_eq!(json["bodyStyle"], "Saloon");
        assert!(json.get("fuelType").is_none());
    }
}
