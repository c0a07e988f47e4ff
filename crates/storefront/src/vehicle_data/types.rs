//! Response shape of the vehicle data API and its mapping to [`VehicleData`].
//!
//! Every field is optional: the API omits or nulls blocks it has no data for,
//! and the mapping falls back from the curated model details to the raw DVLA
//! record.

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use plateshield_core::{Registration, VehicleData};

/// Make/model placeholder when neither source has a value.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LookupResponse {
    pub response_information: Option<ResponseInformation>,
    pub results: Option<LookupResults>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ResponseInformation {
    pub status_code: Option<i64>,
    pub status_message: Option<String>,
    pub is_success_status_code: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LookupResults {
    pub vehicle_details: Option<VehicleDetails>,
    pub model_details: Option<ModelDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VehicleDetails {
    pub vehicle_identification: Option<VehicleIdentification>,
}

/// DVLA registration record.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VehicleIdentification {
    pub vin: Option<String>,
    pub dvla_make: Option<String>,
    pub dvla_model: Option<String>,
    pub dvla_body_type: Option<String>,
    pub dvla_fuel_type: Option<String>,
    pub year_of_manufacture: Option<i32>,
    pub date_first_registered: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModelDetails {
    pub model_identification: Option<ModelIdentification>,
    pub body_details: Option<BodyDetails>,
    pub powertrain: Option<Powertrain>,
}

/// Curated make/model data, usually better formatted than the DVLA record.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModelIdentification {
    pub make: Option<String>,
    pub range: Option<String>,
    pub model: Option<String>,
    pub model_variant: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BodyDetails {
    pub body_style: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Powertrain {
    pub fuel_type: Option<String>,
}

impl LookupResponse {
    /// Whether the API reported a successful lookup.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_information
            .as_ref()
            .and_then(|info| info.is_success_status_code)
            .unwrap_or(false)
    }

    /// Status message for logging.
    #[must_use]
    pub fn status_message(&self) -> &str {
        self.response_information
            .as_ref()
            .and_then(|info| info.status_message.as_deref())
            .unwrap_or("no status message")
    }

    /// Map the response onto a vehicle record.
    ///
    /// Returns `None` if the response carries neither vehicle nor model
    /// details. `current_year` is the last resort for the manufacture year.
    #[must_use]
    pub fn into_vehicle_data(
        self,
        registration: Registration,
        current_year: i32,
    ) -> Option<VehicleData> {
        let results = self.results?;
        if results.vehicle_details.is_none() && results.model_details.is_none() {
            return None;
        }

        let dvla = results
            .vehicle_details
            .and_then(|d| d.vehicle_identification)
            .unwrap_or_default();
        let model_details = results.model_details.unwrap_or_default();
        let ident = model_details.model_identification.unwrap_or_default();

        let year = dvla
            .year_of_manufacture
            .or_else(|| {
                dvla.date_first_registered
                    .as_deref()
                    .and_then(year_from_date)
            })
            .unwrap_or(current_year);

        Some(VehicleData {
            registration,
            make: first_present([ident.make, dvla.dvla_make])
                .unwrap_or_else(|| UNKNOWN.to_string()),
            model: first_present([ident.model, ident.range, dvla.dvla_model])
                .unwrap_or_else(|| UNKNOWN.to_string()),
            year,
            variant: first_present([ident.model_variant]),
            body_style: first_present([
                model_details.body_details.and_then(|b| b.body_style),
                dvla.dvla_body_type,
            ]),
            fuel_type: first_present([
                model_details.powertrain.and_then(|p| p.fuel_type),
                dvla.dvla_fuel_type,
            ]),
            vin: first_present([dvla.vin]),
        })
    }
}

/// First non-blank value, trimmed.
fn first_present<const N: usize>(candidates: [Option<String>; N]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

/// Year of a registration date such as `2019-05-31T00:00:00` or `2019-05-31`.
fn year_from_date(raw: &str) -> Option<i32> {
    let date = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .map(|date| date.year())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn registration() -> Registration {
        Registration::parse("AB12CDE").unwrap()
    }

    fn parse(json: &str) -> LookupResponse {
        serde_json::from_str(json).unwrap()
    }

    const FULL: &str = r#"{
        "ResponseInformation": {"StatusCode": 0, "StatusMessage": "Success", "IsSuccessStatusCode": true},
        "Results": {
            "VehicleDetails": {
                "VehicleIdentification": {
                    "Vrm": "AB12CDE",
                    "Vin": "5YJ3E7EB0KF000000",
                    "DvlaMake": "TESLA",
                    "DvlaModel": "MODEL 3",
                    "DvlaBodyType": "SALOON",
                    "DvlaFuelType": "ELECTRICITY",
                    "YearOfManufacture": 2019,
                    "DateFirstRegistered": "2019-05-31T00:00:00"
                }
            },
            "ModelDetails": {
                "ModelIdentification": {"Make": "Tesla", "Range": "Model 3", "Model": "Model 3", "ModelVariant": "Long Range AWD"},
                "BodyDetails": {"BodyStyle": "Saloon"},
                "Powertrain": {"FuelType": "Electric"}
            }
        }
    }"#;

    #[test]
    fn test_full_response() {
        let response = parse(FULL);
        assert!(response.is_success());

        let vehicle = response.into_vehicle_data(registration(), 2026).unwrap();
        assert_eq!(vehicle.make, "Tesla");
        assert_eq!(vehicle.model, "Model 3");
        assert_eq!(vehicle.year, 2019);
        assert_eq!(vehicle.variant.as_deref(), Some("Long Range AWD"));
        assert_eq!(vehicle.body_style.as_deref(), Some("Saloon"));
        assert_eq!(vehicle.fuel_type.as_deref(), Some("Electric"));
        assert_eq!(vehicle.vin.as_deref(), Some("5YJ3E7EB0KF000000"));
    }

    #[test]
    fn test_falls_back_to_dvla_make() {
        let response = parse(
            r#"{
                "ResponseInformation": {"IsSuccessStatusCode": true},
                "Results": {
                    "VehicleDetails": {"VehicleIdentification": {"DvlaMake": "FORD", "DvlaModel": "FIESTA", "YearOfManufacture": 2015}},
                    "ModelDetails": null
                }
            }"#,
        );
        let vehicle = response.into_vehicle_data(registration(), 2026).unwrap();
        assert_eq!(vehicle.make, "FORD");
        assert_eq!(vehicle.model, "FIESTA");
        assert_eq!(vehicle.variant, None);
    }

    #[test]
    fn test_unknown_make() {
        let response = parse(
            r#"{"Results": {"VehicleDetails": {"VehicleIdentification": {"DvlaMake": "  "}}}}"#,
        );
        let vehicle = response.into_vehicle_data(registration(), 2026).unwrap();
        assert_eq!(vehicle.make, UNKNOWN);
        assert_eq!(vehicle.model, UNKNOWN);
    }

    #[test]
    fn test_year_from_registration_date() {
        let response = parse(
            r#"{"Results": {"VehicleDetails": {"VehicleIdentification": {"DvlaMake": "VW", "DateFirstRegistered": "2017-09-01T00:00:00"}}}}"#,
        );
        let vehicle = response.into_vehicle_data(registration(), 2026).unwrap();
        assert_eq!(vehicle.year, 2017);
    }

    #[test]
    fn test_year_falls_back_to_current_year() {
        let response = parse(
            r#"{"Results": {"VehicleDetails": {"VehicleIdentification": {"DvlaMake": "VW", "DateFirstRegistered": "unknown"}}}}"#,
        );
        let vehicle = response.into_vehicle_data(registration(), 2026).unwrap();
        assert_eq!(vehicle.year, 2026);
    }

    #[test]
    fn test_empty_results() {
        assert!(parse(r#"{"Results": {}}"#).into_vehicle_data(registration(), 2026).is_none());
        assert!(parse("{}").into_vehicle_data(registration(), 2026).is_none());
    }

    #[test]
    fn test_unsuccessful_status() {
        let response = parse(
            r#"{"ResponseInformation": {"StatusCode": 3, "StatusMessage": "No results", "IsSuccessStatusCode": false}}"#,
        );
        assert!(!response.is_success());
        assert_eq!(response.status_message(), "No results");
    }

    #[test]
    fn test_year_from_date_formats() {
        assert_eq!(year_from_date("2019-05-31T00:00:00"), Some(2019));
        assert_eq!(year_from_date("2019-05-31"), Some(2019));
        assert_eq!(year_from_date("2019-05-31T00:00:00.000Z"), Some(2019));
        assert_eq!(year_from_date("31/05/2019"), None);
    }
}
