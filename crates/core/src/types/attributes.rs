//! Vehicle attributes carried on Shopify carts and line items.
//!
//! The configurator attaches the resolved vehicle to the cart as custom
//! key/value attributes. After checkout they come back on the order, either as
//! cart-level note attributes or as line item properties.

use serde::{Deserialize, Serialize};

use super::registration::normalize;

/// Attribute names understood on orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    Registration,
    Make,
    Model,
    Year,
    Variant,
}

impl AttributeKey {
    /// All keys, in the order they are written to a cart.
    pub const ALL: [Self; 5] = [
        Self::Registration,
        Self::Make,
        Self::Model,
        Self::Year,
        Self::Variant,
    ];

    /// Canonical attribute name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Make => "make",
            Self::Model => "model",
            Self::Year => "year",
            Self::Variant => "variant",
        }
    }

    /// Human-readable label for emails and order notes.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Registration => "Registration",
            Self::Make => "Make",
            Self::Model => "Model",
            Self::Year => "Year",
            Self::Variant => "Variant",
        }
    }

    /// Match an attribute name as it appears on an order.
    ///
    /// Matching is case-insensitive and ignores a leading underscore, which
    /// Shopify uses to hide line item properties from the customer.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_prefix('_').unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }
}

/// The vehicle an order was placed for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleAttributes {
    pub registration: String,
    pub make: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub variant: Option<String>,
}

impl VehicleAttributes {
    /// Collect attributes from name/value pairs.
    ///
    /// Returns `None` unless the pairs form a complete match: both the
    /// registration and the make must be present and non-blank. Blank values
    /// are treated as absent, and the first non-blank value for a key wins.
    pub fn from_pairs<'a, I>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut registration = None;
        let mut make = None;
        let mut model = None;
        let mut year = None;
        let mut variant = None;

        for (name, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match AttributeKey::from_name(name) {
                Some(AttributeKey::Registration) => &mut registration,
                Some(AttributeKey::Make) => &mut make,
                Some(AttributeKey::Model) => &mut model,
                Some(AttributeKey::Year) => &mut year,
                Some(AttributeKey::Variant) => &mut variant,
                None => continue,
            };
            slot.get_or_insert_with(|| value.to_string());
        }

        Some(Self {
            registration: normalize(&registration?),
            make: make?,
            model,
            year: year.and_then(|y| y.parse().ok()),
            variant,
        })
    }

    /// Attributes as labelled pairs, skipping absent values.
    #[must_use]
    pub fn labelled(&self) -> Vec<(&'static str, String)> {
        AttributeKey::ALL
            .into_iter()
            .filter_map(|key| {
                let value = match key {
                    AttributeKey::Registration => Some(self.registration.clone()),
                    AttributeKey::Make => Some(self.make.clone()),
                    AttributeKey::Model => self.model.clone(),
                    AttributeKey::Year => self.year.map(|y| y.to_string()),
                    AttributeKey::Variant => self.variant.clone(),
                };
                value.map(|v| (key.label(), v))
            })
            .collect()
    }

    /// Short description, e.g. `2019 Tesla Model 3 (AB12CDE)`.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(4);
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        parts.push(self.make.clone());
        if let Some(model) = &self.model {
            parts.push(model.clone());
        }
        if let Some(variant) = &self.variant {
            parts.push(variant.clone());
        }
        format!("{} ({})", parts.join(" "), self.registration)
    }
}
