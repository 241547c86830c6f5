//! Service catalog
//!
//! Static registry of the municipal services a citizen can request. Each
//! definition lists its dynamic form fields and the supporting documents the
//! citizen is asked to upload. The order of `fields` and `documents` is the
//! canonical display order and the order used by [`crate::form_encoding`].

mod data;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use data::SERVICES;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Country {
    #[serde(rename = "Tunisie")]
    Tunisia,
    #[serde(rename = "Sénégal")]
    Senegal,
}

impl Country {
    pub const ALL: [Country; 2] = [Country::Tunisia, Country::Senegal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Country::Tunisia => "Tunisie",
            Country::Senegal => "Sénégal",
        }
    }

    /// Parse the display name used on the wire. Accepts the unaccented
    /// spelling as well since it shows up in query strings.
    pub fn parse(raw: &str) -> Option<Country> {
        match raw.trim() {
            "Tunisie" | "tunisie" => Some(Country::Tunisia),
            "Sénégal" | "sénégal" | "Senegal" | "senegal" => Some(Country::Senegal),
            _ => None,
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Textarea,
    Number,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub value: &'static str,
    pub label: &'static str,
    pub short_label: &'static str,
    pub country: Country,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
    pub documents: &'static [&'static str],
}

impl ServiceDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_document(&self, label: &str) -> bool {
        self.documents.iter().any(|d| *d == label)
    }
}

// =============================================================================
// Lookups
// =============================================================================

/// All definitions offered in `country`, in catalog order
pub fn list_by_country(country: Country) -> Vec<&'static ServiceDefinition> {
    SERVICES.iter().filter(|s| s.country == country).collect()
}

/// Find a definition by its unique `value` key
pub fn find_by_value(value: &str) -> Option<&'static ServiceDefinition> {
    SERVICES.iter().find(|s| s.value == value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_values_unique_across_catalog() {
        let mut seen = HashSet::new();
        for service in SERVICES {
            assert!(seen.insert(service.value), "duplicate value {}", service.value);
        }
    }

    #[test]
    fn test_field_names_unique_within_definition() {
        for service in SERVICES {
            let mut names = HashSet::new();
            for field in service.fields {
                assert!(
                    names.insert(field.name),
                    "duplicate field {} in {}",
                    field.name,
                    service.value
                );
            }
        }
    }

    #[test]
    fn test_list_by_country_keeps_catalog_order() {
        let tunisia = list_by_country(Country::Tunisia);
        assert_eq!(tunisia.first().map(|s| s.value), Some("PERMIS_CONSTRUIRE"));
        assert!(tunisia.iter().all(|s| s.country == Country::Tunisia));

        let senegal = list_by_country(Country::Senegal);
        assert_eq!(senegal.first().map(|s| s.value), Some("PERMIS_CONSTRUIRE_SN"));
        assert_eq!(tunisia.len() + senegal.len(), SERVICES.len());
    }

    #[test]
    fn test_find_by_value() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").expect("permit exists");
        assert_eq!(
            permit.fields.iter().map(|f| f.name).collect::<Vec<_>>(),
            vec!["adresse", "numeroFoncier", "typeConstruction"]
        );
        assert_eq!(permit.documents[0], "Copie CIN");
        assert!(find_by_value("UNKNOWN").is_none());
        assert!(find_by_value("permis_construire").is_none());
    }

    #[test]
    fn test_country_parse_and_wire_name() {
        assert_eq!(Country::parse("Sénégal"), Some(Country::Senegal));
        assert_eq!(Country::parse("senegal"), Some(Country::Senegal));
        assert_eq!(Country::parse("France"), None);
        assert_eq!(
            serde_json::to_string(&Country::Senegal).unwrap(),
            "\"Sénégal\""
        );
    }
}
