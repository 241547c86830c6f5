//! Dynamic field encoding
//!
//! Requests store their service-specific answers as a structured
//! [`FormSubmission`]. Older clients packed the same data into the free-text
//! description instead:
//!
//! ```text
//! <free text> | adresse: 12 Rue X | numeroFoncier: 99 | Copie CIN: cin.pdf
//! ```
//!
//! This module produces and reads that packed form so legacy descriptions can
//! be ingested and exported. Decoding is total: a malformed or missing tail
//! yields empty results, never an error.
//!
//! Only the tail after the first delimiter is searched for segments. Some
//! legacy clients wrote no free text at all and started the description
//! directly with a segment (`adresse: 12 Rue X | Copie CIN: cin.pdf`), and
//! looked document labels up anywhere in the string. Such a description
//! decodes with its first segment taken as the free text, so that answer or
//! filename is not recovered on ingestion.

use crate::catalog::ServiceDefinition;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Separator between the free text and each `key: value` segment
pub const SEGMENT_DELIMITER: &str = " | ";

/// Structured answers for one request: dynamic field values keyed by
/// `FieldSpec::name` and submitted filenames keyed by document label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub documents: BTreeMap<String, String>,
}

impl FormSubmission {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.documents.is_empty()
    }
}

/// Result of splitting a stored description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedDescription {
    /// Human readable part before the first delimiter
    pub text: String,
    /// `key: value` segments in stored order
    pub entries: Vec<(String, String)>,
}

impl DecodedDescription {
    /// Entries as a map; a repeated key keeps its last value
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Join free text and `key: value` pairs into a single description.
///
/// Pairs with an empty value are skipped, matching what the submission form
/// used to send. With no pairs the text is returned unchanged.
pub fn encode<'a, I>(text: &str, pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let segments: Vec<String> = pairs
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect();

    if segments.is_empty() {
        return text.to_string();
    }

    format!("{}{}{}", text, SEGMENT_DELIMITER, segments.join(SEGMENT_DELIMITER))
}

/// Encode a structured submission against its service definition.
///
/// Field answers come first in the definition's field order, then submitted
/// filenames in the definition's document order. Keys the definition does not
/// know are appended afterwards in key order so nothing is silently dropped.
pub fn encode_submission(
    text: &str,
    service: &ServiceDefinition,
    form: &FormSubmission,
) -> String {
    let mut pairs: Vec<(&str, &str)> = Vec::new();

    for spec in service.fields {
        if let Some(value) = form.fields.get(spec.name) {
            pairs.push((spec.name, value.as_str()));
        }
    }
    for (name, value) in &form.fields {
        if service.field(name).is_none() {
            pairs.push((name.as_str(), value.as_str()));
        }
    }

    for label in service.documents {
        if let Some(filename) = form.documents.get(*label) {
            pairs.push((*label, filename.as_str()));
        }
    }
    for (label, filename) in &form.documents {
        if !service.has_document(label) {
            pairs.push((label.as_str(), filename.as_str()));
        }
    }

    encode(text, pairs)
}

// =============================================================================
// Decoding
// =============================================================================

/// Split a stored description at the first delimiter and parse the tail.
///
/// Segments without a `:` or with an empty key are ignored. Keys and values
/// are trimmed; a value may itself contain `:` since only the first one
/// separates key from value.
pub fn decode(stored: &str) -> DecodedDescription {
    let Some((text, tail)) = stored.split_once(SEGMENT_DELIMITER) else {
        return DecodedDescription {
            text: stored.to_string(),
            entries: Vec::new(),
        };
    };

    let entries = tail
        .split(SEGMENT_DELIMITER)
        .filter_map(|segment| {
            let (key, value) = segment.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect();

    DecodedDescription {
        text: text.to_string(),
        entries,
    }
}

/// Recover which of the service's documents were submitted, label → filename.
///
/// Each label is matched case-insensitively as a literal against the key of
/// every tail segment; labels with no matching segment are omitted.
pub fn submitted_documents(stored: &str, service: &ServiceDefinition) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();

    let Some((_, tail)) = stored.split_once(SEGMENT_DELIMITER) else {
        return found;
    };
    let segments: Vec<&str> = tail.split(SEGMENT_DELIMITER).collect();

    for label in service.documents {
        let pattern = format!(r"(?i)^\s*{}\s*:\s*([^|]+)", regex::escape(label));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!("Could not build document matcher for '{}': {}", label, e);
                continue;
            }
        };

        let filename = segments.iter().find_map(|segment| {
            re.captures(segment)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        });

        if let Some(filename) = filename.filter(|f| !f.is_empty()) {
            found.insert(label.to_string(), filename);
        }
    }

    found
}

/// Rebuild a structured submission from a legacy description.
///
/// Returns the free text and the submission. Segments naming one of the
/// service's documents become document entries, everything else a field.
pub fn decode_submission(stored: &str, service: &ServiceDefinition) -> (String, FormSubmission) {
    let decoded = decode(stored);
    let documents = submitted_documents(stored, service);

    let fields = decoded
        .entries
        .into_iter()
        .filter(|(key, _)| {
            !service
                .documents
                .iter()
                .any(|label| label.to_lowercase() == key.to_lowercase())
        })
        .collect();

    (decoded.text, FormSubmission { fields, documents })
}

/// True if `value` would break the segment layout when packed
pub fn contains_delimiter(value: &str) -> bool {
    value.contains(SEGMENT_DELIMITER)
}
