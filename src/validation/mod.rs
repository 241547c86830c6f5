//! Input validation module

use crate::catalog::{self, FieldType, ServiceDefinition};
use crate::form_encoding::{self, FormSubmission};
use chrono::NaiveDate;
use thiserror::Error;

/// Longest free-text description or message accepted
pub const MAX_TEXT_LENGTH: usize = 4000;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' is too long (max {max} characters)")]
    TooLong { field: String, max: usize },

    #[error("Unknown service type: {0}")]
    UnknownService(String),

    #[error("Field '{field}' is not part of this service's form")]
    UnknownField { field: String },

    #[error("Document '{label}' is not requested by this service")]
    UnknownDocument { label: String },

    #[error("Field '{field}' must be a number")]
    InvalidNumber { field: String },

    #[error("Field '{field}' must be a date (YYYY-MM-DD)")]
    InvalidDate { field: String },

    #[error("Field '{field}' may not contain the sequence \" | \"")]
    ContainsDelimiter { field: String },

    #[error("Invalid file type: {mime_type}")]
    InvalidFileType { mime_type: String },

    #[error("File too large (max {max_mb} MB)")]
    FileTooLarge { max_mb: usize },

    #[error("File is empty")]
    EmptyFile,

    #[error("{0}")]
    Fields(String),
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let codes: Vec<&str> = errs.iter().map(|e| e.code.as_ref()).collect();
                format!("{} ({})", field, codes.join(", "))
            })
            .collect();
        fields.sort();
        ValidationError::Fields(format!("Invalid fields: {}", fields.join("; ")))
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Look up the definition a request refers to
pub fn service_for(service_type: &str) -> Result<&'static ServiceDefinition, ValidationError> {
    catalog::find_by_value(service_type)
        .ok_or_else(|| ValidationError::UnknownService(service_type.to_string()))
}

/// Check a submission against its service definition.
///
/// Required fields must be present and non-blank, typed fields must parse,
/// and every key must be known to the definition. Documents are optional at
/// this stage; see [`missing_documents`].
pub fn validate_form(
    service: &ServiceDefinition,
    form: &FormSubmission,
) -> Result<(), ValidationError> {
    for name in form.fields.keys() {
        if service.field(name).is_none() {
            return Err(ValidationError::UnknownField {
                field: name.clone(),
            });
        }
    }
    for label in form.documents.keys() {
        if !service.has_document(label) {
            return Err(ValidationError::UnknownDocument {
                label: label.clone(),
            });
        }
    }

    for spec in service.fields {
        let value = form
            .fields
            .get(spec.name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());

        let Some(value) = value else {
            if spec.required {
                return Err(ValidationError::Required {
                    field: spec.name.to_string(),
                });
            }
            continue;
        };

        check_packable(spec.name, value)?;
        if value.chars().count() > MAX_TEXT_LENGTH {
            return Err(ValidationError::TooLong {
                field: spec.name.to_string(),
                max: MAX_TEXT_LENGTH,
            });
        }

        match spec.field_type {
            FieldType::Number => {
                if !value.parse::<f64>().is_ok_and(f64::is_finite) {
                    return Err(ValidationError::InvalidNumber {
                        field: spec.name.to_string(),
                    });
                }
            }
            FieldType::Date => {
                if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
                    return Err(ValidationError::InvalidDate {
                        field: spec.name.to_string(),
                    });
                }
            }
            FieldType::Text | FieldType::Textarea => {}
        }
    }

    for (label, filename) in &form.documents {
        if filename.trim().is_empty() {
            return Err(ValidationError::Required {
                field: label.clone(),
            });
        }
        check_packable(label, filename)?;
    }

    Ok(())
}

/// Free-text part of a request
pub fn validate_description(text: &str) -> Result<(), ValidationError> {
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_TEXT_LENGTH,
        });
    }
    check_packable("description", text)
}

/// Structured submission for a create or update. A legacy packed
/// description is unpacked when no structured form was sent.
pub fn resolve_submission(
    service: &ServiceDefinition,
    description: &str,
    form: Option<FormSubmission>,
) -> Result<(String, FormSubmission), ValidationError> {
    let (text, form) = match form {
        Some(form) => (description.to_string(), form),
        None => form_encoding::decode_submission(description, service),
    };
    let text = text.trim().to_string();
    validate_description(&text)?;
    validate_form(service, &form)?;
    Ok((text, form))
}

/// Catalog documents the submission has no file for, in catalog order
pub fn missing_documents(service: &ServiceDefinition, form: &FormSubmission) -> Vec<&'static str> {
    service
        .documents
        .iter()
        .copied()
        .filter(|label| !form.documents.contains_key(*label))
        .collect()
}

fn check_packable(field: &str, value: &str) -> Result<(), ValidationError> {
    if form_encoding::contains_delimiter(value) {
        return Err(ValidationError::ContainsDelimiter {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Messages
// =============================================================================

/// Trimmed message content, 1 to [`MAX_TEXT_LENGTH`] characters
pub fn validate_message_content(content: &str) -> Result<String, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "content".to_string(),
        });
    }
    if trimmed.chars().count() > MAX_TEXT_LENGTH {
        return Err(ValidationError::TooLong {
            field: "content".to_string(),
            max: MAX_TEXT_LENGTH,
        });
    }
    Ok(trimmed.to_string())
}

// =============================================================================
// Uploads
// =============================================================================

/// MIME types accepted for request attachments
const ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.oasis.opendocument.text",
    "application/rtf",
    "text/plain",
    "text/csv",
];

/// Container formats whose magic bytes only say "zip" or "ole"
const CONTAINER_TYPES: &[&str] = &["application/zip", "application/x-ole-storage"];

/// Validate an uploaded file and return the content type to store.
///
/// Formats with a signature are identified from their bytes; the declared
/// type is only trusted for plain text and for office containers.
pub fn validate_file_upload(
    declared_type: &str,
    bytes: &[u8],
    max_size_bytes: usize,
) -> Result<String, ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyFile);
    }
    if bytes.len() > max_size_bytes {
        return Err(ValidationError::FileTooLarge {
            max_mb: max_size_bytes / (1024 * 1024),
        });
    }

    let declared = declared_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    let effective = match infer::get(bytes).map(|kind| kind.mime_type()) {
        Some(sniffed) if CONTAINER_TYPES.contains(&sniffed) => {
            if declared.starts_with("application/") && declared != "application/pdf" {
                declared
            } else {
                sniffed.to_string()
            }
        }
        Some(sniffed) => sniffed.to_string(),
        None if declared.starts_with("text/") => declared,
        None => {
            return Err(ValidationError::InvalidFileType {
                mime_type: format!("{} (content does not match)", declared),
            })
        }
    };

    if !ALLOWED_TYPES.contains(&effective.as_str()) {
        return Err(ValidationError::InvalidFileType {
            mime_type: effective,
        });
    }

    Ok(effective)
}

/// Dangerous file extensions that could be executed if misconfigured
const DANGEROUS_EXTENSIONS: &[&str] = &[
    ".php", ".phtml", ".asp", ".aspx", ".jsp", ".cgi", ".pl", ".py", ".rb",
    ".exe", ".bat", ".cmd", ".com", ".msi", ".dll", ".scr", ".sh", ".ps1",
    ".js", ".mjs", ".vbs", ".jar", ".class", ".htaccess", ".html", ".htm", ".svg",
];

/// Reject dangerous extensions, at the end or doubled (`scan.php.pdf`)
pub fn validate_filename_extensions(filename: &str) -> Result<(), ValidationError> {
    let lower = filename.to_lowercase();

    for ext in DANGEROUS_EXTENSIONS {
        if lower.ends_with(ext) || lower.contains(&format!("{}.", ext)) {
            return Err(ValidationError::InvalidFileType {
                mime_type: format!("filename contains dangerous extension: {}", ext),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::find_by_value;

    fn permit_form() -> FormSubmission {
        let mut form = FormSubmission::default();
        form.fields.insert("adresse".into(), "12 Rue X".into());
        form.fields.insert("numeroFoncier".into(), "99".into());
        form.fields.insert("typeConstruction".into(), "Villa".into());
        form
    }

    #[test]
    fn test_valid_permit_form() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").unwrap();
        let mut form = permit_form();
        form.documents.insert("Copie CIN".into(), "cin.pdf".into());
        assert!(validate_form(permit, &form).is_ok());
        assert_eq!(
            missing_documents(permit, &form),
            vec!["Plan architectural", "Titre de propriété", "Attestation de conformité"]
        );
    }

    #[test]
    fn test_missing_required_field() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").unwrap();
        let mut form = permit_form();
        form.fields.insert("adresse".into(), "   ".into());
        assert_eq!(
            validate_form(permit, &form),
            Err(ValidationError::Required {
                field: "adresse".to_string()
            })
        );
    }

    #[test]
    fn test_optional_field_may_be_absent() {
        let roads = find_by_value("ENTRETIEN_VOIRIE").unwrap();
        let mut form = FormSubmission::default();
        form.fields.insert("nomVoie".into(), "Avenue Habib Bourguiba".into());
        form.fields.insert("descriptionProbleme".into(), "Nid de poule".into());
        assert!(validate_form(roads, &form).is_ok());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").unwrap();
        let mut form = permit_form();
        form.fields.insert("couleur".into(), "bleu".into());
        assert!(matches!(
            validate_form(permit, &form),
            Err(ValidationError::UnknownField { .. })
        ));

        let mut form = permit_form();
        form.documents.insert("Passeport".into(), "p.pdf".into());
        assert!(matches!(
            validate_form(permit, &form),
            Err(ValidationError::UnknownDocument { .. })
        ));
    }

    #[test]
    fn test_typed_fields() {
        let stall = find_by_value("LICENCE_ETAL").unwrap();
        let mut form = FormSubmission::default();
        form.fields.insert("emplacement".into(), "Marché central".into());
        form.fields.insert("activite".into(), "Fruits".into());
        form.fields.insert("duree".into(), "trente".into());
        assert!(matches!(
            validate_form(stall, &form),
            Err(ValidationError::InvalidNumber { .. })
        ));
        form.fields.insert("duree".into(), "30".into());
        assert!(validate_form(stall, &form).is_ok());

        let works = find_by_value("DECLARATION_TRAVAUX").unwrap();
        let mut form = FormSubmission::default();
        form.fields.insert("adresseChantier".into(), "Dakar".into());
        form.fields.insert("natureTravaux".into(), "Peinture".into());
        form.fields.insert("dateDebut".into(), "01/06/2024".into());
        assert!(matches!(
            validate_form(works, &form),
            Err(ValidationError::InvalidDate { .. })
        ));
        form.fields.insert("dateDebut".into(), "2024-06-01".into());
        assert!(validate_form(works, &form).is_ok());
    }

    #[test]
    fn test_delimiter_rejected_in_values() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").unwrap();
        let mut form = permit_form();
        form.fields.insert("adresse".into(), "12 Rue X | Bloc B".into());
        assert!(matches!(
            validate_form(permit, &form),
            Err(ValidationError::ContainsDelimiter { .. })
        ));

        let mut form = permit_form();
        form.documents.insert("Copie CIN".into(), "a | b.pdf".into());
        assert!(validate_form(permit, &form).is_err());

        assert!(validate_description("texte | suite").is_err());
        assert!(validate_description("texte|suite").is_ok());
    }

    #[test]
    fn test_unknown_service() {
        assert!(service_for("PERMIS_CONSTRUIRE").is_ok());
        assert_eq!(
            service_for("PERMIS_PECHE").unwrap_err(),
            ValidationError::UnknownService("PERMIS_PECHE".to_string())
        );
    }

    #[test]
    fn test_message_content() {
        assert_eq!(validate_message_content("  Bonjour  ").unwrap(), "Bonjour");
        assert!(validate_message_content("   ").is_err());
        assert!(validate_message_content(&"a".repeat(MAX_TEXT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_file_upload_sniffing() {
        let pdf = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n";
        assert_eq!(
            validate_file_upload("application/pdf", pdf, 1024).unwrap(),
            "application/pdf"
        );
        // Declared type is overridden by the signature
        assert_eq!(
            validate_file_upload("application/octet-stream", pdf, 1024).unwrap(),
            "application/pdf"
        );

        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        assert_eq!(validate_file_upload("image/png", png, 1024).unwrap(), "image/png");

        let text = b"Bonjour, voici ma demande.";
        assert_eq!(
            validate_file_upload("text/plain; charset=utf-8", text, 1024).unwrap(),
            "text/plain"
        );
        assert!(matches!(
            validate_file_upload("application/pdf", text, 1024),
            Err(ValidationError::InvalidFileType { .. })
        ));
        assert!(matches!(
            validate_file_upload("text/html", text, 1024),
            Err(ValidationError::InvalidFileType { .. })
        ));
    }

    #[test]
    fn test_file_upload_limits() {
        assert_eq!(
            validate_file_upload("text/plain", b"", 1024),
            Err(ValidationError::EmptyFile)
        );
        assert!(matches!(
            validate_file_upload("text/plain", &vec![b'a'; 3 * 1024 * 1024], 2 * 1024 * 1024),
            Err(ValidationError::FileTooLarge { max_mb: 2 })
        ));
    }

    #[test]
    fn test_dangerous_extensions() {
        assert!(validate_filename_extensions("plan.pdf").is_ok());
        assert!(validate_filename_extensions("Copie CIN.JPG").is_ok());
        assert!(validate_filename_extensions("virus.exe").is_err());
        assert!(validate_filename_extensions("shell.php.pdf").is_err());
        assert!(validate_filename_extensions("page.html").is_err());
    }

    #[test]
    fn test_resolve_submission_unpacks_legacy_description() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").unwrap();
        let (text, form) = resolve_submission(
            permit,
            "Maison | adresse: 12 Rue X | numeroFoncier: 99 | typeConstruction: Villa | Copie CIN: cin.pdf",
            None,
        )
        .unwrap();
        assert_eq!(text, "Maison");
        assert_eq!(form.fields.len(), 3);
        assert_eq!(form.documents.get("Copie CIN").map(String::as_str), Some("cin.pdf"));
    }

    #[test]
    fn test_resolve_submission_prefers_structured_form() {
        let roads = find_by_value("ENTRETIEN_VOIRIE").unwrap();
        let mut form = FormSubmission::default();
        form.fields.insert("nomVoie".into(), "Rue de Marseille".into());
        form.fields.insert("descriptionProbleme".into(), "Trottoir cassé".into());
        let (text, resolved) = resolve_submission(roads, "  Trottoir  ", Some(form.clone())).unwrap();
        assert_eq!(text, "Trottoir");
        assert_eq!(resolved, form);

        // A structured form plus a packed description is ambiguous
        assert!(resolve_submission(roads, "a | b: c", Some(form)).is_err());
    }

    #[test]
    fn test_resolve_submission_validates_required_fields() {
        let permit = find_by_value("PERMIS_CONSTRUIRE").unwrap();
        assert!(matches!(
            resolve_submission(permit, "Juste du texte", None),
            Err(ValidationError::Required { .. })
        ));
    }
}
