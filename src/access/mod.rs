//! Request access control
//!
//! The caller's role is derived once, when the session is loaded, from the
//! authority strings attached to the account. Everything downstream receives
//! the typed [`Role`] and asks it what may be seen and filtered.

use crate::catalog;
use crate::form_encoding;
use crate::models::{RequestDto, RequestRow, RequestStatus};
use crate::validation;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_AGENT: &str = "ROLE_AGENT";
pub const ROLE_USER: &str = "ROLE_USER";

// =============================================================================
// Role
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Agent,
    Admin,
}

impl Role {
    /// Map authority claims to a role. Containment is case-sensitive;
    /// admin wins over agent, and neither means a plain user.
    pub fn from_authorities<S: AsRef<str>>(authorities: &[S]) -> Role {
        let has = |token: &str| authorities.iter().any(|a| a.as_ref() == token);
        if has(ROLE_ADMIN) {
            Role::Admin
        } else if has(ROLE_AGENT) {
            Role::Agent
        } else {
            Role::User
        }
    }

    /// Parse a single authority string as stored on an account
    pub fn from_authority(authority: &str) -> Option<Role> {
        match authority {
            ROLE_ADMIN => Some(Role::Admin),
            ROLE_AGENT => Some(Role::Agent),
            ROLE_USER => Some(Role::User),
            _ => None,
        }
    }

    pub fn authority(&self) -> &'static str {
        match self {
            Role::User => ROLE_USER,
            Role::Agent => ROLE_AGENT,
            Role::Admin => ROLE_ADMIN,
        }
    }

    /// Agents and admins work on every citizen's requests
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Agent | Role::Admin)
    }

    pub fn filter_surface(&self) -> &'static [FilterField] {
        use FilterField::*;
        match self {
            Role::User => &[ServiceType, Status, CreatedDateRange],
            Role::Agent => &[ServiceType, Status, CreatedDateRange, Description, Id],
            Role::Admin => &[
                ServiceType,
                Status,
                CreatedDateRange,
                Description,
                Id,
                CitizenContact,
            ],
        }
    }

    pub fn can_filter_by(&self, field: FilterField) -> bool {
        self.filter_surface().contains(&field)
    }

    /// Scope for a listing: `mine` is always the caller's own requests,
    /// `all` is reserved to staff
    pub fn list_scope(&self, caller_id: i64, listing: Listing) -> Result<Scope, AccessError> {
        match listing {
            Listing::Mine => Ok(Scope::Own(caller_id)),
            Listing::All if self.is_staff() => Ok(Scope::All),
            Listing::All => Err(AccessError::Forbidden(
                "listing all requests requires the agent or admin role".to_string(),
            )),
        }
    }

    pub fn can_view(&self, caller_id: i64, citizen_id: i64) -> bool {
        self.is_staff() || caller_id == citizen_id
    }

    pub fn can_delete(&self, caller_id: i64, citizen_id: i64) -> bool {
        *self == Role::Admin || caller_id == citizen_id
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.authority())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listing {
    Mine,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Own(i64),
    All,
}

impl Scope {
    pub fn includes(&self, citizen_id: i64) -> bool {
        match self {
            Scope::Own(owner) => *owner == citizen_id,
            Scope::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterField {
    ServiceType,
    Status,
    CreatedDateRange,
    Description,
    Id,
    CitizenContact,
}

impl FilterField {
    /// Query parameter(s) carrying this filter
    pub fn query_name(&self) -> &'static str {
        match self {
            FilterField::ServiceType => "type",
            FilterField::Status => "status",
            FilterField::CreatedDateRange => "createdFrom/createdTo",
            FilterField::Description => "description",
            FilterField::Id => "id",
            FilterField::CitizenContact => "citizen",
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AccessError {
    #[error("{0}")]
    Forbidden(String),

    #[error("Filter '{}' is not available to {role}", .field.query_name())]
    FilterNotAllowed { field: FilterField, role: Role },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

// =============================================================================
// Filtering
// =============================================================================

/// Listing filters as sent in the query string
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    /// Comma separated statuses
    pub status: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub description: Option<String>,
    pub id: Option<i64>,
    pub citizen: Option<String>,
}

impl RequestFilter {
    /// Filters actually present in this query
    pub fn fields_used(&self) -> Vec<FilterField> {
        let mut used = Vec::new();
        if non_blank(&self.service_type).is_some() {
            used.push(FilterField::ServiceType);
        }
        if non_blank(&self.status).is_some() {
            used.push(FilterField::Status);
        }
        if self.created_from.is_some() || self.created_to.is_some() {
            used.push(FilterField::CreatedDateRange);
        }
        if non_blank(&self.description).is_some() {
            used.push(FilterField::Description);
        }
        if self.id.is_some() {
            used.push(FilterField::Id);
        }
        if non_blank(&self.citizen).is_some() {
            used.push(FilterField::CitizenContact);
        }
        used
    }

    pub fn authorize(&self, role: Role) -> Result<(), AccessError> {
        match self
            .fields_used()
            .into_iter()
            .find(|field| !role.can_filter_by(*field))
        {
            Some(field) => Err(AccessError::FilterNotAllowed { field, role }),
            None => Ok(()),
        }
    }

    pub fn statuses(&self) -> Result<Vec<RequestStatus>, AccessError> {
        let Some(raw) = non_blank(&self.status) else {
            return Ok(Vec::new());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<RequestStatus>()
                    .map_err(|_| AccessError::InvalidFilter(format!("unknown status '{}'", s)))
            })
            .collect()
    }

    /// Compiled form of the filter, checked once before scanning rows
    pub fn compile(&self) -> Result<CompiledFilter, AccessError> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(AccessError::InvalidFilter(
                    "createdFrom is after createdTo".to_string(),
                ));
            }
        }
        Ok(CompiledFilter {
            service_type: non_blank(&self.service_type).map(str::to_lowercase),
            statuses: self.statuses()?,
            created_from: self.created_from,
            created_to: self.created_to,
            description: non_blank(&self.description).map(str::to_lowercase),
            id: self.id,
            citizen: non_blank(&self.citizen).map(str::to_lowercase),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    service_type: Option<String>,
    statuses: Vec<RequestStatus>,
    created_from: Option<NaiveDate>,
    created_to: Option<NaiveDate>,
    description: Option<String>,
    id: Option<i64>,
    citizen: Option<String>,
}

impl CompiledFilter {
    pub fn matches(&self, row: &RequestRow) -> bool {
        if let Some(ref wanted) = self.service_type {
            let label = catalog::find_by_value(&row.service_type)
                .map(|s| s.label.to_lowercase())
                .unwrap_or_default();
            if !row.service_type.to_lowercase().contains(wanted.as_str())
                && !label.contains(wanted.as_str())
            {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&row.status) {
            return false;
        }
        let created = row.created_date.date_naive();
        if self.created_from.is_some_and(|from| created < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| created > to) {
            return false;
        }
        if let Some(ref needle) = self.description {
            if !row.description.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        if self.id.is_some_and(|id| id != row.id) {
            return false;
        }
        if let Some(ref needle) = self.citizen {
            let contact = [
                &row.citizen_cin,
                &row.citizen_first_name,
                &row.citizen_last_name,
                &row.citizen_email,
                &row.citizen_phone,
            ];
            if !contact
                .iter()
                .filter_map(|v| v.as_deref())
                .any(|v| v.to_lowercase().contains(needle.as_str()))
            {
                return false;
            }
        }
        true
    }
}

impl CompiledFilter {
    /// The filter as a list of clauses over `scope`, for the store to
    /// evaluate. An empty list selects every request.
    pub fn conditions(&self, scope: Scope) -> Vec<Condition> {
        let mut conditions = Vec::new();
        if let Scope::Own(citizen_id) = scope {
            conditions.push(Condition::OwnedBy(citizen_id));
        }
        if let Some(ref needle) = self.service_type {
            let labelled = catalog::SERVICES
                .iter()
                .filter(|s| s.label.to_lowercase().contains(needle.as_str()))
                .map(|s| s.value)
                .collect();
            conditions.push(Condition::ServiceType {
                needle: needle.clone(),
                labelled,
            });
        }
        if !self.statuses.is_empty() {
            conditions.push(Condition::StatusIn(self.statuses.clone()));
        }
        if let Some(from) = self.created_from {
            conditions.push(Condition::CreatedFrom(start_of_day(from)));
        }
        // No day after the last representable date: nothing to exclude
        if let Some(next) = self.created_to.and_then(|to| to.succ_opt()) {
            conditions.push(Condition::CreatedBefore(start_of_day(next)));
        }
        if let Some(ref needle) = self.description {
            conditions.push(Condition::DescriptionContains(needle.clone()));
        }
        if let Some(id) = self.id {
            conditions.push(Condition::IdEquals(id));
        }
        if let Some(ref needle) = self.citizen {
            conditions.push(Condition::CitizenContains(needle.clone()));
        }
        conditions
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// One clause of a request listing. Needles are already lowercased.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    OwnedBy(i64),
    /// Substring of the stored type, or one of the catalog values whose
    /// label contains the needle
    ServiceType {
        needle: String,
        labelled: Vec<&'static str>,
    },
    StatusIn(Vec<RequestStatus>),
    CreatedFrom(DateTime<Utc>),
    /// Exclusive upper bound
    CreatedBefore(DateTime<Utc>),
    DescriptionContains(String),
    IdEquals(i64),
    CitizenContains(String),
}

impl Condition {
    pub fn holds(&self, row: &RequestRow) -> bool {
        let contains = |value: &str, needle: &str| value.to_lowercase().contains(needle);
        match self {
            Condition::OwnedBy(citizen_id) => row.citizen_id == *citizen_id,
            Condition::ServiceType { needle, labelled } => {
                contains(&row.service_type, needle)
                    || labelled.contains(&row.service_type.as_str())
            }
            Condition::StatusIn(statuses) => statuses.contains(&row.status),
            Condition::CreatedFrom(from) => row.created_date >= *from,
            Condition::CreatedBefore(before) => row.created_date < *before,
            Condition::DescriptionContains(needle) => contains(&row.description, needle),
            Condition::IdEquals(id) => row.id == *id,
            Condition::CitizenContains(needle) => [
                &row.citizen_cin,
                &row.citizen_first_name,
                &row.citizen_last_name,
                &row.citizen_email,
                &row.citizen_phone,
            ]
            .iter()
            .filter_map(|v| v.as_deref())
            .any(|v| contains(v, needle)),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Visible, filtered requests for `role` within `scope`.
///
/// Rows outside the scope are dropped even if the store returned them, and
/// filters outside the role's surface are refused.
pub fn project(
    role: Role,
    scope: Scope,
    rows: Vec<RequestRow>,
    filter: &RequestFilter,
) -> Result<Vec<RequestRow>, AccessError> {
    filter.authorize(role)?;
    let compiled = filter.compile()?;
    Ok(rows
        .into_iter()
        .filter(|row| scope.includes(row.citizen_id))
        .filter(|row| compiled.matches(row))
        .collect())
}

/// Wire view of one request for a caller with `role`. Citizen contact
/// details are only shown to staff.
pub fn to_dto(row: RequestRow, role: Role) -> RequestDto {
    let form = row.form();
    let service = catalog::find_by_value(&row.service_type);

    let legacy_description = match service {
        Some(service) => form_encoding::encode_submission(&row.description, service, &form),
        None => row.description.clone(),
    };
    let missing_documents = service
        .map(|s| {
            validation::missing_documents(s, &form)
                .into_iter()
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let staff = role.is_staff();
    let contact = |value: Option<String>| if staff { value } else { None };

    RequestDto {
        id: row.id,
        service_type: row.service_type,
        description: row.description,
        status: row.status,
        created_date: row.created_date,
        updated_date: row.updated_date,
        resolved_date: row.resolved_date,
        citizen_id: row.citizen_id,
        municipality_id: row.municipality_id,
        form,
        legacy_description,
        missing_documents,
        citizen_cin: contact(row.citizen_cin),
        citizen_first_name: contact(row.citizen_first_name),
        citizen_last_name: contact(row.citizen_last_name),
        citizen_email: contact(row.citizen_email),
        citizen_phone: contact(row.citizen_phone),
    }
}
