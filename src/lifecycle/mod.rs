//! Request lifecycle
//!
//! Status rules for citizen requests. A request starts `PENDING`; staff move
//! it between any two statuses. `RESOLVED` and `REJECTED` are terminal in the
//! sense that they stamp `resolved_date` and freeze the citizen's own edits,
//! not in the sense that staff cannot reopen them.

use crate::access::Role;
use crate::models::{RequestStatus, UpdateRequest};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::InProgress,
        RequestStatus::Resolved,
        RequestStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::InProgress => "IN_PROGRESS",
            RequestStatus::Resolved => "RESOLVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Resolved | RequestStatus::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| LifecycleError::UnknownStatus(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LifecycleError {
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Only agents and administrators can change a request's status")]
    StatusChangeForbidden,

    #[error("Request is {0} and can no longer be edited")]
    Closed(RequestStatus),

    #[error("Request not found")]
    NotVisible,
}

/// Status every new request is stored with, whatever the client sent
pub fn initial_status(_requested: Option<RequestStatus>) -> RequestStatus {
    RequestStatus::Pending
}

/// `resolved_date` after moving from `current` to `next`.
///
/// Entering a terminal status stamps `now`; staying in the same terminal
/// status keeps the original stamp; leaving the terminal set clears it.
pub fn resolved_date_after(
    current: RequestStatus,
    current_resolved: Option<DateTime<Utc>>,
    next: RequestStatus,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !next.is_terminal() {
        return None;
    }
    if current == next {
        return current_resolved.or(Some(now));
    }
    Some(now)
}

/// What an accepted update is allowed to write
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub status: RequestStatus,
    pub resolved_date: Option<DateTime<Utc>>,
    pub status_changed: bool,
}

/// Decide whether `role` may apply `update` to a request currently in
/// `current`, and what status fields result.
///
/// Staff may change anything. The owning citizen may edit content while the
/// request is open and must resend the current status unchanged.
pub fn plan_update(
    role: Role,
    is_owner: bool,
    current: RequestStatus,
    current_resolved: Option<DateTime<Utc>>,
    update: &UpdateRequest,
    now: DateTime<Utc>,
) -> Result<UpdatePlan, LifecycleError> {
    if !role.is_staff() {
        if !is_owner {
            return Err(LifecycleError::NotVisible);
        }
        if update.status != current {
            return Err(LifecycleError::StatusChangeForbidden);
        }
        if current.is_terminal() {
            return Err(LifecycleError::Closed(current));
        }
    }

    Ok(UpdatePlan {
        status: update.status,
        resolved_date: resolved_date_after(current, current_resolved, update.status, now),
        status_changed: update.status != current,
    })
}

/// Status-only change, `PATCH /api/requests/{id}/status`
pub fn plan_status_change(
    role: Role,
    current: RequestStatus,
    current_resolved: Option<DateTime<Utc>>,
    next: RequestStatus,
    now: DateTime<Utc>,
) -> Result<UpdatePlan, LifecycleError> {
    if !role.is_staff() {
        return Err(LifecycleError::StatusChangeForbidden);
    }
    Ok(UpdatePlan {
        status: next,
        resolved_date: resolved_date_after(current, current_resolved, next, now),
        status_changed: next != current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn update(status: RequestStatus) -> UpdateRequest {
        UpdateRequest {
            id: Some(1),
            service_type: "PERMIS_CONSTRUIRE".to_string(),
            description: "Nouvelle description".to_string(),
            status,
            municipality_id: None,
            form: None,
        }
    }

    #[test]
    fn test_new_requests_start_pending() {
        assert_eq!(initial_status(None), RequestStatus::Pending);
        assert_eq!(
            initial_status(Some(RequestStatus::Resolved)),
            RequestStatus::Pending
        );
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("IN_PROGRESS".parse(), Ok(RequestStatus::InProgress));
        assert!("in_progress".parse::<RequestStatus>().is_err());
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse(), Ok(status));
        }
    }

    #[test]
    fn test_resolved_date_transitions() {
        let now = Utc::now();
        let earlier = now - Duration::days(3);

        assert_eq!(
            resolved_date_after(RequestStatus::InProgress, None, RequestStatus::Resolved, now),
            Some(now)
        );
        assert_eq!(
            resolved_date_after(
                RequestStatus::Resolved,
                Some(earlier),
                RequestStatus::Resolved,
                now
            ),
            Some(earlier)
        );
        assert_eq!(
            resolved_date_after(
                RequestStatus::Resolved,
                Some(earlier),
                RequestStatus::Rejected,
                now
            ),
            Some(now)
        );
        assert_eq!(
            resolved_date_after(
                RequestStatus::Rejected,
                Some(earlier),
                RequestStatus::InProgress,
                now
            ),
            None
        );
    }

    #[test]
    fn test_staff_may_reopen_terminal_request() {
        let now = Utc::now();
        let plan = plan_status_change(
            Role::Agent,
            RequestStatus::Resolved,
            Some(now),
            RequestStatus::Pending,
            now,
        )
        .unwrap();
        assert_eq!(plan.status, RequestStatus::Pending);
        assert!(plan.resolved_date.is_none());
        assert!(plan.status_changed);
    }

    #[test]
    fn test_citizen_cannot_change_status() {
        let now = Utc::now();
        assert_eq!(
            plan_status_change(
                Role::User,
                RequestStatus::Pending,
                None,
                RequestStatus::Resolved,
                now
            ),
            Err(LifecycleError::StatusChangeForbidden)
        );
        assert_eq!(
            plan_update(
                Role::User,
                true,
                RequestStatus::Pending,
                None,
                &update(RequestStatus::Resolved),
                now
            ),
            Err(LifecycleError::StatusChangeForbidden)
        );
    }

    #[test]
    fn test_citizen_edits_open_request_only() {
        let now = Utc::now();
        let plan = plan_update(
            Role::User,
            true,
            RequestStatus::InProgress,
            None,
            &update(RequestStatus::InProgress),
            now,
        )
        .unwrap();
        assert!(!plan.status_changed);
        assert_eq!(plan.status, RequestStatus::InProgress);

        assert_eq!(
            plan_update(
                Role::User,
                true,
                RequestStatus::Rejected,
                Some(now),
                &update(RequestStatus::Rejected),
                now
            ),
            Err(LifecycleError::Closed(RequestStatus::Rejected))
        );
        assert_eq!(
            plan_update(
                Role::User,
                false,
                RequestStatus::Pending,
                None,
                &update(RequestStatus::Pending),
                now
            ),
            Err(LifecycleError::NotVisible)
        );
    }

    #[test]
    fn test_admin_update_stamps_resolution() {
        let now = Utc::now();
        let plan = plan_update(
            Role::Admin,
            false,
            RequestStatus::Pending,
            None,
            &update(RequestStatus::Rejected),
            now,
        )
        .unwrap();
        assert_eq!(plan.resolved_date, Some(now));
        assert!(plan.status_changed);
    }
}
