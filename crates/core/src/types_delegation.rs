use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::PermissionMask;
use crate::types::next_timestamp;

/// Delegation status. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationStatus {
    Pending,
    Active,
    Suspended,
    Revoked,
}

impl DelegationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "revoked" => Some(Self::Revoked),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }
}

impl std::fmt::Display for DelegationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelegationAction {
    Accept,
    Reject,
    Suspend,
    Reactivate,
    Revoke,
}

impl DelegationAction {
    pub const ALL: [DelegationAction; 5] = [
        Self::Accept,
        Self::Reject,
        Self::Suspend,
        Self::Reactivate,
        Self::Revoke,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Suspend => "suspend",
            Self::Reactivate => "reactivate",
            Self::Revoke => "revoke",
        }
    }

    /// Target status for `action` taken from `from`, or `None` when illegal.
    pub fn apply(self, from: DelegationStatus) -> Option<DelegationStatus> {
        DELEGATION_TRANSITIONS
            .iter()
            .find(|(f, a, _)| *f == from && *a == self)
            .map(|(_, _, to)| *to)
    }
}

/// Every legal delegation transition. Anything absent is refused.
pub const DELEGATION_TRANSITIONS: &[(DelegationStatus, DelegationAction, DelegationStatus)] = &[
    (
        DelegationStatus::Pending,
        DelegationAction::Accept,
        DelegationStatus::Active,
    ),
    (
        DelegationStatus::Pending,
        DelegationAction::Reject,
        DelegationStatus::Revoked,
    ),
    (
        DelegationStatus::Pending,
        DelegationAction::Revoke,
        DelegationStatus::Revoked,
    ),
    (
        DelegationStatus::Active,
        DelegationAction::Suspend,
        DelegationStatus::Suspended,
    ),
    (
        DelegationStatus::Active,
        DelegationAction::Revoke,
        DelegationStatus::Revoked,
    ),
    (
        DelegationStatus::Suspended,
        DelegationAction::Reactivate,
        DelegationStatus::Active,
    ),
    (
        DelegationStatus::Suspended,
        DelegationAction::Revoke,
        DelegationStatus::Revoked,
    ),
];

/// Bounded grant from an advertiser organization to an agency organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyDelegation {
    #[serde(rename = "delegationId")]
    pub delegation_id: i64,
    #[serde(rename = "agencyOrgId")]
    pub agency_org_id: i64,
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: i64,
    pub status: DelegationStatus,
    pub permissions: PermissionMask,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "createdByUserId")]
    pub created_by_user_id: Uuid,
    #[serde(rename = "updatedByUserId")]
    pub updated_by_user_id: Option<Uuid>,
    #[serde(rename = "acceptedByUserId")]
    pub accepted_by_user_id: Option<Uuid>,
    #[serde(rename = "acceptedAt")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl AgencyDelegation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Stored status with expiry applied: an expired delegation reads as `Revoked`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> DelegationStatus {
        if self.is_expired(now) {
            DelegationStatus::Revoked
        } else {
            self.status
        }
    }

    /// Permissions this delegation grants at `now`.
    pub fn granted(&self, now: DateTime<Utc>) -> PermissionMask {
        if self.effective_status(now) == DelegationStatus::Active {
            self.permissions
        } else {
            PermissionMask::empty()
        }
    }

    /// Stored status is non-terminal, so the row counts toward pair uniqueness.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn from_create(delegation_id: i64, create: &CreateDelegation) -> Self {
        Self {
            delegation_id,
            agency_org_id: create.agency_org_id,
            advertiser_org_id: create.advertiser_org_id,
            status: DelegationStatus::Pending,
            permissions: create.permissions,
            expires_at: create.expires_at,
            message: create.message.clone(),
            created_by_user_id: create.created_by_user_id,
            updated_by_user_id: None,
            accepted_by_user_id: None,
            accepted_at: None,
            created_at: create.created_at,
            updated_at: create.created_at,
        }
    }

    pub fn apply_update(&mut self, update: &DelegationUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(permissions) = update.permissions {
            self.permissions = permissions;
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(user) = update.accepted_by_user_id {
            self.accepted_by_user_id = Some(user);
            self.accepted_at = Some(update.updated_at);
        }
        self.updated_by_user_id = Some(update.updated_by_user_id);
        self.updated_at = next_timestamp(self.updated_at, update.updated_at);
    }
}

/// Delegation creation data.
#[derive(Debug, Clone)]
pub struct CreateDelegation {
    pub agency_org_id: i64,
    pub advertiser_org_id: i64,
    pub permissions: PermissionMask,
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Delegation mutation applied by a compare-and-set on the stored status.
#[derive(Debug, Clone)]
pub struct DelegationUpdate {
    pub status: Option<DelegationStatus>,
    pub permissions: Option<PermissionMask>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    /// Set on acceptance; `accepted_at` takes the update time.
    pub accepted_by_user_id: Option<Uuid>,
    pub updated_by_user_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl DelegationUpdate {
    pub fn new(updated_by_user_id: Uuid, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            permissions: None,
            expires_at: None,
            accepted_by_user_id: None,
            updated_by_user_id,
            updated_at,
        }
    }

    pub fn status(mut self, status: DelegationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Store-level delegation listing filter.
///
/// `active_at` drops rows whose `expires_at` is at or before that instant.
#[derive(Debug, Clone, Default)]
pub struct DelegationFilter {
    pub agency_org_id: Option<i64>,
    pub advertiser_org_id: Option<i64>,
    pub status: Option<DelegationStatus>,
    pub active_at: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

impl DelegationFilter {
    pub fn matches(&self, delegation: &AgencyDelegation) -> bool {
        self.agency_org_id
            .is_none_or(|id| delegation.agency_org_id == id)
            && self
                .advertiser_org_id
                .is_none_or(|id| delegation.advertiser_org_id == id)
            && self.status.is_none_or(|s| delegation.status == s)
            && self.active_at.is_none_or(|now| !delegation.is_expired(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::DelegationPermission;
    use DelegationAction::*;
    use DelegationStatus::*;
    use chrono::Duration;

    fn delegation(expires_at: Option<DateTime<Utc>>) -> AgencyDelegation {
        AgencyDelegation::from_create(
            1,
            &CreateDelegation {
                agency_org_id: 30,
                advertiser_org_id: 10,
                permissions: PermissionMask::from([DelegationPermission::ViewCampaigns]),
                expires_at,
                message: None,
                created_by_user_id: Uuid::new_v4(),
                created_at: Utc::now(),
            },
        )
    }

    #[test]
    fn test_transition_table() {
        assert_eq!(Accept.apply(Pending), Some(Active));
        assert_eq!(Reject.apply(Pending), Some(Revoked));
        assert_eq!(Revoke.apply(Pending), Some(Revoked));
        assert_eq!(Suspend.apply(Active), Some(Suspended));
        assert_eq!(Reactivate.apply(Suspended), Some(Active));
        assert_eq!(Revoke.apply(Suspended), Some(Revoked));

        assert_eq!(Accept.apply(Active), None);
        assert_eq!(Reject.apply(Active), None);
        assert_eq!(Suspend.apply(Suspended), None);
        for action in DelegationAction::ALL {
            assert_eq!(action.apply(Revoked), None);
        }
    }

    #[test]
    fn test_expiry_reads_as_revoked() {
        let now = Utc::now();
        let mut d = delegation(Some(now + Duration::hours(1)));
        d.status = Active;
        assert_eq!(d.effective_status(now), Active);
        assert!(!d.granted(now).is_empty());

        let later = now + Duration::hours(1);
        assert!(d.is_expired(later));
        assert_eq!(d.effective_status(later), Revoked);
        assert!(d.granted(later).is_empty());
        assert!(d.is_open());
    }

    #[test]
    fn test_pending_grants_nothing() {
        let d = delegation(None);
        assert_eq!(d.effective_status(Utc::now()), Pending);
        assert!(d.granted(Utc::now()).is_empty());
    }
}
