use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Re-export relationship types so `crate::types::*` keeps working.
pub use crate::types_association::{
    AssociationAction, AssociationCursor, AssociationFilter, AssociationSide, AssociationStatus,
    AssociationType, AssociationUpdate, CreateAssociation, OrganizationAssociation, VisibleScope,
};
pub use crate::types_delegation::{
    AgencyDelegation, CreateDelegation, DelegationAction, DelegationFilter, DelegationStatus,
    DelegationUpdate,
};
pub use crate::types_invitation::{
    AdvertiserAssociationInvitation, CreateInvitation, CreateUsageLog, InvitationFilter,
    InvitationStatus, InvitationUpdate, InvitationUsageLog, Redemption, RedemptionOutcome,
    UsageFailureReason, UsageOutcome,
};

/// Kind of organization taking part in a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationType {
    Advertiser,
    Affiliate,
    Agency,
    Platform,
}

impl OrganizationType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "advertiser" => Some(Self::Advertiser),
            "affiliate" | "publisher" => Some(Self::Affiliate),
            "agency" => Some(Self::Agency),
            "platform" => Some(Self::Platform),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrganizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advertiser => write!(f, "advertiser"),
            Self::Affiliate => write!(f, "affiliate"),
            Self::Agency => write!(f, "agency"),
            Self::Platform => write!(f, "platform"),
        }
    }
}

/// Organization as seen by the relationship engines. Owned elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub org_type: OrganizationType,
}

impl Organization {
    pub fn new(id: i64, name: impl Into<String>, org_type: OrganizationType) -> Self {
        Self {
            id,
            name: name.into(),
            org_type,
        }
    }
}

/// Platform role attached to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    AdvertiserManager,
    AffiliateManager,
    Affiliate,
    PlatformOwner,
}

impl Role {
    /// Parse a role name as stored in the roles table.
    ///
    /// Accepts `AdvertiserManager`, `advertiser_manager` and `Advertiser Manager`.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "admin" => Some(Self::Admin),
            "advertisermanager" => Some(Self::AdvertiserManager),
            "affiliatemanager" => Some(Self::AffiliateManager),
            "affiliate" => Some(Self::Affiliate),
            "platformowner" => Some(Self::PlatformOwner),
            _ => None,
        }
    }

    /// Roles holding every permission against every organization.
    pub fn is_platform(&self) -> bool {
        matches!(self, Self::Admin | Self::PlatformOwner)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::AdvertiserManager => write!(f, "advertiser_manager"),
            Self::AffiliateManager => write!(f, "affiliate_manager"),
            Self::Affiliate => write!(f, "affiliate"),
            Self::PlatformOwner => write!(f, "platform_owner"),
        }
    }
}

/// Row of the external roles table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    #[serde(rename = "roleId")]
    pub role_id: i32,
    pub name: String,
}

/// User profile, owned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "organizationId")]
    pub organization_id: Option<i64>,
    #[serde(rename = "roleId")]
    pub role_id: i32,
    pub email: String,
}

/// Timestamp for a write that must sort strictly after `previous`.
///
/// Postgres keeps microseconds, so the bump is one microsecond.
pub fn next_timestamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

/// Clamp a caller-supplied page size into `1..=max`, falling back to `default`.
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    match requested {
        None | Some(0) => default.min(max),
        Some(n) => n.min(max),
    }
}
