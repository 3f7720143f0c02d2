use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use orglink_core::{DelegationPermission, DelegationStatus, PermissionMask};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDelegationRequest {
    #[serde(rename = "advertiserOrgId")]
    #[validate(range(min = 1, message = "advertiserOrgId must be positive"))]
    pub advertiser_org_id: i64,
    #[serde(rename = "agencyOrgId")]
    #[validate(range(min = 1, message = "agencyOrgId must be positive"))]
    pub agency_org_id: i64,
    pub permissions: PermissionMask,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl CreateDelegationRequest {
    pub fn new(
        advertiser_org_id: i64,
        agency_org_id: i64,
        permissions: impl Into<PermissionMask>,
    ) -> Self {
        Self {
            advertiser_org_id,
            agency_org_id,
            permissions: permissions.into(),
            expires_at: None,
            message: None,
        }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionCheckRequest {
    #[serde(rename = "agencyOrgId")]
    pub agency_org_id: i64,
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: i64,
    #[serde(rename = "requiredPermissions")]
    pub required_permissions: PermissionMask,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDelegationsQuery {
    #[serde(rename = "agencyOrgId")]
    pub agency_org_id: Option<i64>,
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: Option<i64>,
    pub status: Option<DelegationStatus>,
    #[serde(rename = "includeExpired", default)]
    pub include_expired: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCheckReason {
    Granted,
    NoDelegation,
    DelegationNotActive,
    DelegationExpired,
    MissingPermissions,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermissionCheckResult {
    pub granted: bool,
    #[serde(rename = "matchedDelegationId")]
    pub matched_delegation_id: Option<i64>,
    pub reason: PermissionCheckReason,
    #[serde(rename = "permissionResults")]
    pub permission_results: BTreeMap<DelegationPermission, bool>,
    /// Effective status of the delegation found for the pair.
    #[serde(rename = "delegationStatus")]
    pub delegation_status: Option<DelegationStatus>,
    #[serde(rename = "isExpired")]
    pub is_expired: bool,
}
