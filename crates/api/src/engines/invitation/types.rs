use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use orglink_core::{InvitationStatus, OrganizationAssociation};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateInvitationRequest {
    #[serde(rename = "advertiserOrgId")]
    #[validate(range(min = 1, message = "advertiserOrgId must be positive"))]
    pub advertiser_org_id: i64,
    #[validate(length(min = 1, max = 255, message = "name must be 1 to 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "maxUses")]
    #[validate(range(min = 1, message = "maxUses must be at least 1"))]
    pub max_uses: Option<u32>,
    #[serde(rename = "defaultMessage")]
    pub default_message: Option<String>,
    #[serde(rename = "allowedAffiliateOrgIds")]
    #[validate(length(min = 1, message = "allowedAffiliateOrgIds must not be empty"))]
    pub allowed_affiliate_org_ids: Option<Vec<i64>>,
}

impl CreateInvitationRequest {
    pub fn new(advertiser_org_id: i64, name: impl Into<String>) -> Self {
        Self {
            advertiser_org_id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn default_message(mut self, message: impl Into<String>) -> Self {
        self.default_message = Some(message.into());
        self
    }

    pub fn allowed_affiliates(mut self, ids: Vec<i64>) -> Self {
        self.allowed_affiliate_org_ids = Some(ids);
        self
    }
}

/// Partial update. Absent fields are left alone; an explicit `null` clears.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateInvitationRequest {
    #[validate(length(min = 1, max = 255, message = "name must be 1 to 255 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "crate::engines::helpers::double_option")]
    pub description: Option<Option<String>>,
    #[serde(
        rename = "defaultMessage",
        default,
        deserialize_with = "crate::engines::helpers::double_option"
    )]
    pub default_message: Option<Option<String>>,
    #[serde(
        rename = "expiresAt",
        default,
        deserialize_with = "crate::engines::helpers::double_option"
    )]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(
        rename = "maxUses",
        default,
        deserialize_with = "crate::engines::helpers::double_option"
    )]
    pub max_uses: Option<Option<u32>>,
    #[serde(
        rename = "allowedAffiliateOrgIds",
        default,
        deserialize_with = "crate::engines::helpers::double_option"
    )]
    pub allowed_affiliate_org_ids: Option<Option<Vec<i64>>>,
    pub status: Option<InvitationStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UseInvitationRequest {
    #[validate(length(min = 1, message = "token is required"))]
    pub token: String,
    #[serde(rename = "targetAffiliateOrgId")]
    pub target_affiliate_org_id: Option<i64>,
    #[serde(rename = "clientIp")]
    pub client_ip: Option<String>,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
}

impl UseInvitationRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn target(mut self, affiliate_org_id: i64) -> Self {
        self.target_affiliate_org_id = Some(affiliate_org_id);
        self
    }

    pub fn client(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListInvitationsQuery {
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: i64,
    /// Matched against the effective status.
    pub status: Option<InvitationStatus>,
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
pub enum UseOutcome {
    Created,
    /// The pair was already associated; the existing record is returned.
    AlreadyAssociated,
}

#[derive(Debug, Clone, Serialize)]
pub struct UseInvitationResult {
    pub association: OrganizationAssociation,
    pub outcome: UseOutcome,
}
