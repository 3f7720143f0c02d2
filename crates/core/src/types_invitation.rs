use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RelationError, RelationResult};
use crate::types::{OrganizationAssociation, OrganizationType, next_timestamp};

/// Largest usage cap a store column can hold.
pub const MAX_USES_LIMIT: u32 = i32::MAX as u32;

/// Invitation status. Only `Active` and `Disabled` are ever stored;
/// `Expired` is derived from `expires_at` and the usage cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Active,
    Disabled,
    Expired,
}

impl InvitationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disabled => write!(f, "disabled"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Shareable, token-bearing join link owned by an advertiser organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertiserAssociationInvitation {
    #[serde(rename = "invitationId")]
    pub invitation_id: i64,
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub token: String,
    /// Stored status; use [`Self::effective_status`] for decisions.
    pub status: InvitationStatus,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(rename = "maxUses")]
    pub max_uses: Option<u32>,
    #[serde(rename = "usageCount")]
    pub usage_count: u32,
    #[serde(rename = "defaultMessage")]
    pub default_message: Option<String>,
    #[serde(rename = "allowedAffiliateOrgTypes")]
    pub allowed_affiliate_org_types: Vec<OrganizationType>,
    #[serde(rename = "allowedAffiliateOrgIds")]
    pub allowed_affiliate_org_ids: Option<Vec<i64>>,
    #[serde(rename = "createdByUserId")]
    pub created_by_user_id: Uuid,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl AdvertiserAssociationInvitation {
    pub fn is_time_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.usage_count >= max)
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        match self.status {
            InvitationStatus::Active if self.is_time_expired(now) || self.is_exhausted() => {
                InvitationStatus::Expired
            }
            status => status,
        }
    }

    /// Why this invitation cannot be consumed at `now`, if it cannot.
    pub fn unavailable_reason(&self, now: DateTime<Utc>) -> Option<UsageFailureReason> {
        match self.status {
            InvitationStatus::Disabled => Some(UsageFailureReason::Disabled),
            _ if self.is_time_expired(now) => Some(UsageFailureReason::Expired),
            _ if self.is_exhausted() => Some(UsageFailureReason::MaxUsesExceeded),
            _ => None,
        }
    }

    pub fn allows_affiliate(&self, affiliate_org_id: i64) -> bool {
        self.allowed_affiliate_org_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&affiliate_org_id))
    }

    pub fn from_create(invitation_id: i64, create: &CreateInvitation) -> Self {
        Self {
            invitation_id,
            advertiser_org_id: create.advertiser_org_id,
            name: create.name.clone(),
            description: create.description.clone(),
            token: create.token.clone(),
            status: InvitationStatus::Active,
            expires_at: create.expires_at,
            max_uses: create.max_uses,
            usage_count: 0,
            default_message: create.default_message.clone(),
            allowed_affiliate_org_types: vec![OrganizationType::Affiliate],
            allowed_affiliate_org_ids: create.allowed_affiliate_org_ids.clone(),
            created_by_user_id: create.created_by_user_id,
            created_at: create.created_at,
            updated_at: create.created_at,
        }
    }

    pub fn apply_update(&mut self, update: &InvitationUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(message) = &update.default_message {
            self.default_message = message.clone();
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(max_uses) = update.max_uses {
            self.max_uses = max_uses;
        }
        if let Some(ids) = &update.allowed_affiliate_org_ids {
            self.allowed_affiliate_org_ids = ids.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        self.updated_at = next_timestamp(self.updated_at, update.updated_at);
    }

    /// The invitation after `update`, refused when the patch no longer fits
    /// the current usage count. Stores call this on the locked row.
    pub fn updated(&self, update: &InvitationUpdate) -> RelationResult<Self> {
        let mut next = self.clone();
        next.apply_update(update);
        if let Some(max_uses) = next.max_uses
            && max_uses < next.usage_count
        {
            return Err(RelationError::invalid_input(format!(
                "maxUses cannot be lower than the current usage count of {}",
                next.usage_count
            )));
        }
        if update.status == Some(InvitationStatus::Active)
            && next.effective_status(update.updated_at) == InvitationStatus::Expired
        {
            return Err(RelationError::gone(
                "Invitation has expired and cannot be re-enabled",
            ));
        }
        Ok(next)
    }
}

/// Invitation creation data. The token is generated by the caller.
#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub advertiser_org_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
    pub default_message: Option<String>,
    pub allowed_affiliate_org_ids: Option<Vec<i64>>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Invitation patch. Outer `None` leaves a field untouched.
#[derive(Debug, Clone)]
pub struct InvitationUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub default_message: Option<Option<String>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub max_uses: Option<Option<u32>>,
    pub allowed_affiliate_org_ids: Option<Option<Vec<i64>>>,
    pub status: Option<InvitationStatus>,
    pub updated_at: DateTime<Utc>,
}

/// Store-level invitation listing filter.
///
/// `status` is compared against the effective status at `now`.
#[derive(Debug, Clone)]
pub struct InvitationFilter {
    pub advertiser_org_id: Option<i64>,
    pub created_by_user_id: Option<Uuid>,
    pub status: Option<InvitationStatus>,
    pub include_expired: bool,
    pub now: DateTime<Utc>,
    pub limit: u32,
    pub offset: u32,
}

impl InvitationFilter {
    pub fn matches(&self, invitation: &AdvertiserAssociationInvitation) -> bool {
        let effective = invitation.effective_status(self.now);
        self.advertiser_org_id
            .is_none_or(|id| invitation.advertiser_org_id == id)
            && self
                .created_by_user_id
                .is_none_or(|id| invitation.created_by_user_id == id)
            && self.status.is_none_or(|s| effective == s)
            && (self.include_expired
                || self.status == Some(InvitationStatus::Expired)
                || effective != InvitationStatus::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageOutcome {
    Succeeded,
    Failed,
}

impl std::fmt::Display for UsageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Reason recorded on a failed usage log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageFailureReason {
    InvitationNotFound,
    Disabled,
    Expired,
    MaxUsesExceeded,
    InvalidTarget,
    ForbiddenTarget,
    AlreadyAssociated,
}

impl UsageFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvitationNotFound => "invitation_not_found",
            Self::Disabled => "disabled",
            Self::Expired => "expired",
            Self::MaxUsesExceeded => "max_uses_exceeded",
            Self::InvalidTarget => "invalid_target",
            Self::ForbiddenTarget => "forbidden_target",
            Self::AlreadyAssociated => "already_associated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::InvitationNotFound,
            Self::Disabled,
            Self::Expired,
            Self::MaxUsesExceeded,
            Self::InvalidTarget,
            Self::ForbiddenTarget,
            Self::AlreadyAssociated,
        ]
        .into_iter()
        .find(|r| r.as_str() == s)
    }

    /// Reasons that mean the invitation itself can no longer be used.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Disabled | Self::Expired | Self::MaxUsesExceeded)
    }
}

impl std::fmt::Display for UsageFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one consumption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationUsageLog {
    #[serde(rename = "logId")]
    pub log_id: i64,
    /// Absent when the presented token matched no invitation.
    #[serde(rename = "invitationId")]
    pub invitation_id: Option<i64>,
    #[serde(rename = "consumedByUserId")]
    pub consumed_by_user_id: Uuid,
    #[serde(rename = "consumedByAffiliateOrgId")]
    pub consumed_by_affiliate_org_id: Option<i64>,
    #[serde(rename = "resultingAssociationId")]
    pub resulting_association_id: Option<i64>,
    #[serde(rename = "ipAddress")]
    pub ip_address: Option<String>,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
    pub outcome: UsageOutcome,
    #[serde(rename = "failureReason")]
    pub failure_reason: Option<UsageFailureReason>,
    #[serde(rename = "consumedAt")]
    pub consumed_at: DateTime<Utc>,
}

impl InvitationUsageLog {
    pub fn from_create(log_id: i64, create: &CreateUsageLog) -> Self {
        Self {
            log_id,
            invitation_id: create.invitation_id,
            consumed_by_user_id: create.consumed_by_user_id,
            consumed_by_affiliate_org_id: create.consumed_by_affiliate_org_id,
            resulting_association_id: create.resulting_association_id,
            ip_address: create.ip_address.clone(),
            user_agent: create.user_agent.clone(),
            outcome: create.outcome,
            failure_reason: create.failure_reason,
            consumed_at: create.consumed_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUsageLog {
    pub invitation_id: Option<i64>,
    pub consumed_by_user_id: Uuid,
    pub consumed_by_affiliate_org_id: Option<i64>,
    pub resulting_association_id: Option<i64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub outcome: UsageOutcome,
    pub failure_reason: Option<UsageFailureReason>,
    pub consumed_at: DateTime<Utc>,
}

/// Input to the atomic part of invitation consumption.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub token: String,
    pub consuming_user_id: Uuid,
    pub affiliate_org_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub now: DateTime<Utc>,
}

impl Redemption {
    /// Usage log for this attempt with the given outcome fields filled in.
    pub fn log(
        &self,
        invitation_id: Option<i64>,
        resulting_association_id: Option<i64>,
        failure_reason: Option<UsageFailureReason>,
    ) -> CreateUsageLog {
        CreateUsageLog {
            invitation_id,
            consumed_by_user_id: self.consuming_user_id,
            consumed_by_affiliate_org_id: Some(self.affiliate_org_id),
            resulting_association_id,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            outcome: if failure_reason.is_some() {
                UsageOutcome::Failed
            } else {
                UsageOutcome::Succeeded
            },
            failure_reason,
            consumed_at: self.now,
        }
    }
}

/// Result of the atomic redemption. The usage log is already written.
#[derive(Debug, Clone)]
pub enum RedemptionOutcome {
    Created {
        association: OrganizationAssociation,
        invitation: AdvertiserAssociationInvitation,
    },
    AlreadyAssociated {
        association: OrganizationAssociation,
        invitation: AdvertiserAssociationInvitation,
    },
    Refused {
        invitation_id: Option<i64>,
        reason: UsageFailureReason,
    },
}
