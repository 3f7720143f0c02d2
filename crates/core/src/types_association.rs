use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::next_timestamp;

/// Association status. `Rejected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationStatus {
    Pending,
    Active,
    Suspended,
    Rejected,
}

impl AssociationStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

impl std::fmt::Display for AssociationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Which side initiated the association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationType {
    /// Advertiser reached out to the affiliate.
    Invitation,
    /// Affiliate reached out to the advertiser.
    Request,
}

impl AssociationType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "invitation" => Some(Self::Invitation),
            "request" => Some(Self::Request),
            _ => None,
        }
    }

    pub fn initiator(&self) -> AssociationSide {
        match self {
            Self::Invitation => AssociationSide::Advertiser,
            Self::Request => AssociationSide::Affiliate,
        }
    }
}

impl std::fmt::Display for AssociationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invitation => write!(f, "invitation"),
            Self::Request => write!(f, "request"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationSide {
    Advertiser,
    Affiliate,
}

impl AssociationSide {
    pub fn other(&self) -> Self {
        match self {
            Self::Advertiser => Self::Affiliate,
            Self::Affiliate => Self::Advertiser,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationAction {
    Approve,
    Reject,
    Suspend,
    Reactivate,
}

impl AssociationAction {
    pub const ALL: [AssociationAction; 4] =
        [Self::Approve, Self::Reject, Self::Suspend, Self::Reactivate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Suspend => "suspend",
            Self::Reactivate => "reactivate",
        }
    }

    /// Target status for `action` taken from `from`, or `None` when illegal.
    pub fn apply(self, from: AssociationStatus) -> Option<AssociationStatus> {
        ASSOCIATION_TRANSITIONS
            .iter()
            .find(|(f, a, _)| *f == from && *a == self)
            .map(|(_, _, to)| *to)
    }
}

/// Every legal association transition. Anything absent is refused.
pub const ASSOCIATION_TRANSITIONS: &[(AssociationStatus, AssociationAction, AssociationStatus)] = &[
    (
        AssociationStatus::Pending,
        AssociationAction::Approve,
        AssociationStatus::Active,
    ),
    (
        AssociationStatus::Pending,
        AssociationAction::Reject,
        AssociationStatus::Rejected,
    ),
    (
        AssociationStatus::Active,
        AssociationAction::Suspend,
        AssociationStatus::Suspended,
    ),
    (
        AssociationStatus::Suspended,
        AssociationAction::Reactivate,
        AssociationStatus::Active,
    ),
];

/// Records of one party that the other party may see through an association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "scope", content = "ids")]
pub enum VisibleScope {
    All,
    Only(BTreeSet<i64>),
}

impl VisibleScope {
    /// An unset or empty id list reads as everything.
    pub fn resolve(all_visible: bool, ids: Option<&[i64]>) -> Self {
        match ids {
            Some(ids) if !all_visible && !ids.is_empty() => Self::Only(ids.iter().copied().collect()),
            _ => Self::All,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&id),
        }
    }
}

/// Business relationship between an advertiser and an affiliate organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationAssociation {
    #[serde(rename = "associationId")]
    pub association_id: i64,
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: i64,
    #[serde(rename = "affiliateOrgId")]
    pub affiliate_org_id: i64,
    #[serde(rename = "associationType")]
    pub association_type: AssociationType,
    pub status: AssociationStatus,
    #[serde(rename = "visibleToAdvertiser")]
    pub visible_to_advertiser: bool,
    #[serde(rename = "visibleToAffiliate")]
    pub visible_to_affiliate: bool,
    /// Advertiser side: every affiliate record of the partner is in view.
    #[serde(rename = "allAffiliatesVisible")]
    pub all_affiliates_visible: bool,
    /// Advertiser side: the affiliate records in view when not all are.
    #[serde(rename = "visibleAffiliateIds")]
    pub visible_affiliate_ids: Option<Vec<i64>>,
    /// Affiliate side: every campaign of the partner is in view.
    #[serde(rename = "allCampaignsVisible")]
    pub all_campaigns_visible: bool,
    #[serde(rename = "visibleCampaignIds")]
    pub visible_campaign_ids: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "createdByUserId")]
    pub created_by_user_id: Uuid,
    #[serde(rename = "updatedByUserId")]
    pub updated_by_user_id: Option<Uuid>,
    #[serde(rename = "approvedByUserId")]
    pub approved_by_user_id: Option<Uuid>,
    #[serde(rename = "approvedAt")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(rename = "suspendedByOrgId")]
    pub suspended_by_org_id: Option<i64>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl OrganizationAssociation {
    /// Non-terminal associations count toward pair uniqueness.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn org_for(&self, side: AssociationSide) -> i64 {
        match side {
            AssociationSide::Advertiser => self.advertiser_org_id,
            AssociationSide::Affiliate => self.affiliate_org_id,
        }
    }

    /// The side that approves or rejects while pending.
    pub fn counterpart(&self) -> AssociationSide {
        self.association_type.initiator().other()
    }

    /// Affiliate records the advertiser side sees.
    pub fn affiliate_scope(&self) -> VisibleScope {
        VisibleScope::resolve(self.all_affiliates_visible, self.visible_affiliate_ids.as_deref())
    }

    /// Campaigns the affiliate side sees.
    pub fn campaign_scope(&self) -> VisibleScope {
        VisibleScope::resolve(self.all_campaigns_visible, self.visible_campaign_ids.as_deref())
    }

    /// Scope of counterpart records in view from `side`.
    pub fn scope_for(&self, side: AssociationSide) -> VisibleScope {
        match side {
            AssociationSide::Advertiser => self.affiliate_scope(),
            AssociationSide::Affiliate => self.campaign_scope(),
        }
    }

    pub fn from_create(association_id: i64, create: &CreateAssociation) -> Self {
        Self {
            association_id,
            advertiser_org_id: create.advertiser_org_id,
            affiliate_org_id: create.affiliate_org_id,
            association_type: create.association_type,
            status: AssociationStatus::Pending,
            visible_to_advertiser: create.visible_to_advertiser,
            visible_to_affiliate: create.visible_to_affiliate,
            all_affiliates_visible: create.all_affiliates_visible,
            visible_affiliate_ids: create.visible_affiliate_ids.clone(),
            all_campaigns_visible: create.all_campaigns_visible,
            visible_campaign_ids: create.visible_campaign_ids.clone(),
            message: create.message.clone(),
            created_by_user_id: create.created_by_user_id,
            updated_by_user_id: None,
            approved_by_user_id: None,
            approved_at: None,
            suspended_by_org_id: None,
            created_at: create.created_at,
            updated_at: create.created_at,
        }
    }

    pub fn apply_update(&mut self, update: &AssociationUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(v) = update.visible_to_advertiser {
            self.visible_to_advertiser = v;
        }
        if let Some(v) = update.visible_to_affiliate {
            self.visible_to_affiliate = v;
        }
        if let Some(v) = update.all_affiliates_visible {
            self.all_affiliates_visible = v;
        }
        if let Some(ids) = &update.visible_affiliate_ids {
            self.visible_affiliate_ids = Some(ids.clone());
        }
        if let Some(v) = update.all_campaigns_visible {
            self.all_campaigns_visible = v;
        }
        if let Some(ids) = &update.visible_campaign_ids {
            self.visible_campaign_ids = Some(ids.clone());
        }
        if let Some(user) = update.approved_by_user_id {
            self.approved_by_user_id = Some(user);
            self.approved_at = Some(update.updated_at);
        }
        if let Some(org) = update.suspended_by_org_id {
            self.suspended_by_org_id = org;
        }
        self.updated_by_user_id = Some(update.updated_by_user_id);
        self.updated_at = next_timestamp(self.updated_at, update.updated_at);
    }

    pub fn cursor(&self) -> AssociationCursor {
        AssociationCursor {
            updated_at: self.updated_at,
            association_id: self.association_id,
        }
    }
}

/// Association creation data.
#[derive(Debug, Clone)]
pub struct CreateAssociation {
    pub advertiser_org_id: i64,
    pub affiliate_org_id: i64,
    pub association_type: AssociationType,
    pub message: Option<String>,
    pub visible_to_advertiser: bool,
    pub visible_to_affiliate: bool,
    pub all_affiliates_visible: bool,
    pub visible_affiliate_ids: Option<Vec<i64>>,
    pub all_campaigns_visible: bool,
    pub visible_campaign_ids: Option<Vec<i64>>,
    pub created_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Association mutation applied by a compare-and-set on the stored status.
#[derive(Debug, Clone)]
pub struct AssociationUpdate {
    pub status: Option<AssociationStatus>,
    pub visible_to_advertiser: Option<bool>,
    pub visible_to_affiliate: Option<bool>,
    pub all_affiliates_visible: Option<bool>,
    /// Replaces the stored list; an empty list reads as everything.
    pub visible_affiliate_ids: Option<Vec<i64>>,
    pub all_campaigns_visible: Option<bool>,
    pub visible_campaign_ids: Option<Vec<i64>>,
    /// Set on approval; `approved_at` takes the update time.
    pub approved_by_user_id: Option<Uuid>,
    pub suspended_by_org_id: Option<Option<i64>>,
    pub updated_by_user_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

impl AssociationUpdate {
    pub fn new(updated_by_user_id: Uuid, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            visible_to_advertiser: None,
            visible_to_affiliate: None,
            all_affiliates_visible: None,
            visible_affiliate_ids: None,
            all_campaigns_visible: None,
            visible_campaign_ids: None,
            approved_by_user_id: None,
            suspended_by_org_id: None,
            updated_by_user_id,
            updated_at,
        }
    }

    pub fn status(mut self, status: AssociationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Position in the `(updated_at DESC, association_id DESC)` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationCursor {
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "associationId")]
    pub association_id: i64,
}

impl AssociationCursor {
    /// True when `association` sorts strictly after this cursor.
    pub fn precedes(&self, association: &OrganizationAssociation) -> bool {
        (association.updated_at, association.association_id)
            < (self.updated_at, self.association_id)
    }
}

/// Store-level association listing filter. Limits are already clamped.
#[derive(Debug, Clone, Default)]
pub struct AssociationFilter {
    pub advertiser_org_id: Option<i64>,
    pub affiliate_org_id: Option<i64>,
    pub status: Option<AssociationStatus>,
    pub association_type: Option<AssociationType>,
    pub cursor: Option<AssociationCursor>,
    pub limit: u32,
    pub offset: u32,
}

impl AssociationFilter {
    pub fn matches(&self, association: &OrganizationAssociation) -> bool {
        self.advertiser_org_id
            .is_none_or(|id| association.advertiser_org_id == id)
            && self
                .affiliate_org_id
                .is_none_or(|id| association.affiliate_org_id == id)
            && self.status.is_none_or(|s| association.status == s)
            && self
                .association_type
                .is_none_or(|t| association.association_type == t)
            && self.cursor.is_none_or(|c| c.precedes(association))
    }
}
