use serde::{Deserialize, Serialize};
use validator::Validate;

use orglink_core::{
    AssociationCursor, AssociationSide, AssociationStatus, AssociationType,
    OrganizationAssociation,
};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body shared by `create_invitation` and `create_request`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateAssociationRequest {
    #[serde(rename = "advertiserOrgId")]
    #[validate(range(min = 1, message = "advertiserOrgId must be positive"))]
    pub advertiser_org_id: i64,
    #[serde(rename = "affiliateOrgId")]
    #[validate(range(min = 1, message = "affiliateOrgId must be positive"))]
    pub affiliate_org_id: i64,
    pub message: Option<String>,
    #[serde(rename = "visibleToAdvertiser")]
    pub visible_to_advertiser: Option<bool>,
    #[serde(rename = "visibleToAffiliate")]
    pub visible_to_affiliate: Option<bool>,
    #[serde(rename = "allAffiliatesVisible")]
    pub all_affiliates_visible: Option<bool>,
    /// Affiliate records the advertiser sees. A non-empty list turns
    /// `allAffiliatesVisible` off unless it is given.
    #[serde(rename = "visibleAffiliateIds")]
    pub visible_affiliate_ids: Option<Vec<i64>>,
    #[serde(rename = "allCampaignsVisible")]
    pub all_campaigns_visible: Option<bool>,
    #[serde(rename = "visibleCampaignIds")]
    pub visible_campaign_ids: Option<Vec<i64>>,
}

impl CreateAssociationRequest {
    pub fn new(advertiser_org_id: i64, affiliate_org_id: i64) -> Self {
        Self {
            advertiser_org_id,
            affiliate_org_id,
            ..Default::default()
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn visible_to_advertiser(mut self, visible: bool) -> Self {
        self.visible_to_advertiser = Some(visible);
        self
    }

    pub fn visible_to_affiliate(mut self, visible: bool) -> Self {
        self.visible_to_affiliate = Some(visible);
        self
    }

    pub fn visible_affiliates(mut self, ids: Vec<i64>) -> Self {
        self.visible_affiliate_ids = Some(ids);
        self
    }

    pub fn visible_campaigns(mut self, ids: Vec<i64>) -> Self {
        self.visible_campaign_ids = Some(ids);
        self
    }
}

/// Visibility patch. The advertiser side owns `visibleToAdvertiser` and the
/// affiliate subset; the affiliate side owns the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateVisibilityRequest {
    #[serde(rename = "visibleToAdvertiser")]
    pub visible_to_advertiser: Option<bool>,
    #[serde(rename = "visibleToAffiliate")]
    pub visible_to_affiliate: Option<bool>,
    #[serde(rename = "allAffiliatesVisible")]
    pub all_affiliates_visible: Option<bool>,
    #[serde(rename = "visibleAffiliateIds")]
    pub visible_affiliate_ids: Option<Vec<i64>>,
    #[serde(rename = "allCampaignsVisible")]
    pub all_campaigns_visible: Option<bool>,
    #[serde(rename = "visibleCampaignIds")]
    pub visible_campaign_ids: Option<Vec<i64>>,
}

impl UpdateVisibilityRequest {
    fn touches(&self, side: AssociationSide) -> bool {
        match side {
            AssociationSide::Advertiser => {
                self.visible_to_advertiser.is_some()
                    || self.all_affiliates_visible.is_some()
                    || self.visible_affiliate_ids.is_some()
            }
            AssociationSide::Affiliate => {
                self.visible_to_affiliate.is_some()
                    || self.all_campaigns_visible.is_some()
                    || self.visible_campaign_ids.is_some()
            }
        }
    }

    pub(crate) fn sides(&self) -> Vec<AssociationSide> {
        [AssociationSide::Advertiser, AssociationSide::Affiliate]
            .into_iter()
            .filter(|side| self.touches(*side))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAssociationsQuery {
    #[serde(rename = "advertiserOrgId")]
    pub advertiser_org_id: Option<i64>,
    #[serde(rename = "affiliateOrgId")]
    pub affiliate_org_id: Option<i64>,
    pub status: Option<AssociationStatus>,
    #[serde(rename = "associationType")]
    pub association_type: Option<AssociationType>,
    /// Continue after this position instead of using `offset`.
    pub cursor: Option<AssociationCursor>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AssociationPage {
    pub associations: Vec<OrganizationAssociation>,
    /// Present when the page is full; pass it back as `cursor`.
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<AssociationCursor>,
}
