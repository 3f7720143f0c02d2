//! Read-only projections over associations and authority.
//!
//! Nothing here writes. The projector answers which counterpart
//! organizations a principal may see on behalf of an organization, which of
//! their records are in view, and what the principal may do against a target.

use std::collections::{BTreeMap, BTreeSet};

use orglink_core::{
    AssociationSide, OrganizationAssociation, PermissionMask, RelationContext, RelationResult,
    RelationStore, VisibleScope,
};

use super::association::read_permission;
use super::authority::{AuthorityResolver, ResolvedPrincipal};
use super::helpers::at_boundary;

pub struct VisibilityProjector<DB: RelationStore> {
    ctx: RelationContext<DB>,
    authority: AuthorityResolver<DB>,
}

impl<DB: RelationStore> Clone for VisibilityProjector<DB> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            authority: self.authority.clone(),
        }
    }
}

impl<DB: RelationStore> VisibilityProjector<DB> {
    pub fn new(ctx: RelationContext<DB>) -> Self {
        Self {
            authority: AuthorityResolver::new(ctx.clone()),
            ctx,
        }
    }

    /// Affiliates with an active association to `advertiser_org_id` that the
    /// advertiser side has left visible.
    pub async fn visible_affiliates_for(
        &self,
        principal: &ResolvedPrincipal,
        advertiser_org_id: i64,
    ) -> RelationResult<BTreeSet<i64>> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "visibility.affiliates",
            async {
                let scopes = self
                    .project(principal, AssociationSide::Advertiser, advertiser_org_id)
                    .await?;
                Ok(scopes.into_keys().collect())
            },
        )
        .await
    }

    /// Like [`Self::visible_affiliates_for`], with the affiliate records in
    /// view for each partner.
    pub async fn affiliate_scopes_for(
        &self,
        principal: &ResolvedPrincipal,
        advertiser_org_id: i64,
    ) -> RelationResult<BTreeMap<i64, VisibleScope>> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "visibility.affiliate_scopes",
            self.project(principal, AssociationSide::Advertiser, advertiser_org_id),
        )
        .await
    }

    /// Advertisers with an active association to `affiliate_org_id` that the
    /// affiliate side has left visible.
    pub async fn visible_campaign_owners_for(
        &self,
        principal: &ResolvedPrincipal,
        affiliate_org_id: i64,
    ) -> RelationResult<BTreeSet<i64>> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "visibility.campaign_owners",
            async {
                let scopes = self
                    .project(principal, AssociationSide::Affiliate, affiliate_org_id)
                    .await?;
                Ok(scopes.into_keys().collect())
            },
        )
        .await
    }

    /// Campaigns in view per advertiser partner of `affiliate_org_id`.
    pub async fn campaign_scopes_for(
        &self,
        principal: &ResolvedPrincipal,
        affiliate_org_id: i64,
    ) -> RelationResult<BTreeMap<i64, VisibleScope>> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "visibility.campaign_scopes",
            self.project(principal, AssociationSide::Affiliate, affiliate_org_id),
        )
        .await
    }

    pub async fn effective_permissions(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
    ) -> RelationResult<PermissionMask> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "visibility.effective_permissions",
            self.authority.effective_authority(principal, target_org_id),
        )
        .await
    }

    pub async fn can_act_as(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
        required: impl Into<PermissionMask>,
    ) -> RelationResult<bool> {
        let required = required.into();
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "visibility.can_act_as",
            self.authority.can_act_as(principal, target_org_id, required),
        )
        .await
    }

    async fn project(
        &self,
        principal: &ResolvedPrincipal,
        side: AssociationSide,
        org_id: i64,
    ) -> RelationResult<BTreeMap<i64, VisibleScope>> {
        self.authority
            .require(principal, org_id, PermissionMask::from([read_permission(side)]))
            .await?;

        let associations = principal
            .scope
            .run(self.ctx.database.active_associations_for(side, org_id))
            .await?;
        let visible = counterparts(&associations, side);

        tracing::debug!(
            correlation_id = %principal.correlation_id(),
            org_id,
            side = ?side,
            visible = visible.len(),
            "visibility projected"
        );
        Ok(visible)
    }
}

/// Counterparts of the associations whose `side` flag is set, each narrowed
/// to the records that side may see.
fn counterparts(
    associations: &[OrganizationAssociation],
    side: AssociationSide,
) -> BTreeMap<i64, VisibleScope> {
    associations
        .iter()
        .filter(|a| match side {
            AssociationSide::Advertiser => a.visible_to_advertiser,
            AssociationSide::Affiliate => a.visible_to_affiliate,
        })
        .map(|a| (a.org_for(side.other()), a.scope_for(side)))
        .collect()
}
