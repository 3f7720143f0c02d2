//! Advertiser/affiliate associations.
//!
//! Transitions are looked up in [`ASSOCIATION_TRANSITIONS`]; authority comes
//! from [`AuthorityResolver`]. Writes are compare-and-set on the status read
//! at the start of the operation, so two racing transitions cannot both
//! commit.
//!
//! [`ASSOCIATION_TRANSITIONS`]: orglink_core::types_association::ASSOCIATION_TRANSITIONS

pub mod types;

use orglink_core::types::clamp_limit;
use orglink_core::{
    AssociationAction, AssociationFilter, AssociationSide, AssociationStatus, AssociationType,
    AssociationUpdate, CreateAssociation, DelegationPermission, OrganizationAssociation,
    OrganizationType, PermissionMask, RelationContext, RelationError, RelationResult,
    RelationStore, VisibleScope,
};
use validator::Validate;

use super::authority::{AuthorityResolver, ResolvedPrincipal};
use super::helpers::{at_boundary, check_message, require_org_of_type};
pub use types::{
    AssociationPage, CreateAssociationRequest, ListAssociationsQuery, UpdateVisibilityRequest,
};

/// Permission a side writes with.
pub fn write_permission(side: AssociationSide) -> DelegationPermission {
    match side {
        AssociationSide::Advertiser => DelegationPermission::ManageAffiliates,
        AssociationSide::Affiliate => DelegationPermission::ManageCampaigns,
    }
}

/// Permission a side reads with.
pub fn read_permission(side: AssociationSide) -> DelegationPermission {
    match side {
        AssociationSide::Advertiser => DelegationPermission::ViewAffiliates,
        AssociationSide::Affiliate => DelegationPermission::ViewCampaigns,
    }
}

const SIDES: [AssociationSide; 2] = [AssociationSide::Advertiser, AssociationSide::Affiliate];

pub struct AssociationEngine<DB: RelationStore> {
    ctx: RelationContext<DB>,
    authority: AuthorityResolver<DB>,
}

impl<DB: RelationStore> Clone for AssociationEngine<DB> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            authority: self.authority.clone(),
        }
    }
}

impl<DB: RelationStore> AssociationEngine<DB> {
    pub fn new(ctx: RelationContext<DB>) -> Self {
        Self {
            authority: AuthorityResolver::new(ctx.clone()),
            ctx,
        }
    }

    /// Advertiser-initiated association, approved by the affiliate.
    pub async fn create_invitation(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateAssociationRequest,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.create_invitation",
            self.create(principal, request, AssociationType::Invitation),
        )
        .await
    }

    /// Affiliate-initiated association, approved by the advertiser.
    pub async fn create_request(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateAssociationRequest,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.create_request",
            self.create(principal, request, AssociationType::Request),
        )
        .await
    }

    pub async fn approve(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        self.approve_with_visibility(principal, association_id, None)
            .await
    }

    /// Approve and set the approving side's own visibility flag in the same write.
    pub async fn approve_with_visibility(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
        own_visibility: Option<bool>,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.approve",
            self.transition(
                principal,
                association_id,
                AssociationAction::Approve,
                own_visibility,
            ),
        )
        .await
    }

    pub async fn reject(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.reject",
            self.transition(principal, association_id, AssociationAction::Reject, None),
        )
        .await
    }

    pub async fn suspend(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.suspend",
            self.transition(principal, association_id, AssociationAction::Suspend, None),
        )
        .await
    }

    pub async fn reactivate(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.reactivate",
            self.transition(
                principal,
                association_id,
                AssociationAction::Reactivate,
                None,
            ),
        )
        .await
    }

    pub async fn update_visibility(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
        request: UpdateVisibilityRequest,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.update_visibility",
            self.update_visibility_core(principal, association_id, request),
        )
        .await
    }

    pub async fn get(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(&self.ctx.config, &principal.scope, "association.get", async {
            let association = self.load(principal, association_id).await?;
            if !self.readable(principal, &association).await? {
                return Err(RelationError::forbidden(
                    "Not permitted to view this association",
                ));
            }
            Ok(association)
        })
        .await
    }

    /// The open association binding the pair.
    pub async fn get_by_organizations(
        &self,
        principal: &ResolvedPrincipal,
        advertiser_org_id: i64,
        affiliate_org_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.get_by_organizations",
            async {
                let association = principal
                    .scope
                    .run(
                        self.ctx
                            .database
                            .get_open_association(advertiser_org_id, affiliate_org_id),
                    )
                    .await?
                    .ok_or_else(|| RelationError::not_found("Association not found"))?;
                if !self.readable(principal, &association).await? {
                    return Err(RelationError::forbidden(
                        "Not permitted to view this association",
                    ));
                }
                Ok(association)
            },
        )
        .await
    }

    /// Affiliate records the advertiser sees through `association_id`.
    pub async fn visible_affiliates(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<VisibleScope> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.visible_affiliates",
            self.scope_core(principal, association_id, AssociationSide::Advertiser),
        )
        .await
    }

    /// Campaigns the affiliate sees through `association_id`.
    pub async fn visible_campaigns(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<VisibleScope> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.visible_campaigns",
            self.scope_core(principal, association_id, AssociationSide::Affiliate),
        )
        .await
    }

    pub async fn list(
        &self,
        principal: &ResolvedPrincipal,
        query: ListAssociationsQuery,
    ) -> RelationResult<AssociationPage> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "association.list",
            self.list_core(principal, query),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Core functions
    // -----------------------------------------------------------------------

    async fn create(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateAssociationRequest,
        association_type: AssociationType,
    ) -> RelationResult<OrganizationAssociation> {
        request.validate()?;
        if request.advertiser_org_id == request.affiliate_org_id {
            return Err(RelationError::invalid_input(
                "advertiserOrgId and affiliateOrgId must differ",
            ));
        }
        check_message(&self.ctx.config, "message", request.message.as_deref())?;
        check_ids("visibleAffiliateIds", request.visible_affiliate_ids.as_deref())?;
        check_ids("visibleCampaignIds", request.visible_campaign_ids.as_deref())?;

        let scope = &principal.scope;
        require_org_of_type(
            &self.ctx,
            scope,
            "advertiserOrgId",
            request.advertiser_org_id,
            OrganizationType::Advertiser,
        )
        .await?;
        require_org_of_type(
            &self.ctx,
            scope,
            "affiliateOrgId",
            request.affiliate_org_id,
            OrganizationType::Affiliate,
        )
        .await?;

        let initiator = association_type.initiator();
        let initiator_org = match initiator {
            AssociationSide::Advertiser => request.advertiser_org_id,
            AssociationSide::Affiliate => request.affiliate_org_id,
        };
        self.authority
            .require(
                principal,
                initiator_org,
                PermissionMask::from([write_permission(initiator)]),
            )
            .await?;

        let association = scope
            .run(self.ctx.database.create_association(CreateAssociation {
                advertiser_org_id: request.advertiser_org_id,
                affiliate_org_id: request.affiliate_org_id,
                association_type,
                message: request.message,
                visible_to_advertiser: request.visible_to_advertiser.unwrap_or(true),
                visible_to_affiliate: request.visible_to_affiliate.unwrap_or(true),
                all_affiliates_visible: all_visible(
                    request.all_affiliates_visible,
                    request.visible_affiliate_ids.as_deref(),
                )
                .unwrap_or(true),
                visible_affiliate_ids: request.visible_affiliate_ids,
                all_campaigns_visible: all_visible(
                    request.all_campaigns_visible,
                    request.visible_campaign_ids.as_deref(),
                )
                .unwrap_or(true),
                visible_campaign_ids: request.visible_campaign_ids,
                created_by_user_id: principal.user_id,
                created_at: self.ctx.now(),
            }))
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            association_id = association.association_id,
            advertiser_org_id = association.advertiser_org_id,
            affiliate_org_id = association.affiliate_org_id,
            association_type = ?association_type,
            "association created"
        );
        Ok(association)
    }

    async fn transition(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
        action: AssociationAction,
        own_visibility: Option<bool>,
    ) -> RelationResult<OrganizationAssociation> {
        let current = self.load(principal, association_id).await?;
        let mut update = AssociationUpdate::new(principal.user_id, self.ctx.now());

        match action {
            AssociationAction::Approve | AssociationAction::Reject => {
                let side = current.counterpart();
                if !self.side_writable(principal, &current, side).await? {
                    return Err(RelationError::forbidden(format!(
                        "Only the {} side may {} this association",
                        side_name(side),
                        action.as_str()
                    )));
                }
                if action == AssociationAction::Approve {
                    update.approved_by_user_id = Some(principal.user_id);
                    match side {
                        AssociationSide::Advertiser => {
                            update.visible_to_advertiser = own_visibility
                        }
                        AssociationSide::Affiliate => update.visible_to_affiliate = own_visibility,
                    }
                }
            }
            AssociationAction::Suspend => {
                let sides = self.writable_sides(principal, &current).await?;
                let Some(side) = sides.first() else {
                    return Err(RelationError::forbidden("Not a party to this association"));
                };
                let suspended_by = if principal.is_platform() {
                    None
                } else {
                    Some(current.org_for(*side))
                };
                update.suspended_by_org_id = Some(suspended_by);
            }
            AssociationAction::Reactivate => {
                match current.suspended_by_org_id {
                    Some(org_id) if !principal.is_platform() => {
                        let side = if org_id == current.advertiser_org_id {
                            AssociationSide::Advertiser
                        } else {
                            AssociationSide::Affiliate
                        };
                        if !self.side_writable(principal, &current, side).await? {
                            return Err(RelationError::forbidden(
                                "Only the suspending side may reactivate this association",
                            ));
                        }
                    }
                    _ => {
                        if self.writable_sides(principal, &current).await?.is_empty() {
                            return Err(RelationError::forbidden(
                                "Not a party to this association",
                            ));
                        }
                    }
                }
                update.suspended_by_org_id = Some(None);
            }
        }

        let to = action.apply(current.status).ok_or_else(|| {
            RelationError::association_transition(current.status, action.as_str())
        })?;

        let updated = principal
            .scope
            .run(self.ctx.database.update_association(
                association_id,
                current.status,
                update.status(to),
            ))
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            association_id,
            action = action.as_str(),
            from = %current.status,
            to = %to,
            "association transitioned"
        );
        Ok(updated)
    }

    async fn update_visibility_core(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
        request: UpdateVisibilityRequest,
    ) -> RelationResult<OrganizationAssociation> {
        let sides = request.sides();
        if sides.is_empty() {
            return Err(RelationError::invalid_input(
                "at least one visibility field is required",
            ));
        }
        check_ids("visibleAffiliateIds", request.visible_affiliate_ids.as_deref())?;
        check_ids("visibleCampaignIds", request.visible_campaign_ids.as_deref())?;

        let current = self.load(principal, association_id).await?;
        if current.status == AssociationStatus::Rejected {
            return Err(RelationError::association_transition(
                current.status,
                "update visibility of",
            ));
        }

        for side in sides {
            if !self.side_writable(principal, &current, side).await? {
                return Err(RelationError::forbidden(
                    "Each side may only change its own visibility",
                ));
            }
        }

        let mut update = AssociationUpdate::new(principal.user_id, self.ctx.now());
        update.visible_to_advertiser = request.visible_to_advertiser;
        update.visible_to_affiliate = request.visible_to_affiliate;
        update.all_affiliates_visible = all_visible(
            request.all_affiliates_visible,
            request.visible_affiliate_ids.as_deref(),
        );
        update.visible_affiliate_ids = request.visible_affiliate_ids;
        update.all_campaigns_visible = all_visible(
            request.all_campaigns_visible,
            request.visible_campaign_ids.as_deref(),
        );
        update.visible_campaign_ids = request.visible_campaign_ids;

        let updated = principal
            .scope
            .run(
                self.ctx
                    .database
                    .update_association(association_id, current.status, update),
            )
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            association_id,
            visible_to_advertiser = updated.visible_to_advertiser,
            visible_to_affiliate = updated.visible_to_affiliate,
            all_affiliates_visible = updated.all_affiliates_visible,
            all_campaigns_visible = updated.all_campaigns_visible,
            "association visibility updated"
        );
        Ok(updated)
    }

    async fn scope_core(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
        side: AssociationSide,
    ) -> RelationResult<VisibleScope> {
        let association = self.load(principal, association_id).await?;
        if !self.readable(principal, &association).await? {
            return Err(RelationError::forbidden(
                "Not permitted to view this association",
            ));
        }
        Ok(association.scope_for(side))
    }

    async fn list_core(
        &self,
        principal: &ResolvedPrincipal,
        query: ListAssociationsQuery,
    ) -> RelationResult<AssociationPage> {
        if !principal.is_platform() {
            if query.advertiser_org_id.is_none() && query.affiliate_org_id.is_none() {
                return Err(RelationError::forbidden(
                    "An advertiserOrgId or affiliateOrgId filter is required",
                ));
            }
            let mut allowed = false;
            if let Some(org_id) = query.advertiser_org_id {
                allowed |= self
                    .authority
                    .has(principal, org_id, read_permission(AssociationSide::Advertiser))
                    .await?;
            }
            if !allowed && let Some(org_id) = query.affiliate_org_id {
                allowed |= self
                    .authority
                    .has(principal, org_id, read_permission(AssociationSide::Affiliate))
                    .await?;
            }
            if !allowed {
                return Err(RelationError::forbidden(
                    "Not permitted to list these associations",
                ));
            }
        }

        let config = &self.ctx.config;
        let limit = clamp_limit(query.limit, config.default_list_limit, config.max_list_limit);
        let filter = AssociationFilter {
            advertiser_org_id: query.advertiser_org_id,
            affiliate_org_id: query.affiliate_org_id,
            status: query.status,
            association_type: query.association_type,
            cursor: query.cursor,
            limit,
            offset: if query.cursor.is_some() {
                0
            } else {
                query.offset.unwrap_or(0)
            },
        };

        let associations = principal
            .scope
            .run(self.ctx.database.list_associations(&filter))
            .await?;
        let next_cursor = if associations.len() == limit as usize {
            associations.last().map(OrganizationAssociation::cursor)
        } else {
            None
        };

        Ok(AssociationPage {
            associations,
            next_cursor,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn load(
        &self,
        principal: &ResolvedPrincipal,
        association_id: i64,
    ) -> RelationResult<OrganizationAssociation> {
        principal
            .scope
            .run(self.ctx.database.get_association(association_id))
            .await?
            .ok_or_else(|| RelationError::not_found("Association not found"))
    }

    async fn side_writable(
        &self,
        principal: &ResolvedPrincipal,
        association: &OrganizationAssociation,
        side: AssociationSide,
    ) -> RelationResult<bool> {
        self.authority
            .has(principal, association.org_for(side), write_permission(side))
            .await
    }

    async fn writable_sides(
        &self,
        principal: &ResolvedPrincipal,
        association: &OrganizationAssociation,
    ) -> RelationResult<Vec<AssociationSide>> {
        let mut sides = Vec::with_capacity(SIDES.len());
        for side in SIDES {
            if self.side_writable(principal, association, side).await? {
                sides.push(side);
            }
        }
        Ok(sides)
    }

    async fn readable(
        &self,
        principal: &ResolvedPrincipal,
        association: &OrganizationAssociation,
    ) -> RelationResult<bool> {
        for side in SIDES {
            if self
                .authority
                .has(principal, association.org_for(side), read_permission(side))
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Explicit flag, else implied by a supplied id list.
fn all_visible(flag: Option<bool>, ids: Option<&[i64]>) -> Option<bool> {
    flag.or_else(|| ids.map(|ids| ids.is_empty()))
}

fn check_ids(field: &str, ids: Option<&[i64]>) -> RelationResult<()> {
    if ids.is_some_and(|ids| ids.iter().any(|id| *id <= 0)) {
        return Err(RelationError::invalid_input(format!(
            "{} must contain positive ids",
            field
        )));
    }
    Ok(())
}

fn side_name(side: AssociationSide) -> &'static str {
    match side {
        AssociationSide::Advertiser => "advertiser",
        AssociationSide::Affiliate => "affiliate",
    }
}

#[cfg(test)]
mod tests;
