//! Shareable association invitations.
//!
//! Consumption pre-checks the token, the effective status and the target
//! affiliate so each refusal gets its own usage log, then hands the
//! serialised part (allow-list, pair uniqueness, association insert,
//! counter increment, log append) to
//! [`InvitationOps::redeem_invitation`](orglink_core::InvitationOps::redeem_invitation).

pub mod types;

use chrono::{DateTime, Utc};
use orglink_core::token::{generate_token, render_link};
use orglink_core::types::clamp_limit;
use orglink_core::types_invitation::MAX_USES_LIMIT;
use orglink_core::{
    AdvertiserAssociationInvitation, CreateInvitation, CreateUsageLog, DelegationPermission,
    InvitationFilter, InvitationStatus, InvitationUpdate, InvitationUsageLog, OrganizationType,
    PermissionMask, Redemption, RedemptionOutcome, RelationContext, RelationError,
    RelationResult, RelationStore, RequestScope, UsageFailureReason, UsageOutcome,
};
use validator::Validate;

use super::authority::{AuthorityResolver, ResolvedPrincipal};
use super::helpers::{at_boundary, check_message, report, require_org_of_type};
pub use types::{
    CreateInvitationRequest, ListInvitationsQuery, UpdateInvitationRequest,
    UseInvitationRequest, UseInvitationResult, UseOutcome,
};

pub struct InvitationEngine<DB: RelationStore> {
    ctx: RelationContext<DB>,
    authority: AuthorityResolver<DB>,
}

impl<DB: RelationStore> Clone for InvitationEngine<DB> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            authority: self.authority.clone(),
        }
    }
}

impl<DB: RelationStore> InvitationEngine<DB> {
    pub fn new(ctx: RelationContext<DB>) -> Self {
        Self {
            authority: AuthorityResolver::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn create_invitation(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateInvitationRequest,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "invitation.create",
            self.create_core(principal, request),
        )
        .await
    }

    pub async fn update(
        &self,
        principal: &ResolvedPrincipal,
        invitation_id: i64,
        request: UpdateInvitationRequest,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "invitation.update",
            self.update_core(principal, invitation_id, request),
        )
        .await
    }

    pub async fn delete(&self, principal: &ResolvedPrincipal, invitation_id: i64) -> RelationResult<()> {
        at_boundary(&self.ctx.config, &principal.scope, "invitation.delete", async {
            let invitation = self.load(principal, invitation_id).await?;
            self.require_manage(principal, &invitation).await?;
            principal
                .scope
                .run(self.ctx.database.delete_invitation(invitation_id))
                .await?;
            tracing::info!(
                correlation_id = %principal.correlation_id(),
                invitation_id,
                "invitation deleted"
            );
            Ok(())
        })
        .await
    }

    pub async fn get(
        &self,
        principal: &ResolvedPrincipal,
        invitation_id: i64,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        at_boundary(&self.ctx.config, &principal.scope, "invitation.get", async {
            let invitation = self.load(principal, invitation_id).await?;
            self.require_view(principal, invitation.advertiser_org_id)
                .await?;
            Ok(invitation)
        })
        .await
    }

    /// Public lookup for the landing page. The invitation is returned
    /// whatever its effective status.
    pub async fn get_by_token(
        &self,
        scope: &RequestScope,
        token: &str,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        at_boundary(&self.ctx.config, scope, "invitation.get_by_token", async {
            scope
                .run(self.ctx.database.get_invitation_by_token(token))
                .await?
                .ok_or_else(|| RelationError::not_found("Invitation not found"))
        })
        .await
    }

    /// Consume one use of an invitation on behalf of `principal`.
    pub async fn use_invitation(
        &self,
        principal: &ResolvedPrincipal,
        request: UseInvitationRequest,
    ) -> RelationResult<UseInvitationResult> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "invitation.use",
            self.use_core(principal, request),
        )
        .await
    }

    /// Usage logs, newest first.
    pub async fn usage_history(
        &self,
        principal: &ResolvedPrincipal,
        invitation_id: i64,
        limit: Option<u32>,
    ) -> RelationResult<Vec<InvitationUsageLog>> {
        at_boundary(&self.ctx.config, &principal.scope, "invitation.usage_history", async {
            let invitation = self.load(principal, invitation_id).await?;
            self.require_view(principal, invitation.advertiser_org_id)
                .await?;
            let config = &self.ctx.config;
            let limit = clamp_limit(
                limit,
                config.default_usage_history_limit,
                config.max_usage_history_limit,
            );
            principal
                .scope
                .run(self.ctx.database.list_usage_logs(invitation_id, limit))
                .await
        })
        .await
    }

    pub async fn list(
        &self,
        principal: &ResolvedPrincipal,
        query: ListInvitationsQuery,
    ) -> RelationResult<Vec<AdvertiserAssociationInvitation>> {
        at_boundary(&self.ctx.config, &principal.scope, "invitation.list", async {
            self.require_view(principal, query.advertiser_org_id).await?;
            let config = &self.ctx.config;
            let filter = InvitationFilter {
                advertiser_org_id: Some(query.advertiser_org_id),
                created_by_user_id: None,
                status: query.status,
                include_expired: query.include_expired,
                now: self.ctx.now(),
                limit: clamp_limit(query.limit, config.default_list_limit, config.max_list_limit),
                offset: query.offset.unwrap_or(0),
            };
            principal
                .scope
                .run(self.ctx.database.list_invitations(&filter))
                .await
        })
        .await
    }

    /// Shareable URL for an invitation.
    pub fn link(&self, invitation: &AdvertiserAssociationInvitation) -> String {
        let config = &self.ctx.config;
        render_link(
            &config.invitation_base_url,
            config.invitation_link_style,
            &invitation.token,
        )
    }

    // -----------------------------------------------------------------------
    // Core functions
    // -----------------------------------------------------------------------

    async fn create_core(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateInvitationRequest,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        request.validate()?;
        let config = &self.ctx.config;
        check_message(config, "description", request.description.as_deref())?;
        check_message(config, "defaultMessage", request.default_message.as_deref())?;
        let now = self.ctx.now();
        reject_past_expiry(request.expires_at, now)?;
        check_max_uses(request.max_uses)?;

        let scope = &principal.scope;
        require_org_of_type(
            &self.ctx,
            scope,
            "advertiserOrgId",
            request.advertiser_org_id,
            OrganizationType::Advertiser,
        )
        .await?;
        self.authority
            .require(
                principal,
                request.advertiser_org_id,
                PermissionMask::from([DelegationPermission::ManageAffiliates]),
            )
            .await?;

        for attempt in 1..=config.token_attempts {
            let token = generate_token(self.ctx.token_source.as_ref(), config.token_bytes)?;
            let created = scope
                .run(self.ctx.database.create_invitation(CreateInvitation {
                    advertiser_org_id: request.advertiser_org_id,
                    name: request.name.clone(),
                    description: request.description.clone(),
                    token,
                    expires_at: request.expires_at,
                    max_uses: request.max_uses,
                    default_message: request.default_message.clone(),
                    allowed_affiliate_org_ids: request.allowed_affiliate_org_ids.clone(),
                    created_by_user_id: principal.user_id,
                    created_at: now,
                }))
                .await;
            match created {
                Ok(invitation) => {
                    tracing::info!(
                        correlation_id = %principal.correlation_id(),
                        invitation_id = invitation.invitation_id,
                        advertiser_org_id = invitation.advertiser_org_id,
                        max_uses = ?invitation.max_uses,
                        "invitation created"
                    );
                    return Ok(invitation);
                }
                Err(RelationError::Conflict(_)) => {
                    tracing::warn!(
                        correlation_id = %principal.correlation_id(),
                        attempt,
                        "invitation token collision"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(RelationError::internal(
            "could not allocate a unique invitation token",
        ))
    }

    async fn update_core(
        &self,
        principal: &ResolvedPrincipal,
        invitation_id: i64,
        request: UpdateInvitationRequest,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        request.validate()?;
        let current = self.load(principal, invitation_id).await?;
        self.require_manage(principal, &current).await?;

        let now = self.ctx.now();
        let config = &self.ctx.config;
        check_message(config, "description", request.description.clone().flatten().as_deref())?;
        check_message(
            config,
            "defaultMessage",
            request.default_message.clone().flatten().as_deref(),
        )?;
        reject_past_expiry(request.expires_at.flatten(), now)?;
        if let Some(max_uses) = request.max_uses {
            check_max_uses(max_uses)?;
        }
        if let Some(Some(ids)) = &request.allowed_affiliate_org_ids
            && ids.is_empty()
        {
            return Err(RelationError::invalid_input(
                "allowedAffiliateOrgIds must not be empty",
            ));
        }
        if request.status == Some(InvitationStatus::Expired) {
            return Err(RelationError::invalid_input(
                "status expired is derived and cannot be set",
            ));
        }

        let update = InvitationUpdate {
            name: request.name,
            description: request.description,
            default_message: request.default_message,
            expires_at: request.expires_at,
            max_uses: request.max_uses,
            allowed_affiliate_org_ids: request.allowed_affiliate_org_ids,
            status: request.status,
            updated_at: now,
        };

        // Fails fast on this snapshot; the store repeats the check on the
        // locked row.
        current.updated(&update)?;

        let updated = principal
            .scope
            .run(self.ctx.database.update_invitation(invitation_id, update))
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            invitation_id,
            status = %updated.status,
            "invitation updated"
        );
        Ok(updated)
    }

    async fn use_core(
        &self,
        principal: &ResolvedPrincipal,
        request: UseInvitationRequest,
    ) -> RelationResult<UseInvitationResult> {
        request.validate()?;
        let scope = &principal.scope;
        let database = &self.ctx.database;
        let now = self.ctx.now();

        let Some(invitation) = scope
            .run(database.get_invitation_by_token(&request.token))
            .await?
        else {
            return self
                .refuse(
                    principal,
                    &request,
                    None,
                    request.target_affiliate_org_id,
                    UsageFailureReason::InvitationNotFound,
                    now,
                )
                .await;
        };
        let invitation_id = Some(invitation.invitation_id);

        if let Some(reason) = invitation.unavailable_reason(now) {
            return self
                .refuse(
                    principal,
                    &request,
                    invitation_id,
                    request.target_affiliate_org_id,
                    reason,
                    now,
                )
                .await;
        }

        let affiliate_org_id = match request.target_affiliate_org_id {
            Some(target) => {
                let organization = scope.run(database.get_organization(target)).await?;
                if organization.is_none_or(|org| org.org_type != OrganizationType::Affiliate) {
                    return self
                        .refuse(
                            principal,
                            &request,
                            invitation_id,
                            Some(target),
                            UsageFailureReason::InvalidTarget,
                            now,
                        )
                        .await;
                }
                if !self
                    .authority
                    .has(principal, target, DelegationPermission::ManageCampaigns)
                    .await?
                {
                    return self
                        .refuse(
                            principal,
                            &request,
                            invitation_id,
                            Some(target),
                            UsageFailureReason::ForbiddenTarget,
                            now,
                        )
                        .await;
                }
                target
            }
            None => match (principal.organization_id, principal.organization_type) {
                (Some(org_id), Some(OrganizationType::Affiliate)) => org_id,
                _ => {
                    return self
                        .refuse(
                            principal,
                            &request,
                            invitation_id,
                            None,
                            UsageFailureReason::InvalidTarget,
                            now,
                        )
                        .await;
                }
            },
        };

        let outcome = scope
            .run(database.redeem_invitation(Redemption {
                token: request.token.clone(),
                consuming_user_id: principal.user_id,
                affiliate_org_id,
                ip_address: request.client_ip.clone(),
                user_agent: request.user_agent.clone(),
                now,
            }))
            .await?;

        let (association, outcome) = match outcome {
            RedemptionOutcome::Created { association, .. } => (association, UseOutcome::Created),
            RedemptionOutcome::AlreadyAssociated { association, .. } => {
                (association, UseOutcome::AlreadyAssociated)
            }
            RedemptionOutcome::Refused { reason, .. } => return Err(refusal(reason)),
        };

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            invitation_id = invitation.invitation_id,
            association_id = association.association_id,
            affiliate_org_id,
            outcome = ?outcome,
            "invitation consumed"
        );
        Ok(UseInvitationResult {
            association,
            outcome,
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Append the failed usage log for a refusal made before redemption and
    /// return the matching error.
    async fn refuse<T>(
        &self,
        principal: &ResolvedPrincipal,
        request: &UseInvitationRequest,
        invitation_id: Option<i64>,
        affiliate_org_id: Option<i64>,
        reason: UsageFailureReason,
        now: DateTime<Utc>,
    ) -> RelationResult<T> {
        let log = CreateUsageLog {
            invitation_id,
            consumed_by_user_id: principal.user_id,
            consumed_by_affiliate_org_id: affiliate_org_id,
            resulting_association_id: None,
            ip_address: request.client_ip.clone(),
            user_agent: request.user_agent.clone(),
            outcome: UsageOutcome::Failed,
            failure_reason: Some(reason),
            consumed_at: now,
        };
        if let Err(err) = self.ctx.database.append_usage_log(log).await {
            report(&self.ctx.config, &principal.scope, "invitation.use.log", &err);
        }
        Err(refusal(reason))
    }

    async fn load(
        &self,
        principal: &ResolvedPrincipal,
        invitation_id: i64,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        principal
            .scope
            .run(self.ctx.database.get_invitation(invitation_id))
            .await?
            .ok_or_else(|| RelationError::not_found("Invitation not found"))
    }

    async fn require_manage(
        &self,
        principal: &ResolvedPrincipal,
        invitation: &AdvertiserAssociationInvitation,
    ) -> RelationResult<()> {
        self.authority
            .require(
                principal,
                invitation.advertiser_org_id,
                PermissionMask::from([DelegationPermission::ManageAffiliates]),
            )
            .await
    }

    async fn require_view(
        &self,
        principal: &ResolvedPrincipal,
        advertiser_org_id: i64,
    ) -> RelationResult<()> {
        self.authority
            .require(
                principal,
                advertiser_org_id,
                PermissionMask::from([DelegationPermission::ViewAffiliates]),
            )
            .await
    }
}

fn reject_past_expiry(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> RelationResult<()> {
    match expires_at {
        Some(at) if at < now => Err(RelationError::invalid_input(
            "expiresAt must not be in the past",
        )),
        _ => Ok(()),
    }
}

fn check_max_uses(max_uses: Option<u32>) -> RelationResult<()> {
    match max_uses {
        Some(0) => Err(RelationError::invalid_input("maxUses must be at least 1")),
        Some(max) if max > MAX_USES_LIMIT => Err(RelationError::invalid_input(format!(
            "maxUses must be at most {}",
            MAX_USES_LIMIT
        ))),
        _ => Ok(()),
    }
}

/// Error returned to the consumer for a refused use.
fn refusal(reason: UsageFailureReason) -> RelationError {
    match reason {
        UsageFailureReason::InvitationNotFound => RelationError::not_found("Invitation not found"),
        UsageFailureReason::Disabled => RelationError::gone("Invitation is disabled"),
        UsageFailureReason::Expired => RelationError::gone("Invitation has expired"),
        UsageFailureReason::MaxUsesExceeded => {
            RelationError::gone("Invitation has reached its usage limit")
        }
        UsageFailureReason::InvalidTarget => RelationError::invalid_input(
            "targetAffiliateOrgId must reference an affiliate organization",
        ),
        UsageFailureReason::ForbiddenTarget => RelationError::forbidden(
            "Not permitted to use this invitation for the target affiliate",
        ),
        UsageFailureReason::AlreadyAssociated => {
            RelationError::conflict("Organizations are already associated")
        }
    }
}
