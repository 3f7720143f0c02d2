//! Advertiser-to-agency delegations.
//!
//! Expiry is applied on every read through
//! [`AgencyDelegation::effective_status`]; an expired delegation behaves as
//! `Revoked` whatever its stored status says.

pub mod types;

use chrono::{DateTime, Utc};
use orglink_core::types::clamp_limit;
use orglink_core::{
    AgencyDelegation, CreateDelegation, DelegationAction, DelegationFilter, DelegationStatus,
    DelegationUpdate, OrganizationType, PermissionMask, RelationContext, RelationError,
    RelationResult, RelationStore, RequestScope,
};
use validator::Validate;

use super::authority::{AuthorityResolver, ResolvedPrincipal};
use super::helpers::{at_boundary, check_message, require_org_of_type};
pub use types::{
    CreateDelegationRequest, ListDelegationsQuery, PermissionCheckReason,
    PermissionCheckRequest, PermissionCheckResult,
};

pub struct DelegationEngine<DB: RelationStore> {
    ctx: RelationContext<DB>,
    authority: AuthorityResolver<DB>,
}

impl<DB: RelationStore> Clone for DelegationEngine<DB> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            authority: self.authority.clone(),
        }
    }
}

impl<DB: RelationStore> DelegationEngine<DB> {
    pub fn new(ctx: RelationContext<DB>) -> Self {
        Self {
            authority: AuthorityResolver::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn create_delegation(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateDelegationRequest,
    ) -> RelationResult<AgencyDelegation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "delegation.create",
            self.create_core(principal, request),
        )
        .await
    }

    pub async fn accept(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        self.act(principal, delegation_id, DelegationAction::Accept)
            .await
    }

    pub async fn reject(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        self.act(principal, delegation_id, DelegationAction::Reject)
            .await
    }

    pub async fn suspend(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        self.act(principal, delegation_id, DelegationAction::Suspend)
            .await
    }

    pub async fn reactivate(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        self.act(principal, delegation_id, DelegationAction::Reactivate)
            .await
    }

    pub async fn revoke(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        self.act(principal, delegation_id, DelegationAction::Revoke)
            .await
    }

    /// Replace the granted permission set.
    pub async fn update_permissions(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
        permissions: PermissionMask,
    ) -> RelationResult<AgencyDelegation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "delegation.update_permissions",
            async {
                if permissions.is_empty() {
                    return Err(RelationError::invalid_input("permissions must not be empty"));
                }
                let mut update = DelegationUpdate::new(principal.user_id, self.ctx.now());
                update.permissions = Some(permissions);
                self.amend(principal, delegation_id, "update permissions of", update)
                    .await
            },
        )
        .await
    }

    /// Set or clear the expiry instant.
    pub async fn update_expiration(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> RelationResult<AgencyDelegation> {
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            "delegation.update_expiration",
            async {
                let now = self.ctx.now();
                reject_past_expiry(expires_at, now)?;
                let mut update = DelegationUpdate::new(principal.user_id, now);
                update.expires_at = Some(expires_at);
                self.amend(principal, delegation_id, "update expiration of", update)
                    .await
            },
        )
        .await
    }

    /// Whether `agency_org_id` may exercise `required_permissions` for
    /// `advertiser_org_id` right now.
    pub async fn check_permissions(
        &self,
        scope: &RequestScope,
        request: PermissionCheckRequest,
    ) -> RelationResult<PermissionCheckResult> {
        at_boundary(&self.ctx.config, scope, "delegation.check_permissions", async {
            let delegation = scope
                .run(
                    self.ctx
                        .database
                        .get_open_delegation(request.agency_org_id, request.advertiser_org_id),
                )
                .await?;
            Ok(evaluate(
                delegation.as_ref(),
                request.required_permissions,
                self.ctx.now(),
            ))
        })
        .await
    }

    pub async fn get(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        at_boundary(&self.ctx.config, &principal.scope, "delegation.get", async {
            let delegation = self.load(principal, delegation_id).await?;
            if !principal.manages(delegation.agency_org_id)
                && !principal.manages(delegation.advertiser_org_id)
            {
                return Err(RelationError::forbidden(
                    "Not permitted to view this delegation",
                ));
            }
            Ok(delegation)
        })
        .await
    }

    pub async fn list(
        &self,
        principal: &ResolvedPrincipal,
        query: ListDelegationsQuery,
    ) -> RelationResult<Vec<AgencyDelegation>> {
        at_boundary(&self.ctx.config, &principal.scope, "delegation.list", async {
            let permitted = principal.is_platform()
                || query.agency_org_id.is_some_and(|id| principal.manages(id))
                || query.advertiser_org_id.is_some_and(|id| principal.manages(id));
            if !permitted {
                return Err(RelationError::forbidden(
                    "Not permitted to list these delegations",
                ));
            }

            let config = &self.ctx.config;
            let filter = DelegationFilter {
                agency_org_id: query.agency_org_id,
                advertiser_org_id: query.advertiser_org_id,
                status: query.status,
                active_at: (!query.include_expired).then(|| self.ctx.now()),
                limit: clamp_limit(query.limit, config.default_list_limit, config.max_list_limit),
                offset: query.offset.unwrap_or(0),
            };
            principal
                .scope
                .run(self.ctx.database.list_delegations(&filter))
                .await
        })
        .await
    }

    /// Effectively active delegations the agency holds.
    pub async fn agency_delegations(
        &self,
        principal: &ResolvedPrincipal,
        agency_org_id: i64,
    ) -> RelationResult<Vec<AgencyDelegation>> {
        self.list_active(principal, "delegation.agency_delegations", |filter| {
            filter.agency_org_id = Some(agency_org_id)
        })
        .await
    }

    /// Effectively active delegations the advertiser has granted.
    pub async fn advertiser_delegations(
        &self,
        principal: &ResolvedPrincipal,
        advertiser_org_id: i64,
    ) -> RelationResult<Vec<AgencyDelegation>> {
        self.list_active(principal, "delegation.advertiser_delegations", |filter| {
            filter.advertiser_org_id = Some(advertiser_org_id)
        })
        .await
    }

    /// Persist `Revoked` on every open delegation that has expired.
    pub async fn expire_delegations(&self, scope: &RequestScope) -> RelationResult<usize> {
        at_boundary(&self.ctx.config, scope, "delegation.expire", async {
            let count = scope
                .run(self.ctx.database.expire_delegations(self.ctx.now()))
                .await?;
            if count > 0 {
                tracing::info!(
                    correlation_id = %scope.correlation_id,
                    count,
                    "expired delegations revoked"
                );
            }
            Ok(count)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Core functions
    // -----------------------------------------------------------------------

    async fn create_core(
        &self,
        principal: &ResolvedPrincipal,
        request: CreateDelegationRequest,
    ) -> RelationResult<AgencyDelegation> {
        request.validate()?;
        if request.permissions.is_empty() {
            return Err(RelationError::invalid_input("permissions must not be empty"));
        }
        if request.advertiser_org_id == request.agency_org_id {
            return Err(RelationError::invalid_input(
                "advertiserOrgId and agencyOrgId must differ",
            ));
        }
        let now = self.ctx.now();
        reject_past_expiry(request.expires_at, now)?;
        check_message(&self.ctx.config, "message", request.message.as_deref())?;

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
            "agencyOrgId",
            request.agency_org_id,
            OrganizationType::Agency,
        )
        .await?;
        self.authority
            .require_manages(principal, request.advertiser_org_id)?;

        let database = &self.ctx.database;
        if let Some(stale) = scope
            .run(database.get_open_delegation(request.agency_org_id, request.advertiser_org_id))
            .await?
            && stale.is_expired(now)
        {
            scope
                .run(database.update_delegation(
                    stale.delegation_id,
                    stale.status,
                    DelegationUpdate::new(principal.user_id, now).status(DelegationStatus::Revoked),
                ))
                .await?;
            tracing::info!(
                correlation_id = %principal.correlation_id(),
                delegation_id = stale.delegation_id,
                "expired delegation revoked"
            );
        }

        let delegation = scope
            .run(database.create_delegation(CreateDelegation {
                agency_org_id: request.agency_org_id,
                advertiser_org_id: request.advertiser_org_id,
                permissions: request.permissions,
                expires_at: request.expires_at,
                message: request.message,
                created_by_user_id: principal.user_id,
                created_at: now,
            }))
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            delegation_id = delegation.delegation_id,
            agency_org_id = delegation.agency_org_id,
            advertiser_org_id = delegation.advertiser_org_id,
            permissions = ?delegation.permissions,
            "delegation created"
        );
        Ok(delegation)
    }

    async fn act(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
        action: DelegationAction,
    ) -> RelationResult<AgencyDelegation> {
        let operation = match action {
            DelegationAction::Accept => "delegation.accept",
            DelegationAction::Reject => "delegation.reject",
            DelegationAction::Suspend => "delegation.suspend",
            DelegationAction::Reactivate => "delegation.reactivate",
            DelegationAction::Revoke => "delegation.revoke",
        };
        at_boundary(
            &self.ctx.config,
            &principal.scope,
            operation,
            self.transition(principal, delegation_id, action),
        )
        .await
    }

    async fn transition(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
        action: DelegationAction,
    ) -> RelationResult<AgencyDelegation> {
        let current = self.load(principal, delegation_id).await?;
        let now = self.ctx.now();
        let effective = current.effective_status(now);

        let agency_side = principal.manages(current.agency_org_id);
        let advertiser_side = principal.manages(current.advertiser_org_id);
        let permitted = match action {
            DelegationAction::Accept | DelegationAction::Reject => agency_side,
            DelegationAction::Suspend | DelegationAction::Reactivate => {
                agency_side || advertiser_side
            }
            // the agency side revokes only what it has accepted
            DelegationAction::Revoke => {
                advertiser_side || (agency_side && effective != DelegationStatus::Pending)
            }
        };
        if !permitted {
            return Err(RelationError::forbidden(format!(
                "Not permitted to {} this delegation",
                action.as_str()
            )));
        }

        let to = action
            .apply(effective)
            .ok_or_else(|| RelationError::delegation_transition(effective, action.as_str()))?;

        let mut update = DelegationUpdate::new(principal.user_id, now).status(to);
        if action == DelegationAction::Accept {
            update.accepted_by_user_id = Some(principal.user_id);
        }

        let updated = principal
            .scope
            .run(
                self.ctx
                    .database
                    .update_delegation(delegation_id, current.status, update),
            )
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            delegation_id,
            action = action.as_str(),
            from = %effective,
            to = %to,
            "delegation transitioned"
        );
        Ok(updated)
    }

    /// Advertiser-side change to an `Active` or `Suspended` delegation.
    async fn amend(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
        action: &'static str,
        update: DelegationUpdate,
    ) -> RelationResult<AgencyDelegation> {
        let current = self.load(principal, delegation_id).await?;
        self.authority
            .require_manages(principal, current.advertiser_org_id)?;

        let effective = current.effective_status(update.updated_at);
        if !matches!(
            effective,
            DelegationStatus::Active | DelegationStatus::Suspended
        ) {
            return Err(RelationError::delegation_transition(effective, action));
        }

        let updated = principal
            .scope
            .run(
                self.ctx
                    .database
                    .update_delegation(delegation_id, current.status, update),
            )
            .await?;

        tracing::info!(
            correlation_id = %principal.correlation_id(),
            delegation_id,
            permissions = ?updated.permissions,
            expires_at = ?updated.expires_at,
            "delegation amended"
        );
        Ok(updated)
    }

    async fn list_active(
        &self,
        principal: &ResolvedPrincipal,
        operation: &'static str,
        scope_filter: impl FnOnce(&mut DelegationFilter),
    ) -> RelationResult<Vec<AgencyDelegation>> {
        let mut filter = DelegationFilter {
            status: Some(DelegationStatus::Active),
            active_at: Some(self.ctx.now()),
            limit: self.ctx.config.max_list_limit,
            ..Default::default()
        };
        scope_filter(&mut filter);

        at_boundary(&self.ctx.config, &principal.scope, operation, async {
            let org_id = filter.agency_org_id.or(filter.advertiser_org_id);
            if !principal.is_platform() && !org_id.is_some_and(|id| principal.manages(id)) {
                return Err(RelationError::forbidden(
                    "Not permitted to list these delegations",
                ));
            }
            principal
                .scope
                .run(self.ctx.database.list_delegations(&filter))
                .await
        })
        .await
    }

    async fn load(
        &self,
        principal: &ResolvedPrincipal,
        delegation_id: i64,
    ) -> RelationResult<AgencyDelegation> {
        principal
            .scope
            .run(self.ctx.database.get_delegation(delegation_id))
            .await?
            .ok_or_else(|| RelationError::not_found("Delegation not found"))
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

/// Permission check against the pair's open delegation, if any.
pub(crate) fn evaluate(
    delegation: Option<&AgencyDelegation>,
    required: PermissionMask,
    now: DateTime<Utc>,
) -> PermissionCheckResult {
    let Some(delegation) = delegation else {
        return PermissionCheckResult {
            granted: false,
            matched_delegation_id: None,
            reason: PermissionCheckReason::NoDelegation,
            permission_results: required.iter().map(|p| (p, false)).collect(),
            delegation_status: None,
            is_expired: false,
        };
    };

    let granted_mask = delegation.granted(now);
    let is_expired = delegation.is_expired(now);
    let status = delegation.effective_status(now);
    let reason = if is_expired {
        PermissionCheckReason::DelegationExpired
    } else if status != DelegationStatus::Active {
        PermissionCheckReason::DelegationNotActive
    } else if !granted_mask.is_superset(&required) {
        PermissionCheckReason::MissingPermissions
    } else {
        PermissionCheckReason::Granted
    };
    let granted = reason == PermissionCheckReason::Granted;

    PermissionCheckResult {
        granted,
        matched_delegation_id: granted.then_some(delegation.delegation_id),
        reason,
        permission_results: required
            .iter()
            .map(|p| (p, granted_mask.contains(p)))
            .collect(),
        delegation_status: Some(status),
        is_expired,
    }
}
