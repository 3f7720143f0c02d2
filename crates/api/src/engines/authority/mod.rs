//! Identity and authority resolution.
//!
//! Every permission decision in the engines goes through
//! [`AuthorityResolver`]. Direct authority is a pure function of the
//! principal; delegated authority reads the agency's open delegation.

use orglink_core::{
    DelegationPermission, OrganizationType, PermissionMask, RelationContext, RelationError,
    RelationResult, RelationStore, RequestScope, Role,
};
use uuid::Uuid;

/// `(role, organization type)` pairs that hold complete authority over the
/// principal's own organization.
const SELF_AUTHORITY: &[(Role, OrganizationType)] = &[
    (Role::AdvertiserManager, OrganizationType::Advertiser),
    (Role::AdvertiserManager, OrganizationType::Agency),
    (Role::AffiliateManager, OrganizationType::Affiliate),
];

/// An authenticated user with their organizational context.
#[derive(Debug, Clone)]
pub struct ResolvedPrincipal {
    pub user_id: Uuid,
    pub organization_id: Option<i64>,
    pub organization_type: Option<OrganizationType>,
    pub role: Role,
    pub scope: RequestScope,
}

impl ResolvedPrincipal {
    pub fn is_platform(&self) -> bool {
        self.role.is_platform()
    }

    pub fn belongs_to(&self, org_id: i64) -> bool {
        self.organization_id == Some(org_id)
    }

    pub fn correlation_id(&self) -> &str {
        &self.scope.correlation_id
    }

    /// Permissions held through the principal's role alone.
    pub fn direct_authority(&self, target_org_id: i64) -> PermissionMask {
        if self.is_platform() {
            return PermissionMask::all();
        }
        match self.organization_type {
            Some(org_type)
                if self.belongs_to(target_org_id)
                    && SELF_AUTHORITY.contains(&(self.role, org_type)) =>
            {
                PermissionMask::all()
            }
            _ => PermissionMask::empty(),
        }
    }

    /// Direct authority over `org_id` is complete.
    pub fn manages(&self, org_id: i64) -> bool {
        self.direct_authority(org_id).is_all()
    }
}

/// Turns request scopes into principals and answers permission questions.
pub struct AuthorityResolver<DB: RelationStore> {
    ctx: RelationContext<DB>,
}

impl<DB: RelationStore> Clone for AuthorityResolver<DB> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<DB: RelationStore> AuthorityResolver<DB> {
    pub fn new(ctx: RelationContext<DB>) -> Self {
        Self { ctx }
    }

    pub async fn resolve(&self, scope: &RequestScope) -> RelationResult<ResolvedPrincipal> {
        let user_id = scope.user_id.ok_or(RelationError::Unauthenticated)?;
        let database = &self.ctx.database;

        let profile = scope
            .run(database.get_profile(user_id))
            .await?
            .ok_or_else(|| RelationError::not_found("Profile not found"))?;

        let record = scope.run(database.get_role(profile.role_id)).await?.ok_or_else(|| {
            RelationError::misconfigured(format!("unknown role id {}", profile.role_id))
        })?;
        let role = Role::parse(&record.name).ok_or_else(|| {
            RelationError::misconfigured(format!("unknown role name {:?}", record.name))
        })?;

        let organization_type = match profile.organization_id {
            Some(org_id) => {
                let organization = scope
                    .run(database.get_organization(org_id))
                    .await?
                    .ok_or_else(|| RelationError::not_found("Profile organization not found"))?;
                Some(organization.org_type)
            }
            None => None,
        };

        Ok(ResolvedPrincipal {
            user_id,
            organization_id: profile.organization_id,
            organization_type,
            role,
            scope: scope.clone(),
        })
    }

    /// Permissions granted to the principal's agency by `target_org_id`.
    pub async fn delegated_authority(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
    ) -> RelationResult<PermissionMask> {
        let agency_org_id = match (principal.organization_id, principal.organization_type) {
            (Some(id), Some(OrganizationType::Agency)) if id != target_org_id => id,
            _ => return Ok(PermissionMask::empty()),
        };

        let delegation = principal
            .scope
            .run(
                self.ctx
                    .database
                    .get_open_delegation(agency_org_id, target_org_id),
            )
            .await?;

        Ok(delegation
            .map(|d| d.granted(self.ctx.now()))
            .unwrap_or_default())
    }

    /// Direct ∪ delegated.
    pub async fn effective_authority(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
    ) -> RelationResult<PermissionMask> {
        let direct = principal.direct_authority(target_org_id);
        if direct.is_all() {
            return Ok(direct);
        }
        let delegated = self.delegated_authority(principal, target_org_id).await?;
        Ok(direct.union(delegated))
    }

    pub async fn has(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
        permission: DelegationPermission,
    ) -> RelationResult<bool> {
        Ok(self
            .effective_authority(principal, target_org_id)
            .await?
            .contains(permission))
    }

    pub async fn can_act_as(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
        required: PermissionMask,
    ) -> RelationResult<bool> {
        Ok(self
            .effective_authority(principal, target_org_id)
            .await?
            .is_superset(&required))
    }

    /// Fail with `Forbidden` unless every permission in `required` is held.
    pub async fn require(
        &self,
        principal: &ResolvedPrincipal,
        target_org_id: i64,
        required: PermissionMask,
    ) -> RelationResult<()> {
        let effective = self.effective_authority(principal, target_org_id).await?;
        if effective.is_superset(&required) {
            return Ok(());
        }
        let missing: Vec<&str> = required
            .iter()
            .filter(|p| !effective.contains(*p))
            .map(|p| p.as_str())
            .collect();
        Err(RelationError::forbidden(format!(
            "Missing {} on organization {}",
            missing.join(", "),
            target_org_id
        )))
    }

    pub fn require_manages(
        &self,
        principal: &ResolvedPrincipal,
        org_id: i64,
    ) -> RelationResult<()> {
        if principal.manages(org_id) {
            Ok(())
        } else {
            Err(RelationError::forbidden(format!(
                "Not a manager of organization {}",
                org_id
            )))
        }
    }
}
