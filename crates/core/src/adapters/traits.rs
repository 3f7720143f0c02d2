use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RelationResult;
use crate::types::{
    AdvertiserAssociationInvitation, AgencyDelegation, AssociationFilter, AssociationSide,
    AssociationStatus, AssociationUpdate, CreateAssociation, CreateDelegation, CreateInvitation,
    CreateUsageLog, DelegationFilter, DelegationStatus, DelegationUpdate, InvitationFilter,
    InvitationUpdate, InvitationUsageLog, Organization, OrganizationAssociation, Profile,
    Redemption, RedemptionOutcome, RoleRecord,
};

/// Read access to organizations, profiles and roles owned by other services.
#[async_trait]
pub trait DirectoryOps: Send + Sync + 'static {
    async fn get_organization(&self, id: i64) -> RelationResult<Option<Organization>>;
    async fn get_profile(&self, user_id: Uuid) -> RelationResult<Option<Profile>>;
    async fn get_role(&self, role_id: i32) -> RelationResult<Option<RoleRecord>>;
}

/// Association persistence operations.
///
/// Updates are compare-and-set on the stored status: when the row is no
/// longer in `expected`, the store fails with `InvalidTransition` and writes
/// nothing.
#[async_trait]
pub trait AssociationOps: Send + Sync + 'static {
    /// Insert a `Pending` association, failing with `Conflict` when an open
    /// association already binds the pair.
    async fn create_association(
        &self,
        association: CreateAssociation,
    ) -> RelationResult<OrganizationAssociation>;
    async fn get_association(&self, id: i64) -> RelationResult<Option<OrganizationAssociation>>;
    /// The non-`Rejected` association for the pair, if any.
    async fn get_open_association(
        &self,
        advertiser_org_id: i64,
        affiliate_org_id: i64,
    ) -> RelationResult<Option<OrganizationAssociation>>;
    async fn update_association(
        &self,
        id: i64,
        expected: AssociationStatus,
        update: AssociationUpdate,
    ) -> RelationResult<OrganizationAssociation>;
    /// Ordered by `updated_at DESC, association_id DESC`.
    async fn list_associations(
        &self,
        filter: &AssociationFilter,
    ) -> RelationResult<Vec<OrganizationAssociation>>;
    /// Every `Active` association that `org_id` takes part in on `side`.
    async fn active_associations_for(
        &self,
        side: AssociationSide,
        org_id: i64,
    ) -> RelationResult<Vec<OrganizationAssociation>>;
}

/// Delegation persistence operations.
#[async_trait]
pub trait DelegationOps: Send + Sync + 'static {
    /// Insert a `Pending` delegation, failing with `Conflict` when a
    /// non-`Revoked` delegation already binds the pair.
    async fn create_delegation(
        &self,
        delegation: CreateDelegation,
    ) -> RelationResult<AgencyDelegation>;
    async fn get_delegation(&self, id: i64) -> RelationResult<Option<AgencyDelegation>>;
    /// The non-`Revoked` delegation for the pair, regardless of expiry.
    async fn get_open_delegation(
        &self,
        agency_org_id: i64,
        advertiser_org_id: i64,
    ) -> RelationResult<Option<AgencyDelegation>>;
    async fn update_delegation(
        &self,
        id: i64,
        expected: DelegationStatus,
        update: DelegationUpdate,
    ) -> RelationResult<AgencyDelegation>;
    /// Ordered by `created_at DESC, delegation_id DESC`.
    async fn list_delegations(
        &self,
        filter: &DelegationFilter,
    ) -> RelationResult<Vec<AgencyDelegation>>;
    /// Persist `Revoked` on every open delegation expired at `now`.
    async fn expire_delegations(&self, now: DateTime<Utc>) -> RelationResult<usize>;
}

/// Invitation and usage log persistence operations.
#[async_trait]
pub trait InvitationOps: Send + Sync + 'static {
    /// Insert an invitation, failing with `Conflict` on a duplicate token.
    async fn create_invitation(
        &self,
        invitation: CreateInvitation,
    ) -> RelationResult<AdvertiserAssociationInvitation>;
    async fn get_invitation(
        &self,
        id: i64,
    ) -> RelationResult<Option<AdvertiserAssociationInvitation>>;
    /// Exact, case-sensitive token match.
    async fn get_invitation_by_token(
        &self,
        token: &str,
    ) -> RelationResult<Option<AdvertiserAssociationInvitation>>;
    async fn update_invitation(
        &self,
        id: i64,
        update: InvitationUpdate,
    ) -> RelationResult<AdvertiserAssociationInvitation>;
    async fn delete_invitation(&self, id: i64) -> RelationResult<()>;
    /// Ordered by `created_at DESC, invitation_id DESC`.
    async fn list_invitations(
        &self,
        filter: &InvitationFilter,
    ) -> RelationResult<Vec<AdvertiserAssociationInvitation>>;
    async fn append_usage_log(&self, log: CreateUsageLog) -> RelationResult<InvitationUsageLog>;
    /// Newest first.
    async fn list_usage_logs(
        &self,
        invitation_id: i64,
        limit: u32,
    ) -> RelationResult<Vec<InvitationUsageLog>>;
    /// Consume one use of the invitation behind `redemption.token`.
    ///
    /// Runs as one serialised unit per invitation: re-reads the invitation,
    /// re-derives its effective status, checks the allow-list and the pair
    /// uniqueness, creates the `Request` association, increments
    /// `usage_count` and appends the usage log. Every outcome, refusals
    /// included, leaves exactly one usage log behind.
    async fn redeem_invitation(&self, redemption: Redemption)
    -> RelationResult<RedemptionOutcome>;
}
