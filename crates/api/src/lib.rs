//! # orglink api
//!
//! The relationship engines built on [`orglink_core`]:
//!
//! - [`AuthorityResolver`] turns a request scope into a principal and answers
//!   permission questions, direct or delegated.
//! - [`AssociationEngine`] runs the advertiser/affiliate association lifecycle.
//! - [`DelegationEngine`] runs agency delegations and permission checks.
//! - [`InvitationEngine`] issues and consumes shareable association invitations.
//! - [`VisibilityProjector`] computes who can see whom.

pub mod engines;

pub use engines::{
    AssociationEngine, AssociationPage, AuthorityResolver, CreateAssociationRequest,
    CreateDelegationRequest, CreateInvitationRequest, DelegationEngine, InvitationEngine,
    ListAssociationsQuery, ListDelegationsQuery, ListInvitationsQuery, PermissionCheckReason,
    PermissionCheckRequest, PermissionCheckResult, ResolvedPrincipal, UpdateInvitationRequest,
    UpdateVisibilityRequest, UseInvitationRequest, UseInvitationResult, UseOutcome,
    VisibilityProjector,
};
