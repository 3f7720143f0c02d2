pub mod association;
pub mod authority;
pub mod delegation;
pub mod invitation;
pub mod visibility;

pub(crate) mod helpers;

#[cfg(test)]
pub(crate) mod test_support;

pub use association::{
    AssociationEngine, AssociationPage, CreateAssociationRequest, ListAssociationsQuery,
    UpdateVisibilityRequest,
};
pub use authority::{AuthorityResolver, ResolvedPrincipal};
pub use delegation::{
    CreateDelegationRequest, DelegationEngine, ListDelegationsQuery, PermissionCheckReason,
    PermissionCheckRequest, PermissionCheckResult,
};
pub use invitation::{
    CreateInvitationRequest, InvitationEngine, ListInvitationsQuery, UpdateInvitationRequest,
    UseInvitationRequest, UseInvitationResult, UseOutcome,
};
pub use visibility::VisibilityProjector;
