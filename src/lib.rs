//! # orglink
//!
//! Cross-organization relationships for affiliate platforms: advertiser and
//! affiliate associations, agency delegations, shareable invitations and the
//! visibility they imply.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orglink::{CreateInvitationRequest, MemoryRelationStore, RelationsBuilder, RelationsConfig, RequestScope};
//! # use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let relations = RelationsBuilder::new(RelationsConfig::new("https://partners.example.com"))
//!         .database(MemoryRelationStore::new())
//!         .build()?;
//!
//!     # let user_id = Uuid::new_v4();
//!     let principal = relations.resolve(&RequestScope::new(user_id)).await?;
//!     let invitation = relations
//!         .invitations()
//!         .create_invitation(&principal, CreateInvitationRequest::new(10, "Spring partners"))
//!         .await?;
//!     println!("{}", relations.invitations().link(&invitation));
//!     Ok(())
//! }
//! ```

pub mod core;

pub use orglink_api as engines;
pub use orglink_core as types_mod;

pub use orglink_core::{
    AdvertiserAssociationInvitation, AgencyDelegation, AssociationAction, AssociationSide,
    AssociationStatus, AssociationType, Clock, DatabaseError, DelegationAction,
    DelegationPermission, DelegationStatus, ErrorKind, InvitationLinkStyle, InvitationStatus,
    InvitationUsageLog, Logger, ManualClock, MemoryRelationStore, Organization,
    OrganizationAssociation, OrganizationType, PermissionMask, Profile, RelationContext,
    RelationError, RelationResult, RelationStore, RelationsConfig, RequestScope, Role,
    RoleRecord, SystemClock, TokenSource, TracingLogger, UsageFailureReason, UsageOutcome,
    VisibleScope,
};

pub use orglink_api::{
    AssociationEngine, AssociationPage, AuthorityResolver, CreateAssociationRequest,
    CreateDelegationRequest, CreateInvitationRequest, DelegationEngine, InvitationEngine,
    ListAssociationsQuery, ListDelegationsQuery, ListInvitationsQuery, PermissionCheckReason,
    PermissionCheckRequest, PermissionCheckResult, ResolvedPrincipal, UpdateInvitationRequest,
    UpdateVisibilityRequest, UseInvitationRequest, UseInvitationResult, UseOutcome,
    VisibilityProjector,
};

// Re-export adapters
pub mod adapters {
    pub use orglink_core::{
        AssociationOps, DelegationOps, DirectoryOps, InvitationOps, MemoryRelationStore,
        RelationStore,
    };

    #[cfg(feature = "sqlx-postgres")]
    pub use orglink_core::{PoolConfig, PoolStats, SqlxRelationStore};
}

pub use crate::core::{Relations, RelationsBuilder, TypedRelationsBuilder};
