//! # orglink core
//!
//! Entities, store traits and shared plumbing for cross-organization
//! relationships: advertiser/affiliate associations, agency delegations and
//! shareable association invitations.

pub mod adapters;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod logger;
pub mod permission;
pub mod scope;
pub mod token;
pub mod types;
pub mod types_association;
pub mod types_delegation;
mod types_impls;
pub mod types_invitation;

pub use adapters::{
    AssociationOps, DelegationOps, DirectoryOps, InvitationOps, MemoryRelationStore,
    RelationStore,
};
#[cfg(feature = "sqlx-postgres")]
pub use adapters::{PoolConfig, PoolStats, SqlxRelationStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{InvitationLinkStyle, RelationsConfig};
pub use context::RelationContext;
pub use error::{DatabaseError, ErrorKind, RelationError, RelationResult};
pub use logger::{Logger, TracingLogger};
pub use permission::{DelegationPermission, PermissionMask};
pub use scope::RequestScope;
pub use token::{OsTokenSource, TokenSource};
pub use types::{
    AdvertiserAssociationInvitation, AgencyDelegation, AssociationAction, AssociationCursor,
    AssociationFilter, AssociationSide, AssociationStatus, AssociationType, AssociationUpdate,
    CreateAssociation, CreateDelegation, CreateInvitation, CreateUsageLog, DelegationAction,
    DelegationFilter, DelegationStatus, DelegationUpdate, InvitationFilter, InvitationStatus,
    InvitationUpdate, InvitationUsageLog, Organization, OrganizationAssociation,
    OrganizationType, Profile, Redemption, RedemptionOutcome, Role, RoleRecord,
    UsageFailureReason, UsageOutcome, VisibleScope,
};
