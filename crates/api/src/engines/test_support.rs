use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use orglink_core::{
    ManualClock, MemoryRelationStore, Organization, OrganizationType, Profile, RelationContext,
    RelationsConfig, RequestScope, Role, RoleRecord,
};
use uuid::Uuid;

use super::authority::{AuthorityResolver, ResolvedPrincipal};

pub(crate) const ADVERTISER: i64 = 10;
pub(crate) const OTHER_ADVERTISER: i64 = 11;
pub(crate) const AFFILIATE: i64 = 20;
pub(crate) const AFFILIATE_B: i64 = 21;
pub(crate) const AFFILIATE_C: i64 = 22;
pub(crate) const AGENCY: i64 = 30;
pub(crate) const OTHER_AGENCY: i64 = 31;

pub(crate) const UNKNOWN_ROLE_ID: i32 = 99;

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub(crate) fn role_id(role: Role) -> i32 {
    match role {
        Role::Admin => 1,
        Role::AdvertiserManager => 2,
        Role::AffiliateManager => 3,
        Role::Affiliate => 4,
        Role::PlatformOwner => 5,
    }
}

pub(crate) struct Fixture {
    pub store: Arc<MemoryRelationStore>,
    pub clock: ManualClock,
    pub ctx: RelationContext<MemoryRelationStore>,
    pub authority: AuthorityResolver<MemoryRelationStore>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(RelationsConfig::default())
    }

    pub fn with_config(config: RelationsConfig) -> Self {
        let store = Arc::new(MemoryRelationStore::new());
        for (id, name, org_type) in [
            (ADVERTISER, "Acme Outdoor", OrganizationType::Advertiser),
            (OTHER_ADVERTISER, "Borealis Shoes", OrganizationType::Advertiser),
            (AFFILIATE, "Trail Reviews", OrganizationType::Affiliate),
            (AFFILIATE_B, "Summit Deals", OrganizationType::Affiliate),
            (AFFILIATE_C, "Camp Coupons", OrganizationType::Affiliate),
            (AGENCY, "Northwind Media", OrganizationType::Agency),
            (OTHER_AGENCY, "Eastgate Partners", OrganizationType::Agency),
        ] {
            store
                .insert_organization(Organization::new(id, name, org_type))
                .unwrap();
        }
        for (role, name) in [
            (Role::Admin, "Admin"),
            (Role::AdvertiserManager, "AdvertiserManager"),
            (Role::AffiliateManager, "AffiliateManager"),
            (Role::Affiliate, "Affiliate"),
            (Role::PlatformOwner, "PlatformOwner"),
        ] {
            store
                .insert_role(RoleRecord {
                    role_id: role_id(role),
                    name: name.to_string(),
                })
                .unwrap();
        }
        store
            .insert_role(RoleRecord {
                role_id: UNKNOWN_ROLE_ID,
                name: "Superuser".to_string(),
            })
            .unwrap();

        let clock = ManualClock::new(start_time());
        let ctx = RelationContext::new(Arc::new(config), store.clone())
            .with_clock(Arc::new(clock.clone()));
        let authority = AuthorityResolver::new(ctx.clone());

        Self {
            store,
            clock,
            ctx,
            authority,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    /// Seed a profile and return its id without resolving it.
    pub fn seed_user(&self, organization_id: Option<i64>, role_id: i32) -> Uuid {
        let user_id = Uuid::new_v4();
        self.store
            .insert_profile(Profile {
                user_id,
                organization_id,
                role_id,
                email: format!("{}@example.com", user_id.simple()),
            })
            .unwrap();
        user_id
    }

    pub async fn principal(&self, organization_id: Option<i64>, role: Role) -> ResolvedPrincipal {
        let user_id = self.seed_user(organization_id, role_id(role));
        self.authority
            .resolve(&RequestScope::new(user_id))
            .await
            .unwrap()
    }

    /// A manager of `org_id` with the role that grants complete authority over it.
    pub async fn manager_of(&self, org_id: i64) -> ResolvedPrincipal {
        let role = match org_id {
            AFFILIATE | AFFILIATE_B | AFFILIATE_C => Role::AffiliateManager,
            _ => Role::AdvertiserManager,
        };
        self.principal(Some(org_id), role).await
    }

    pub async fn admin(&self) -> ResolvedPrincipal {
        self.principal(None, Role::Admin).await
    }
}
