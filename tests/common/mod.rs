//! Shared harness for the integration tests.
//!
//! Provides:
//! - [`TestHarness`]: a [`Relations`] instance over a seeded
//!   [`MemoryRelationStore`] with a [`ManualClock`], plus principal helpers.
//! - [`init_tracing`]: installs an `EnvFilter` subscriber once per binary.

use std::sync::{Arc, Once};

use chrono::{DateTime, TimeZone, Utc};
use orglink::{
    ManualClock, MemoryRelationStore, Organization, OrganizationType, Profile, Relations,
    RelationsBuilder, RelationsConfig, RequestScope, ResolvedPrincipal, Role, RoleRecord,
};
use uuid::Uuid;

pub const ADVERTISER: i64 = 10;
#[allow(dead_code)]
pub const OTHER_ADVERTISER: i64 = 11;
pub const AFFILIATE: i64 = 20;
pub const AFFILIATE_B: i64 = 21;
pub const AFFILIATE_C: i64 = 22;
pub const AGENCY: i64 = 30;

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn role_id(role: Role) -> i32 {
    match role {
        Role::Admin => 1,
        Role::AdvertiserManager => 2,
        Role::AffiliateManager => 3,
        Role::Affiliate => 4,
        Role::PlatformOwner => 5,
    }
}

pub struct TestHarness {
    pub relations: Relations<MemoryRelationStore>,
    pub store: Arc<MemoryRelationStore>,
    pub clock: ManualClock,
}

impl TestHarness {
    pub fn new() -> Self {
        init_tracing();

        let store = Arc::new(MemoryRelationStore::new());
        for (id, name, org_type) in [
            (ADVERTISER, "Acme Outdoor", OrganizationType::Advertiser),
            (OTHER_ADVERTISER, "Borealis Shoes", OrganizationType::Advertiser),
            (AFFILIATE, "Trail Reviews", OrganizationType::Affiliate),
            (AFFILIATE_B, "Summit Deals", OrganizationType::Affiliate),
            (AFFILIATE_C, "Camp Coupons", OrganizationType::Affiliate),
            (AGENCY, "Northwind Media", OrganizationType::Agency),
        ] {
            store
                .insert_organization(Organization::new(id, name, org_type))
                .unwrap();
        }
        for role in [
            Role::Admin,
            Role::AdvertiserManager,
            Role::AffiliateManager,
            Role::Affiliate,
            Role::PlatformOwner,
        ] {
            store
                .insert_role(RoleRecord {
                    role_id: role_id(role),
                    name: role.to_string(),
                })
                .unwrap();
        }

        let clock = ManualClock::new(start_time());
        let relations = RelationsBuilder::new(RelationsConfig::new("https://partners.example.com"))
            .shared_database(store.clone())
            .clock(clock.clone())
            .build()
            .expect("test config is valid");

        Self {
            relations,
            store,
            clock,
        }
    }

    #[allow(dead_code)]
    pub fn now(&self) -> DateTime<Utc> {
        use orglink::Clock;
        self.clock.now()
    }

    pub async fn principal(&self, organization_id: Option<i64>, role: Role) -> ResolvedPrincipal {
        let user_id = Uuid::new_v4();
        self.store
            .insert_profile(Profile {
                user_id,
                organization_id,
                role_id: role_id(role),
                email: format!("{}@example.com", user_id.simple()),
            })
            .unwrap();
        self.relations
            .resolve(&RequestScope::new(user_id).with_correlation_id(format!("test-{}", user_id.simple())))
            .await
            .unwrap()
    }

    /// A manager holding complete direct authority over `org_id`.
    pub async fn manager_of(&self, org_id: i64) -> ResolvedPrincipal {
        let role = match org_id {
            AFFILIATE | AFFILIATE_B | AFFILIATE_C => Role::AffiliateManager,
            _ => Role::AdvertiserManager,
        };
        self.principal(Some(org_id), role).await
    }

    #[allow(dead_code)]
    pub async fn admin(&self) -> ResolvedPrincipal {
        self.principal(None, Role::Admin).await
    }
}
