pub use super::traits::{AssociationOps, DelegationOps, DirectoryOps, InvitationOps};

/// Store trait for the relationship engines.
///
/// Combines all entity-specific operation traits. Any type that implements
/// all sub-traits automatically implements `RelationStore` via the blanket
/// impl.
pub trait RelationStore: DirectoryOps + AssociationOps + DelegationOps + InvitationOps {}

impl<T> RelationStore for T where T: DirectoryOps + AssociationOps + DelegationOps + InvitationOps {}

#[cfg(feature = "sqlx-postgres")]
pub mod sqlx_adapter {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
    use uuid::Uuid;

    use crate::error::{RelationError, RelationResult};
    use crate::types::{
        AdvertiserAssociationInvitation, AgencyDelegation, AssociationFilter, AssociationSide,
        AssociationStatus, AssociationType, AssociationUpdate, CreateAssociation,
        CreateDelegation, CreateInvitation, CreateUsageLog, DelegationFilter, DelegationStatus,
        DelegationUpdate, InvitationFilter, InvitationStatus, InvitationUpdate,
        InvitationUsageLog, Organization, OrganizationAssociation, Profile, Redemption,
        RedemptionOutcome, RoleRecord, UsageFailureReason,
    };

    /// Schema for the four relationship tables and their partial unique indexes.
    ///
    /// `organizations`, `profiles` and `roles` belong to other services and are
    /// only read.
    pub const SCHEMA: &str = include_str!("../../migrations/0001_relationships.sql");

    const INVITATION_EXPIRED: &str = "(status = 'active' AND ((expires_at IS NOT NULL AND expires_at <= $NOW) OR (max_uses IS NOT NULL AND usage_count >= max_uses)))";

    /// PostgreSQL store via SQLx.
    pub struct SqlxRelationStore {
        pool: PgPool,
    }

    impl SqlxRelationStore {
        pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
            let pool = PgPool::connect(database_url).await?;
            Ok(Self { pool })
        }

        pub async fn with_config(
            database_url: &str,
            config: PoolConfig,
        ) -> Result<Self, sqlx::Error> {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(config.acquire_timeout)
                .idle_timeout(config.idle_timeout)
                .max_lifetime(config.max_lifetime)
                .connect(database_url)
                .await?;
            Ok(Self { pool })
        }

        pub fn from_pool(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Create the relationship tables if they do not exist.
        pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
            sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
            Ok(())
        }

        pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        }

        pub fn pool_stats(&self) -> PoolStats {
            PoolStats {
                size: self.pool.size(),
                idle: self.pool.num_idle(),
            }
        }

        pub async fn close(&self) {
            self.pool.close().await;
        }
    }

    #[derive(Debug, Clone)]
    pub struct PoolConfig {
        pub max_connections: u32,
        pub min_connections: u32,
        pub acquire_timeout: std::time::Duration,
        pub idle_timeout: Option<std::time::Duration>,
        pub max_lifetime: Option<std::time::Duration>,
    }

    impl Default for PoolConfig {
        fn default() -> Self {
            Self {
                max_connections: 10,
                min_connections: 0,
                acquire_timeout: std::time::Duration::from_secs(30),
                idle_timeout: Some(std::time::Duration::from_secs(600)),
                max_lifetime: Some(std::time::Duration::from_secs(1800)),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub struct PoolStats {
        pub size: u32,
        pub idle: usize,
    }

    /// Map a unique violation to `Conflict`, anything else to a store error.
    fn unique_conflict(message: &'static str) -> impl FnOnce(sqlx::Error) -> RelationError {
        move |err| {
            if let sqlx::Error::Database(db_err) = &err
                && db_err.is_unique_violation()
            {
                return RelationError::conflict(message);
            }
            RelationError::from(err)
        }
    }

    /// `max_uses` as stored in the INTEGER column.
    fn max_uses_column(max_uses: Option<u32>) -> RelationResult<Option<i32>> {
        max_uses
            .map(|m| {
                i32::try_from(m)
                    .map_err(|_| RelationError::invalid_input("maxUses is out of range"))
            })
            .transpose()
    }

    async fn insert_association<'c, E: PgExecutor<'c>>(
        executor: E,
        create: &CreateAssociation,
    ) -> RelationResult<OrganizationAssociation> {
        sqlx::query_as::<_, OrganizationAssociation>(
            r#"
            INSERT INTO organization_associations (
                advertiser_org_id, affiliate_org_id, association_type, status,
                visible_to_advertiser, visible_to_affiliate, all_affiliates_visible,
                visible_affiliate_ids, all_campaigns_visible, visible_campaign_ids, message,
                created_by_user_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            RETURNING *
            "#,
        )
        .bind(create.advertiser_org_id)
        .bind(create.affiliate_org_id)
        .bind(create.association_type.to_string())
        .bind(create.visible_to_advertiser)
        .bind(create.visible_to_affiliate)
        .bind(create.all_affiliates_visible)
        .bind(&create.visible_affiliate_ids)
        .bind(create.all_campaigns_visible)
        .bind(&create.visible_campaign_ids)
        .bind(&create.message)
        .bind(create.created_by_user_id)
        .bind(create.created_at)
        .fetch_one(executor)
        .await
        .map_err(unique_conflict(
            "An association between these organizations already exists",
        ))
    }

    async fn insert_usage_log<'c, E: PgExecutor<'c>>(
        executor: E,
        log: &CreateUsageLog,
    ) -> RelationResult<InvitationUsageLog> {
        let row = sqlx::query_as::<_, InvitationUsageLog>(
            r#"
            INSERT INTO invitation_usage_logs (
                invitation_id, consumed_by_user_id, consumed_by_affiliate_org_id,
                resulting_association_id, ip_address, user_agent, outcome,
                failure_reason, consumed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(log.invitation_id)
        .bind(log.consumed_by_user_id)
        .bind(log.consumed_by_affiliate_org_id)
        .bind(log.resulting_association_id)
        .bind(&log.ip_address)
        .bind(&log.user_agent)
        .bind(log.outcome.to_string())
        .bind(log.failure_reason.map(|r| r.as_str()))
        .bind(log.consumed_at)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    // -- DirectoryOps --

    #[async_trait]
    impl DirectoryOps for SqlxRelationStore {
        async fn get_organization(&self, id: i64) -> RelationResult<Option<Organization>> {
            let org = sqlx::query_as::<_, Organization>(
                "SELECT id, name, type FROM organizations WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(org)
        }

        async fn get_profile(&self, user_id: Uuid) -> RelationResult<Option<Profile>> {
            let profile = sqlx::query_as::<_, Profile>(
                "SELECT user_id, organization_id, role_id, email FROM profiles WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(profile)
        }

        async fn get_role(&self, role_id: i32) -> RelationResult<Option<RoleRecord>> {
            let role = sqlx::query_as::<_, RoleRecord>(
                "SELECT role_id, name FROM roles WHERE role_id = $1",
            )
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(role)
        }
    }

    // -- AssociationOps --

    #[async_trait]
    impl AssociationOps for SqlxRelationStore {
        async fn create_association(
            &self,
            association: CreateAssociation,
        ) -> RelationResult<OrganizationAssociation> {
            insert_association(&self.pool, &association).await
        }

        async fn get_association(
            &self,
            id: i64,
        ) -> RelationResult<Option<OrganizationAssociation>> {
            let association = sqlx::query_as::<_, OrganizationAssociation>(
                "SELECT * FROM organization_associations WHERE association_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(association)
        }

        async fn get_open_association(
            &self,
            advertiser_org_id: i64,
            affiliate_org_id: i64,
        ) -> RelationResult<Option<OrganizationAssociation>> {
            let association = sqlx::query_as::<_, OrganizationAssociation>(
                r#"
                SELECT * FROM organization_associations
                WHERE advertiser_org_id = $1 AND affiliate_org_id = $2 AND status <> 'rejected'
                "#,
            )
            .bind(advertiser_org_id)
            .bind(affiliate_org_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(association)
        }

        async fn update_association(
            &self,
            id: i64,
            expected: AssociationStatus,
            update: AssociationUpdate,
        ) -> RelationResult<OrganizationAssociation> {
            let mut query = QueryBuilder::<Postgres>::new(
                "UPDATE organization_associations SET updated_at = GREATEST(",
            );
            query.push_bind(update.updated_at);
            query.push(", updated_at + INTERVAL '1 microsecond'), updated_by_user_id = ");
            query.push_bind(update.updated_by_user_id);

            if let Some(status) = update.status {
                query.push(", status = ");
                query.push_bind(status.to_string());
            }
            if let Some(visible) = update.visible_to_advertiser {
                query.push(", visible_to_advertiser = ");
                query.push_bind(visible);
            }
            if let Some(visible) = update.visible_to_affiliate {
                query.push(", visible_to_affiliate = ");
                query.push_bind(visible);
            }
            if let Some(all) = update.all_affiliates_visible {
                query.push(", all_affiliates_visible = ");
                query.push_bind(all);
            }
            if let Some(ids) = &update.visible_affiliate_ids {
                query.push(", visible_affiliate_ids = ");
                query.push_bind(ids.clone());
            }
            if let Some(all) = update.all_campaigns_visible {
                query.push(", all_campaigns_visible = ");
                query.push_bind(all);
            }
            if let Some(ids) = &update.visible_campaign_ids {
                query.push(", visible_campaign_ids = ");
                query.push_bind(ids.clone());
            }
            if let Some(user) = update.approved_by_user_id {
                query.push(", approved_by_user_id = ");
                query.push_bind(user);
                query.push(", approved_at = ");
                query.push_bind(update.updated_at);
            }
            if let Some(org) = update.suspended_by_org_id {
                query.push(", suspended_by_org_id = ");
                query.push_bind(org);
            }

            query.push(" WHERE association_id = ");
            query.push_bind(id);
            query.push(" AND status = ");
            query.push_bind(expected.to_string());
            query.push(" RETURNING *");

            let updated = query
                .build_query_as::<OrganizationAssociation>()
                .fetch_optional(&self.pool)
                .await?;
            match updated {
                Some(association) => Ok(association),
                None => match self.get_association(id).await? {
                    Some(current) => Err(RelationError::association_transition(
                        current.status,
                        "update",
                    )),
                    None => Err(RelationError::not_found("Association not found")),
                },
            }
        }

        async fn list_associations(
            &self,
            filter: &AssociationFilter,
        ) -> RelationResult<Vec<OrganizationAssociation>> {
            let mut query =
                QueryBuilder::<Postgres>::new("SELECT * FROM organization_associations WHERE TRUE");
            if let Some(id) = filter.advertiser_org_id {
                query.push(" AND advertiser_org_id = ");
                query.push_bind(id);
            }
            if let Some(id) = filter.affiliate_org_id {
                query.push(" AND affiliate_org_id = ");
                query.push_bind(id);
            }
            if let Some(status) = filter.status {
                query.push(" AND status = ");
                query.push_bind(status.to_string());
            }
            if let Some(kind) = filter.association_type {
                query.push(" AND association_type = ");
                query.push_bind(kind.to_string());
            }
            if let Some(cursor) = filter.cursor {
                query.push(" AND (updated_at, association_id) < (");
                query.push_bind(cursor.updated_at);
                query.push(", ");
                query.push_bind(cursor.association_id);
                query.push(")");
            }
            query.push(" ORDER BY updated_at DESC, association_id DESC LIMIT ");
            query.push_bind(i64::from(filter.limit));
            query.push(" OFFSET ");
            query.push_bind(i64::from(filter.offset));

            let associations = query
                .build_query_as::<OrganizationAssociation>()
                .fetch_all(&self.pool)
                .await?;
            Ok(associations)
        }

        async fn active_associations_for(
            &self,
            side: AssociationSide,
            org_id: i64,
        ) -> RelationResult<Vec<OrganizationAssociation>> {
            let sql = match side {
                AssociationSide::Advertiser => {
                    "SELECT * FROM organization_associations WHERE advertiser_org_id = $1 AND status = 'active'"
                }
                AssociationSide::Affiliate => {
                    "SELECT * FROM organization_associations WHERE affiliate_org_id = $1 AND status = 'active'"
                }
            };
            let associations = sqlx::query_as::<_, OrganizationAssociation>(sql)
                .bind(org_id)
                .fetch_all(&self.pool)
                .await?;
            Ok(associations)
        }
    }

    // -- DelegationOps --

    #[async_trait]
    impl DelegationOps for SqlxRelationStore {
        async fn create_delegation(
            &self,
            delegation: CreateDelegation,
        ) -> RelationResult<AgencyDelegation> {
            sqlx::query_as::<_, AgencyDelegation>(
                r#"
                INSERT INTO agency_delegations (
                    agency_org_id, advertiser_org_id, status, permissions, expires_at,
                    message, created_by_user_id, created_at, updated_at
                )
                VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $7)
                RETURNING *
                "#,
            )
            .bind(delegation.agency_org_id)
            .bind(delegation.advertiser_org_id)
            .bind(delegation.permissions.to_strings())
            .bind(delegation.expires_at)
            .bind(&delegation.message)
            .bind(delegation.created_by_user_id)
            .bind(delegation.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(unique_conflict(
                "A delegation between these organizations already exists",
            ))
        }

        async fn get_delegation(&self, id: i64) -> RelationResult<Option<AgencyDelegation>> {
            let delegation = sqlx::query_as::<_, AgencyDelegation>(
                "SELECT * FROM agency_delegations WHERE delegation_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(delegation)
        }

        async fn get_open_delegation(
            &self,
            agency_org_id: i64,
            advertiser_org_id: i64,
        ) -> RelationResult<Option<AgencyDelegation>> {
            let delegation = sqlx::query_as::<_, AgencyDelegation>(
                r#"
                SELECT * FROM agency_delegations
                WHERE agency_org_id = $1 AND advertiser_org_id = $2 AND status <> 'revoked'
                "#,
            )
            .bind(agency_org_id)
            .bind(advertiser_org_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(delegation)
        }

        async fn update_delegation(
            &self,
            id: i64,
            expected: DelegationStatus,
            update: DelegationUpdate,
        ) -> RelationResult<AgencyDelegation> {
            let mut query = QueryBuilder::<Postgres>::new(
                "UPDATE agency_delegations SET updated_at = GREATEST(",
            );
            query.push_bind(update.updated_at);
            query.push(", updated_at + INTERVAL '1 microsecond'), updated_by_user_id = ");
            query.push_bind(update.updated_by_user_id);

            if let Some(status) = update.status {
                query.push(", status = ");
                query.push_bind(status.to_string());
            }
            if let Some(permissions) = update.permissions {
                query.push(", permissions = ");
                query.push_bind(permissions.to_strings());
            }
            if let Some(expires_at) = update.expires_at {
                query.push(", expires_at = ");
                query.push_bind(expires_at);
            }
            if let Some(user) = update.accepted_by_user_id {
                query.push(", accepted_by_user_id = ");
                query.push_bind(user);
                query.push(", accepted_at = ");
                query.push_bind(update.updated_at);
            }

            query.push(" WHERE delegation_id = ");
            query.push_bind(id);
            query.push(" AND status = ");
            query.push_bind(expected.to_string());
            query.push(" RETURNING *");

            let updated = query
                .build_query_as::<AgencyDelegation>()
                .fetch_optional(&self.pool)
                .await?;
            match updated {
                Some(delegation) => Ok(delegation),
                None => match self.get_delegation(id).await? {
                    Some(current) => Err(RelationError::delegation_transition(
                        current.status,
                        "update",
                    )),
                    None => Err(RelationError::not_found("Delegation not found")),
                },
            }
        }

        async fn list_delegations(
            &self,
            filter: &DelegationFilter,
        ) -> RelationResult<Vec<AgencyDelegation>> {
            let mut query =
                QueryBuilder::<Postgres>::new("SELECT * FROM agency_delegations WHERE TRUE");
            if let Some(id) = filter.agency_org_id {
                query.push(" AND agency_org_id = ");
                query.push_bind(id);
            }
            if let Some(id) = filter.advertiser_org_id {
                query.push(" AND advertiser_org_id = ");
                query.push_bind(id);
            }
            if let Some(status) = filter.status {
                query.push(" AND status = ");
                query.push_bind(status.to_string());
            }
            if let Some(now) = filter.active_at {
                query.push(" AND (expires_at IS NULL OR expires_at > ");
                query.push_bind(now);
                query.push(")");
            }
            query.push(" ORDER BY created_at DESC, delegation_id DESC LIMIT ");
            query.push_bind(i64::from(filter.limit));
            query.push(" OFFSET ");
            query.push_bind(i64::from(filter.offset));

            let delegations = query
                .build_query_as::<AgencyDelegation>()
                .fetch_all(&self.pool)
                .await?;
            Ok(delegations)
        }

        async fn expire_delegations(&self, now: DateTime<Utc>) -> RelationResult<usize> {
            let result = sqlx::query(
                r#"
                UPDATE agency_delegations
                SET status = 'revoked', updated_at = GREATEST($1, updated_at + INTERVAL '1 microsecond')
                WHERE status <> 'revoked' AND expires_at IS NOT NULL AND expires_at <= $1
                "#,
            )
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() as usize)
        }
    }

    // -- InvitationOps --

    #[async_trait]
    impl InvitationOps for SqlxRelationStore {
        async fn create_invitation(
            &self,
            invitation: CreateInvitation,
        ) -> RelationResult<AdvertiserAssociationInvitation> {
            sqlx::query_as::<_, AdvertiserAssociationInvitation>(
                r#"
                INSERT INTO advertiser_association_invitations (
                    advertiser_org_id, name, description, token, status, expires_at,
                    max_uses, usage_count, default_message, allowed_affiliate_org_ids,
                    created_by_user_id, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, 'active', $5, $6, 0, $7, $8, $9, $10, $10)
                RETURNING *
                "#,
            )
            .bind(invitation.advertiser_org_id)
            .bind(&invitation.name)
            .bind(&invitation.description)
            .bind(&invitation.token)
            .bind(invitation.expires_at)
            .bind(max_uses_column(invitation.max_uses)?)
            .bind(&invitation.default_message)
            .bind(&invitation.allowed_affiliate_org_ids)
            .bind(invitation.created_by_user_id)
            .bind(invitation.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(unique_conflict("Invitation token already in use"))
        }

        async fn get_invitation(
            &self,
            id: i64,
        ) -> RelationResult<Option<AdvertiserAssociationInvitation>> {
            let invitation = sqlx::query_as::<_, AdvertiserAssociationInvitation>(
                "SELECT * FROM advertiser_association_invitations WHERE invitation_id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(invitation)
        }

        async fn get_invitation_by_token(
            &self,
            token: &str,
        ) -> RelationResult<Option<AdvertiserAssociationInvitation>> {
            let invitation = sqlx::query_as::<_, AdvertiserAssociationInvitation>(
                "SELECT * FROM advertiser_association_invitations WHERE token = $1",
            )
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
            Ok(invitation)
        }

        async fn update_invitation(
            &self,
            id: i64,
            update: InvitationUpdate,
        ) -> RelationResult<AdvertiserAssociationInvitation> {
            let mut tx = self.pool.begin().await?;

            // The cap and re-enable checks need the usage count as of the
            // write, so the row stays locked until commit.
            let current = sqlx::query_as::<_, AdvertiserAssociationInvitation>(
                "SELECT * FROM advertiser_association_invitations WHERE invitation_id = $1 FOR UPDATE",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RelationError::not_found("Invitation not found"))?;
            current.updated(&update)?;

            let mut query = QueryBuilder::<Postgres>::new(
                "UPDATE advertiser_association_invitations SET updated_at = GREATEST(",
            );
            query.push_bind(update.updated_at);
            query.push(", updated_at + INTERVAL '1 microsecond')");

            if let Some(name) = &update.name {
                query.push(", name = ");
                query.push_bind(name.clone());
            }
            if let Some(description) = &update.description {
                query.push(", description = ");
                query.push_bind(description.clone());
            }
            if let Some(message) = &update.default_message {
                query.push(", default_message = ");
                query.push_bind(message.clone());
            }
            if let Some(expires_at) = update.expires_at {
                query.push(", expires_at = ");
                query.push_bind(expires_at);
            }
            if let Some(max_uses) = update.max_uses {
                query.push(", max_uses = ");
                query.push_bind(max_uses_column(max_uses)?);
            }
            if let Some(ids) = &update.allowed_affiliate_org_ids {
                query.push(", allowed_affiliate_org_ids = ");
                query.push_bind(ids.clone());
            }
            if let Some(status) = update.status {
                query.push(", status = ");
                query.push_bind(status.to_string());
            }

            query.push(" WHERE invitation_id = ");
            query.push_bind(id);
            query.push(" RETURNING *");

            let updated = query
                .build_query_as::<AdvertiserAssociationInvitation>()
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(updated)
        }

        async fn delete_invitation(&self, id: i64) -> RelationResult<()> {
            let result = sqlx::query(
                "DELETE FROM advertiser_association_invitations WHERE invitation_id = $1",
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Err(RelationError::not_found("Invitation not found"));
            }
            Ok(())
        }

        async fn list_invitations(
            &self,
            filter: &InvitationFilter,
        ) -> RelationResult<Vec<AdvertiserAssociationInvitation>> {
            let mut query = QueryBuilder::<Postgres>::new(
                "SELECT * FROM advertiser_association_invitations WHERE TRUE",
            );
            if let Some(id) = filter.advertiser_org_id {
                query.push(" AND advertiser_org_id = ");
                query.push_bind(id);
            }
            if let Some(user) = filter.created_by_user_id {
                query.push(" AND created_by_user_id = ");
                query.push_bind(user);
            }

            // Effective status is derived, so the predicate is spelled out
            // against the stored columns with `now` bound in.
            let push_expired = |query: &mut QueryBuilder<'_, Postgres>| {
                let mut parts = INVITATION_EXPIRED.split("$NOW");
                if let Some(head) = parts.next() {
                    query.push(head);
                }
                for tail in parts {
                    query.push_bind(filter.now);
                    query.push(tail);
                }
            };
            match filter.status {
                Some(InvitationStatus::Expired) => {
                    query.push(" AND ");
                    push_expired(&mut query);
                }
                Some(InvitationStatus::Disabled) => {
                    query.push(" AND status = 'disabled'");
                }
                Some(InvitationStatus::Active) => {
                    query.push(" AND status = 'active' AND NOT ");
                    push_expired(&mut query);
                }
                None if !filter.include_expired => {
                    query.push(" AND NOT ");
                    push_expired(&mut query);
                }
                None => {}
            }

            query.push(" ORDER BY created_at DESC, invitation_id DESC LIMIT ");
            query.push_bind(i64::from(filter.limit));
            query.push(" OFFSET ");
            query.push_bind(i64::from(filter.offset));

            let invitations = query
                .build_query_as::<AdvertiserAssociationInvitation>()
                .fetch_all(&self.pool)
                .await?;
            Ok(invitations)
        }

        async fn append_usage_log(
            &self,
            log: CreateUsageLog,
        ) -> RelationResult<InvitationUsageLog> {
            insert_usage_log(&self.pool, &log).await
        }

        async fn list_usage_logs(
            &self,
            invitation_id: i64,
            limit: u32,
        ) -> RelationResult<Vec<InvitationUsageLog>> {
            let logs = sqlx::query_as::<_, InvitationUsageLog>(
                r#"
                SELECT * FROM invitation_usage_logs
                WHERE invitation_id = $1
                ORDER BY consumed_at DESC, log_id DESC
                LIMIT $2
                "#,
            )
            .bind(invitation_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(logs)
        }

        async fn redeem_invitation(
            &self,
            redemption: Redemption,
        ) -> RelationResult<RedemptionOutcome> {
            let mut tx = self.pool.begin().await?;

            let invitation = sqlx::query_as::<_, AdvertiserAssociationInvitation>(
                "SELECT * FROM advertiser_association_invitations WHERE token = $1 FOR UPDATE",
            )
            .bind(&redemption.token)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(invitation) = invitation else {
                let reason = UsageFailureReason::InvitationNotFound;
                insert_usage_log(&mut *tx, &redemption.log(None, None, Some(reason))).await?;
                tx.commit().await?;
                return Ok(RedemptionOutcome::Refused {
                    invitation_id: None,
                    reason,
                });
            };
            let invitation_id = invitation.invitation_id;

            let refusal = invitation.unavailable_reason(redemption.now).or_else(|| {
                (!invitation.allows_affiliate(redemption.affiliate_org_id))
                    .then_some(UsageFailureReason::ForbiddenTarget)
            });
            if let Some(reason) = refusal {
                insert_usage_log(
                    &mut *tx,
                    &redemption.log(Some(invitation_id), None, Some(reason)),
                )
                .await?;
                tx.commit().await?;
                return Ok(RedemptionOutcome::Refused {
                    invitation_id: Some(invitation_id),
                    reason,
                });
            }

            let existing = sqlx::query_as::<_, OrganizationAssociation>(
                r#"
                SELECT * FROM organization_associations
                WHERE advertiser_org_id = $1 AND affiliate_org_id = $2 AND status <> 'rejected'
                FOR UPDATE
                "#,
            )
            .bind(invitation.advertiser_org_id)
            .bind(redemption.affiliate_org_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (association, reason) = match existing {
                Some(existing) => (existing, Some(UsageFailureReason::AlreadyAssociated)),
                None => {
                    let created = insert_association(
                        &mut *tx,
                        &CreateAssociation {
                            advertiser_org_id: invitation.advertiser_org_id,
                            affiliate_org_id: redemption.affiliate_org_id,
                            association_type: AssociationType::Request,
                            message: invitation.default_message.clone(),
                            visible_to_advertiser: true,
                            visible_to_affiliate: true,
                            all_affiliates_visible: true,
                            visible_affiliate_ids: None,
                            all_campaigns_visible: true,
                            visible_campaign_ids: None,
                            created_by_user_id: redemption.consuming_user_id,
                            created_at: redemption.now,
                        },
                    )
                    .await?;
                    (created, None)
                }
            };

            let invitation = sqlx::query_as::<_, AdvertiserAssociationInvitation>(
                r#"
                UPDATE advertiser_association_invitations
                SET usage_count = usage_count + 1,
                    updated_at = GREATEST($2, updated_at + INTERVAL '1 microsecond')
                WHERE invitation_id = $1 AND (max_uses IS NULL OR usage_count < max_uses)
                RETURNING *
                "#,
            )
            .bind(invitation_id)
            .bind(redemption.now)
            .fetch_optional(&mut *tx)
            .await?;
            // Dropping `tx` here rolls back the association insert.
            let Some(invitation) = invitation else {
                return Err(RelationError::gone("Invitation has reached its usage limit"));
            };

            insert_usage_log(
                &mut *tx,
                &redemption.log(
                    Some(invitation_id),
                    Some(association.association_id),
                    reason,
                ),
            )
            .await?;
            tx.commit().await?;

            Ok(match reason {
                None => RedemptionOutcome::Created {
                    association,
                    invitation,
                },
                Some(_) => RedemptionOutcome::AlreadyAssociated {
                    association,
                    invitation,
                },
            })
        }
    }

}
