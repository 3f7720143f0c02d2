use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{RelationError, RelationResult};
use crate::token::token_digest;
use crate::types::{
    AdvertiserAssociationInvitation, AgencyDelegation, AssociationFilter, AssociationSide,
    AssociationStatus, AssociationType, AssociationUpdate, CreateAssociation, CreateDelegation,
    CreateInvitation, CreateUsageLog, DelegationFilter, DelegationStatus, DelegationUpdate,
    InvitationFilter, InvitationUpdate, InvitationUsageLog, Organization, OrganizationAssociation,
    Profile, Redemption, RedemptionOutcome, RoleRecord, UsageFailureReason,
};

use super::traits::{AssociationOps, DelegationOps, DirectoryOps, InvitationOps};

#[derive(Default)]
struct Directory {
    organizations: HashMap<i64, Organization>,
    profiles: HashMap<Uuid, Profile>,
    roles: HashMap<i32, RoleRecord>,
}

/// Relationship tables. Every mutation happens under one guard, so each
/// store call is a serialisable transaction.
#[derive(Default)]
struct Tables {
    associations: BTreeMap<i64, OrganizationAssociation>,
    delegations: BTreeMap<i64, AgencyDelegation>,
    invitations: BTreeMap<i64, AdvertiserAssociationInvitation>,
    usage_logs: BTreeMap<i64, InvitationUsageLog>,
    /// token digest -> invitation id
    token_index: HashMap<String, i64>,
    next_association_id: i64,
    next_delegation_id: i64,
    next_invitation_id: i64,
    next_log_id: i64,
}

impl Tables {
    fn next_id(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }

    fn open_association(&self, advertiser: i64, affiliate: i64) -> Option<&OrganizationAssociation> {
        self.associations.values().find(|a| {
            a.advertiser_org_id == advertiser && a.affiliate_org_id == affiliate && a.is_open()
        })
    }

    fn open_delegation(&self, agency: i64, advertiser: i64) -> Option<&AgencyDelegation> {
        self.delegations.values().find(|d| {
            d.agency_org_id == agency && d.advertiser_org_id == advertiser && d.is_open()
        })
    }

    fn insert_association(&mut self, create: &CreateAssociation) -> RelationResult<OrganizationAssociation> {
        if self
            .open_association(create.advertiser_org_id, create.affiliate_org_id)
            .is_some()
        {
            return Err(RelationError::conflict(
                "An association between these organizations already exists",
            ));
        }
        let id = Self::next_id(&mut self.next_association_id);
        let association = OrganizationAssociation::from_create(id, create);
        self.associations.insert(id, association.clone());
        Ok(association)
    }

    fn insert_log(&mut self, create: &CreateUsageLog) -> InvitationUsageLog {
        let id = Self::next_id(&mut self.next_log_id);
        let log = InvitationUsageLog::from_create(id, create);
        self.usage_logs.insert(id, log.clone());
        log
    }
}

/// In-memory store for tests and single-process deployments.
///
/// Directory data (organizations, profiles, roles) is seeded by the host with
/// the `insert_*` helpers.
#[derive(Clone, Default)]
pub struct MemoryRelationStore {
    directory: Arc<Mutex<Directory>>,
    tables: Arc<Mutex<Tables>>,
}

impl MemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn directory(&self) -> RelationResult<MutexGuard<'_, Directory>> {
        self.directory
            .lock()
            .map_err(|_| RelationError::internal("directory lock poisoned"))
    }

    fn tables(&self) -> RelationResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| RelationError::internal("relation tables lock poisoned"))
    }

    pub fn insert_organization(&self, organization: Organization) -> RelationResult<()> {
        self.directory()?
            .organizations
            .insert(organization.id, organization);
        Ok(())
    }

    pub fn insert_role(&self, role: RoleRecord) -> RelationResult<()> {
        self.directory()?.roles.insert(role.role_id, role);
        Ok(())
    }

    pub fn insert_profile(&self, profile: Profile) -> RelationResult<()> {
        self.directory()?.profiles.insert(profile.user_id, profile);
        Ok(())
    }

    /// All usage logs, oldest first. Includes logs for unknown tokens.
    pub fn all_usage_logs(&self) -> RelationResult<Vec<InvitationUsageLog>> {
        Ok(self.tables()?.usage_logs.values().cloned().collect())
    }

    /// All associations, in id order.
    pub fn all_associations(&self) -> RelationResult<Vec<OrganizationAssociation>> {
        Ok(self.tables()?.associations.values().cloned().collect())
    }
}

fn page<T>(items: impl Iterator<Item = T>, offset: u32, limit: u32) -> Vec<T> {
    items.skip(offset as usize).take(limit as usize).collect()
}

#[async_trait]
impl DirectoryOps for MemoryRelationStore {
    async fn get_organization(&self, id: i64) -> RelationResult<Option<Organization>> {
        Ok(self.directory()?.organizations.get(&id).cloned())
    }

    async fn get_profile(&self, user_id: Uuid) -> RelationResult<Option<Profile>> {
        Ok(self.directory()?.profiles.get(&user_id).cloned())
    }

    async fn get_role(&self, role_id: i32) -> RelationResult<Option<RoleRecord>> {
        Ok(self.directory()?.roles.get(&role_id).cloned())
    }
}

#[async_trait]
impl AssociationOps for MemoryRelationStore {
    async fn create_association(
        &self,
        association: CreateAssociation,
    ) -> RelationResult<OrganizationAssociation> {
        self.tables()?.insert_association(&association)
    }

    async fn get_association(&self, id: i64) -> RelationResult<Option<OrganizationAssociation>> {
        Ok(self.tables()?.associations.get(&id).cloned())
    }

    async fn get_open_association(
        &self,
        advertiser_org_id: i64,
        affiliate_org_id: i64,
    ) -> RelationResult<Option<OrganizationAssociation>> {
        Ok(self
            .tables()?
            .open_association(advertiser_org_id, affiliate_org_id)
            .cloned())
    }

    async fn update_association(
        &self,
        id: i64,
        expected: AssociationStatus,
        update: AssociationUpdate,
    ) -> RelationResult<OrganizationAssociation> {
        let mut tables = self.tables()?;
        let association = tables
            .associations
            .get_mut(&id)
            .ok_or_else(|| RelationError::not_found("Association not found"))?;
        if association.status != expected {
            return Err(RelationError::association_transition(
                association.status,
                "update",
            ));
        }
        association.apply_update(&update);
        Ok(association.clone())
    }

    async fn list_associations(
        &self,
        filter: &AssociationFilter,
    ) -> RelationResult<Vec<OrganizationAssociation>> {
        let tables = self.tables()?;
        let mut matching: Vec<&OrganizationAssociation> = tables
            .associations
            .values()
            .filter(|a| filter.matches(a))
            .collect();
        matching.sort_by(|a, b| {
            (b.updated_at, b.association_id).cmp(&(a.updated_at, a.association_id))
        });
        Ok(page(matching.into_iter().cloned(), filter.offset, filter.limit))
    }

    async fn active_associations_for(
        &self,
        side: AssociationSide,
        org_id: i64,
    ) -> RelationResult<Vec<OrganizationAssociation>> {
        Ok(self
            .tables()?
            .associations
            .values()
            .filter(|a| a.status == AssociationStatus::Active && a.org_for(side) == org_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DelegationOps for MemoryRelationStore {
    async fn create_delegation(
        &self,
        delegation: CreateDelegation,
    ) -> RelationResult<AgencyDelegation> {
        let mut tables = self.tables()?;
        if tables
            .open_delegation(delegation.agency_org_id, delegation.advertiser_org_id)
            .is_some()
        {
            return Err(RelationError::conflict(
                "A delegation between these organizations already exists",
            ));
        }
        let id = Tables::next_id(&mut tables.next_delegation_id);
        let created = AgencyDelegation::from_create(id, &delegation);
        tables.delegations.insert(id, created.clone());
        Ok(created)
    }

    async fn get_delegation(&self, id: i64) -> RelationResult<Option<AgencyDelegation>> {
        Ok(self.tables()?.delegations.get(&id).cloned())
    }

    async fn get_open_delegation(
        &self,
        agency_org_id: i64,
        advertiser_org_id: i64,
    ) -> RelationResult<Option<AgencyDelegation>> {
        Ok(self
            .tables()?
            .open_delegation(agency_org_id, advertiser_org_id)
            .cloned())
    }

    async fn update_delegation(
        &self,
        id: i64,
        expected: DelegationStatus,
        update: DelegationUpdate,
    ) -> RelationResult<AgencyDelegation> {
        let mut tables = self.tables()?;
        let delegation = tables
            .delegations
            .get_mut(&id)
            .ok_or_else(|| RelationError::not_found("Delegation not found"))?;
        if delegation.status != expected {
            return Err(RelationError::delegation_transition(
                delegation.status,
                "update",
            ));
        }
        delegation.apply_update(&update);
        Ok(delegation.clone())
    }

    async fn list_delegations(
        &self,
        filter: &DelegationFilter,
    ) -> RelationResult<Vec<AgencyDelegation>> {
        let tables = self.tables()?;
        let mut matching: Vec<&AgencyDelegation> = tables
            .delegations
            .values()
            .filter(|d| filter.matches(d))
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.delegation_id).cmp(&(a.created_at, a.delegation_id)));
        Ok(page(matching.into_iter().cloned(), filter.offset, filter.limit))
    }

    async fn expire_delegations(&self, now: DateTime<Utc>) -> RelationResult<usize> {
        let mut tables = self.tables()?;
        let mut count = 0;
        for delegation in tables.delegations.values_mut() {
            if delegation.is_open() && delegation.is_expired(now) {
                delegation.status = DelegationStatus::Revoked;
                delegation.updated_at = crate::types::next_timestamp(delegation.updated_at, now);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl InvitationOps for MemoryRelationStore {
    async fn create_invitation(
        &self,
        invitation: CreateInvitation,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        let mut tables = self.tables()?;
        let digest = token_digest(&invitation.token);
        if tables.token_index.contains_key(&digest) {
            return Err(RelationError::conflict("Invitation token already in use"));
        }
        let id = Tables::next_id(&mut tables.next_invitation_id);
        let created = AdvertiserAssociationInvitation::from_create(id, &invitation);
        tables.invitations.insert(id, created.clone());
        tables.token_index.insert(digest, id);
        Ok(created)
    }

    async fn get_invitation(
        &self,
        id: i64,
    ) -> RelationResult<Option<AdvertiserAssociationInvitation>> {
        Ok(self.tables()?.invitations.get(&id).cloned())
    }

    async fn get_invitation_by_token(
        &self,
        token: &str,
    ) -> RelationResult<Option<AdvertiserAssociationInvitation>> {
        let tables = self.tables()?;
        Ok(tables
            .token_index
            .get(&token_digest(token))
            .and_then(|id| tables.invitations.get(id))
            .cloned())
    }

    async fn update_invitation(
        &self,
        id: i64,
        update: InvitationUpdate,
    ) -> RelationResult<AdvertiserAssociationInvitation> {
        let mut tables = self.tables()?;
        let invitation = tables
            .invitations
            .get_mut(&id)
            .ok_or_else(|| RelationError::not_found("Invitation not found"))?;
        *invitation = invitation.updated(&update)?;
        Ok(invitation.clone())
    }

    async fn delete_invitation(&self, id: i64) -> RelationResult<()> {
        let mut tables = self.tables()?;
        let removed = tables
            .invitations
            .remove(&id)
            .ok_or_else(|| RelationError::not_found("Invitation not found"))?;
        tables.token_index.remove(&token_digest(&removed.token));
        Ok(())
    }

    async fn list_invitations(
        &self,
        filter: &InvitationFilter,
    ) -> RelationResult<Vec<AdvertiserAssociationInvitation>> {
        let tables = self.tables()?;
        let mut matching: Vec<&AdvertiserAssociationInvitation> = tables
            .invitations
            .values()
            .filter(|i| filter.matches(i))
            .collect();
        matching.sort_by(|a, b| {
            (b.created_at, b.invitation_id).cmp(&(a.created_at, a.invitation_id))
        });
        Ok(page(matching.into_iter().cloned(), filter.offset, filter.limit))
    }

    async fn append_usage_log(&self, log: CreateUsageLog) -> RelationResult<InvitationUsageLog> {
        Ok(self.tables()?.insert_log(&log))
    }

    async fn list_usage_logs(
        &self,
        invitation_id: i64,
        limit: u32,
    ) -> RelationResult<Vec<InvitationUsageLog>> {
        let tables = self.tables()?;
        let mut logs: Vec<&InvitationUsageLog> = tables
            .usage_logs
            .values()
            .filter(|l| l.invitation_id == Some(invitation_id))
            .collect();
        logs.sort_by(|a, b| (b.consumed_at, b.log_id).cmp(&(a.consumed_at, a.log_id)));
        Ok(page(logs.into_iter().cloned(), 0, limit))
    }

    async fn redeem_invitation(
        &self,
        redemption: Redemption,
    ) -> RelationResult<RedemptionOutcome> {
        let mut guard = self.tables()?;
        let tables = &mut *guard;

        let Some(invitation_id) = tables
            .token_index
            .get(&token_digest(&redemption.token))
            .copied()
        else {
            let reason = UsageFailureReason::InvitationNotFound;
            tables.insert_log(&redemption.log(None, None, Some(reason)));
            return Ok(RedemptionOutcome::Refused {
                invitation_id: None,
                reason,
            });
        };
        let invitation = tables
            .invitations
            .get(&invitation_id)
            .cloned()
            .ok_or_else(|| RelationError::internal("token index points at a missing invitation"))?;

        let refusal = invitation.unavailable_reason(redemption.now).or_else(|| {
            (!invitation.allows_affiliate(redemption.affiliate_org_id))
                .then_some(UsageFailureReason::ForbiddenTarget)
        });
        if let Some(reason) = refusal {
            tables.insert_log(&redemption.log(Some(invitation_id), None, Some(reason)));
            return Ok(RedemptionOutcome::Refused {
                invitation_id: Some(invitation_id),
                reason,
            });
        }

        let existing = tables
            .open_association(invitation.advertiser_org_id, redemption.affiliate_org_id)
            .cloned();
        let (association, reason) = match existing {
            Some(existing) => (existing, Some(UsageFailureReason::AlreadyAssociated)),
            None => {
                let created = tables.insert_association(&CreateAssociation {
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
                })?;
                (created, None)
            }
        };

        let invitation = {
            let stored = tables
                .invitations
                .get_mut(&invitation_id)
                .ok_or_else(|| RelationError::internal("invitation vanished during redemption"))?;
            // never overrun the usage cap
            if stored.max_uses.is_some_and(|max| stored.usage_count + 1 > max) {
                if reason.is_none() {
                    tables.associations.remove(&association.association_id);
                }
                return Err(RelationError::gone("Invitation has reached its usage limit"));
            }
            stored.usage_count += 1;
            stored.updated_at = crate::types::next_timestamp(stored.updated_at, redemption.now);
            stored.clone()
        };

        tables.insert_log(&redemption.log(
            Some(invitation_id),
            Some(association.association_id),
            reason,
        ));

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InvitationStatus, OrganizationType, UsageOutcome};
    use chrono::Duration;

    fn create_invitation(token: &str, max_uses: Option<u32>) -> CreateInvitation {
        CreateInvitation {
            advertiser_org_id: 10,
            name: "Launch partners".into(),
            description: None,
            token: token.into(),
            expires_at: None,
            max_uses,
            default_message: Some("Welcome aboard".into()),
            allowed_affiliate_org_ids: None,
            created_by_user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    fn redemption(token: &str, affiliate: i64) -> Redemption {
        Redemption {
            token: token.into(),
            consuming_user_id: Uuid::new_v4(),
            affiliate_org_id: affiliate,
            ip_address: Some("203.0.113.7".into()),
            user_agent: None,
            now: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_directory_seeding() {
        let store = MemoryRelationStore::new();
        store
            .insert_organization(Organization::new(10, "Acme", OrganizationType::Advertiser))
            .unwrap();
        let org = store.get_organization(10).await.unwrap().unwrap();
        assert_eq!(org.org_type, OrganizationType::Advertiser);
        assert!(store.get_organization(11).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_association_blocks_duplicate() {
        let store = MemoryRelationStore::new();
        let create = CreateAssociation {
            advertiser_org_id: 10,
            affiliate_org_id: 20,
            association_type: AssociationType::Invitation,
            message: None,
            visible_to_advertiser: true,
            visible_to_affiliate: true,
            all_affiliates_visible: true,
            visible_affiliate_ids: None,
            all_campaigns_visible: true,
            visible_campaign_ids: None,
            created_by_user_id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let first = store.create_association(create.clone()).await.unwrap();
        let err = store.create_association(create.clone()).await.unwrap_err();
        assert!(matches!(err, RelationError::Conflict(_)));

        let actor = Uuid::new_v4();
        store
            .update_association(
                first.association_id,
                AssociationStatus::Pending,
                AssociationUpdate::new(actor, Utc::now()).status(AssociationStatus::Rejected),
            )
            .await
            .unwrap();
        assert!(store.create_association(create).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_is_compare_and_set() {
        let store = MemoryRelationStore::new();
        let created = store
            .create_association(CreateAssociation {
                advertiser_org_id: 10,
                affiliate_org_id: 20,
                association_type: AssociationType::Request,
                message: None,
                visible_to_advertiser: true,
                visible_to_affiliate: true,
                all_affiliates_visible: true,
                visible_affiliate_ids: None,
                all_campaigns_visible: true,
                visible_campaign_ids: None,
                created_by_user_id: Uuid::new_v4(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let err = store
            .update_association(
                created.association_id,
                AssociationStatus::Active,
                AssociationUpdate::new(Uuid::new_v4(), Utc::now()).status(AssociationStatus::Suspended),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelationError::InvalidTransition { .. }));
        let unchanged = store
            .get_association(created.association_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.status, AssociationStatus::Pending);
    }

    #[tokio::test]
    async fn test_token_lookup_is_exact() {
        let store = MemoryRelationStore::new();
        store
            .create_invitation(create_invitation("AbCdEf", None))
            .await
            .unwrap();
        assert!(store.get_invitation_by_token("AbCdEf").await.unwrap().is_some());
        assert!(store.get_invitation_by_token("abcdef").await.unwrap().is_none());
        assert!(store.get_invitation_by_token("AbCdE").await.unwrap().is_none());

        let dup = store
            .create_invitation(create_invitation("AbCdEf", None))
            .await
            .unwrap_err();
        assert!(matches!(dup, RelationError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_redeem_creates_request_and_counts_use() {
        let store = MemoryRelationStore::new();
        store
            .create_invitation(create_invitation("tok-1", Some(1)))
            .await
            .unwrap();

        let outcome = store.redeem_invitation(redemption("tok-1", 20)).await.unwrap();
        let RedemptionOutcome::Created {
            association,
            invitation,
        } = outcome
        else {
            panic!("expected a created association");
        };
        assert_eq!(association.association_type, AssociationType::Request);
        assert_eq!(association.status, AssociationStatus::Pending);
        assert_eq!(association.message.as_deref(), Some("Welcome aboard"));
        assert_eq!(invitation.usage_count, 1);

        let second = store.redeem_invitation(redemption("tok-1", 21)).await.unwrap();
        assert!(matches!(
            second,
            RedemptionOutcome::Refused {
                reason: UsageFailureReason::MaxUsesExceeded,
                ..
            }
        ));

        let logs = store.list_usage_logs(invitation.invitation_id, 50).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].outcome, UsageOutcome::Succeeded);
        assert_eq!(logs[0].outcome, UsageOutcome::Failed);
    }

    #[tokio::test]
    async fn test_redeem_unknown_token_logs_without_invitation() {
        let store = MemoryRelationStore::new();
        let outcome = store.redeem_invitation(redemption("missing", 20)).await.unwrap();
        assert!(matches!(
            outcome,
            RedemptionOutcome::Refused {
                invitation_id: None,
                reason: UsageFailureReason::InvitationNotFound
            }
        ));
        let logs = store.all_usage_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].invitation_id, None);
    }

    #[tokio::test]
    async fn test_redeem_respects_allow_list_and_disable() {
        let store = MemoryRelationStore::new();
        let mut create = create_invitation("tok-2", None);
        create.allowed_affiliate_org_ids = Some(vec![20]);
        let inv = store.create_invitation(create).await.unwrap();

        let outcome = store.redeem_invitation(redemption("tok-2", 21)).await.unwrap();
        assert!(matches!(
            outcome,
            RedemptionOutcome::Refused {
                reason: UsageFailureReason::ForbiddenTarget,
                ..
            }
        ));

        store
            .update_invitation(
                inv.invitation_id,
                InvitationUpdate {
                    name: None,
                    description: None,
                    default_message: None,
                    expires_at: None,
                    max_uses: None,
                    allowed_affiliate_org_ids: None,
                    status: Some(InvitationStatus::Disabled),
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        let outcome = store.redeem_invitation(redemption("tok-2", 20)).await.unwrap();
        assert!(matches!(
            outcome,
            RedemptionOutcome::Refused {
                reason: UsageFailureReason::Disabled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_rechecks_cap_against_stored_usage() {
        let store = MemoryRelationStore::new();
        let inv = store
            .create_invitation(create_invitation("tok-3", Some(4)))
            .await
            .unwrap();
        for affiliate in [20, 21] {
            store
                .redeem_invitation(redemption("tok-3", affiliate))
                .await
                .unwrap();
        }

        // Patch computed against a snapshot taken before both redemptions.
        let lowered = InvitationUpdate {
            name: None,
            description: None,
            default_message: None,
            expires_at: None,
            max_uses: Some(Some(1)),
            allowed_affiliate_org_ids: None,
            status: None,
            updated_at: Utc::now(),
        };
        let err = store
            .update_invitation(inv.invitation_id, lowered.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, RelationError::InvalidInput(_)));

        let stored = store.get_invitation(inv.invitation_id).await.unwrap().unwrap();
        assert_eq!(stored.max_uses, Some(4));
        assert_eq!(stored.usage_count, 2);

        let at_usage = InvitationUpdate {
            max_uses: Some(Some(2)),
            ..lowered
        };
        let updated = store
            .update_invitation(inv.invitation_id, at_usage)
            .await
            .unwrap();
        assert_eq!(updated.max_uses, Some(2));
    }

    #[tokio::test]
    async fn test_expire_delegations_persists_revoked() {
        let store = MemoryRelationStore::new();
        let now = Utc::now();
        store
            .create_delegation(CreateDelegation {
                agency_org_id: 30,
                advertiser_org_id: 10,
                permissions: crate::permission::PermissionMask::all(),
                expires_at: Some(now + Duration::minutes(5)),
                message: None,
                created_by_user_id: Uuid::new_v4(),
                created_at: now,
            })
            .await
            .unwrap();

        assert_eq!(store.expire_delegations(now).await.unwrap(), 0);
        assert_eq!(
            store
                .expire_delegations(now + Duration::minutes(5))
                .await
                .unwrap(),
            1
        );
        assert!(store.get_open_delegation(30, 10).await.unwrap().is_none());
    }
}
