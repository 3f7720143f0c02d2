use super::*;
use crate::engines::test_support::*;
use chrono::Duration;
use orglink_core::{
    AssociationOps, CreateDelegation, DelegationOps, DelegationStatus, DelegationUpdate, Role,
};
use std::collections::BTreeSet;
use uuid::Uuid;

fn engine(fixture: &Fixture) -> AssociationEngine<orglink_core::MemoryRelationStore> {
    AssociationEngine::new(fixture.ctx.clone())
}

async fn pending_invitation(
    fixture: &Fixture,
    engine: &AssociationEngine<orglink_core::MemoryRelationStore>,
    affiliate_org_id: i64,
) -> OrganizationAssociation {
    let advertiser = fixture.manager_of(ADVERTISER).await;
    engine
        .create_invitation(
            &advertiser,
            CreateAssociationRequest::new(ADVERTISER, affiliate_org_id).message("Let's partner"),
        )
        .await
        .unwrap()
}

async fn active_association(
    fixture: &Fixture,
    engine: &AssociationEngine<orglink_core::MemoryRelationStore>,
    affiliate_org_id: i64,
) -> OrganizationAssociation {
    let pending = pending_invitation(fixture, engine, affiliate_org_id).await;
    let affiliate = fixture.manager_of(affiliate_org_id).await;
    engine
        .approve(&affiliate, pending.association_id)
        .await
        .unwrap()
}

async fn delegate_to_agency(fixture: &Fixture, permissions: PermissionMask) {
    let now = fixture.now();
    let delegation = fixture
        .store
        .create_delegation(CreateDelegation {
            agency_org_id: AGENCY,
            advertiser_org_id: ADVERTISER,
            permissions,
            expires_at: None,
            message: None,
            created_by_user_id: Uuid::new_v4(),
            created_at: now,
        })
        .await
        .unwrap();
    fixture
        .store
        .update_delegation(
            delegation.delegation_id,
            DelegationStatus::Pending,
            DelegationUpdate::new(Uuid::new_v4(), now).status(DelegationStatus::Active),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_invitation() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let advertiser = fixture.manager_of(ADVERTISER).await;

    let association = engine
        .create_invitation(
            &advertiser,
            CreateAssociationRequest::new(ADVERTISER, AFFILIATE).visible_to_affiliate(false),
        )
        .await
        .unwrap();

    assert_eq!(association.status, AssociationStatus::Pending);
    assert_eq!(association.association_type, AssociationType::Invitation);
    assert_eq!(association.created_by_user_id, advertiser.user_id);
    assert!(association.visible_to_advertiser);
    assert!(!association.visible_to_affiliate);
    assert_eq!(association.created_at, start_time());
}

#[tokio::test]
async fn test_create_requires_initiator_authority() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);

    // an affiliate cannot send an advertiser-initiated invitation
    let affiliate = fixture.manager_of(AFFILIATE).await;
    let err = engine
        .create_invitation(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));

    let request = engine
        .create_request(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap();
    assert_eq!(request.association_type, AssociationType::Request);

    let advertiser = fixture.manager_of(ADVERTISER).await;
    let err = engine
        .create_request(&advertiser, CreateAssociationRequest::new(ADVERTISER, AFFILIATE_B))
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));
}

#[tokio::test]
async fn test_create_validates_input() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let admin = fixture.admin().await;

    for request in [
        CreateAssociationRequest::new(AFFILIATE, AFFILIATE_B),
        CreateAssociationRequest::new(ADVERTISER, AGENCY),
        CreateAssociationRequest::new(ADVERTISER, 999),
        CreateAssociationRequest::new(ADVERTISER, ADVERTISER),
        CreateAssociationRequest::new(0, AFFILIATE),
        CreateAssociationRequest::new(ADVERTISER, AFFILIATE).message("x".repeat(1001)),
    ] {
        let err = engine.create_invitation(&admin, request).await.unwrap_err();
        assert!(
            matches!(err, RelationError::InvalidInput(_)),
            "unexpected {:?}",
            err
        );
    }
}

#[tokio::test]
async fn test_create_conflicts_with_open_association() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let pending = pending_invitation(&fixture, &engine, AFFILIATE).await;

    let affiliate = fixture.manager_of(AFFILIATE).await;
    let err = engine
        .create_request(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Conflict(_)));

    // a rejected association no longer blocks the pair
    engine
        .reject(&affiliate, pending.association_id)
        .await
        .unwrap();
    engine
        .create_request(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_approval_belongs_to_counterpart() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let pending = pending_invitation(&fixture, &engine, AFFILIATE).await;

    let advertiser = fixture.manager_of(ADVERTISER).await;
    let err = engine
        .approve(&advertiser, pending.association_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));

    let outsider = fixture.manager_of(AFFILIATE_B).await;
    assert!(
        engine
            .approve(&outsider, pending.association_id)
            .await
            .is_err()
    );

    let affiliate = fixture.manager_of(AFFILIATE).await;
    let active = engine
        .approve(&affiliate, pending.association_id)
        .await
        .unwrap();
    assert_eq!(active.status, AssociationStatus::Active);
    assert_eq!(active.approved_by_user_id, Some(affiliate.user_id));
    assert!(active.approved_at.is_some());
    assert!(active.updated_at > pending.updated_at);
}

#[tokio::test]
async fn test_request_is_approved_by_advertiser() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let affiliate = fixture.manager_of(AFFILIATE).await;
    let request = engine
        .create_request(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap();

    assert!(
        engine
            .approve(&affiliate, request.association_id)
            .await
            .is_err()
    );

    let advertiser = fixture.manager_of(ADVERTISER).await;
    let active = engine
        .approve_with_visibility(&advertiser, request.association_id, Some(false))
        .await
        .unwrap();
    assert!(!active.visible_to_advertiser);
    assert!(active.visible_to_affiliate);
}

#[tokio::test]
async fn test_delegated_agency_approves_for_advertiser() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let affiliate = fixture.manager_of(AFFILIATE).await;
    let request = engine
        .create_request(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap();

    let agency = fixture.manager_of(AGENCY).await;
    assert!(engine.approve(&agency, request.association_id).await.is_err());

    delegate_to_agency(
        &fixture,
        PermissionMask::from([DelegationPermission::ManageAffiliates]),
    )
    .await;
    let active = engine.approve(&agency, request.association_id).await.unwrap();
    assert_eq!(active.status, AssociationStatus::Active);
}

#[tokio::test]
async fn test_rejection_is_not_repeatable() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let pending = pending_invitation(&fixture, &engine, AFFILIATE).await;
    let affiliate = fixture.manager_of(AFFILIATE).await;

    let rejected = engine
        .reject(&affiliate, pending.association_id)
        .await
        .unwrap();
    assert_eq!(rejected.status, AssociationStatus::Rejected);

    let err = engine
        .reject(&affiliate, pending.association_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::InvalidTransition { .. }));

    let stored = fixture
        .store
        .get_association(pending.association_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.updated_at, rejected.updated_at);
}

#[tokio::test]
async fn test_illegal_transitions() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let pending = pending_invitation(&fixture, &engine, AFFILIATE).await;
    let admin = fixture.admin().await;

    for result in [
        engine.suspend(&admin, pending.association_id).await,
        engine.reactivate(&admin, pending.association_id).await,
    ] {
        assert!(matches!(
            result,
            Err(RelationError::InvalidTransition { .. })
        ));
    }

    let active = engine.approve(&admin, pending.association_id).await.unwrap();
    assert!(matches!(
        engine.approve(&admin, active.association_id).await,
        Err(RelationError::InvalidTransition { .. })
    ));
    assert!(matches!(
        engine.reactivate(&admin, active.association_id).await,
        Err(RelationError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn test_only_suspending_side_reactivates() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let active = active_association(&fixture, &engine, AFFILIATE).await;
    let advertiser = fixture.manager_of(ADVERTISER).await;
    let affiliate = fixture.manager_of(AFFILIATE).await;

    let suspended = engine
        .suspend(&affiliate, active.association_id)
        .await
        .unwrap();
    assert_eq!(suspended.status, AssociationStatus::Suspended);
    assert_eq!(suspended.suspended_by_org_id, Some(AFFILIATE));

    let err = engine
        .reactivate(&advertiser, active.association_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));

    let reactivated = engine
        .reactivate(&affiliate, active.association_id)
        .await
        .unwrap();
    assert_eq!(reactivated.status, AssociationStatus::Active);
    assert_eq!(reactivated.suspended_by_org_id, None);
}

#[tokio::test]
async fn test_platform_suspension_records_no_side() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let active = active_association(&fixture, &engine, AFFILIATE).await;
    let owner = fixture.principal(None, Role::PlatformOwner).await;

    let suspended = engine.suspend(&owner, active.association_id).await.unwrap();
    assert_eq!(suspended.suspended_by_org_id, None);

    let advertiser = fixture.manager_of(ADVERTISER).await;
    engine
        .reactivate(&advertiser, active.association_id)
        .await
        .unwrap();

    let outsider = fixture.manager_of(OTHER_ADVERTISER).await;
    assert!(matches!(
        engine.suspend(&outsider, active.association_id).await,
        Err(RelationError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_visibility_is_toggled_per_side() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let active = active_association(&fixture, &engine, AFFILIATE).await;
    let advertiser = fixture.manager_of(ADVERTISER).await;
    let affiliate = fixture.manager_of(AFFILIATE).await;

    let updated = engine
        .update_visibility(
            &advertiser,
            active.association_id,
            UpdateVisibilityRequest {
                visible_to_advertiser: Some(false),
                visible_to_affiliate: None,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!updated.visible_to_advertiser);
    assert!(updated.visible_to_affiliate);
    assert_eq!(updated.status, AssociationStatus::Active);

    let err = engine
        .update_visibility(
            &affiliate,
            active.association_id,
            UpdateVisibilityRequest {
                visible_to_advertiser: Some(true),
                visible_to_affiliate: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));

    let admin = fixture.admin().await;
    let both = engine
        .update_visibility(
            &admin,
            active.association_id,
            UpdateVisibilityRequest {
                visible_to_advertiser: Some(true),
                visible_to_affiliate: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(both.visible_to_advertiser);
    assert!(!both.visible_to_affiliate);

    let err = engine
        .update_visibility(
            &admin,
            active.association_id,
            UpdateVisibilityRequest::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::InvalidInput(_)));
}

#[tokio::test]
async fn test_create_carries_visibility_subsets() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let advertiser = fixture.manager_of(ADVERTISER).await;

    let created = engine
        .create_invitation(
            &advertiser,
            CreateAssociationRequest::new(ADVERTISER, AFFILIATE).visible_affiliates(vec![501, 502]),
        )
        .await
        .unwrap();
    assert!(!created.all_affiliates_visible);
    assert_eq!(created.visible_affiliate_ids, Some(vec![501, 502]));
    assert!(created.all_campaigns_visible);
    assert_eq!(
        created.affiliate_scope(),
        VisibleScope::Only(BTreeSet::from([501, 502]))
    );

    let explicit = engine
        .create_invitation(
            &advertiser,
            CreateAssociationRequest {
                all_affiliates_visible: Some(true),
                visible_affiliate_ids: Some(vec![601]),
                ..CreateAssociationRequest::new(ADVERTISER, AFFILIATE_B)
            },
        )
        .await
        .unwrap();
    assert_eq!(explicit.affiliate_scope(), VisibleScope::All);

    let err = engine
        .create_invitation(
            &advertiser,
            CreateAssociationRequest::new(ADVERTISER, AFFILIATE_C).visible_campaigns(vec![0]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::InvalidInput(_)));
}

#[tokio::test]
async fn test_visibility_subsets_belong_to_their_side() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let active = active_association(&fixture, &engine, AFFILIATE).await;
    let advertiser = fixture.manager_of(ADVERTISER).await;
    let affiliate = fixture.manager_of(AFFILIATE).await;

    let narrowed = engine
        .update_visibility(
            &advertiser,
            active.association_id,
            UpdateVisibilityRequest {
                visible_affiliate_ids: Some(vec![701, 702]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!narrowed.all_affiliates_visible);
    assert!(narrowed.visible_to_advertiser);

    let err = engine
        .update_visibility(
            &affiliate,
            active.association_id,
            UpdateVisibilityRequest {
                all_affiliates_visible: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));

    engine
        .update_visibility(
            &affiliate,
            active.association_id,
            UpdateVisibilityRequest {
                visible_campaign_ids: Some(vec![801]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        engine
            .visible_affiliates(&affiliate, active.association_id)
            .await
            .unwrap(),
        VisibleScope::Only(BTreeSet::from([701, 702]))
    );
    assert_eq!(
        engine
            .visible_campaigns(&advertiser, active.association_id)
            .await
            .unwrap(),
        VisibleScope::Only(BTreeSet::from([801]))
    );

    // An empty list widens back to everything.
    let widened = engine
        .update_visibility(
            &advertiser,
            active.association_id,
            UpdateVisibilityRequest {
                visible_affiliate_ids: Some(Vec::new()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(widened.affiliate_scope(), VisibleScope::All);

    let outsider = fixture.manager_of(AFFILIATE_B).await;
    assert!(matches!(
        engine.visible_campaigns(&outsider, active.association_id).await,
        Err(RelationError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_get_by_organizations_finds_open_pair() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let affiliate = fixture.manager_of(AFFILIATE).await;

    let first = pending_invitation(&fixture, &engine, AFFILIATE).await;
    assert_eq!(
        engine
            .get_by_organizations(&affiliate, ADVERTISER, AFFILIATE)
            .await
            .unwrap()
            .association_id,
        first.association_id
    );

    engine.reject(&affiliate, first.association_id).await.unwrap();
    assert!(matches!(
        engine
            .get_by_organizations(&affiliate, ADVERTISER, AFFILIATE)
            .await,
        Err(RelationError::NotFound(_))
    ));

    let second = pending_invitation(&fixture, &engine, AFFILIATE).await;
    assert_eq!(
        engine
            .get_by_organizations(&fixture.manager_of(ADVERTISER).await, ADVERTISER, AFFILIATE)
            .await
            .unwrap()
            .association_id,
        second.association_id
    );

    let outsider = fixture.manager_of(AFFILIATE_B).await;
    assert!(matches!(
        engine
            .get_by_organizations(&outsider, ADVERTISER, AFFILIATE)
            .await,
        Err(RelationError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_get_requires_read_on_either_side() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let pending = pending_invitation(&fixture, &engine, AFFILIATE).await;

    let affiliate = fixture.manager_of(AFFILIATE).await;
    assert_eq!(
        engine
            .get(&affiliate, pending.association_id)
            .await
            .unwrap()
            .association_id,
        pending.association_id
    );

    let outsider = fixture.manager_of(AFFILIATE_B).await;
    assert!(matches!(
        engine.get(&outsider, pending.association_id).await,
        Err(RelationError::Forbidden(_))
    ));
    assert!(matches!(
        engine.get(&affiliate, 9_999).await,
        Err(RelationError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_orders_and_pages() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let first = pending_invitation(&fixture, &engine, AFFILIATE).await;
    fixture.clock.advance(Duration::minutes(1));
    let second = pending_invitation(&fixture, &engine, AFFILIATE_B).await;
    fixture.clock.advance(Duration::minutes(1));
    let third = pending_invitation(&fixture, &engine, AFFILIATE_C).await;

    let advertiser = fixture.manager_of(ADVERTISER).await;
    let page = engine
        .list(
            &advertiser,
            ListAssociationsQuery {
                advertiser_org_id: Some(ADVERTISER),
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ids: Vec<i64> = page.associations.iter().map(|a| a.association_id).collect();
    assert_eq!(ids, vec![third.association_id, second.association_id]);
    let cursor = page.next_cursor.unwrap();

    // a new association at the head does not shift the next page
    fixture.clock.advance(Duration::minutes(1));
    let affiliate = fixture.manager_of(AFFILIATE_B).await;
    engine.reject(&affiliate, second.association_id).await.unwrap();
    fixture.clock.advance(Duration::minutes(1));
    let _fresh = engine
        .create_request(&affiliate, CreateAssociationRequest::new(ADVERTISER, AFFILIATE_B))
        .await
        .unwrap();

    let next = engine
        .list(
            &advertiser,
            ListAssociationsQuery {
                advertiser_org_id: Some(ADVERTISER),
                cursor: Some(cursor),
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ids: Vec<i64> = next.associations.iter().map(|a| a.association_id).collect();
    assert_eq!(ids, vec![first.association_id]);
    assert!(next.next_cursor.is_none());

    let rejected = engine
        .list(
            &advertiser,
            ListAssociationsQuery {
                advertiser_org_id: Some(ADVERTISER),
                status: Some(AssociationStatus::Rejected),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rejected.associations.len(), 1);
}

#[tokio::test]
async fn test_list_requires_scoping_filter() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    pending_invitation(&fixture, &engine, AFFILIATE).await;

    let advertiser = fixture.manager_of(ADVERTISER).await;
    assert!(matches!(
        engine
            .list(&advertiser, ListAssociationsQuery::default())
            .await,
        Err(RelationError::Forbidden(_))
    ));
    assert!(matches!(
        engine
            .list(
                &advertiser,
                ListAssociationsQuery {
                    affiliate_org_id: Some(AFFILIATE),
                    ..Default::default()
                }
            )
            .await,
        Err(RelationError::Forbidden(_))
    ));

    let admin = fixture.admin().await;
    let page = engine
        .list(&admin, ListAssociationsQuery::default())
        .await
        .unwrap();
    assert_eq!(page.associations.len(), 1);
}

#[tokio::test]
async fn test_cancelled_request_writes_nothing() {
    let fixture = Fixture::new();
    let engine = engine(&fixture);
    let advertiser = fixture.manager_of(ADVERTISER).await;
    advertiser.scope.cancellation.cancel();

    let err = engine
        .create_invitation(&advertiser, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Cancelled));
    assert!(fixture.store.all_associations().unwrap().is_empty());
}
