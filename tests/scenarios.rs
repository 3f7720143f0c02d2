//! End-to-end scenarios through the `Relations` facade.

mod common;

use chrono::Duration;
use common::*;
use orglink::adapters::InvitationOps;
use orglink::{
    AssociationStatus, CreateAssociationRequest, CreateDelegationRequest, CreateInvitationRequest,
    DelegationPermission, PermissionMask, RelationError, Role, UsageFailureReason,
    UsageOutcome, UseInvitationRequest, UseOutcome,
};

use DelegationPermission::{ManageCampaigns, ViewCampaigns};

#[tokio::test]
async fn invitation_happy_path_then_exhaustion() {
    let h = TestHarness::new();
    let invitations = h.relations.invitations();
    let advertiser = h.manager_of(ADVERTISER).await;

    let invitation = invitations
        .create_invitation(
            &advertiser,
            CreateInvitationRequest::new(ADVERTISER, "Spring partners").max_uses(1),
        )
        .await
        .unwrap();
    assert!(invitation.expires_at.is_none());

    let consumer = h.principal(Some(AFFILIATE), Role::Affiliate).await;
    let result = invitations
        .use_invitation(&consumer, UseInvitationRequest::new(&invitation.token))
        .await
        .unwrap();
    assert_eq!(result.outcome, UseOutcome::Created);
    assert_eq!(result.association.status, AssociationStatus::Pending);
    assert_eq!(result.association.advertiser_org_id, ADVERTISER);
    assert_eq!(result.association.affiliate_org_id, AFFILIATE);
    assert_eq!(result.association.created_by_user_id, consumer.user_id);

    let second = h.manager_of(AFFILIATE_B).await;
    let err = invitations
        .use_invitation(&second, UseInvitationRequest::new(&invitation.token))
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Gone(_)));

    let stored = h
        .store
        .get_invitation(invitation.invitation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.usage_count, 1);

    let history = invitations
        .usage_history(&advertiser, invitation.invitation_id, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].outcome, UsageOutcome::Failed);
    assert_eq!(
        history[0].failure_reason,
        Some(UsageFailureReason::MaxUsesExceeded)
    );
    assert_eq!(history[0].failure_reason.map(|r| r.as_str()), Some("max_uses_exceeded"));
}

#[tokio::test]
async fn duplicate_association_short_circuits() {
    let h = TestHarness::new();
    let associations = h.relations.associations();
    let existing = associations
        .create_invitation(
            &h.manager_of(ADVERTISER).await,
            CreateAssociationRequest::new(ADVERTISER, AFFILIATE),
        )
        .await
        .unwrap();
    let affiliate = h.manager_of(AFFILIATE).await;
    associations
        .approve(&affiliate, existing.association_id)
        .await
        .unwrap();

    let invitations = h.relations.invitations();
    let invitation = invitations
        .create_invitation(
            &h.manager_of(ADVERTISER).await,
            CreateInvitationRequest::new(ADVERTISER, "Fresh"),
        )
        .await
        .unwrap();
    let result = invitations
        .use_invitation(&affiliate, UseInvitationRequest::new(&invitation.token))
        .await
        .unwrap();

    assert_eq!(result.outcome, UseOutcome::AlreadyAssociated);
    assert_eq!(result.association.association_id, existing.association_id);
    assert_eq!(result.association.status, AssociationStatus::Active);

    let logs = h.store.all_usage_logs().unwrap();
    let log = logs
        .iter()
        .find(|l| l.invitation_id == Some(invitation.invitation_id))
        .unwrap();
    assert_eq!(log.outcome, UsageOutcome::Failed);
    assert_eq!(log.failure_reason, Some(UsageFailureReason::AlreadyAssociated));

    let stored = h
        .store
        .get_invitation(invitation.invitation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.usage_count, 1);
}

#[tokio::test]
async fn delegated_permission_check_follows_amendments_and_expiry() {
    let h = TestHarness::new();
    let delegations = h.relations.delegations();
    let advertiser = h.manager_of(ADVERTISER).await;

    let delegation = delegations
        .create_delegation(
            &advertiser,
            CreateDelegationRequest::new(ADVERTISER, AGENCY, [ViewCampaigns, ManageCampaigns])
                .expires_at(h.now() + Duration::hours(1)),
        )
        .await
        .unwrap();
    let agency = h.principal(Some(AGENCY), Role::AdvertiserManager).await;
    delegations
        .accept(&agency, delegation.delegation_id)
        .await
        .unwrap();

    let visibility = h.relations.visibility();
    assert!(
        visibility
            .can_act_as(&agency, ADVERTISER, [ManageCampaigns])
            .await
            .unwrap()
    );

    delegations
        .update_permissions(
            &advertiser,
            delegation.delegation_id,
            PermissionMask::from([ViewCampaigns]),
        )
        .await
        .unwrap();
    assert!(
        !visibility
            .can_act_as(&agency, ADVERTISER, [ManageCampaigns])
            .await
            .unwrap()
    );
    assert!(
        visibility
            .can_act_as(&agency, ADVERTISER, [ViewCampaigns])
            .await
            .unwrap()
    );

    h.clock.advance(Duration::hours(1));
    assert!(
        !visibility
            .can_act_as(&agency, ADVERTISER, [ViewCampaigns])
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn visibility_projection() {
    let h = TestHarness::new();
    let associations = h.relations.associations();
    let advertiser = h.manager_of(ADVERTISER).await;

    for (affiliate, visible_to_affiliate) in
        [(AFFILIATE, false), (AFFILIATE_B, true), (AFFILIATE_C, true)]
    {
        let created = associations
            .create_invitation(
                &advertiser,
                CreateAssociationRequest::new(ADVERTISER, affiliate)
                    .visible_to_affiliate(visible_to_affiliate),
            )
            .await
            .unwrap();
        associations
            .approve(&h.manager_of(affiliate).await, created.association_id)
            .await
            .unwrap();
        if affiliate == AFFILIATE_C {
            associations
                .suspend(&advertiser, created.association_id)
                .await
                .unwrap();
        }
    }

    let visibility = h.relations.visibility();
    let affiliates: Vec<i64> = visibility
        .visible_affiliates_for(&advertiser, ADVERTISER)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(affiliates, vec![AFFILIATE, AFFILIATE_B]);

    let owners = visibility
        .visible_campaign_owners_for(&h.manager_of(AFFILIATE).await, AFFILIATE)
        .await
        .unwrap();
    assert!(owners.is_empty());

    let owners: Vec<i64> = visibility
        .visible_campaign_owners_for(&h.manager_of(AFFILIATE_B).await, AFFILIATE_B)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(owners, vec![ADVERTISER]);
}

#[tokio::test]
async fn approval_belongs_to_the_counterpart() {
    let h = TestHarness::new();
    let associations = h.relations.associations();
    let advertiser = h.manager_of(ADVERTISER).await;
    let pending = associations
        .create_invitation(&advertiser, CreateAssociationRequest::new(ADVERTISER, AFFILIATE))
        .await
        .unwrap();

    let err = associations
        .approve(&advertiser, pending.association_id)
        .await
        .unwrap_err();
    assert!(matches!(err, RelationError::Forbidden(_)));

    let affiliate = h.manager_of(AFFILIATE).await;
    let approved = associations
        .approve(&affiliate, pending.association_id)
        .await
        .unwrap();
    assert_eq!(approved.status, AssociationStatus::Active);
    assert_eq!(approved.approved_by_user_id, Some(affiliate.user_id));
    assert!(approved.approved_at.is_some());
}
