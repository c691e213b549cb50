//! Credential Manager behaviour against the in-memory repositories
mod common;

use common::{fresh_credential, Harness, RefreshBehavior};
use review_service::db::AccountRepository;
use review_service::models::Role;
use review_service::ReviewError;
use std::time::Duration;

#[tokio::test]
async fn test_rotation_chain_revokes_every_previous_token() {
    let harness = Harness::new();
    let (_, mut pair) = harness.sign_in("chain@cutroom.test", Role::Delegate, None).await;
    let mut spent = Vec::new();

    for _ in 0..5 {
        let (_, next) = harness
            .credentials
            .rotate(Some(&pair.session.token))
            .await
            .unwrap();
        spent.push(pair.session.token.clone());
        pair = next;
    }

    for token in &spent {
        let err = harness.credentials.rotate(Some(token)).await.unwrap_err();
        assert!(matches!(err, ReviewError::SessionRevoked), "got {err:?}");
    }

    // The latest token is still live
    assert!(harness
        .credentials
        .rotate(Some(&pair.session.token))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_concurrent_rotation_has_one_winner() {
    let harness = Harness::new();
    let (_, pair) = harness.sign_in("race@cutroom.test", Role::Delegate, None).await;
    let token = pair.session.token.clone();

    let (first, second) = tokio::join!(
        harness.credentials.rotate(Some(&token)),
        harness.credentials.rotate(Some(&token)),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let revoked = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ReviewError::SessionRevoked)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(revoked, 1);
}

#[tokio::test]
async fn test_new_sign_in_replaces_previous_session() {
    let harness = Harness::new();
    let (_, first) = harness.sign_in("twice@cutroom.test", Role::Delegate, None).await;
    let (_, second) = harness.sign_in("twice@cutroom.test", Role::Delegate, None).await;

    assert!(matches!(
        harness.credentials.rotate(Some(&first.session.token)).await,
        Err(ReviewError::SessionRevoked)
    ));
    assert!(harness
        .credentials
        .rotate(Some(&second.session.token))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_tokens_are_unique_per_issue() {
    let harness = Harness::new();
    let (_, pair) = harness.sign_in("unique@cutroom.test", Role::Delegate, None).await;
    let (_, rotated) = harness
        .credentials
        .rotate(Some(&pair.session.token))
        .await
        .unwrap();

    assert_ne!(pair.session.jti, rotated.session.jti);
    assert_ne!(pair.access.jti, rotated.access.jti);
    assert_ne!(pair.session.token, rotated.session.token);
}

#[tokio::test]
async fn test_logout_invalidates_session() {
    let harness = Harness::new();
    let (account, pair) = harness.sign_in("bye@cutroom.test", Role::Delegate, None).await;

    harness.credentials.invalidate(account.id).await.unwrap();
    // Idempotent
    harness.credentials.invalidate(account.id).await.unwrap();

    assert!(matches!(
        harness.credentials.rotate(Some(&pair.session.token)).await,
        Err(ReviewError::SessionRevoked)
    ));
}

#[tokio::test]
async fn test_purged_account_is_not_found() {
    let harness = Harness::new();
    let (account, pair) = harness.sign_in("gone@cutroom.test", Role::Producer, None).await;

    harness.repo.purge_account(account.id);

    assert!(matches!(
        harness.credentials.verify_access(Some(&pair.access.token)).await,
        Err(ReviewError::AccountNotFound)
    ));
    assert!(matches!(
        harness.credentials.rotate(Some(&pair.session.token)).await,
        Err(ReviewError::AccountNotFound)
    ));
}

#[tokio::test]
async fn test_token_kinds_are_not_interchangeable() {
    let harness = Harness::new();
    let (account, pair) = harness.sign_in("kinds@cutroom.test", Role::Delegate, None).await;

    assert_eq!(
        harness
            .credentials
            .verify_access(Some(&pair.access.token))
            .await
            .unwrap(),
        account.id
    );
    assert!(matches!(
        harness.credentials.verify_access(Some(&pair.session.token)).await,
        Err(ReviewError::Unauthenticated(_))
    ));
    assert!(matches!(
        harness.credentials.rotate(Some(&pair.access.token)).await,
        Err(ReviewError::Unauthenticated(_))
    ));
    assert!(matches!(
        harness.credentials.verify_access(None).await,
        Err(ReviewError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_role_is_fixed_at_creation() {
    let harness = Harness::new();
    harness.producer("fixed@cutroom.test").await;
    let (account, _) = harness.sign_in("FIXED@cutroom.test ", Role::Delegate, None).await;

    assert_eq!(account.role, Role::Producer);
    assert_eq!(account.email, "fixed@cutroom.test");
}

#[tokio::test]
async fn test_delegate_never_stores_delegated_credential() {
    let harness = Harness::new();
    let (account, _) = harness
        .sign_in(
            "editor@cutroom.test",
            Role::Delegate,
            Some(fresh_credential("should-not-store", Some("nope"))),
        )
        .await;

    let stored = harness.repo.find_by_id(account.id).await.unwrap().unwrap();
    assert!(stored.delegated.is_none());
}

#[tokio::test]
async fn test_resign_in_without_refresh_token_keeps_previous() {
    let harness = Harness::new();
    let producer = harness.producer("keep@cutroom.test").await;

    harness
        .sign_in(
            "keep@cutroom.test",
            Role::Producer,
            Some(fresh_credential("second-access", None)),
        )
        .await;

    let stored = harness.repo.find_by_id(producer.id).await.unwrap().unwrap();
    let bundle = stored.delegated.unwrap();
    assert_eq!(bundle.access_token, "second-access");
    assert_eq!(bundle.refresh_token.as_deref(), Some("delegated-refresh"));
}

#[tokio::test]
async fn test_fresh_credential_is_returned_without_refresh() {
    let harness = Harness::new();
    let producer = harness.producer("fresh@cutroom.test").await;

    let credential = harness
        .credentials
        .resolve_publishing_credential(producer.id)
        .await
        .unwrap();

    assert_eq!(credential.access_token, "delegated-access");
    assert_eq!(harness.identity.refresh_count(), 0);
}

#[tokio::test]
async fn test_concurrent_refresh_happens_once() {
    let harness = Harness::new();
    let producer = harness.producer("busy@cutroom.test").await;
    harness.expire_delegated(producer.id).await;
    harness.identity.set_refresh_delay(Duration::from_millis(50));

    let results = futures::future::join_all(
        (0..5).map(|_| harness.credentials.resolve_publishing_credential(producer.id)),
    )
    .await;

    assert_eq!(harness.identity.refresh_count(), 1);
    for result in results {
        let credential = result.unwrap();
        assert_eq!(credential.access_token, "refreshed-access-1");
        assert!(!credential.is_expired());
    }
    assert_eq!(harness.credentials.refresh_locks_held(), 0);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_and_scope() {
    let harness = Harness::new();
    let producer = harness.producer("scope@cutroom.test").await;
    harness.expire_delegated(producer.id).await;

    harness
        .credentials
        .resolve_publishing_credential(producer.id)
        .await
        .unwrap();

    let stored = harness
        .repo
        .find_by_id(producer.id)
        .await
        .unwrap()
        .unwrap()
        .delegated
        .unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("delegated-refresh"));
    assert_eq!(stored.scope.as_deref(), Some(common::UPLOAD_SCOPE));
}

#[tokio::test]
async fn test_rejected_refresh_is_not_retried() {
    let harness = Harness::new();
    let producer = harness.producer("rejected@cutroom.test").await;
    harness.expire_delegated(producer.id).await;
    harness.identity.set_refresh(RefreshBehavior::Reject);

    let err = harness
        .credentials
        .resolve_publishing_credential(producer.id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewError::DelegationExpired(_)));
    assert_eq!(harness.identity.refresh_count(), 1);
    assert_eq!(harness.credentials.refresh_locks_held(), 0);
}

#[tokio::test]
async fn test_transient_refresh_failures_are_retried_then_expire() {
    let harness = Harness::new();
    let producer = harness.producer("flaky@cutroom.test").await;
    harness.expire_delegated(producer.id).await;
    harness.identity.set_refresh(RefreshBehavior::Network);

    let err = harness
        .credentials
        .resolve_publishing_credential(producer.id)
        .await
        .unwrap_err();

    assert!(matches!(err, ReviewError::DelegationExpired(_)));
    // One call plus two retries
    assert_eq!(harness.identity.refresh_count(), 3);
}

#[tokio::test]
async fn test_missing_delegation_is_reported() {
    let harness = Harness::new();
    let (producer, _) = harness.sign_in("nodelegation@cutroom.test", Role::Producer, None).await;

    assert!(matches!(
        harness.credentials.resolve_publishing_credential(producer.id).await,
        Err(ReviewError::NotDelegated)
    ));
}

#[tokio::test]
async fn test_consent_state_is_single_use() {
    let harness = Harness::new();
    let url = harness.credentials.begin_consent(Role::Producer);
    let state = url.rsplit_once("state=").unwrap().1.to_string();

    let (account, _) = harness
        .credentials
        .complete_consent("owner@cutroom.test", &state)
        .await
        .unwrap();
    assert_eq!(account.role, Role::Producer);
    assert_eq!(
        account.delegated.unwrap().refresh_token.as_deref(),
        Some("consent-refresh")
    );

    assert!(matches!(
        harness
            .credentials
            .complete_consent("owner@cutroom.test", &state)
            .await,
        Err(ReviewError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_failed_code_exchange_is_unauthenticated() {
    let harness = Harness::new();
    let url = harness.credentials.begin_consent(Role::Delegate);
    let state = url.rsplit_once("state=").unwrap().1.to_string();

    assert!(matches!(
        harness.credentials.complete_consent("bad-code", &state).await,
        Err(ReviewError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_refresh_locks_do_not_accumulate() {
    let harness = Harness::new();
    for n in 0..20 {
        let producer = harness.producer(&format!("producer{n}@cutroom.test")).await;
        harness.expire_delegated(producer.id).await;
        harness
            .credentials
            .resolve_publishing_credential(producer.id)
            .await
            .unwrap();
    }
    assert_eq!(harness.identity.refresh_count(), 20);
    assert_eq!(harness.credentials.refresh_locks_held(), 0);
}
