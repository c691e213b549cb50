//! Review transitions, authorization and delegation handling
mod common;

use common::{Harness, StalledReads};
use review_service::db::{AssetRepository, WorkspaceRepository};
use review_service::models::{AssetStatus, Decision, DelegationStatus, EditMetadata};
use review_service::services::PublishOptions;
use review_service::ReviewError;
use std::sync::Arc;
use std::time::Duration;

fn edit(title: &str) -> EditMetadata {
    EditMetadata {
        title: Some(title.to_string()),
        description: None,
        tags: Vec::new(),
    }
}

#[tokio::test]
async fn test_full_review_cycle_publishes_once() {
    let harness = Harness::new();
    let producer = harness.producer("producer@cutroom.test").await;
    let delegate = harness.delegate("editor@cutroom.test").await;
    let workspace = harness
        .workflow
        .create_workspace(producer.id, "Main channel")
        .await
        .unwrap();

    let raw = harness.put_binary(8192).await;
    let asset = harness
        .workflow
        .submit_original(producer.id, workspace.id, "Editor@Cutroom.test", &raw)
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::Pending);
    assert_eq!(asset.assigned_to, delegate.id);
    assert_eq!(asset.uploaded_by, producer.id);

    let first_cut = harness.put_binary(4096).await;
    let asset = harness
        .workflow
        .submit_edit(delegate.id, asset.id, &first_cut, edit("Rough cut"))
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::ReviewReady);
    assert!(asset.edited_at.is_some());

    let asset = harness
        .workflow
        .decide(
            producer.id,
            asset.id,
            Decision::RequestChanges,
            Some("fix audio".into()),
        )
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::ChangesRequested);
    assert_eq!(asset.feedback.as_deref(), Some("fix audio"));
    assert!(asset.feedback_at.is_some());

    let second_cut = harness.put_binary(2048).await;
    let asset = harness
        .workflow
        .submit_edit(delegate.id, asset.id, &second_cut, edit("Final cut"))
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::ReviewReady);
    assert_eq!(asset.edited_ref.as_deref(), Some(second_cut.as_str()));
    assert!(!harness.binaries.contains(&first_cut), "superseded edit is removed");
    assert!(harness.binaries.contains(&raw));

    let asset = harness
        .workflow
        .decide(producer.id, asset.id, Decision::Approve, None)
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::Approved);
    assert_eq!(asset.feedback.as_deref(), Some("fix audio"));

    let record = harness
        .workflow
        .publish(producer.id, asset.id, PublishOptions::default())
        .await
        .unwrap();
    assert_eq!(record.platform_id, "yt123");
    assert_eq!(record.title, "Final cut");

    let stored = harness.workflow.get_asset(producer.id, asset.id).await.unwrap();
    assert!(stored.is_published());
    assert_eq!(stored.platform_id(), Some("yt123"));
    assert_eq!(stored.status, AssetStatus::Approved);

    assert_eq!(harness.platform.insert_count(), 1);
    let upload = &harness.platform.received()[0];
    assert_eq!(upload.bytes, 2048, "the edited binary is published");
    assert_eq!(upload.access_token, "delegated-access");
}

#[tokio::test]
async fn test_approved_asset_rejects_further_review() {
    let harness = Harness::new();
    let scenario = harness.approved_asset().await;

    let err = harness
        .workflow
        .decide(
            scenario.producer.id,
            scenario.asset.id,
            Decision::RequestChanges,
            Some("late note".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::InvalidTransition(_)));

    let cut = harness.put_binary(16).await;
    let err = harness
        .workflow
        .submit_edit(scenario.delegate.id, scenario.asset.id, &cut, edit("again"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::InvalidTransition(_)));

    let unchanged = harness
        .workflow
        .get_asset(scenario.producer.id, scenario.asset.id)
        .await
        .unwrap();
    assert_eq!(unchanged.status, AssetStatus::Approved);
    assert!(unchanged.feedback.is_none());
}

#[tokio::test]
async fn test_decide_on_changes_requested_is_invalid() {
    let harness = Harness::new();
    let producer = harness.producer("p@cutroom.test").await;
    let delegate = harness.delegate("d@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();
    let raw = harness.put_binary(16).await;
    let asset = harness
        .workflow
        .submit_original(producer.id, workspace.id, &delegate.email, &raw)
        .await
        .unwrap();

    // A producer may decide straight from pending
    let asset = harness
        .workflow
        .decide(producer.id, asset.id, Decision::RequestChanges, None)
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::ChangesRequested);
    assert!(asset.feedback.is_none());

    let err = harness
        .workflow
        .decide(producer.id, asset.id, Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_only_owner_decides_and_publishes() {
    let harness = Harness::new();
    let scenario = harness.approved_asset().await;
    let outsider = harness.producer("other@cutroom.test").await;

    let err = harness
        .workflow
        .decide(scenario.delegate.id, scenario.asset.id, Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));

    let err = harness
        .workflow
        .publish(outsider.id, scenario.asset.id, PublishOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
    assert_eq!(harness.platform.insert_count(), 0);

    let err = harness
        .workflow
        .get_asset(outsider.id, scenario.asset.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
}

#[tokio::test]
async fn test_forbidden_is_reported_before_transition_errors() {
    let harness = Harness::new();
    let scenario = harness.approved_asset().await;

    // Approved asset and a non-owner: authorization wins
    let err = harness
        .workflow
        .decide(scenario.delegate.id, scenario.asset.id, Decision::RequestChanges, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
}

#[tokio::test]
async fn test_submit_original_requires_workspace_owner() {
    let harness = Harness::new();
    let owner = harness.producer("owner@cutroom.test").await;
    let intruder = harness.producer("intruder@cutroom.test").await;
    harness.delegate("editor@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(owner.id, "ws").await.unwrap();
    let raw = harness.put_binary(16).await;

    let err = harness
        .workflow
        .submit_original(intruder.id, workspace.id, "editor@cutroom.test", &raw)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
}

#[tokio::test]
async fn test_unknown_delegate_is_rejected() {
    let harness = Harness::new();
    let owner = harness.producer("owner@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(owner.id, "ws").await.unwrap();
    let raw = harness.put_binary(16).await;

    let err = harness
        .workflow
        .submit_original(owner.id, workspace.id, "nobody@cutroom.test", &raw)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::DelegateNotFound(email) if email == "nobody@cutroom.test"));
    assert!(harness
        .workflow
        .list_workspace_assets(owner.id, workspace.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_only_assignee_submits_edits() {
    let harness = Harness::new();
    let producer = harness.producer("p@cutroom.test").await;
    let assignee = harness.delegate("assignee@cutroom.test").await;
    let other = harness.delegate("other@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();
    let raw = harness.put_binary(16).await;
    let asset = harness
        .workflow
        .submit_original(producer.id, workspace.id, &assignee.email, &raw)
        .await
        .unwrap();

    let cut = harness.put_binary(16).await;
    for actor in [other.id, producer.id] {
        let err = harness
            .workflow
            .submit_edit(actor, asset.id, &cut, edit("hijack"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Forbidden(_)));
    }

    let untouched = harness.workflow.get_asset(producer.id, asset.id).await.unwrap();
    assert_eq!(untouched.status, AssetStatus::Pending);
    assert!(untouched.edited_ref.is_none());
}

#[tokio::test]
async fn test_first_edit_consumes_pending_delegation() {
    let harness = Harness::new();
    let producer = harness.producer("p@cutroom.test").await;
    let delegate = harness.delegate("d@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();
    let raw = harness.put_binary(16).await;
    let asset = harness
        .workflow
        .submit_original(producer.id, workspace.id, &delegate.email, &raw)
        .await
        .unwrap();

    let delegation = harness
        .repo
        .find_delegation(workspace.id, &delegate.email)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delegation.status, DelegationStatus::Pending);

    let listed = harness.workflow.list_workspaces(delegate.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, workspace.id);

    let cut = harness.put_binary(16).await;
    harness
        .workflow
        .submit_edit(delegate.id, asset.id, &cut, edit("cut"))
        .await
        .unwrap();

    let delegation = harness
        .repo
        .find_delegation(workspace.id, &delegate.email)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delegation.status, DelegationStatus::Accepted);
    assert!(delegation.accepted_at.is_some());
}

#[tokio::test]
async fn test_explicit_delegation_acceptance() {
    let harness = Harness::new();
    let producer = harness.producer("p@cutroom.test").await;
    let delegate = harness.delegate("d@cutroom.test").await;
    let stranger = harness.delegate("s@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();
    let raw = harness.put_binary(16).await;
    harness
        .workflow
        .submit_original(producer.id, workspace.id, &delegate.email, &raw)
        .await
        .unwrap();

    let accepted = harness
        .workflow
        .accept_delegation(delegate.id, workspace.id)
        .await
        .unwrap();
    assert_eq!(accepted.status, DelegationStatus::Accepted);

    let again = harness
        .workflow
        .accept_delegation(delegate.id, workspace.id)
        .await
        .unwrap();
    assert_eq!(again.accepted_at, accepted.accepted_at);

    let err = harness
        .workflow
        .accept_delegation(stranger.id, workspace.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
}

#[tokio::test]
async fn test_workspace_listing_and_visibility() {
    let harness = Harness::new();
    let producer = harness.producer("p@cutroom.test").await;
    let first = harness.delegate("first@cutroom.test").await;
    let second = harness.delegate("second@cutroom.test").await;
    let outsider = harness.delegate("outsider@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();

    for delegate in [&first, &second] {
        let raw = harness.put_binary(16).await;
        harness
            .workflow
            .submit_original(producer.id, workspace.id, &delegate.email, &raw)
            .await
            .unwrap();
    }

    let owned = harness.workflow.list_workspaces(producer.id).await.unwrap();
    assert_eq!(owned.len(), 1);

    let all = harness
        .workflow
        .list_workspace_assets(producer.id, workspace.id)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let mine = harness
        .workflow
        .list_workspace_assets(first.id, workspace.id)
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].assigned_to, first.id);

    let assigned = harness.workflow.list_assigned(second.id).await.unwrap();
    assert_eq!(assigned.len(), 1);

    let err = harness
        .workflow
        .list_workspace_assets(outsider.id, workspace.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));
}

#[tokio::test]
async fn test_delegates_cannot_own_workspaces() {
    let harness = Harness::new();
    let delegate = harness.delegate("d@cutroom.test").await;
    let producer = harness.producer("p@cutroom.test").await;

    let err = harness
        .workflow
        .create_workspace(delegate.id, "mine")
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Forbidden(_)));

    let err = harness
        .workflow
        .create_workspace(producer.id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::Validation(_)));
}

#[tokio::test]
async fn test_missing_asset_is_not_found() {
    let harness = Harness::new();
    let producer = harness.producer("p@cutroom.test").await;

    let err = harness
        .workflow
        .decide(producer.id, uuid::Uuid::new_v4(), Decision::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReviewError::NotFound(_)));
}

#[tokio::test]
async fn test_edit_cannot_alias_existing_binaries() {
    let harness = Harness::new();
    let producer = harness.producer("producer@cutroom.test").await;
    let other = harness.producer("other@cutroom.test").await;
    let delegate = harness.delegate("editor@cutroom.test").await;

    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();
    let raw = harness.put_binary(64).await;
    let asset = harness
        .workflow
        .submit_original(producer.id, workspace.id, &delegate.email, &raw)
        .await
        .unwrap();

    let foreign_ws = harness.workflow.create_workspace(other.id, "other").await.unwrap();
    let foreign_raw = harness.put_binary(64).await;
    harness
        .workflow
        .submit_original(other.id, foreign_ws.id, &delegate.email, &foreign_raw)
        .await
        .unwrap();

    for reference in [raw.as_str(), foreign_raw.as_str(), "s3://elsewhere/x"] {
        let err = harness
            .workflow
            .submit_edit(delegate.id, asset.id, reference, edit("Cut"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Validation(_)), "{reference}");
    }
    assert!(harness.binaries.contains(&raw));
    assert!(harness.binaries.contains(&foreign_raw));

    let first_cut = harness.put_binary(32).await;
    harness
        .workflow
        .submit_edit(delegate.id, asset.id, &first_cut, edit("Rough cut"))
        .await
        .unwrap();
    let second_cut = harness.put_binary(32).await;
    let asset = harness
        .workflow
        .submit_edit(delegate.id, asset.id, &second_cut, edit("Final cut"))
        .await
        .unwrap();

    assert_eq!(asset.edited_ref.as_deref(), Some(second_cut.as_str()));
    assert!(!harness.binaries.contains(&first_cut));
    assert!(harness.binaries.contains(&raw));
    assert!(harness.binaries.contains(&foreign_raw));
}

/// An asset with a first cut awaiting review, plus everything around it
async fn review_ready(harness: &Harness) -> (common::Scenario, String) {
    let producer = harness.producer("producer@cutroom.test").await;
    let delegate = harness.delegate("editor@cutroom.test").await;
    let workspace = harness.workflow.create_workspace(producer.id, "ws").await.unwrap();
    let raw = harness.put_binary(64).await;
    let asset = harness
        .workflow
        .submit_original(producer.id, workspace.id, &delegate.email, &raw)
        .await
        .unwrap();
    let first_cut = harness.put_binary(32).await;
    let asset = harness
        .workflow
        .submit_edit(delegate.id, asset.id, &first_cut, edit("Rough cut"))
        .await
        .unwrap();
    assert_eq!(asset.status, AssetStatus::ReviewReady);

    let scenario = common::Scenario {
        producer,
        delegate,
        workspace,
        asset,
    };
    (scenario, first_cut)
}

#[tokio::test]
async fn test_edit_racing_approval_and_publish_is_rejected() {
    let harness = Harness::new();
    let (scenario, first_cut) = review_ready(&harness).await;
    let slow = harness.workflow_with(
        Arc::new(StalledReads::new(harness.repo.clone(), Duration::from_millis(100))),
        harness.platform.clone(),
    );
    let late_cut = harness.put_binary(16).await;

    let (edit_result, publish_result) = tokio::join!(
        slow.submit_edit(scenario.delegate.id, scenario.asset.id, &late_cut, edit("Late cut")),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            harness
                .workflow
                .decide(scenario.producer.id, scenario.asset.id, Decision::Approve, None)
                .await?;
            harness
                .workflow
                .publish(scenario.producer.id, scenario.asset.id, PublishOptions::default())
                .await
        },
    );

    assert!(matches!(edit_result, Err(ReviewError::InvalidTransition(_))));
    assert_eq!(publish_result.unwrap().platform_id, "yt123");

    let stored = AssetRepository::find(&*harness.repo, scenario.asset.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AssetStatus::Approved);
    assert!(stored.is_published());
    assert_eq!(stored.edited_ref.as_deref(), Some(first_cut.as_str()));
    assert!(harness.binaries.contains(&first_cut));
}

#[tokio::test]
async fn test_stale_decision_does_not_overwrite_approval() {
    let harness = Harness::new();
    let (scenario, _) = review_ready(&harness).await;
    let slow = harness.workflow_with(
        Arc::new(StalledReads::new(harness.repo.clone(), Duration::from_millis(100))),
        harness.platform.clone(),
    );

    let (stale, approved) = tokio::join!(
        slow.decide(
            scenario.producer.id,
            scenario.asset.id,
            Decision::RequestChanges,
            Some("redo the intro".into()),
        ),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            harness
                .workflow
                .decide(scenario.producer.id, scenario.asset.id, Decision::Approve, None)
                .await
        },
    );

    assert!(matches!(stale, Err(ReviewError::InvalidTransition(_))));
    assert_eq!(approved.unwrap().status, AssetStatus::Approved);

    let stored = AssetRepository::find(&*harness.repo, scenario.asset.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, AssetStatus::Approved);
    assert!(stored.feedback.is_none());
}
