use super::*;
use crate::api::fake::FakeBackend;
use crate::connectors::IndexingState;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;

fn credential(id: CredentialId, source: SourceType, key: &str) -> Credential {
    let mut payload = BTreeMap::new();
    if let Some(field) = source.key_field() {
        payload.insert(field.to_string(), key.to_string());
    }
    Credential {
        id,
        source,
        payload,
        admin_public: true,
        created_at: Utc::now(),
    }
}

fn status(id: ConnectorId, source: SourceType, linked: Option<CredentialId>) -> IndexingStatus {
    IndexingStatus::not_started(Connector {
        id,
        name: source.schema().connector_name.to_string(),
        source,
        input_type: source.schema().input_type,
        specific_config: json!({}),
        refresh_interval: source.schema().default_refresh_secs,
        credential_ids: linked.into_iter().collect(),
        disabled: false,
        created_at: Utc::now(),
    })
}

fn setup() -> (Arc<FakeBackend>, BindingCoordinator) {
    let fake = Arc::new(FakeBackend::new());
    let backend: Arc<dyn BackendApi> = fake.clone();
    let cache = Arc::new(ResourceCache::new(Arc::clone(&backend)));
    (fake, BindingCoordinator::new(backend, cache))
}

fn ready<T>(items: Vec<T>) -> Snapshot<T> {
    Snapshot::Ready(Arc::new(items))
}

#[test]
fn test_loading_wins_over_failure() {
    let view = derive_view(
        SourceType::Hubspot,
        &Snapshot::Loading,
        &Snapshot::Failed("boom".to_string()),
    );
    assert_eq!(view, ViewState::Loading);
}

#[test]
fn test_connector_failure_reported_first() {
    let view = derive_view(
        SourceType::Hubspot,
        &Snapshot::Failed("creds down".to_string()),
        &Snapshot::Failed("statuses down".to_string()),
    );
    assert_eq!(
        view,
        ViewState::LoadFailed {
            resource: CacheKey::IndexingStatuses,
            message: "statuses down".to_string(),
        }
    );
}

#[test]
fn test_credential_failure() {
    let view = derive_view(
        SourceType::Hubspot,
        &Snapshot::Failed("creds down".to_string()),
        &ready(vec![]),
    );
    assert!(matches!(
        view,
        ViewState::LoadFailed {
            resource: CacheKey::Credentials,
            ..
        }
    ));
}

#[test]
fn test_blank_key_is_not_live() {
    let creds = vec![credential(1, SourceType::Hubspot, "  ")];
    assert_eq!(
        classify(SourceType::Hubspot, &creds, &[]),
        ViewState::Unconfigured
    );
}

#[test]
fn test_other_source_credential_is_not_live() {
    let creds = vec![credential(1, SourceType::Notion, "secret_x")];
    assert_eq!(
        classify(SourceType::Hubspot, &creds, &[]),
        ViewState::Unconfigured
    );
}

#[test]
fn test_first_match_is_live() {
    let creds = vec![
        credential(1, SourceType::Notion, "n"),
        credential(2, SourceType::Hubspot, "abc"),
        credential(3, SourceType::Hubspot, "def"),
    ];
    match classify(SourceType::Hubspot, &creds, &[]) {
        ViewState::CredentialOnly {
            credential: Some(c),
        } => assert_eq!(c.id, 2),
        other => panic!("unexpected view {:?}", other),
    }
}

#[test]
fn test_rows_carry_link_state() {
    let creds = vec![credential(1, SourceType::Hubspot, "abc")];
    let statuses = vec![
        status(10, SourceType::Hubspot, Some(1)),
        status(11, SourceType::Hubspot, None),
        status(12, SourceType::Hubspot, Some(7)),
        status(13, SourceType::Github, Some(1)),
    ];

    let view = classify(SourceType::Hubspot, &creds, &statuses);
    let links: Vec<(ConnectorId, LinkState)> = view
        .connectors()
        .iter()
        .map(|row| (row.status.connector.id, row.link))
        .collect();
    assert_eq!(
        links,
        vec![
            (10, LinkState::Live),
            (11, LinkState::Unlinked),
            (12, LinkState::Other(7)),
        ]
    );
}

#[test]
fn test_credential_less_source_is_never_unconfigured() {
    assert_eq!(
        classify(SourceType::Web, &[], &[]),
        ViewState::CredentialOnly { credential: None }
    );
    let view = classify(SourceType::Web, &[], &[status(5, SourceType::Web, None)]);
    assert_eq!(view.connectors().len(), 1);
}

/// Checks the three-way classification over every small combination of
/// credential and connector sources.
#[test]
fn test_classification_matches_collections() {
    let pool = [SourceType::Hubspot, SourceType::Notion, SourceType::Github];
    let target = SourceType::Hubspot;

    for cred_mask in 0u8..8 {
        for conn_mask in 0u8..8 {
            let creds: Vec<Credential> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| cred_mask & (1 << i) != 0)
                .map(|(i, s)| credential(i as i64 + 1, *s, "key"))
                .collect();
            let statuses: Vec<IndexingStatus> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| conn_mask & (1 << i) != 0)
                .map(|(i, s)| status(i as i64 + 100, *s, None))
                .collect();

            let has_cred = creds.iter().any(|c| c.source == target);
            let has_conn = statuses.iter().any(|s| s.connector.source == target);
            let view = classify(target, &creds, &statuses);

            match view {
                ViewState::Unconfigured => assert!(!has_cred),
                ViewState::CredentialOnly { .. } => assert!(has_cred && !has_conn),
                ViewState::Bound { ref connectors, .. } => {
                    assert!(has_cred && has_conn);
                    assert!(connectors.iter().all(|r| r.status.connector.source == target));
                }
                other => panic!("unexpected view {:?}", other),
            }
        }
    }
}

#[tokio::test]
async fn test_link_refreshes_statuses() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    let conn = fake.seed_connector(SourceType::Hubspot, None);

    coordinator.link_credential(conn, cred).await.unwrap();

    let view = coordinator.current_view(SourceType::Hubspot);
    assert_eq!(view.connectors()[0].link, LinkState::Live);
}

#[tokio::test]
async fn test_link_twice_is_idempotent() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    let conn = fake.seed_connector(SourceType::Hubspot, None);

    coordinator.link_credential(conn, cred).await.unwrap();
    let once = coordinator.view(SourceType::Hubspot).await;

    coordinator.link_credential(conn, cred).await.unwrap();
    let twice = coordinator.view(SourceType::Hubspot).await;

    assert_eq!(once, twice);
    // Second call short-circuits on the cached link
    assert_eq!(fake.calls("link_credential"), 1);
}

#[tokio::test]
async fn test_relink_to_other_credential_rejected_locally() {
    let (fake, coordinator) = setup();
    let first = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    let second = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "def")]);
    let conn = fake.seed_connector(SourceType::Hubspot, Some(first));

    let err = coordinator.link_credential(conn, second).await.unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::AlreadyLinked { linked_to, .. })
            if linked_to == first
    ));
    assert_eq!(fake.calls("link_credential"), 0);
}

#[tokio::test]
async fn test_source_mismatch_rejected_locally() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Notion, &[("notion_integration_token", "n")]);
    let conn = fake.seed_connector(SourceType::Hubspot, None);

    let err = coordinator.link_credential(conn, cred).await.unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::SourceMismatch { .. })
    ));
    assert_eq!(fake.calls("link_credential"), 0);
}

#[tokio::test]
async fn test_backend_rejection_leaves_view_unchanged() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    let conn = fake.seed_connector(SourceType::Hubspot, None);
    let before = coordinator.view(SourceType::Hubspot).await;
    fake.fail_next("link_credential", ApiError::Transport("reset".to_string()));

    let err = coordinator.link_credential(conn, cred).await.unwrap_err();

    assert!(matches!(err, ConsoleError::Mutation(_)));
    assert_eq!(coordinator.current_view(SourceType::Hubspot), before);
}

#[tokio::test]
async fn test_refused_with_no_request_when_connector_exists() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    fake.seed_connector(SourceType::Hubspot, Some(cred));

    let before = coordinator.view(SourceType::Hubspot).await;
    let cred_fetches = fake.calls("list_credentials");
    let status_fetches = fake.calls("list_indexing_statuses");

    let err = coordinator.guarded_delete_credential(cred).await.unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::CredentialInUse { connectors: 1, .. })
    ));
    assert_eq!(
        err.to_string(),
        "Must delete all connectors before deleting credentials"
    );
    assert_eq!(fake.calls("delete_credential"), 0);
    assert_eq!(fake.calls("list_credentials"), cred_fetches);
    assert_eq!(fake.calls("list_indexing_statuses"), status_fetches);
    assert_eq!(coordinator.current_view(SourceType::Hubspot), before);
}

#[tokio::test]
async fn test_unlinked_connector_of_same_source_blocks_delete() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    fake.seed_connector(SourceType::Hubspot, None);

    let err = coordinator.guarded_delete_credential(cred).await.unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::CredentialInUse { .. })
    ));
    assert_eq!(fake.calls("delete_credential"), 0);
}

#[tokio::test]
async fn test_deletes_when_no_dependents() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    fake.seed_connector(SourceType::Notion, None);

    coordinator.guarded_delete_credential(cred).await.unwrap();

    assert_eq!(fake.calls("delete_credential"), 1);
    assert_eq!(
        coordinator.current_view(SourceType::Hubspot),
        ViewState::Unconfigured
    );
}

#[tokio::test]
async fn test_unknown_credential_rejected_locally() {
    let (fake, coordinator) = setup();

    let err = coordinator.guarded_delete_credential(42).await.unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::UnknownCredential(42))
    ));
    assert_eq!(fake.calls("delete_credential"), 0);
}

#[tokio::test]
async fn test_status_load_failure_blocks_delete() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    fake.fail_next("list_indexing_statuses", ApiError::Transport("refused".to_string()));

    let err = coordinator.guarded_delete_credential(cred).await.unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Load {
            resource: CacheKey::IndexingStatuses,
            ..
        }
    ));
    assert_eq!(fake.calls("delete_credential"), 0);
}

#[tokio::test]
async fn test_stale_read_surfaces_backend_conflict() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    coordinator.view(SourceType::Hubspot).await;

    // Another operator links a connector after our last fetch
    fake.seed_connector(SourceType::Hubspot, Some(cred));

    let err = coordinator.guarded_delete_credential(cred).await.unwrap_err();

    match err {
        ConsoleError::Mutation(api) => assert!(api.is_conflict()),
        other => panic!("expected backend conflict, got {:?}", other),
    }
    assert_eq!(fake.calls("delete_credential"), 1);
}

#[tokio::test]
async fn test_unconfigured_to_credential_only() {
    let (_fake, coordinator) = setup();
    assert_eq!(
        coordinator.view(SourceType::Hubspot).await,
        ViewState::Unconfigured
    );

    let mut payload = BTreeMap::new();
    payload.insert("hubspot_access_token".to_string(), "abc".to_string());
    coordinator
        .credentials()
        .create_credential(SourceType::Hubspot, payload, true)
        .await
        .unwrap();

    assert!(matches!(
        coordinator.current_view(SourceType::Hubspot),
        ViewState::CredentialOnly {
            credential: Some(_)
        }
    ));
}

#[tokio::test]
async fn test_both_steps_succeed_into_bound() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);

    let connector = coordinator
        .create_and_link_connector(SourceType::Hubspot, json!({}), None, cred)
        .await
        .unwrap();
    assert_eq!(connector.credential_ids, vec![cred]);

    match coordinator.current_view(SourceType::Hubspot) {
        ViewState::Bound { connectors, .. } => {
            assert_eq!(connectors.len(), 1);
            assert_eq!(connectors[0].link, LinkState::Live);
            assert!(connectors[0].status.connector.references(cred));
        }
        other => panic!("expected bound view, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_link_leaves_unlinked_row() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    fake.fail_next("link_credential", ApiError::Transport("reset".to_string()));

    let err = coordinator
        .create_and_link_connector(SourceType::Hubspot, json!({}), None, cred)
        .await
        .unwrap_err();

    let created = match err {
        ConsoleError::PartialSequence { connector, .. } => connector,
        other => panic!("expected partial sequence, got {:?}", other),
    };

    let view = coordinator.current_view(SourceType::Hubspot);
    assert!(matches!(view, ViewState::Bound { .. }));
    let row = &view.connectors()[0];
    assert_eq!(row.status.connector.id, created.id);
    assert_eq!(row.link, LinkState::Unlinked);

    // Operator retries the link
    coordinator.link_credential(created.id, cred).await.unwrap();
    assert_eq!(
        coordinator.current_view(SourceType::Hubspot).connectors()[0].link,
        LinkState::Live
    );
}

#[tokio::test]
async fn test_wrong_source_credential_creates_nothing() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Notion, &[("notion_integration_token", "n")]);

    let err = coordinator
        .create_and_link_connector(SourceType::Hubspot, json!({}), None, cred)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::SourceMismatch { .. })
    ));
    assert_eq!(fake.calls("create_connector"), 0);
}

#[tokio::test]
async fn test_credential_less_source_rejected() {
    let (fake, coordinator) = setup();
    let err = coordinator
        .create_and_link_connector(
            SourceType::Web,
            json!({"base_url": "https://docs.example.com"}),
            None,
            1,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConsoleError::Validation(ValidationError::NoCredentialRequired(SourceType::Web))
    ));
    assert_eq!(fake.calls("create_connector"), 0);
}

#[tokio::test]
async fn test_rows_show_indexing_progress() {
    let (fake, coordinator) = setup();
    let cred = fake.seed_credential(SourceType::Hubspot, &[("hubspot_access_token", "abc")]);
    let connector = coordinator
        .create_and_link_connector(SourceType::Hubspot, json!({}), None, cred)
        .await
        .unwrap();

    fake.set_indexing_state(connector.id, IndexingState::Success);
    coordinator
        .cache()
        .invalidate(CacheKey::IndexingStatuses)
        .await;

    let view = coordinator.current_view(SourceType::Hubspot);
    assert_eq!(view.connectors()[0].status.last_status, IndexingState::Success);
}
