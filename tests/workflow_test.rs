mod common;

use std::collections::HashMap;

use common::{FakeGateway, PAGE_PATH, fixture, participant, post_body};
use congress_registration::domain::participant::DataId;
use congress_registration::domain::ports::SessionState;
use congress_registration::domain::request::{HttpMethod, RegistrationRequest};
use congress_registration::domain::view::{FormError, MessageKey, ViewModel};
use congress_registration::infrastructure::in_memory::InMemorySession;
use congress_registration::interfaces::query::read_request;

fn get_request(pairs: &[(&str, &str)]) -> RegistrationRequest {
    let query: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    read_request(PAGE_PATH, HttpMethod::Get, &query, None)
}

#[tokio::test]
async fn test_unknown_data_id_is_not_found() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();

    let view = f
        .workflow
        .run(&get_request(&[("dataId", "beef")]), &session)
        .await
        .unwrap();
    assert_eq!(view, ViewModel::Error { is_not_found: true });
}

#[tokio::test]
async fn test_viewing_issues_nonce_and_targets() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();

    let view = f
        .workflow
        .run(&RegistrationRequest::get(PAGE_PATH), &session)
        .await
        .unwrap();

    let ViewModel::Form {
        data_id,
        form_nonce,
        validate_target,
        submit_target,
        cancel_target,
        back_target,
        editable,
        cancelable,
        form,
        error,
        ..
    } = view
    else {
        panic!("expected form view, got {view:?}");
    };
    assert_eq!(data_id, None);
    assert!(!form_nonce.is_empty());
    // the issued nonce is live in the session
    assert!(session.consume_nonce(&form_nonce).await);
    assert_eq!(validate_target, format!("{PAGE_PATH}?validate=true"));
    assert_eq!(submit_target, PAGE_PATH);
    assert_eq!(cancel_target, None);
    assert_eq!(back_target, "/congress");
    assert!(editable && cancelable);
    assert_eq!(form, "<form-body/>");
    assert_eq!(error, None);
}

#[tokio::test]
async fn test_submission_persists_and_confirms_once() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();
    let nonce = session.issue_nonce().await;

    let mut request = RegistrationRequest::get(PAGE_PATH);
    request.method = HttpMethod::Post;
    request.post = Some(post_body(&[
        ("name", "Ana Haveno"),
        ("email", "ana@example.org"),
        ("nonce", &nonce),
    ]));

    let view = f.workflow.run(&request, &session).await.unwrap();
    let ViewModel::Redirect { location } = view else {
        panic!("expected redirect, got {view:?}");
    };
    assert_eq!(f.repo.len().await, 1);
    let data_id = location.rsplit('=').next().unwrap().to_string();
    assert_eq!(location, format!("{PAGE_PATH}?dataId={data_id}"));

    // following the redirect shows the confirmation exactly once
    let edit = get_request(&[("dataId", &data_id)]);
    let view = f.workflow.run(&edit, &session).await.unwrap();
    assert!(
        matches!(view, ViewModel::Confirmation { .. }),
        "got {view:?}"
    );

    let view = f.workflow.run(&edit, &session).await.unwrap();
    assert!(matches!(view, ViewModel::Form { .. }), "got {view:?}");
}

#[tokio::test]
async fn test_submission_with_invalid_nonce_persists_nothing() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();

    let mut request = RegistrationRequest::get(PAGE_PATH);
    request.method = HttpMethod::Post;
    request.post = Some(post_body(&[
        ("name", "Ana Haveno"),
        ("email", "ana@example.org"),
        ("nonce", "stale-token"),
    ]));

    let view = f.workflow.run(&request, &session).await.unwrap();
    let ViewModel::Form { error, .. } = view else {
        panic!("expected form view, got {view:?}");
    };
    assert_eq!(error, Some(FormError::NonceInvalid));
    assert_eq!(f.repo.len().await, 0);
}

#[tokio::test]
async fn test_validate_only_never_persists() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();

    let mut request = get_request(&[("validate", "true")]);
    request.method = HttpMethod::Post;
    request.post = Some(post_body(&[("name", ""), ("email", "ana@example.org")]));

    let view = f.workflow.run(&request, &session).await.unwrap();
    let ViewModel::Form { error, .. } = view else {
        panic!("expected form view, got {view:?}");
    };
    assert!(
        matches!(error, Some(FormError::Validation { ref fields }) if fields[0].field == "name")
    );
    assert_eq!(f.repo.len().await, 0);

    // a clean body validates without persisting either
    let mut request = get_request(&[("validate", "true")]);
    request.method = HttpMethod::Post;
    request.post = Some(post_body(&[
        ("name", "Ana Haveno"),
        ("email", "ana@example.org"),
    ]));
    let view = f.workflow.run(&request, &session).await.unwrap();
    let ViewModel::Form { error, .. } = view else {
        panic!("expected form view, got {view:?}");
    };
    assert_eq!(error, None);
    assert_eq!(f.repo.len().await, 0);
}

#[tokio::test]
async fn test_cancel_flow_reaches_terminal_state() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();
    f.repo.insert(participant("aaaa", 10000, 0)).await;

    // step 1: confirmation prompt, nothing cancelled yet
    let view = f
        .workflow
        .run(&get_request(&[("dataId", "aaaa"), ("cancel", "true")]), &session)
        .await
        .unwrap();
    let ViewModel::CancelPrompt {
        cancel_error,
        really_cancel_target,
        ..
    } = view
    else {
        panic!("expected cancel prompt, got {view:?}");
    };
    assert!(!cancel_error);
    assert_eq!(
        really_cancel_target,
        format!("{PAGE_PATH}?dataId=aaaa&really_cancel=true")
    );
    assert!(f.repo.get(&DataId::new("aaaa")).await.unwrap().cancelled_time.is_none());

    // step 2: actually cancel
    let view = f
        .workflow
        .run(
            &get_request(&[("dataId", "aaaa"), ("really_cancel", "true")]),
            &session,
        )
        .await
        .unwrap();
    assert!(
        matches!(view, ViewModel::Cancelled { cancel_success: true, .. }),
        "got {view:?}"
    );
    assert!(f.repo.get(&DataId::new("aaaa")).await.unwrap().cancelled_time.is_some());

    // terminal: every later request shows the cancelled view, whatever the flags
    for pairs in [
        vec![("dataId", "aaaa")],
        vec![("dataId", "aaaa"), ("cancel", "true")],
        vec![("dataId", "aaaa"), ("really_cancel", "true")],
        vec![("dataId", "aaaa"), ("payment", "true")],
    ] {
        let view = f.workflow.run(&get_request(&pairs), &session).await.unwrap();
        assert!(
            matches!(view, ViewModel::Cancelled { cancel_success: false, .. }),
            "flags {pairs:?} got {view:?}"
        );
    }
}

#[tokio::test]
async fn test_payment_success_return_redirects_and_messages_once() {
    let f = fixture(FakeGateway::default());
    let session = InMemorySession::new();
    f.repo.insert(participant("aaaa", 10000, 0)).await;

    let view = f
        .workflow
        .run(
            &get_request(&[("dataId", "aaaa"), ("payment_success_return", "true")]),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(
        view,
        ViewModel::redirect(format!("{PAGE_PATH}?dataId=aaaa"))
    );

    // the clean edit view carries the message, once
    let edit = get_request(&[("dataId", "aaaa")]);
    let view = f.workflow.run(&edit, &session).await.unwrap();
    let ViewModel::Form { message, .. } = view else {
        panic!("expected form view, got {view:?}");
    };
    assert_eq!(message, Some(MessageKey::PaymentSuccessReturnMsg));

    let view = f.workflow.run(&edit, &session).await.unwrap();
    let ViewModel::Form { message, .. } = view else {
        panic!("expected form view, got {view:?}");
    };
    assert_eq!(message, None);
}

#[tokio::test]
async fn test_find_data_id_for_codeholder_skips_cancelled() {
    let f = fixture(FakeGateway::default());

    let mut cancelled = participant("aaaa", 10000, 0);
    cancelled.cancelled_time = Some(chrono::Utc::now());
    f.repo.insert(cancelled).await;

    let found = f.workflow.find_data_id_for_codeholder(77).await.unwrap();
    assert_eq!(found, None);

    f.repo.insert(participant("bbbb", 10000, 0)).await;
    let found = f.workflow.find_data_id_for_codeholder(77).await.unwrap();
    assert_eq!(found, Some(DataId::new("bbbb")));

    assert_eq!(f.workflow.find_data_id_for_codeholder(1).await.unwrap(), None);
}
