use super::*;

#[tokio::test]
async fn test_exchange_good_code_authorizes() {
    let pipeline = create_test_pipeline_with(|_| {}, FakeStorage::always_done(), false).await;
    let manager = &pipeline.manager;
    let mut events = manager.subscribe();
    assert!(!manager.is_authorized());

    let url = manager.authorization_url().unwrap();
    assert!(url.starts_with("https://consent.example.com/"));
    assert!(manager.exchange_code("good").await.unwrap());

    assert!(manager.is_authorized());
    assert!(drain(&mut events).iter().any(|e| matches!(e, Event::Authorized)));

    let stored = std::fs::read_to_string(&manager.get_config().auth.credential_file).unwrap();
    assert!(stored.contains("token-from-code"));
}

#[tokio::test]
async fn test_rejected_code_returns_false() {
    let pipeline = create_test_pipeline_with(|_| {}, FakeStorage::always_done(), false).await;
    let manager = &pipeline.manager;

    manager.authorization_url().unwrap();
    assert!(!manager.exchange_code("wrong").await.unwrap());
    assert!(!manager.is_authorized());

    // The flow has to be restarted after a rejected code
    let again = manager.exchange_code("good").await;
    assert!(matches!(
        again,
        Err(Error::Auth(AuthError::FlowNotStarted))
    ));
}

#[tokio::test]
async fn test_exchange_without_flow_is_refused() {
    let pipeline = create_test_pipeline_with(|_| {}, FakeStorage::always_done(), false).await;
    let result = pipeline.manager.exchange_code("good").await;
    assert!(matches!(result, Err(Error::Auth(AuthError::FlowNotStarted))));
}

#[tokio::test]
async fn test_authorization_url_when_already_authorized() {
    let pipeline = create_test_pipeline_with(|_| {}, FakeStorage::always_done(), true).await;
    let result = pipeline.manager.authorization_url();
    assert!(matches!(
        result,
        Err(Error::Auth(AuthError::AlreadyAuthorized))
    ));
}
