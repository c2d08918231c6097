use std::time::Duration;

use bytes::Bytes;
use refetch::FetchError;

use crate::{HitCounter, get, setup_coordinator, test_policy};

#[tokio::test]
async fn test_fetch_over_http() {
    let server = HitCounter::new();
    let coordinator = setup_coordinator(|_| ());

    let (key, request) = get(&server, "ok");
    let body = coordinator.fetch(key, request, test_policy()).await.unwrap();

    assert_eq!(body, Bytes::from("hello world"));
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_cache_prevents_second_request() {
    let server = HitCounter::new();
    let coordinator = setup_coordinator(|_| ());

    let (key, request) = get(&server, "ok");
    let first = coordinator
        .fetch(key.clone(), request.clone(), test_policy())
        .await
        .unwrap();
    let second = coordinator.fetch(key, request, test_policy()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_concurrent_fetches_hit_server_once() {
    let server = HitCounter::new();
    let coordinator = setup_coordinator(|_| ());

    let (key, request) = get(&server, "delay/100ms/shared");
    let fetches =
        (0..5).map(|_| coordinator.fetch(key.clone(), request.clone(), test_policy()));
    let results = futures::future::join_all(fetches).await;

    for result in results {
        assert_eq!(result.unwrap(), Bytes::from("shared"));
    }
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = HitCounter::new();
    let coordinator = setup_coordinator(|_| ());

    let (key, request) = get(&server, "flaky/2/recovering");
    let body = coordinator.fetch(key, request, test_policy()).await.unwrap();

    assert_eq!(body, Bytes::from("recovering"));
    assert_eq!(server.accesses(), 3);
}

#[tokio::test]
async fn test_persistent_server_error_exhausts_attempts() {
    let server = HitCounter::new();
    let coordinator = setup_coordinator(|_| ());

    let (key, request) = get(&server, "respond_statuscode/503");
    let error = coordinator
        .fetch(key.clone(), request, test_policy())
        .await
        .unwrap_err();

    assert_eq!(error.status(), Some(503));
    assert_eq!(server.accesses(), 3);
    assert!(!coordinator.is_in_flight(&key));
}

#[tokio::test]
async fn test_client_error_is_terminal() {
    let server = HitCounter::new();
    let coordinator = setup_coordinator(|_| ());

    let (key, request) = get(&server, "respond_statuscode/404");
    let error = coordinator.fetch(key, request, test_policy()).await.unwrap_err();

    assert_eq!(error.status(), Some(404));
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_connection_failure_is_unavailable() {
    let coordinator = setup_coordinator(|config| {
        config.connect_timeout = Duration::from_millis(500);
    });

    // Assumes nothing is listening on this port.
    let request = refetch::PreparedRequest::get("http://127.0.0.1:9/nothing".parse().unwrap());
    let key = refetch::RequestKey::from_request(&request, &[]);
    let policy = test_policy().with_max_attempts(1);

    let error = coordinator.fetch(key, request, policy).await.unwrap_err();

    assert!(matches!(error, FetchError::Unavailable(_)), "{error:?}");
}
