//! Live integration against a running MongoDB server.
//!
//! Every test is `#[ignore]`d: run with `cargo test --features document
//! -- --ignored` and a reachable server. The endpoint comes from
//! `TEST_MONGODB_URI`, defaulting to a local instance.

#![cfg(feature = "document")]

use quarry::{BackendDescriptor, RepositoryFixture};

fn server_uri() -> String {
    std::env::var("TEST_MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017/quarry-test".to_string())
}

#[tokio::test]
#[ignore] // Requires MongoDB
async fn test_document_cluster_lifecycle() {
    let descriptor =
        BackendDescriptor::document_uri(server_uri(), true, 1024 * 1024).expect("valid descriptor");
    let mut fixture = RepositoryFixture::new(descriptor).expect("document feature compiled");

    let handles = fixture.set_up_cluster(2).await.expect("server reachable");
    assert_eq!(handles.len(), 2);

    fixture.tear_down_cluster().await.expect("database dropped");
}

#[tokio::test]
#[ignore] // Requires MongoDB
async fn test_document_teardown_is_idempotent() {
    let descriptor =
        BackendDescriptor::document_uri(server_uri(), true, 1024 * 1024).expect("valid descriptor");
    let mut fixture = RepositoryFixture::new(descriptor).expect("document feature compiled");

    fixture.set_up_cluster(1).await.expect("server reachable");
    fixture.tear_down_cluster().await.expect("first teardown");
    fixture.tear_down_cluster().await.expect("second teardown");
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_terminally() {
    // Nothing listens on this port; the provisioning attempt must fail and
    // roll back rather than hand out a lazily-broken client. The short
    // selection timeout keeps the test quick.
    let descriptor = BackendDescriptor::document_uri(
        "mongodb://127.0.0.1:1/quarry-test?serverSelectionTimeoutMS=500",
        true,
        1024 * 1024,
    )
    .expect("valid descriptor");
    let mut fixture = RepositoryFixture::new(descriptor).expect("document feature compiled");

    assert!(fixture.set_up_cluster(1).await.is_err());
    assert!(fixture.handles().is_empty());
}
