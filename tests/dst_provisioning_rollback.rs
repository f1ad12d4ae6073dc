//! DST: all-or-nothing provisioning under injected faults.
//!
//! Seeded fault injection drives the memory provisioner into failures at
//! chosen nodes; every scenario asserts the cluster rolled back whole and
//! the fixture stayed usable. Same seed, same outcome.

use quarry::{
    BackendDescriptor, FixtureError, MemoryFaults, MemoryProvisioner, ProvisionError,
    RepositoryFixture,
};

fn faulty_fixture(faults: MemoryFaults) -> RepositoryFixture {
    // Rollback paths log warnings; surface them under RUST_LOG when debugging.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();

    let descriptor = BackendDescriptor::memory(1024 * 1024).expect("valid descriptor");
    let provisioner = MemoryProvisioner::with_faults(descriptor.clone(), faults);
    RepositoryFixture::with_provisioner(descriptor, Box::new(provisioner))
}

#[tokio::test]
async fn test_fault_at_first_node_yields_empty_cluster() {
    let mut fixture = faulty_fixture(MemoryFaults::with_seed(7).fail_at_node(0));

    let err = fixture.set_up_cluster(4).await.unwrap_err();
    match err {
        FixtureError::Provisioning(ProvisionError::Node { node_id, .. }) => {
            assert_eq!(node_id, 0);
        }
        other => panic!("expected a node provisioning error, got {other}"),
    }
    assert!(fixture.handles().is_empty());
}

#[tokio::test]
async fn test_fault_mid_cluster_rolls_back_earlier_nodes() {
    let mut fixture = faulty_fixture(MemoryFaults::with_seed(7).fail_at_node(2));

    let err = fixture.set_up_cluster(4).await.unwrap_err();
    match err {
        FixtureError::Provisioning(ProvisionError::Node { node_id, .. }) => {
            assert_eq!(node_id, 2);
        }
        other => panic!("expected a node provisioning error, got {other}"),
    }

    // Nodes 0 and 1 were built and then shut down; none survive.
    assert!(fixture.handles().is_empty());
}

#[tokio::test]
async fn test_fixture_recovers_after_provisioning_failure() {
    let mut fixture = faulty_fixture(MemoryFaults::with_seed(7).fail_at_node(3));

    assert!(fixture.set_up_cluster(5).await.is_err());

    // A smaller cluster that never reaches the faulty node succeeds.
    let handles = fixture.set_up_cluster(3).await.expect("cluster below fault");
    assert_eq!(handles.len(), 3);
    fixture.tear_down_cluster().await.expect("clean teardown");
}

#[tokio::test]
async fn test_teardown_after_failed_setup_is_a_noop() {
    let mut fixture = faulty_fixture(MemoryFaults::with_seed(7).fail_at_node(1));

    assert!(fixture.set_up_cluster(2).await.is_err());
    fixture.tear_down_cluster().await.expect("nothing to release");
    fixture.tear_down_cluster().await.expect("still nothing");
}

#[tokio::test]
async fn test_customizer_failure_rolls_back_provisioned_nodes() {
    let descriptor = BackendDescriptor::memory(1024 * 1024).expect("valid descriptor");
    let mut fixture = RepositoryFixture::new(descriptor).expect("memory always compiled");

    let err = fixture
        .set_up_cluster_with(3, |builder| {
            if builder.node_id() == 2 {
                Err(FixtureError::customization("injected customizer failure"))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FixtureError::Customization { .. }));
    assert!(fixture.handles().is_empty());

    // Rollback left the fixture reusable.
    let handles = fixture.set_up_cluster(3).await.expect("clean retry");
    assert_eq!(handles.len(), 3);
    fixture.tear_down_cluster().await.expect("clean teardown");
}

#[tokio::test]
async fn test_probabilistic_faults_replay_with_same_seed() {
    let run = |seed: u64| async move {
        let mut fixture = faulty_fixture(MemoryFaults::with_seed(seed).with_failure_probability(0.3));
        let outcome = fixture.set_up_cluster(8).await.map(|handles| handles.len());
        // Either way the fixture ends in a known state.
        match &outcome {
            Ok(n) => assert_eq!(*n, 8),
            Err(_) => assert!(fixture.handles().is_empty()),
        }
        fixture.tear_down_cluster().await.ok();
        outcome.map_err(|e| e.to_string())
    };

    for seed in [1, 2, 42, 99, 12345] {
        let first = run(seed).await;
        let second = run(seed).await;
        assert_eq!(
            first, second,
            "seed {seed} must replay the same provisioning outcome"
        );
    }
}
