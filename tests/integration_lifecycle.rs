//! Integration: full cluster lifecycle across backend kinds.
//!
//! Exercises the fixture end to end against the backends that need no
//! external services: memory, segment-file, and composite. Networked
//! backends are covered by their feature-gated unit tests.

use std::sync::Arc;

use quarry::constants::STATISTICS_SERVICE_KIND;
use quarry::{
    BackendDescriptor, BackendKind, FixtureError, RecordingStatisticsSink, RepositoryFixture,
    StatisticsBinding, StatisticsSink,
};

fn memory_fixture() -> anyhow::Result<RepositoryFixture> {
    let descriptor = BackendDescriptor::memory(16 * 1024 * 1024)?;
    Ok(RepositoryFixture::new(descriptor)?)
}

#[tokio::test]
async fn test_memory_cluster_full_lifecycle() -> anyhow::Result<()> {
    let mut fixture = memory_fixture()?;
    assert!(fixture.is_available(3));

    let handles = fixture.set_up_cluster(3).await?;
    assert_eq!(handles.len(), 3);
    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(handle.node_id(), i);
        assert_eq!(handle.kind(), BackendKind::Memory);
        assert!(handle.supports_graceful_shutdown());
    }

    fixture.tear_down_cluster().await?;
    assert!(fixture.handles().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_tear_down_is_idempotent() -> anyhow::Result<()> {
    let mut fixture = memory_fixture()?;
    fixture.set_up_cluster(2).await?;

    fixture.tear_down_cluster().await?;
    fixture.tear_down_cluster().await?;
    fixture.tear_down_cluster().await?;
    Ok(())
}

#[tokio::test]
async fn test_is_available_is_a_pure_check() -> anyhow::Result<()> {
    let fixture = memory_fixture()?;
    for n in [0, 1, 8, 64] {
        assert!(fixture.is_available(n));
    }
    assert!(!fixture.is_available(65));
    assert!(fixture.handles().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sync_repository_cluster_always_fails() -> anyhow::Result<()> {
    let mut fixture = memory_fixture()?;

    // Even the trivially-consistent empty input is rejected; callers must
    // never believe a sync happened.
    let err = fixture.sync_repository_cluster(&[]).unwrap_err();
    assert!(matches!(err, FixtureError::Unsupported { .. }));
    assert!(err.to_string().contains("sync_repository_cluster"));

    fixture.set_up_cluster(2).await?;
    let err = fixture.sync_repository_cluster(fixture.handles());
    assert!(err.is_err());
    fixture.tear_down_cluster().await?;
    Ok(())
}

#[tokio::test]
async fn test_customizer_runs_once_per_node_with_stats_bound() -> anyhow::Result<()> {
    let mut fixture = memory_fixture()?;

    let handles = fixture
        .set_up_cluster_with(3, |builder| {
            // The statistics binding must already be visible here.
            let binding = builder
                .engine()
                .extensions()
                .lookup::<StatisticsBinding>(STATISTICS_SERVICE_KIND)
                .ok_or_else(|| FixtureError::customization("statistics not bound"))?;
            binding.sink().record_count("customizer.invoked", 1);

            let label = format!("bench-{}", builder.node_id());
            builder.with_metadata("label", label);
            Ok(())
        })
        .await?;

    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(
            handle.metadata().get("label").map(String::as_str),
            Some(format!("bench-{i}").as_str())
        );
    }

    fixture.tear_down_cluster().await?;
    Ok(())
}

#[tokio::test]
async fn test_recording_sink_observes_provisioning() -> anyhow::Result<()> {
    let sink = Arc::new(RecordingStatisticsSink::new());
    let mut fixture = memory_fixture()?;
    fixture.set_statistics_sink(Arc::clone(&sink) as Arc<dyn StatisticsSink>)?;

    fixture.set_up_cluster(4).await?;
    assert_eq!(sink.total_count("cluster.node.provisioned"), 4);
    assert_eq!(sink.durations().len(), 1);
    assert_eq!(sink.durations()[0].0, "cluster.set_up");

    fixture.tear_down_cluster().await?;
    Ok(())
}

#[tokio::test]
async fn test_zero_node_cluster_is_valid() -> anyhow::Result<()> {
    let mut fixture = memory_fixture()?;
    let handles = fixture.set_up_cluster(0).await?;
    assert!(handles.is_empty());

    // An empty cluster is still live, so a second setup is rejected.
    let err = fixture.set_up_cluster(1).await.unwrap_err();
    assert!(matches!(err, FixtureError::ClusterActive));

    fixture.tear_down_cluster().await?;
    fixture.set_up_cluster(1).await?;
    fixture.tear_down_cluster().await?;
    Ok(())
}

#[tokio::test]
async fn test_segment_cluster_creates_and_removes_directories() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let descriptor = BackendDescriptor::segment(dir.path(), 256, 256, true)?;
    let mut fixture = RepositoryFixture::new(descriptor)?;

    fixture.set_up_cluster(2).await?;
    for i in 0..2 {
        let node_dir = dir.path().join(format!("node-{i}"));
        assert!(node_dir.join("segments").is_dir());
        assert!(node_dir.join("journal.log").is_file());
    }

    fixture.tear_down_cluster().await?;
    assert!(!dir.path().join("node-0").exists());
    assert!(!dir.path().join("node-1").exists());
    Ok(())
}

#[tokio::test]
async fn test_segment_blob_store_variant() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let descriptor = BackendDescriptor::segment_with_blob_store(dir.path(), 256, 256, false, 16)?;
    assert!(descriptor.kind().uses_blob_store());

    let mut fixture = RepositoryFixture::new(descriptor)?;
    fixture.set_up_cluster(1).await?;
    assert!(dir.path().join("node-0").join("blobs").is_dir());

    fixture.tear_down_cluster().await?;
    assert!(!dir.path().join("node-0").exists());
    Ok(())
}

#[tokio::test]
async fn test_composite_cluster_lays_out_mounts() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let descriptor = BackendDescriptor::multiplexed(dir.path(), 256, 256, true, 3)?;
    let mut fixture = RepositoryFixture::new(descriptor)?;

    fixture.set_up_cluster(1).await?;
    let node_dir = dir.path().join("node-0");
    for m in 0..3 {
        assert!(node_dir.join(format!("mnt-{m}")).join("segments").is_dir());
    }

    fixture.tear_down_cluster().await?;
    assert!(!node_dir.exists());
    Ok(())
}

#[tokio::test]
async fn test_fixture_display_names_the_backend() -> anyhow::Result<()> {
    let fixture = memory_fixture()?;
    assert_eq!(fixture.to_string(), "Quarry-Memory");

    let dir = tempfile::tempdir()?;
    let fixture =
        RepositoryFixture::new(BackendDescriptor::segment(dir.path(), 256, 256, true)?)?;
    assert_eq!(fixture.to_string(), "Quarry-Segment");
    Ok(())
}
