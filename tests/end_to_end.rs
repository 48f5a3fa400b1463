//! End-to-end tests through the public API
//!
//! These drive the engine the way an application does: batches in, queries and reports out,
//! with persistence and the async connection layer where relevant.

use futures::StreamExt;
use pitboard::analysis::IncidentAnalysis;
use pitboard::detector::ResetReason;
use pitboard::persistence::{
    BlobSessionHistory, BlobStore, FileBlobStore, LAP_LOG_KEY, MemoryBlobStore, PersistenceWorker,
    SessionHistory,
};
use pitboard::providers::ChannelProvider;
use pitboard::store::StoreDocument;
use pitboard::{
    EngineConfig, KartKey, LapEngine, LapRecord, RawKartFrame, SnapshotBatch, TimingConnection,
    UpdateRate,
};
use std::sync::Arc;

const T0: u64 = 1_700_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn kart(number: &str, driver: &str, laps: u32, last_ms: i64) -> RawKartFrame {
    RawKartFrame {
        kart_number: Some(number.to_string()),
        driver_name: Some(driver.to_string()),
        total_laps: Some(laps),
        last_time_raw: Some(last_ms),
        position: Some(1),
        ..Default::default()
    }
}

fn batch(session: &str, current_lap: u32, karts: Vec<RawKartFrame>) -> SnapshotBatch {
    SnapshotBatch {
        event_name: "Club Night".to_string(),
        session_name: session.to_string(),
        current_lap,
        karts,
        ..Default::default()
    }
}

fn record(session: &str, kart: &str, driver: &str, lap_number: u32, lap_ms: u32, at: u64) -> LapRecord {
    LapRecord {
        session_id: session.to_string(),
        kart_key: KartKey::new(None, kart),
        base_kart_id: kart.to_string(),
        kart_number: kart.to_string(),
        kart_name: None,
        driver_name: driver.to_string(),
        lap_number,
        lap_ms,
        recorded_at_ms: at,
        position: None,
        track_config_id: None,
    }
}

#[test]
fn kart_seven_keeps_two_valid_laps() -> anyhow::Result<()> {
    init_tracing();
    let mut engine = LapEngine::new(EngineConfig::default());
    for (laps, ms) in [(1, 28_000), (2, 27_500), (3, 61_000)] {
        engine.ingest_at(&batch("Heat 1", laps, vec![kart("7", "Ana", laps, ms)]), T0);
    }

    assert_eq!(engine.store().laps().len(), 2);
    let aggregate = engine.kart_aggregate("7").ok_or_else(|| anyhow::anyhow!("kart 7 missing"))?;
    assert_eq!(aggregate.best_lap_ms, Some(27_500));
    assert_eq!(aggregate.total_laps, 2);
    assert_eq!(engine.driver_aggregate("Ana").map(|d| d.total_laps), Some(2));
    Ok(())
}

#[test]
fn over_limit_laps_in_an_import_stay_in_the_log_only() -> anyhow::Result<()> {
    let document = StoreDocument {
        version: 1,
        laps: vec![
            record("s1", "7", "Ana", 1, 30_000, 1),
            record("s1", "7", "Ana", 2, 60_001, 2),
            record("s1", "9", "Bo", 1, 60_001, 3),
        ],
        ..Default::default()
    };
    let mut engine = LapEngine::new(EngineConfig::default());
    engine.import_json(&serde_json::to_vec(&document)?)?;

    assert_eq!(engine.store().laps().len(), 3);
    assert_eq!(engine.kart_aggregate("7").map(|k| k.total_laps), Some(1));
    assert!(engine.kart_aggregate("9").is_none());
    assert!(engine.rank_karts(None).iter().all(|r| r.kart_number != "9"));
    Ok(())
}

#[test]
fn import_migrates_documents_with_missing_keys() -> anyhow::Result<()> {
    let json = r#"{"laps":[{"sessionId":"s1","kartKey":"7","baseKartId":"7","kartNumber":"7",
        "driverName":"Ana","lapNumber":1,"lapMs":30000,"recordedAtMs":5}]}"#;
    let mut engine = LapEngine::new(EngineConfig::default());
    engine.import_json(json.as_bytes())?;

    assert_eq!(engine.store().sessions().len(), 1);
    assert_eq!(engine.store().sessions()["s1"].lap_count, 1);
    assert_eq!(engine.kart_aggregate("7").and_then(|k| k.best_lap_ms), Some(30_000));
    Ok(())
}

#[test]
fn restart_heuristic_depends_on_current_lap() {
    let mut engine = LapEngine::new(EngineConfig::default());
    for lap in 1..=5 {
        engine.ingest_at(&batch("Heat 1", lap, vec![kart("7", "Ana", lap, 30_000)]), T0);
    }
    let report = engine.ingest_at(&batch("Heat 1", 10, vec![kart("7", "Ana", 6, 30_000)]), T0 + 1);
    assert!(report.reset.is_none());

    let report = engine.ingest_at(&batch("Heat 1", 1, vec![kart("7", "Ana", 1, 30_100)]), T0 + 2);
    assert!(matches!(report.reset, Some(ResetReason::LapCounterRestart { current_lap: 1, .. })));
    assert!(report.completed_session_id.is_some());
    // The log keeps every lap across the reset.
    assert_eq!(engine.store().laps().len(), 7);
}

#[test]
fn incidents_confirm_recovered_laps() {
    let mut engine = LapEngine::new(EngineConfig::default());
    for (lap, ms) in [(1, 30_500), (2, 30_000), (3, 30_000), (4, 45_000), (5, 30_200)] {
        engine.ingest_at(&batch("Heat 1", lap, vec![kart("7", "Ana", lap, ms)]), T0);
    }

    match engine.incidents("7") {
        IncidentAnalysis::Analyzed(report) => {
            assert_eq!(report.incidents.len(), 1);
            assert_eq!(report.incidents[0].lap_number, 4);
            assert_eq!(report.incidents[0].recovery_lap, Some(5));
        }
        other => panic!("expected an analysis, got {other:?}"),
    }
    assert!(matches!(engine.incidents("99"), IncidentAnalysis::InsufficientData { .. }));
}

#[test]
fn export_import_is_a_fixed_point() -> anyhow::Result<()> {
    let mut engine = LapEngine::new(EngineConfig::default());
    for session in ["Heat 1", "Heat 2"] {
        for lap in 1..=4 {
            engine.ingest_at(
                &batch(
                    session,
                    lap,
                    vec![kart("7", "Ana", lap, 29_000 + i64::from(lap) * 50), kart("9", "Bo", lap, 29_800)],
                ),
                T0 + u64::from(lap),
            );
        }
    }

    let exported = engine.export_json()?;
    let mut restored = LapEngine::new(EngineConfig::default());
    restored.import_json(&exported)?;
    assert_eq!(restored.export_json()?, exported);

    restored.rebuild_aggregates();
    assert_eq!(restored.export_json()?, exported);
    assert_eq!(restored.rank_karts(None), engine.rank_karts(None));
    Ok(())
}

#[test]
fn retention_evicts_oldest_and_matches_rebuild() -> anyhow::Result<()> {
    let mut engine = LapEngine::new(EngineConfig::default());
    for session in 0..141u64 {
        let name = format!("Heat {session}");
        engine.ingest_at(&batch(&name, 1, vec![kart("7", "Ana", 1, 30_000)]), T0 + session * 1_000);
    }

    assert_eq!(engine.store().sessions().len(), 140);
    assert!(!engine.store().sessions().contains_key(&format!("{T0}_Club Night - Heat 0")));
    let incremental = engine.export_json()?;
    engine.rebuild_aggregates();
    assert_eq!(engine.export_json()?, incremental);
    assert_eq!(engine.kart_aggregate("7").map(|k| k.total_laps), Some(140));
    Ok(())
}

#[tokio::test]
async fn connection_persists_and_restores_through_files() -> anyhow::Result<()> {
    init_tracing();
    let dir = std::env::temp_dir().join(format!("pitboard-e2e-{}", std::process::id()));
    let blobs = Arc::new(FileBlobStore::new(&dir));
    let persistence = PersistenceWorker::spawn_with_store(blobs.clone());

    let config = EngineConfig { persist_every_laps: 1, ..Default::default() };
    let mut engine = LapEngine::new(config.clone());
    engine.attach_persistence(persistence.clone());

    let (provider, tx) = ChannelProvider::new(8);
    let connection = TimingConnection::start(provider, engine);
    let mut reports = connection.subscribe(UpdateRate::Native);

    for lap in 1..=3 {
        tx.send(batch("Final", lap, vec![kart("7", "Ana", lap, 30_000 - i64::from(lap) * 10)])).await?;
        let report = reports.next().await.ok_or_else(|| anyhow::anyhow!("feed ended early"))?;
        assert!(report.persisted);
    }
    drop(tx);
    while reports.next().await.is_some() {}
    persistence.flush().await;

    assert!(blobs.load(LAP_LOG_KEY).await?.is_some());
    let history = BlobSessionHistory::new(blobs.clone());
    let sessions = history.list_sessions().await?;
    assert_eq!(sessions.len(), 1);
    let completed = history.load_session(&sessions[0].session_id).await?;
    assert_eq!(completed.session_best.map(|b| b.lap_ms), Some(29_970));

    let restored = LapEngine::restore(blobs.as_ref(), config).await;
    assert_eq!(restored.store().laps().len(), 3);
    assert_eq!(restored.personal_bests().get("Ana", None).map(|pb| pb.lap_ms), Some(29_970));

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}

#[tokio::test]
async fn persistence_failures_never_block_ingestion() {
    struct BrokenStore;

    #[async_trait::async_trait]
    impl BlobStore for BrokenStore {
        async fn load(&self, _key: &str) -> pitboard::Result<Option<Vec<u8>>> {
            Err(pitboard::EngineError::persistence_failed("any", "disk gone"))
        }

        async fn save(&self, key: &str, _bytes: &[u8]) -> pitboard::Result<()> {
            Err(pitboard::EngineError::Config { reason: format!("read-only store for {key}") })
        }

        async fn delete(&self, _key: &str) -> pitboard::Result<bool> {
            Ok(false)
        }
    }

    let handle = PersistenceWorker::spawn_with_store(Arc::new(BrokenStore));
    let mut engine = LapEngine::restore(&BrokenStore, EngineConfig::default()).await;
    engine.attach_persistence(handle.clone());

    assert_eq!(engine.config(), &EngineConfig::default());
    for lap in 1..=10 {
        let report = engine.ingest_at(&batch("Heat 1", lap, vec![kart("7", "Ana", lap, 30_000)]), T0);
        assert_eq!(report.appended.len(), 1);
    }
    handle.flush().await;
    assert_eq!(engine.store().laps().len(), 10);

    // The memory store still works as a drop-in for the same engine.
    let memory = Arc::new(MemoryBlobStore::new());
    let handle = PersistenceWorker::spawn_with_store(memory.clone());
    engine.attach_persistence(handle.clone());
    assert!(engine.persist());
    handle.flush().await;
    assert!(memory.load(LAP_LOG_KEY).await.ok().flatten().is_some());
}
