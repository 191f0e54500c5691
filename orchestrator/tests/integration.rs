//! End-to-end tests over the real service stack
//!
//! Channels are persisted to a JSON file in a temporary directory and
//! started as real processes of a shell script that mimics the relay's
//! telemetry and log output.

use shared::ChannelStatus;
use tokio_test::{assert_err, assert_ok};

use orchestrator::{OrchestratorError, TimeWindow};

mod common;
use common::{TestFixtures, TestHelpers, Workspace};

/// Single-output channel: one process, `cam1.csv` telemetry, readable stats
#[tokio::test]
async fn test_single_output_lifecycle() {
    // Arrange
    let ws = Workspace::new();
    ws.service.create(TestFixtures::cam1()).await.unwrap();

    // Act
    let started = assert_ok!(ws.service.start(TestFixtures::CHANNEL).await);

    // Assert
    assert_eq!(started.status, ChannelStatus::Running);
    assert_eq!(started.pids.as_ref().map(Vec::len), Some(1));
    assert!(started.stats_file.ends_with("cam1.csv"));
    assert!(TestHelpers::wait_for_file(&ws.path("stats/cam1.csv")).await);

    let series = ws.service.get_stats(TestFixtures::CHANNEL, TimeWindow::All).await.unwrap();
    assert_eq!(series.total_records, 1);
    assert_eq!(series.latest().unwrap().mbps_bandwidth, 5.0);

    let stored = &ws.config_json()["channels"][0];
    assert_eq!(stored["status"], "running");
    assert_eq!(stored["pid"], started.pid.unwrap());

    let pid = started.pid.unwrap();
    let stopped = ws.service.stop(TestFixtures::CHANNEL).await.unwrap();
    assert_eq!(stopped.status, ChannelStatus::Stopped);
    assert!(TestHelpers::wait_for_exit(pid).await);
}

/// Fan-out channel: one process and one telemetry file per destination
#[tokio::test]
async fn test_fan_out_lifecycle() {
    let ws = Workspace::new();
    ws.service.create(TestFixtures::cam1_fan_out()).await.unwrap();

    let started = ws.service.start(TestFixtures::CHANNEL).await.unwrap();
    let pids = started.pids.clone().unwrap();
    assert_eq!(pids.len(), 2);
    assert!(TestHelpers::wait_for_file(&ws.path("stats/cam1_dest0.csv")).await);
    assert!(TestHelpers::wait_for_file(&ws.path("stats/cam1_dest1.csv")).await);
    assert!(TestHelpers::wait_for_file(&ws.path("logs/cam1_dest1.log")).await);

    let logs = ws.service.get_logs(TestFixtures::CHANNEL, 10, None).await.unwrap();
    assert!(logs.has_multiple_processes);
    assert_eq!(logs.processes.len(), 2);

    ws.service.delete(TestFixtures::CHANNEL).await.unwrap();
    for pid in pids {
        assert!(TestHelpers::wait_for_exit(pid).await);
    }
    assert!(ws.config_json()["channels"].as_array().unwrap().is_empty());
}

/// Connection state and live stats merged into the full info view
#[tokio::test]
async fn test_full_info_reads_live_state() {
    let ws = Workspace::new();
    ws.service.create(TestFixtures::cam1()).await.unwrap();
    ws.service.start(TestFixtures::CHANNEL).await.unwrap();
    assert!(TestHelpers::wait_for_file(&ws.path("stats/cam1.csv")).await);
    assert!(TestHelpers::wait_for_file(&ws.path("logs/cam1.log")).await);

    let info = ws.service.get_full_info(TestFixtures::CHANNEL).await.unwrap();
    assert_eq!(info.srt_stats.as_ref().unwrap().rtt_ms, 20.0);
    assert_eq!(info.connections.len(), 1);
    assert_eq!(info.connections[0].remote_ip, "10.0.0.7");
    assert_eq!(info.connections[0].local_port, 9100);

    // ffprobe is not installed at the configured path
    let report = ws.service.stream_info(TestFixtures::CHANNEL, true).await.unwrap();
    assert!(!report.success);

    ws.service.stop(TestFixtures::CHANNEL).await.unwrap();
}

/// A missing relay binary leaves the channel in error with the reason kept
#[tokio::test]
async fn test_missing_relay_binary_marks_error() {
    let ws = Workspace::new();
    ws.service.create(TestFixtures::cam1()).await.unwrap();
    std::fs::remove_file(&ws.relay).unwrap();

    let err = assert_err!(ws.service.start(TestFixtures::CHANNEL).await);
    assert!(matches!(err, OrchestratorError::Spawn { .. }));

    let channel = ws.service.get(TestFixtures::CHANNEL).await.unwrap();
    assert_eq!(channel.status, ChannelStatus::Error);
    assert!(!channel.error_message.is_empty());
    assert_eq!(ws.config_json()["channels"][0]["status"], "error");
}

/// Restart yields a new process and keeps the channel running
#[tokio::test]
async fn test_restart_replaces_process() {
    let ws = Workspace::new();
    ws.service.create(TestFixtures::cam1()).await.unwrap();
    let first = ws.service.start(TestFixtures::CHANNEL).await.unwrap().pid.unwrap();

    let restarted = assert_ok!(ws.service.restart(TestFixtures::CHANNEL).await);
    assert_eq!(restarted.status, ChannelStatus::Running);
    assert_ne!(restarted.pid, Some(first));
    assert!(TestHelpers::wait_for_exit(first).await);

    ws.service.stop(TestFixtures::CHANNEL).await.unwrap();
}

/// Accounts in the shared configuration document survive channel saves
#[tokio::test]
async fn test_users_survive_channel_mutations() {
    let ws = Workspace::new();
    std::fs::write(
        ws.path("config.json"),
        r#"{"channels": [], "users": [{"username": "admin", "hashed_password": "x"}]}"#,
    )
    .unwrap();

    ws.service.create(TestFixtures::cam1()).await.unwrap();
    ws.service.delete(TestFixtures::CHANNEL).await.unwrap();

    let document = ws.config_json();
    assert_eq!(document["users"][0]["username"], "admin");
}

/// Fleet summary across channels with telemetry written by hand
#[tokio::test]
async fn test_fleet_summary_from_files() {
    let ws = Workspace::new();
    let mut second = TestFixtures::cam1();
    second.channel_name = "cam2".to_string();
    ws.service.create(TestFixtures::cam1()).await.unwrap();
    ws.service.create(second).await.unwrap();

    std::fs::create_dir_all(ws.path("stats")).unwrap();
    std::fs::write(ws.path("stats/cam1.csv"), TestFixtures::telemetry_rows(10, 5.0, 20.0)).unwrap();
    std::fs::write(ws.path("stats/cam2.csv"), TestFixtures::telemetry_rows(10, 5.0, 40.0)).unwrap();

    let all = ws.service.get_all_stats(TimeWindow::OneHour).await.unwrap();
    assert_eq!(all.summary.total_bandwidth, 10.0);
    assert_eq!(all.summary.avg_rtt, 30.0);
    assert_eq!(all.channels[0].stats.len(), 10);
}
