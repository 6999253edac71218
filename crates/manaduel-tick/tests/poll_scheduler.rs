//! Integration tests for the poll scheduler.
//!
//! Runs on a paused Tokio clock so sleeps resolve as soon as time is
//! advanced.

use std::time::Duration;

use manaduel_tick::{PollConfig, PollPolicy, PollScheduler};

fn config_100ms() -> PollConfig {
    PollConfig {
        interval_ms: 100,
        initial_jitter_ms: 0,
        ..PollConfig::default()
    }
}

// =========================================================================
// PollConfig
// =========================================================================

#[test]
fn test_default_config() {
    let cfg = PollConfig::default();
    assert_eq!(cfg.interval(), Duration::from_millis(250));
    assert_eq!(cfg.policy, PollPolicy::Skip);
    assert!(cfg.metrics_enabled);
}

#[test]
fn test_validated_clamps_interval() {
    let too_fast = PollConfig {
        interval_ms: 1,
        ..PollConfig::default()
    }
    .validated();
    assert_eq!(too_fast.interval_ms, PollConfig::MIN_INTERVAL_MS);

    let too_slow = PollConfig {
        interval_ms: 10 * 60_000,
        ..PollConfig::default()
    }
    .validated();
    assert_eq!(too_slow.interval_ms, PollConfig::MAX_INTERVAL_MS);
}

#[test]
fn test_validated_clamps_threshold_and_jitter() {
    let cfg = PollConfig {
        interval_ms: 50,
        budget_warn_threshold: 3.0,
        initial_jitter_ms: 500,
        ..PollConfig::default()
    }
    .validated();
    assert_eq!(cfg.budget_warn_threshold, 1.0);
    assert_eq!(cfg.initial_jitter_ms, 50);
}

#[test]
fn test_config_from_partial_json() {
    let cfg: PollConfig = serde_json::from_str(r#"{"interval_ms": 500, "policy": "drop"}"#).unwrap();
    assert_eq!(cfg.interval(), Duration::from_millis(500));
    assert_eq!(cfg.policy, PollPolicy::Drop);
    assert_eq!(cfg.budget_warn_threshold, 0.80);
}

// =========================================================================
// Polling
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_polls_fire_and_count_up() {
    let mut s = PollScheduler::new(config_100ms());
    assert_eq!(s.poll_count(), 0);

    for expected in 1..=4 {
        let info = s.wait_for_poll().await;
        assert_eq!(info.poll, expected);
        assert!(!info.overrun);
        assert_eq!(info.polls_skipped, 0);
    }
    assert_eq!(s.metrics().total_polls, 4);
}

#[tokio::test(start_paused = true)]
async fn test_polls_are_one_interval_apart() {
    let mut s = PollScheduler::new(config_100ms());
    let start = tokio::time::Instant::now();

    s.wait_for_poll().await;
    s.wait_for_poll().await;

    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reports_missed_polls() {
    let mut s = PollScheduler::new(config_100ms());
    s.wait_for_poll().await;

    // Block the "driver" for 3.5 intervals.
    tokio::time::advance(Duration::from_millis(450)).await;
    let info = s.wait_for_poll().await;

    assert!(info.overrun);
    assert_eq!(info.polls_skipped, 3);
    assert_eq!(s.metrics().total_overruns, 1);
    assert_eq!(s.metrics().total_skipped, 3);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_does_not_count_skips() {
    let mut s = PollScheduler::new(PollConfig {
        policy: PollPolicy::Drop,
        ..config_100ms()
    });
    s.wait_for_poll().await;

    tokio::time::advance(Duration::from_millis(450)).await;
    let info = s.wait_for_poll().await;

    assert!(info.overrun);
    assert_eq!(info.polls_skipped, 0);
}

// =========================================================================
// Pause / Resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_stops_polls() {
    let mut s = PollScheduler::new(config_100ms());
    s.wait_for_poll().await;

    s.pause();
    assert!(s.is_paused());

    let result = tokio::time::timeout(Duration::from_secs(2), s.wait_for_poll()).await;
    assert!(result.is_err(), "paused scheduler should pend");
    assert_eq!(s.poll_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_restarts_one_interval_later() {
    let mut s = PollScheduler::new(config_100ms());
    s.pause();
    s.pause();
    tokio::time::advance(Duration::from_secs(5)).await;

    s.resume();
    s.resume();
    assert!(!s.is_paused());

    let start = tokio::time::Instant::now();
    let info = s.wait_for_poll().await;
    assert_eq!(info.poll, 1);
    assert!(!info.overrun, "time spent paused is not an overrun");
    assert_eq!(start.elapsed(), Duration::from_millis(100));
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_record_poll_end_without_poll_is_noop() {
    let mut s = PollScheduler::new(config_100ms());
    s.record_poll_end();
    assert_eq!(s.metrics().max_poll_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_poll_end_tracks_work_time() {
    let mut s = PollScheduler::new(config_100ms());
    s.wait_for_poll().await;
    // Work time is wall-clock, not Tokio time.
    std::thread::sleep(Duration::from_micros(200));
    s.record_poll_end();

    assert!(s.metrics().max_poll_time > Duration::ZERO);
    assert!(s.metrics().budget_utilization > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_disabled_skips_timing() {
    let mut s = PollScheduler::new(PollConfig {
        metrics_enabled: false,
        ..config_100ms()
    });
    s.wait_for_poll().await;
    std::thread::sleep(Duration::from_micros(200));
    s.record_poll_end();

    assert_eq!(s.metrics().avg_poll_time, Duration::ZERO);
    assert_eq!(s.metrics().max_poll_time, Duration::ZERO);
    assert_eq!(s.metrics().total_polls, 1);
}

// =========================================================================
// select! loop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut s = PollScheduler::new(config_100ms());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        tx.send("stop").await.ok();
    });

    let mut polls = 0u64;
    loop {
        tokio::select! {
            Some(cmd) = rx.recv() => {
                assert_eq!(cmd, "stop");
                break;
            }
            info = s.wait_for_poll() => {
                polls += 1;
                s.record_poll_end();
                assert_eq!(info.poll, polls);
            }
        }
    }

    assert_eq!(polls, 3);
}
