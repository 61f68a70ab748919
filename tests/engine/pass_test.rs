//! Tests for `DiagnosticEngine::run_pass` — health, sensor checks and delivery.

use std::sync::Arc;

use chrono::{Duration, Utc};

use sensorwatch::policy::Alert;

use crate::fakes::{harness, harness_with_registry, measurement, sensor, FakeFetcher, HealthReply, MemoryRegistry};

#[tokio::test]
async fn healthy_pass_without_sensors_sends_nothing() {
    let h = harness(Vec::new(), FakeFetcher::default());
    let report = h.engine.run_pass().await;

    assert!(report.alerts.is_empty());
    assert_eq!(report.sensors_checked, 0);
    assert!(!report.registry_failed);
    assert_eq!(h.notifier.count(), 0);
}

#[tokio::test]
async fn temperature_above_max_sends_one_alert() {
    let fetcher = FakeFetcher::default();
    fetcher.set_state("sensor.temp1", measurement("35.0", Utc::now(), None));
    let h = harness(vec![sensor(1, "sensor.temp1", Some(10.0), Some(30.0))], fetcher);

    let report = h.engine.run_pass().await;

    assert_eq!(report.alerts.len(), 1);
    let texts = h.notifier.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("sensor.temp1"));
    assert!(texts[0].contains("35.00"));
}

#[tokio::test]
async fn low_battery_sends_one_alert() {
    let fetcher = FakeFetcher::default();
    fetcher.set_state("sensor.battery1", measurement("3", Utc::now(), Some("battery")));
    let h = harness(vec![sensor(1, "sensor.battery1", None, None)], fetcher);

    h.engine.run_pass().await;

    let texts = h.notifier.texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("3%"));
}

#[tokio::test]
async fn health_500_alerts_once_and_still_checks_sensors() {
    let fetcher = FakeFetcher::default();
    fetcher.set_health(HealthReply::Status(500));
    fetcher.set_state("sensor.temp1", measurement("20", Utc::now(), None));
    let h = harness(vec![sensor(1, "sensor.temp1", Some(10.0), Some(30.0))], fetcher);

    let report = h.engine.run_pass().await;

    assert_eq!(report.alerts, vec![Alert::ApiUnreachable]);
    assert_eq!(report.sensors_checked, 1);
    assert_eq!(h.fetcher.state_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn wrong_status_message_is_unhealthy() {
    let fetcher = FakeFetcher::default();
    fetcher.set_health(HealthReply::Message("Starting".to_owned()));
    let h = harness(Vec::new(), fetcher);

    let report = h.engine.run_pass().await;
    assert_eq!(report.alerts, vec![Alert::ApiUnhealthy]);
}

#[tokio::test]
async fn undecodable_status_is_unhealthy() {
    let fetcher = FakeFetcher::default();
    fetcher.set_health(HealthReply::Garbage);
    let h = harness(Vec::new(), fetcher);

    let report = h.engine.run_pass().await;
    assert_eq!(report.alerts, vec![Alert::ApiUnhealthy]);
}

#[tokio::test]
async fn unreachable_sensor_alerts_and_next_sensor_is_checked() {
    let fetcher = FakeFetcher::default();
    fetcher.set_state("sensor.old", measurement("20", Utc::now() - Duration::hours(7), None));
    let h = harness(
        vec![
            sensor(1, "sensor.gone", None, None),
            sensor(2, "sensor.old", None, None),
        ],
        fetcher,
    );

    let report = h.engine.run_pass().await;

    assert_eq!(report.sensors_checked, 2);
    assert_eq!(report.alerts.len(), 2);
    assert_eq!(
        report.alerts[0],
        Alert::SensorUnreachable {
            sensor: "sensor.gone".to_owned()
        }
    );
    assert!(matches!(report.alerts[1], Alert::Stale { .. }));
}

#[tokio::test]
async fn registry_failure_skips_sensor_checks() {
    let fetcher = FakeFetcher::default();
    fetcher.set_health(HealthReply::Status(502));
    let h = harness_with_registry(Arc::new(MemoryRegistry::failing()), fetcher);

    let report = h.engine.run_pass().await;

    assert!(report.registry_failed);
    assert_eq!(report.sensors_checked, 0);
    assert_eq!(report.alerts, vec![Alert::ApiUnreachable]);
}

#[tokio::test]
async fn alerts_use_tokens_and_chat_from_settings() {
    let fetcher = FakeFetcher::default();
    fetcher.set_health(HealthReply::Status(500));
    fetcher.set_state("sensor.t", measurement("1", Utc::now(), None));
    let h = harness(vec![sensor(1, "sensor.t", None, None)], fetcher);

    h.engine.run_pass().await;

    let sent = h.notifier.sent.lock().expect("lock").clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].bot_token, "123:tg-secret");
    assert_eq!(sent[0].chat_id, "-1001");

    let seen = h.fetcher.seen_auth.lock().expect("lock").clone();
    assert_eq!(
        seen,
        vec![("http://ha.local:8123".to_owned(), "ha-secret".to_owned())]
    );
}

#[tokio::test]
async fn alerts_are_delivered_in_decision_order() {
    let fetcher = FakeFetcher::default();
    fetcher.set_health(HealthReply::Garbage);
    fetcher.set_error_log(Some(b"2024-05-01 ERROR (MainThread) boom\n"));
    fetcher.set_state("sensor.t", measurement("99", Utc::now(), None));
    let h = harness(vec![sensor(1, "sensor.t", None, Some(50.0))], fetcher);

    let report = h.engine.run_pass().await;

    let kinds: Vec<&str> = report.alerts.iter().map(Alert::kind).collect();
    assert_eq!(kinds, vec!["api_unhealthy", "error_log", "out_of_threshold"]);
    let texts = h.notifier.texts();
    let expected: Vec<String> = report.alerts.iter().map(ToString::to_string).collect();
    assert_eq!(texts, expected);
}
