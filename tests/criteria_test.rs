use abusewatch::abusewatch::alert::meta;
use abusewatch::abusewatch::config::StatisticalThresholdConfig;
use abusewatch::abusewatch::criteria::StatisticalSettings;
use abusewatch::{
    ActionType, Alert, ChannelSink, CollectingSink, DetectorConfig, NatSnapshot, NormalizedEvent,
    PipelineConfig, PipelineCoordinator, PipelineResources, SideInput,
};
use std::sync::Arc;

fn request(address: &str, ms: i64, user_agent: &str) -> NormalizedEvent {
    NormalizedEvent::at_millis(ActionType::HttpRequest, ms)
        .with_source_address(address)
        .with_user_agent(user_agent)
}

/// Ten clients with five requests each, plus `heavy` with 200 requests
/// spread over `user_agents`
fn window_events(heavy: &str, user_agents: &[&str]) -> Vec<NormalizedEvent> {
    let mut events = Vec::new();
    for client in 0..10 {
        for i in 0..5 {
            events.push(request(
                &format!("10.1.0.{}", client),
                (client * 5 + i) * 100,
                "curl/8.0",
            ));
        }
    }
    for i in 0..200 {
        let agent = user_agents[i % user_agents.len()];
        events.push(request(heavy, 10_000 + i as i64 * 100, agent));
    }
    events
}

fn statistical(modifier: f64, monitor_only: bool) -> DetectorConfig {
    match DetectorConfig::threshold_analysis(StatisticalSettings::default().with_modifier(modifier), 60)
    {
        DetectorConfig::StatisticalThreshold(mut c) => {
            c.monitor_only = monitor_only;
            DetectorConfig::StatisticalThreshold(c)
        }
        other => other,
    }
}

#[tokio::test]
async fn test_monitor_only_statistical_variant() {
    let sink = Arc::new(CollectingSink::new());
    let config = PipelineConfig::new("test")
        .with_detector(statistical(75.0, false))
        .with_detector(statistical(3.0, true));
    let mut pipeline = PipelineCoordinator::start(
        config,
        PipelineResources::in_memory().with_sink(sink.clone()),
    )
    .await
    .unwrap();

    for event in window_events("10.9.9.9", &["curl/8.0"]) {
        pipeline.submit(event).await.unwrap();
    }
    pipeline.drain().await.unwrap();

    // The primary variant's threshold (mean * 75) is out of reach
    let alerts = sink.alerts_for("threshold_analysis");
    assert_eq!(alerts.len(), 1);
    let alert = &alerts[0];
    assert_eq!(
        alert.summary,
        "test httprequest threshold_analysis 10.9.9.9 200 (monitor only)"
    );
    assert_eq!(
        alert.notify_merge_key.as_deref(),
        Some("threshold_analysis_monitor_only")
    );
    assert_eq!(alert.metadata_value(meta::SOURCEADDRESS), Some("10.9.9.9"));
}

#[tokio::test]
async fn test_window_derived_nat_detection() {
    let sink = Arc::new(CollectingSink::new());
    let detector = match statistical(3.0, false) {
        DetectorConfig::StatisticalThreshold(c) => {
            DetectorConfig::StatisticalThreshold(StatisticalThresholdConfig {
                nat_detection: Some(Default::default()),
                ..c
            })
        }
        other => other,
    };
    let mut pipeline = PipelineCoordinator::start(
        PipelineConfig::new("test").with_detector(detector),
        PipelineResources::in_memory().with_sink(sink.clone()),
    )
    .await
    .unwrap();

    // Several distinct clients behind one gateway address
    for event in window_events("10.9.9.9", &["Firefox/120", "Safari/17", "Chrome/119"]) {
        pipeline.submit(event).await.unwrap();
    }
    pipeline.drain().await.unwrap();
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_published_side_input_snapshot() {
    let sink = Arc::new(CollectingSink::new());
    let (publisher, nat) = SideInput::channel("nat");
    let mut pipeline = PipelineCoordinator::start(
        PipelineConfig::new("test").with_detector(statistical(3.0, false)),
        PipelineResources::in_memory()
            .with_sink(sink.clone())
            .with_nat_side_input(nat),
    )
    .await
    .unwrap();

    for event in window_events("10.9.9.9", &["curl/8.0"]) {
        pipeline.submit(event).await.unwrap();
    }
    // Only a different address is behind NAT, so the heavy client still fires
    publisher.publish(NatSnapshot::new(vec!["10.1.0.1".to_string()]));
    pipeline.drain().await.unwrap();

    assert_eq!(sink.alerts_for("threshold_analysis").len(), 1);
}

#[tokio::test]
async fn test_channel_sink_delivers_serializable_alerts() {
    let (sink, mut receiver) = ChannelSink::channel(16);
    let mut pipeline = PipelineCoordinator::start(
        PipelineConfig::new("test").with_detector(DetectorConfig::account_creation_abuse(2, 600)),
        PipelineResources::in_memory().with_sink(Arc::new(sink)),
    )
    .await
    .unwrap();

    for i in 0..2 {
        pipeline
            .submit(
                NormalizedEvent::at_millis(ActionType::AccountCreate, i * 1000)
                    .with_source_address("203.0.113.50")
                    .with_account_id(format!("new{}@example.com", i)),
            )
            .await
            .unwrap();
    }
    pipeline.drain().await.unwrap();

    let alert = receiver.recv().await.unwrap();
    assert_eq!(alert.subcategory, "account_creation_abuse");
    assert_eq!(
        alert.metadata_value(meta::UNIQUE_SOURCE_ADDRESS),
        Some("203.0.113.50")
    );

    let json = alert.to_json().unwrap();
    let parsed = Alert::from_json(&json).unwrap();
    assert_eq!(parsed, alert);
    assert!(receiver.try_recv().is_err());
}
