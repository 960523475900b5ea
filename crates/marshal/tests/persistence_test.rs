//! Suspend/resume through the in-memory store
//!
//! Run with: cargo test -p bpmn-marshal --test persistence_test

use std::sync::Arc;

use bpmn_marshal::prelude::*;
use bpmn_marshal_schemas::TimerInstance;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

struct Fixture {
    definitions: Arc<InMemoryProcessDefinitionRegistry>,
    store: Arc<InMemoryProcessInstanceStore>,
    clock: Arc<PseudoClock>,
}

impl Fixture {
    fn new() -> Self {
        let definitions = Arc::new(InMemoryProcessDefinitionRegistry::new());
        definitions.register(ProcessDefinition::new("claims", "Claims").with_swimlane("adjuster"));
        Self {
            definitions,
            store: Arc::new(InMemoryProcessInstanceStore::new()),
            clock: Arc::new(PseudoClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())),
        }
    }

    fn persister(&self, format: WireFormat) -> (ProcessInstancePersister, Arc<TimerManager>) {
        let config = MarshalConfig {
            format,
            ..Default::default()
        };
        let marshaller = Arc::new(ProcessInstanceMarshaller::new(
            Arc::new(StrategyRegistry::default()),
            config,
        ));
        let timers = Arc::new(TimerManager::new(self.clock.clone()));
        let persister =
            ProcessInstancePersister::new(self.store.clone(), marshaller, self.definitions.clone())
                .with_timers(timers.clone());
        (persister, timers)
    }

    fn instance(&self) -> ProcessInstance {
        let mut instance = ProcessInstance::start(self.definitions.resolve("claims").unwrap());
        instance.set_swimlane_actor("adjuster", "lee");
        instance.set_variable("claim", json!({"amount": 1200, "currency": "EUR"}));
        instance.add_node_instance(NodeInstance::new(
            "n-1",
            "inspect",
            NodeInstanceContent::State {
                timer_instance_ids: vec!["t-1".into()],
            },
        ));
        instance.add_timer(TimerInstance {
            id: "t-1".into(),
            timer_id: "inspection-deadline".into(),
            process_instance_id: instance.id().to_string(),
            node_instance_id: Some("n-1".into()),
            delay_ms: 3_600_000,
            period_ms: 0,
            repeat_limit: None,
            activated_time: self.clock.now(),
            last_triggered: None,
            trigger_count: 0,
        });
        instance
    }
}

#[tokio::test]
async fn test_suspend_resume_in_each_format() {
    let fixture = Fixture::new();
    for format in [WireFormat::Legacy, WireFormat::Structured] {
        let (persister, timers) = fixture.persister(format);
        let instance = fixture.instance();

        let version = persister.suspend(&instance, None).await.unwrap();
        assert_eq!(version, 1);

        let stored = fixture.store.load(instance.id()).await.unwrap();
        assert_eq!(stored.record.format, format);
        assert_eq!(stored.record.process_id, "claims");

        let resumed = persister.resume(instance.id()).await.unwrap();
        assert!(resumed.instance.same_state(&instance));
        assert!(timers.is_active("t-1"));
    }
}

#[tokio::test]
async fn test_versions_advance_and_conflict() {
    let fixture = Fixture::new();
    let (persister, _) = fixture.persister(WireFormat::Structured);
    let mut instance = fixture.instance();

    let v1 = persister.suspend(&instance, None).await.unwrap();
    let resumed = persister.resume(instance.id()).await.unwrap();
    assert_eq!(resumed.version, v1);

    instance.set_variable("status", json!("inspected"));
    let v2 = persister.suspend(&instance, Some(resumed.version)).await.unwrap();
    assert_eq!(v2, 2);

    let stale = persister.suspend(&instance, Some(v1)).await;
    assert!(matches!(
        stale,
        Err(PersistenceError::Store(StoreError::ConcurrencyConflict {
            expected: 1,
            actual: 2
        }))
    ));

    let latest = persister.resume(instance.id()).await.unwrap();
    assert_eq!(latest.instance.variable("status"), Some(&json!("inspected")));
}

#[tokio::test]
async fn test_overdue_after_long_suspension() {
    let fixture = Fixture::new();
    let (persister, _) = fixture.persister(WireFormat::Legacy);
    let instance = fixture.instance();
    persister.suspend(&instance, None).await.unwrap();

    fixture.clock.advance(Duration::hours(2));
    let (restarted, timers) = fixture.persister(WireFormat::Legacy);
    restarted.resume(instance.id()).await.unwrap();

    let scheduled = timers.get("t-1").unwrap();
    assert!(scheduled.trigger.is_overdue());
    assert_eq!(scheduled.trigger.next_fire_time(), fixture.clock.now());
}

#[tokio::test]
async fn test_remove_cancels_timers() {
    let fixture = Fixture::new();
    let (persister, timers) = fixture.persister(WireFormat::Structured);
    let instance = fixture.instance();

    persister.suspend(&instance, None).await.unwrap();
    persister.resume(instance.id()).await.unwrap();
    assert!(timers.is_active("t-1"));

    persister.remove(instance.id()).await.unwrap();
    assert!(!timers.is_active("t-1"));
    assert!(fixture.store.is_empty());
    assert!(matches!(
        persister.resume(instance.id()).await,
        Err(PersistenceError::Store(StoreError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_failed_resume_leaves_store_untouched() {
    let fixture = Fixture::new();
    let (persister, timers) = fixture.persister(WireFormat::Structured);
    let instance = fixture.instance();
    persister.suspend(&instance, None).await.unwrap();

    fixture.definitions.remove("claims");
    let result = persister.resume(instance.id()).await;
    assert!(matches!(
        result,
        Err(PersistenceError::Marshal(MarshalError::UnknownProcess(id))) if id == "claims"
    ));
    assert!(timers.is_empty());
    assert_eq!(fixture.store.list(Some("claims")).await.unwrap().len(), 1);
}
