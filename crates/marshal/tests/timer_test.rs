//! Timer specifications and re-arming of restored timers
//!
//! Run with: cargo test -p bpmn-marshal --test timer_test

use std::sync::Arc;

use bpmn_marshal::prelude::*;
use bpmn_marshal::{RearmOutcome, TimerError};
use bpmn_marshal_schemas::TimerInstance;
use chrono::{DateTime, Duration, TimeZone, Utc};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn definitions() -> InMemoryProcessDefinitionRegistry {
    let definitions = InMemoryProcessDefinitionRegistry::new();
    definitions.register(ProcessDefinition::new("escalation", "Escalation"));
    definitions
}

fn timed_instance(definitions: &InMemoryProcessDefinitionRegistry) -> ProcessInstance {
    let mut instance = ProcessInstance::start(definitions.resolve("escalation").unwrap());
    let id = instance.id().to_string();
    instance.add_node_instance(NodeInstance::new(
        "n-1",
        "wait",
        NodeInstanceContent::Timer {
            timer_id: "deadline".into(),
        },
    ));
    instance.add_timer(TimerInstance {
        id: "t-1".into(),
        timer_id: "deadline".into(),
        process_instance_id: id,
        node_instance_id: Some("n-1".into()),
        delay_ms: 10_000,
        period_ms: 0,
        repeat_limit: None,
        activated_time: at(1_000),
        last_triggered: None,
        trigger_count: 0,
    });
    instance
}

#[test]
fn test_timer_kind_dispatch() {
    let clock = PseudoClock::new(at(1_000));

    assert_eq!(
        to_expiration(&TimerSpec::duration("PT5S"), &clock).unwrap(),
        Expiration::After { delay_ms: 5_000 }
    );
    assert_eq!(
        to_expiration(&TimerSpec::date("2024-03-01T12:00:00Z"), &clock).unwrap(),
        Expiration::Exact {
            at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        }
    );
    assert_eq!(
        to_expiration(&TimerSpec::cycle("PT10S").with_period("not a duration"), &clock).unwrap(),
        Expiration::Repeat {
            delay_ms: 10_000,
            period_ms: 10_000,
            limit: None
        }
    );
}

#[test]
fn test_validation_is_stricter_than_rearming() {
    let spec = TimerSpec::cycle("PT10S").with_period("not a duration");
    assert!(matches!(spec.validate(), Err(TimerError::InvalidDuration(_))));
    assert!(to_expiration(&spec, &SystemClock).is_ok());
}

#[test_log::test]
fn test_overdue_timer_fires_immediately_after_restore() {
    let definitions = definitions();
    let instance = timed_instance(&definitions);
    let marshaller = ProcessInstanceMarshaller::default();

    for format in [WireFormat::Legacy, WireFormat::Structured] {
        let bytes = marshaller.write(&instance, format).unwrap();

        // restart a minute after the timer was due
        let clock = Arc::new(PseudoClock::new(at(1_070)));
        let timers = TimerManager::new(clock.clone());
        let context = ReadContext::new(&definitions).with_timers(&timers);
        marshaller.read(&bytes, format, &context).unwrap();

        let scheduled = timers.get("t-1").unwrap();
        assert!(scheduled.trigger.is_overdue());
        assert_eq!(scheduled.trigger.next_fire_time(), at(1_070));
        assert_eq!(timers.due().len(), 1);
    }
}

#[test]
fn test_pending_timer_keeps_its_fire_time() {
    let definitions = definitions();
    let instance = timed_instance(&definitions);
    let marshaller = ProcessInstanceMarshaller::default();
    let bytes = marshaller.write(&instance, WireFormat::Structured).unwrap();

    let clock = Arc::new(PseudoClock::new(at(1_004)));
    let timers = TimerManager::new(clock.clone());
    marshaller
        .read(
            &bytes,
            WireFormat::Structured,
            &ReadContext::new(&definitions).with_timers(&timers),
        )
        .unwrap();

    let scheduled = timers.get("t-1").unwrap();
    assert!(!scheduled.trigger.is_overdue());
    assert_eq!(scheduled.trigger.next_fire_time(), at(1_010));
    assert!(timers.due().is_empty());

    clock.advance(Duration::seconds(6));
    assert_eq!(timers.due().len(), 1);
}

#[test]
fn test_rearming_is_idempotent() {
    let definitions = definitions();
    let instance = timed_instance(&definitions);
    let marshaller = ProcessInstanceMarshaller::default();
    let bytes = marshaller.write(&instance, WireFormat::Legacy).unwrap();

    let timers = TimerManager::new(Arc::new(PseudoClock::new(at(1_070))));
    let context = ReadContext::new(&definitions).with_timers(&timers);
    let first = marshaller.read(&bytes, WireFormat::Legacy, &context).unwrap();
    marshaller.read(&bytes, WireFormat::Legacy, &context).unwrap();

    assert_eq!(timers.len(), 1);
    assert_eq!(marshaller.rearm_timers(&first, &timers), 0);
    let persisted = first.timers["t-1"].clone();
    assert_eq!(timers.rearm(persisted), RearmOutcome::AlreadyActive);
}

#[test]
fn test_exhausted_timer_is_not_rearmed() {
    let definitions = definitions();
    let mut instance = timed_instance(&definitions);
    if let Some(timer) = instance.timers.get_mut("t-1") {
        timer.last_triggered = Some(at(1_010));
        timer.trigger_count = 1;
    }
    let marshaller = ProcessInstanceMarshaller::default();
    let bytes = marshaller.write(&instance, WireFormat::Structured).unwrap();

    let timers = TimerManager::new(Arc::new(PseudoClock::new(at(1_070))));
    let restored = marshaller
        .read(
            &bytes,
            WireFormat::Structured,
            &ReadContext::new(&definitions).with_timers(&timers),
        )
        .unwrap();

    assert!(timers.is_empty());
    assert_eq!(restored.timers.len(), 1);
}

#[test]
fn test_rearm_can_be_disabled() {
    let definitions = definitions();
    let instance = timed_instance(&definitions);
    let marshaller = ProcessInstanceMarshaller::new(
        Arc::new(StrategyRegistry::default()),
        MarshalConfig {
            rearm_timers: false,
            ..Default::default()
        },
    );
    let bytes = marshaller.write(&instance, WireFormat::Structured).unwrap();

    let timers = TimerManager::new(Arc::new(PseudoClock::new(at(1_070))));
    marshaller
        .read(
            &bytes,
            WireFormat::Structured,
            &ReadContext::new(&definitions).with_timers(&timers),
        )
        .unwrap();
    assert!(timers.is_empty());
}

#[test]
fn test_scheduled_timer_survives_a_restart() {
    let definitions = definitions();
    let clock = Arc::new(PseudoClock::new(at(5_000)));
    let before = TimerManager::new(clock.clone());

    let mut instance = ProcessInstance::start(definitions.resolve("escalation").unwrap());
    let expiration = to_expiration(&TimerSpec::cycle("R3/PT30S"), clock.as_ref()).unwrap();
    let timer = before
        .schedule("reminder", instance.id(), None, &expiration)
        .unwrap();
    instance.add_timer(timer.clone());

    let marshaller = ProcessInstanceMarshaller::default();
    let bytes = marshaller.write(&instance, WireFormat::Legacy).unwrap();

    clock.advance(Duration::seconds(10));
    let after = TimerManager::new(clock.clone());
    marshaller
        .read(
            &bytes,
            WireFormat::Legacy,
            &ReadContext::new(&definitions).with_timers(&after),
        )
        .unwrap();

    let scheduled = after.get(&timer.id).unwrap();
    assert_eq!(scheduled.trigger.next_fire_time(), at(5_030));
    assert!(matches!(
        scheduled.trigger,
        Trigger::Interval {
            period_ms: 30_000,
            remaining: Some(3),
            ..
        }
    ));
}

#[test]
fn test_duration_beyond_date_range_fails_validation() {
    let clock = Arc::new(PseudoClock::new(at(1_000)));
    let timers = TimerManager::new(clock.clone());

    let spec = TimerSpec::duration("P100000000D");
    assert!(matches!(spec.validate(), Err(TimerError::OutOfRange(_))));
    assert!(matches!(
        to_expiration(&spec, clock.as_ref()),
        Err(TimerError::OutOfRange(_))
    ));

    let result = timers.schedule(
        "deadline",
        "pi-1",
        None,
        &Expiration::After { delay_ms: i64::MAX },
    );
    assert_eq!(result, Err(TimerError::OutOfRange(i64::MAX)));
    assert!(timers.is_empty());
}

#[test_log::test]
fn test_stored_timer_beyond_date_range_fails_the_read() {
    let definitions = definitions();
    let mut instance = timed_instance(&definitions);
    if let Some(timer) = instance.timers.get_mut("t-1") {
        timer.delay_ms = i64::MAX;
    }
    let marshaller = ProcessInstanceMarshaller::default();

    for format in [WireFormat::Legacy, WireFormat::Structured] {
        let bytes = marshaller.write(&instance, format).unwrap();
        let timers = TimerManager::new(Arc::new(PseudoClock::new(at(1_070))));
        let result = marshaller.read(
            &bytes,
            format,
            &ReadContext::new(&definitions).with_timers(&timers),
        );

        assert!(matches!(
            result,
            Err(MarshalError::TimerOutOfRange { ref timer_instance_id, delay_ms: i64::MAX, .. })
                if timer_instance_id == "t-1"
        ));
        assert!(timers.is_empty());
    }
}
