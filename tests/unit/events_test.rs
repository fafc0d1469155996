//! Tests for event sinks

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_resource_pool::core::{
    CallbackSink, EventSink, InMemoryEventSink, PoolEvent, PoolEventKind,
};

fn event(kind: PoolEventKind, resource_id: Option<u64>) -> PoolEvent {
    PoolEvent {
        pool: "pool1".to_string(),
        kind,
        resource_id,
        at_ms: 0,
    }
}

#[test]
fn test_in_memory_event_sink() {
    let sink = InMemoryEventSink::new(10);
    sink.record(&event(PoolEventKind::Created, Some(1)));
    sink.record(&event(PoolEventKind::Acquired, Some(1)));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, PoolEventKind::Created);
    assert_eq!(events[1].resource_id, Some(1));
}

#[test]
fn test_event_sink_overflow() {
    let sink = InMemoryEventSink::new(2);
    sink.record(&event(PoolEventKind::Created, Some(1)));
    sink.record(&event(PoolEventKind::Created, Some(2)));
    sink.record(&event(PoolEventKind::Created, Some(3)));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].resource_id, Some(2)); // First one popped
    assert_eq!(events[1].resource_id, Some(3));
}

#[test]
fn test_zero_capacity_sink_keeps_nothing() {
    let sink = InMemoryEventSink::new(0);
    sink.record(&event(PoolEventKind::Created, Some(1)));
    sink.record(&event(PoolEventKind::Destroyed, Some(1)));

    assert!(sink.events().is_empty());
    assert_eq!(sink.count(PoolEventKind::Created), 0);
}

#[test]
fn test_callback_sink() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let sink = CallbackSink(move |e: &PoolEvent| {
        if e.kind == PoolEventKind::Destroyed {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    sink.record(&event(PoolEventKind::Destroyed, Some(7)));
    sink.record(&event(PoolEventKind::Released, Some(7)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_event_serializes_snake_case() {
    let json = serde_json::to_value(event(PoolEventKind::WaiterTimedOut, None)).unwrap();
    assert_eq!(json["kind"], "waiter_timed_out");
    assert_eq!(json["pool"], "pool1");
}
