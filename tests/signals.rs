use std::sync::Arc;

use tensorlane::{StreamContext, StreamKind, StreamSignal};

#[test]
fn a_fresh_signal_has_no_emitter() {
    let signal = StreamSignal::new(StreamKind::Cpu).unwrap();
    assert_eq!(signal.kind(), StreamKind::Cpu);
    assert!(signal.emitter().is_none());
}

#[test]
fn emission_is_last_write_wins() {
    let s1 = StreamContext::new(StreamKind::Cpu).unwrap();
    let s2 = StreamContext::new(StreamKind::Cpu).unwrap();
    let signal = StreamSignal::new(StreamKind::Cpu).unwrap();

    s1.emit(&signal).unwrap();
    s2.emit(&signal).unwrap();
    assert!(Arc::ptr_eq(&signal.emitter().unwrap(), &s2));

    // Emitting again from the first stream overwrites once more.
    s1.emit(&signal).unwrap();
    assert!(Arc::ptr_eq(&signal.emitter().unwrap(), &s1));
}

#[test]
fn the_emitter_does_not_outlive_its_stream() {
    let signal = StreamSignal::new(StreamKind::Cpu).unwrap();
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    stream.emit(&signal).unwrap();

    drop(stream);
    assert!(signal.emitter().is_none());
}

#[test]
fn cpu_signal_waits_are_no_ops() {
    let producer = StreamContext::new(StreamKind::Cpu).unwrap();
    let consumer = StreamContext::new(StreamKind::Cpu).unwrap();
    let signal = StreamSignal::new(StreamKind::Cpu).unwrap();

    producer.emit(&signal).unwrap();
    // Sequential dispatch already orders CPU work; this returns at once.
    consumer.wait_signal(&signal).unwrap();
}

#[test]
fn neighbor_discovery_resolves_lazily() {
    let hub = StreamContext::new(StreamKind::Cpu).unwrap();
    let peer = StreamContext::new(StreamKind::Cpu).unwrap();
    assert!(hub.find_neighbor(0).is_none());

    let resolved = Arc::clone(&peer);
    hub.set_neighbor_discovery(move |device_id| (device_id == 3).then(|| Arc::clone(&resolved)));
    assert!(hub.find_neighbor(0).is_none());
    assert!(Arc::ptr_eq(&hub.find_neighbor(3).unwrap(), &peer));
}

#[test]
fn installing_a_second_resolver_replaces_the_first() {
    let hub = StreamContext::new(StreamKind::Cpu).unwrap();
    let peer = StreamContext::new(StreamKind::Cpu).unwrap();

    let resolved = Arc::clone(&peer);
    hub.set_neighbor_discovery(move |_| Some(Arc::clone(&resolved)));
    assert!(hub.find_neighbor(0).is_some());

    hub.set_neighbor_discovery(|_| None);
    assert!(hub.find_neighbor(0).is_none());
}
