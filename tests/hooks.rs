use std::sync::{Arc, Mutex};

use tensorlane::{StreamContext, StreamKind};

#[test]
fn removed_slot_is_handed_out_again() {
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    let a = stream.add_hook(|_| {});
    let b = stream.add_hook(|_| {});
    let c = stream.add_hook(|_| {});
    assert_eq!((a, b, c), (0, 1, 2));

    stream.remove_hook(b);
    assert_eq!(stream.add_hook(|_| {}), 1);
    // With no hole left, registration appends again.
    assert_eq!(stream.add_hook(|_| {}), 3);
}

#[test]
fn trailing_removals_truncate() {
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    let _a = stream.add_hook(|_| {});
    let b = stream.add_hook(|_| {});
    let c = stream.add_hook(|_| {});

    stream.remove_hook(c);
    stream.remove_hook(b);
    // Only slot 0 survives, so the next registration lands at 1, not 3.
    assert_eq!(stream.add_hook(|_| {}), 1);
}

#[test]
fn interior_holes_fill_lowest_first() {
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    let ids: Vec<_> = (0..5).map(|_| stream.add_hook(|_| {})).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);

    stream.remove_hook(3);
    stream.remove_hook(1);
    // The forward rescan tracks the next hole after each fill.
    assert_eq!(stream.add_hook(|_| {}), 1);
    assert_eq!(stream.add_hook(|_| {}), 3);
    assert_eq!(stream.add_hook(|_| {}), 5);
}

#[test]
fn hooks_run_once_in_slot_order_on_free() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    for tag in 0..4 {
        let order = Arc::clone(&order);
        stream.add_hook(move |_| order.lock().unwrap().push(tag));
    }
    stream.remove_hook(2);

    drop(stream);
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 3]);
}

#[test]
fn hooks_see_the_context_being_freed() {
    let kind = Arc::new(Mutex::new(None));
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    let seen = Arc::clone(&kind);
    stream.add_hook(move |context| {
        *seen.lock().unwrap() = Some(context.kind());
    });

    drop(stream);
    assert_eq!(*kind.lock().unwrap(), Some(StreamKind::Cpu));
}

#[test]
#[should_panic(expected = "out of range")]
fn removing_an_unknown_hook_panics() {
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    stream.add_hook(|_| {});
    stream.remove_hook(7);
}

#[test]
fn hooks_can_be_managed_from_other_threads() {
    let stream = StreamContext::new(StreamKind::Cpu).unwrap();
    let id = stream.add_hook(|_| {});
    let worker = {
        let stream = Arc::clone(&stream);
        std::thread::spawn(move || {
            stream.remove_hook(id);
            stream.add_hook(|_| {})
        })
    };
    // The freed slot is visible to the other thread's registration.
    assert_eq!(worker.join().unwrap(), 0);
}
