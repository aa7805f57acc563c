#[allow(dead_code)]
mod common;

use orrery_core::error::StoreError;
use orrery_core::process::{NewProcess, ProcessSummary, Status};
use orrery_core::store::{MemoryStore, Store};

fn new_process(store: &MemoryStore, identifier: &str) -> orrery_core::process::AsyncProcess {
    store
        .create_process(NewProcess {
            identifier: identifier.into(),
            target: None,
        })
        .unwrap()
}

#[test]
fn test_terminal_timestamp_set_once_and_kept() {
    let store = MemoryStore::new();
    let mut p = new_process(&store, "p1");
    assert!(p.terminal_timestamp.is_none());

    p.status = Status::Transient("Finding stars".into());
    store.save_process(&mut p).unwrap();
    assert!(store.get_process(p.id).unwrap().terminal_timestamp.is_none());

    p.status = Status::Created;
    store.save_process(&mut p).unwrap();
    let stamped = store.get_process(p.id).unwrap().terminal_timestamp;
    assert!(stamped.is_some());
    assert_eq!(p.terminal_timestamp, stamped);

    // Saving again, unchanged, keeps the first stamp.
    std::thread::sleep(std::time::Duration::from_millis(5));
    store.save_process(&mut p).unwrap();
    assert_eq!(store.get_process(p.id).unwrap().terminal_timestamp, stamped);

    // Any attempt to leave the terminal state is refused.
    for status in [Status::Failed, Status::Pending, Status::Transient("again".into())] {
        let mut changed = p.clone();
        changed.status = status;
        let err = store.save_process(&mut changed).unwrap_err();
        assert!(matches!(err, StoreError::TerminalState { .. }));
        let stored = store.get_process(p.id).unwrap();
        assert_eq!(stored.status, Status::Created);
        assert_eq!(stored.terminal_timestamp, stamped);
    }
}

#[test]
fn test_direct_status_write_on_pipeline_is_stamped() {
    let store = MemoryStore::new();
    let target = common::target(&store);
    let input = common::add_product(&store, &target, "a.fits", vec![0]);
    let mut pipe = common::pipeline_process(&store, "direct", "x", Some(&target), vec![input]);

    pipe.process.status = Status::Failed;
    pipe.process.failure_message = "boom".into();
    store.save_pipeline(&mut pipe).unwrap();

    let stored = store.get_pipeline(pipe.process.id).unwrap();
    assert_eq!(stored.process.status, Status::Failed);
    assert_eq!(stored.process.failure_message, "boom");
    assert!(stored.process.terminal_timestamp.is_some());
}

#[test]
fn test_created_never_changes() {
    let store = MemoryStore::new();
    let mut p = new_process(&store, "p2");
    let created = p.created;
    p.created = created - chrono::Duration::days(1);
    p.status = Status::Transient("Working".into());
    store.save_process(&mut p).unwrap();
    assert_eq!(store.get_process(p.id).unwrap().created, created);
}

#[test]
fn test_processes_for_target_newest_first() {
    let store = MemoryStore::new();
    let target = common::target(&store);
    for name in ["first", "second", "third"] {
        store
            .create_process(NewProcess {
                identifier: name.into(),
                target: Some(target.id),
            })
            .unwrap();
    }
    new_process(&store, "untargeted");

    let names: Vec<_> = store
        .processes_for_target(target.id)
        .into_iter()
        .map(|p| p.identifier)
        .collect();
    assert_eq!(names, ["third", "second", "first"]);
}

#[test]
fn test_summary_fields() {
    let store = MemoryStore::new();
    let mut p = new_process(&store, "sum");
    let pending = ProcessSummary::from(&p);
    assert_eq!(pending.status, "pending");
    assert!(pending.terminal_timestamp.is_none());
    assert!(pending.failure_message.is_none());

    p.mark_failed("No stars found");
    store.save_process(&mut p).unwrap();
    let failed = ProcessSummary::from(&p);
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.failure_message.as_deref(), Some("No stars found"));
    assert!(failed.terminal_timestamp.unwrap() >= failed.created);
}
