//! Heap and ownership tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use quickbeam::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ═══════════════════════════════════════════════════════════════════════
// Reference Counting
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_refcount_balance() {
    init();
    let heap = Heap::default();
    let s = heap.alloc_string("shared");
    let id = s.handle().unwrap();

    for _ in 0..3 {
        heap.retain(id);
    }
    assert_eq!(heap.ref_count(id), Some(4));

    for _ in 0..3 {
        heap.release(id);
    }
    assert_eq!(heap.ref_count(id), Some(1));

    heap.release(id);
    assert_eq!(heap.ref_count(id), None);
    assert_eq!(heap.stats().freed, 1);
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn test_release_frees_children() {
    let heap = Heap::default();
    let inner = heap.alloc_list(vec![heap.alloc_string("a"), heap.alloc_string("b")]);
    let mut entries = IndexMap::new();
    entries.insert("inner".to_string(), inner);
    let outer = heap.alloc_map(entries);
    assert_eq!(heap.stats().live, 4);

    heap.release_value(outer);
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn test_stale_handle_is_already_deleted() {
    let heap = Heap::default();
    let old = heap.alloc_string("gone");
    let id = old.handle().unwrap();
    heap.release_value(old);

    let reused = heap.alloc_string("new");
    let new_id = reused.handle().unwrap();
    assert_eq!(new_id.index(), id.index());
    assert_ne!(new_id.generation(), id.generation());

    let err = heap.string_text(id).unwrap_err();
    assert_eq!(err.code(), "OBJECT-ALREADY-DELETED");
    assert_eq!(heap.string_text(new_id).unwrap(), "new");
    heap.release_value(reused);
}

#[test]
fn test_unique_object_has_single_owner() {
    let heap = Heap::default();
    let class = SimpleClass::new("Token").build();
    let token = heap.alloc_unique(class);
    let id = token.handle().unwrap();
    assert!(heap.is_unique(id));
    assert_eq!(heap.ref_count(id), Some(1));
    heap.release_value(token);
    assert!(!heap.is_live(id));
}

// ═══════════════════════════════════════════════════════════════════════
// Destructors
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_destructor_runs_once_on_last_release() {
    init();
    let heap = Heap::default();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let class = SimpleClass::new("File")
        .with_destructor(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let file = heap.alloc_object(class);
    let copy = heap.dup(file);
    heap.release_value(copy);
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    heap.release_value(file);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn test_destructor_sees_members() {
    let heap = Heap::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let class = SimpleClass::new("Named")
        .member("name")
        .with_default("name", |heap| heap.alloc_string("widget"))
        .with_destructor(move |teardown| {
            if let Value::String(id) = teardown.member("name") {
                if let Ok(text) = teardown.heap().string_text(id) {
                    sink.lock().unwrap().push(text);
                }
            }
        })
        .build();

    let obj = heap.alloc_object(class);
    assert_eq!(heap.stats().live, 2);
    heap.release_value(obj);
    assert_eq!(*seen.lock().unwrap(), vec!["widget".to_string()]);
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn test_destructor_may_take_member() {
    let heap = Heap::default();
    let kept = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&kept);
    let class = SimpleClass::new("Holder")
        .member("payload")
        .with_destructor(move |teardown| {
            *slot.lock().unwrap() = Some(teardown.take_member("payload"));
        })
        .build();

    let obj = heap.alloc_object(class);
    let payload = heap.alloc_string("survivor");
    let payload_id = payload.handle().unwrap();
    heap.with_container_mut(obj.handle().unwrap(), |c| {
        if let Container::Object(data) = c {
            data.members.insert("payload".to_string(), payload);
        }
    })
    .unwrap();

    heap.release_value(obj);
    assert!(heap.is_live(payload_id));
    let taken = kept.lock().unwrap().take().unwrap();
    assert_eq!(heap.string_text(payload_id).unwrap(), "survivor");
    heap.release_value(taken);
    assert_eq!(heap.stats().live, 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Scan Counts and Copy-on-Write
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_scan_count_tracks_scannable_children() {
    let heap = Heap::default();
    let class = SimpleClass::new("Node").build();
    let strings = heap.alloc_list(vec![heap.alloc_string("x"), Value::Int(1)]);
    let objects = heap.alloc_list(vec![heap.alloc_object(class), Value::Int(1)]);

    assert_eq!(heap.scan_count(strings.handle().unwrap()), Some(0));
    assert!(!heap.value_needs_scan(&strings));
    assert_eq!(heap.scan_count(objects.handle().unwrap()), Some(1));
    assert!(heap.value_needs_scan(&objects));

    heap.release_value(strings);
    heap.release_value(objects);
}

#[test]
fn test_ensure_unique_clones_shared_container() {
    let heap = Heap::default();
    let original = heap.alloc_list(vec![Value::Int(1), heap.alloc_string("two")]);
    let other_owner = heap.dup(original);
    let mut cell = original;

    let mut queue = ReleaseQueue::new(&heap);
    assert!(heap.ensure_unique(&mut cell, &mut queue).unwrap());
    assert!(!heap.ensure_unique(&mut cell, &mut queue).unwrap());
    queue.flush();

    assert_ne!(cell, other_owner);
    assert_eq!(heap.stats().clones, 1);
    assert_eq!(heap.snapshot(&cell), heap.snapshot(&other_owner));
    assert_eq!(heap.ref_count(other_owner.handle().unwrap()), Some(1));

    heap.release_value(cell);
    heap.release_value(other_owner);
    assert_eq!(heap.stats().live, 0);
}

#[test]
fn test_snapshot_renders_nested_data() {
    let heap = Heap::default();
    let mut entries = IndexMap::new();
    entries.insert("n".to_string(), Value::Int(1));
    entries.insert("s".to_string(), heap.alloc_string("x"));
    let list = heap.alloc_list(vec![heap.alloc_map(entries), Value::Bool(true)]);

    assert_eq!(
        heap.snapshot(&list),
        Snapshot::List(vec![
            Snapshot::Map(vec![
                ("n".to_string(), Snapshot::Int(1)),
                ("s".to_string(), Snapshot::Str("x".to_string())),
            ]),
            Snapshot::Bool(true),
        ])
    );
    heap.release_value(list);
}
