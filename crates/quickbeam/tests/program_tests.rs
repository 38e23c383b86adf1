//! Program coordination tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use quickbeam::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ═══════════════════════════════════════════════════════════════════════
// Attachment
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_attach_and_detach() -> anyhow::Result<()> {
    init();
    let engine = Engine::default();
    let program = engine.create_program();

    let thread = program.attach_thread()?;
    assert_eq!(program.thread_count(), 1);
    assert_eq!(engine.registry().len(), 1);

    thread.detach();
    assert_eq!(program.thread_count(), 0);
    assert!(engine.registry().is_empty());
    Ok(())
}

#[test]
fn test_one_thread_in_two_programs() -> anyhow::Result<()> {
    let engine = Engine::default();
    let first = engine.create_program();
    let second = engine.create_program();

    let a = first.attach_thread()?;
    let b = second.attach_thread()?;
    assert_eq!(engine.registry().len(), 1);
    assert_eq!(a.entry().attachments(), 2);
    assert_eq!(a.entry().ordinal(), b.entry().ordinal());

    drop(a);
    assert_eq!(engine.registry().len(), 1);
    assert_eq!(first.thread_count(), 0);
    assert_eq!(second.thread_count(), 1);
    drop(b);
    assert!(engine.registry().is_empty());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Structural Changes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_structural_change_waits_for_other_threads() -> anyhow::Result<()> {
    init();
    let engine = Engine::default();
    let program = engine.create_program();
    let worker_left = AtomicBool::new(false);
    let (attached_tx, attached_rx) = mpsc::channel();
    let (leave_tx, leave_rx) = mpsc::channel::<()>();

    let program = &program;
    let worker_left = &worker_left;

    std::thread::scope(|s| -> anyhow::Result<()> {
        let worker = s.spawn(move || -> anyhow::Result<()> {
            let thread = program.attach_thread()?;
            attached_tx.send(())?;
            leave_rx.recv()?;
            worker_left.store(true, Ordering::SeqCst);
            thread.detach();
            Ok(())
        });
        attached_rx.recv()?;

        let definer = s.spawn(move || -> anyhow::Result<bool> {
            program.define_global("late", Value::Int(1), TypeConstraint::Any, false)?;
            Ok(worker_left.load(Ordering::SeqCst))
        });

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(program.global_count(), 0);
        leave_tx.send(())?;

        worker.join().expect("worker panicked")?;
        assert!(definer.join().expect("definer panicked")?);
        Ok(())
    })?;

    assert_eq!(program.global_count(), 1);
    assert_eq!(program.phase(), ProgramPhase::Active);
    Ok(())
}

#[test]
fn test_attached_thread_may_change_structure() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    let id = program.define_global("mine", Value::Int(7), TypeConstraint::Any, false)?;
    assert_eq!(thread.get_value(&LValueExpr::Global(id))?, Value::Int(7));
    assert_eq!(program.thread_count(), 1);

    let seen = program.with_structural_lock(|p| (p.phase(), p.thread_count()))?;
    assert_eq!(seen, (ProgramPhase::Draining, 0));
    assert_eq!(program.thread_count(), 1);
    Ok(())
}

#[test]
fn test_teardown_releases_everything() -> anyhow::Result<()> {
    init();
    let engine = Engine::default();
    let program = engine.create_program();
    let heap = engine.heap();
    let list = heap.alloc_list(vec![heap.alloc_string("a")]);
    let data = LValueExpr::Global(program.define_global("data", list, TypeConstraint::Any, false)?);

    let thread = program.attach_thread()?;
    thread.thread_data_set("cache", heap.alloc_string("cached"))?;
    assert_eq!(heap.stats().live, 3);

    program.teardown()?;
    assert_eq!(program.phase(), ProgramPhase::TornDown);
    assert_eq!(heap.stats().live, 0);

    let err = thread.get_value(&data).unwrap_err();
    assert_eq!(err.code(), "PROGRAM-TORN-DOWN");
    drop(thread);

    let err = program.attach_thread().unwrap_err();
    assert_eq!(err.code(), "PROGRAM-TORN-DOWN");
    assert!(engine.registry().is_empty());
    assert_eq!(program.thread_count(), 0);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Thread-Local Storage
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_thread_data_round_trip() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    assert_eq!(thread.thread_data_get("depth"), Value::Nothing);
    thread.thread_data_set("depth", Value::Int(3))?;
    assert_eq!(thread.thread_data_get("depth"), Value::Int(3));
    thread.thread_data_set("depth", Value::Int(4))?;
    assert_eq!(thread.thread_data_remove("depth"), Value::Int(4));
    assert_eq!(thread.thread_data_get("depth"), Value::Nothing);
    Ok(())
}

#[test]
fn test_thread_data_is_per_program() -> anyhow::Result<()> {
    let engine = Engine::default();
    let first = engine.create_program();
    let second = engine.create_program();
    let a = first.attach_thread()?;
    let b = second.attach_thread()?;

    a.thread_data_set("name", Value::Int(1))?;
    b.thread_data_set("name", Value::Int(2))?;
    assert_eq!(a.thread_data_get("name"), Value::Int(1));
    assert_eq!(b.thread_data_get("name"), Value::Int(2));
    Ok(())
}

#[test]
fn test_thread_data_survives_until_last_attachment() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let heap = engine.heap();

    let outer = program.attach_thread()?;
    let inner = program.attach_thread()?;
    inner.thread_data_set("buffer", heap.alloc_string("kept"))?;
    drop(inner);
    assert_eq!(heap.stats().live, 1);

    let kept = outer.thread_data_get("buffer");
    assert_eq!(heap.snapshot(&kept), Snapshot::Str("kept".to_string()));
    heap.release_value(kept);

    drop(outer);
    assert_eq!(heap.stats().live, 0);
    Ok(())
}

#[test]
fn test_thread_data_refuses_unique_objects() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let heap = engine.heap();
    let thread = program.attach_thread()?;

    let token = heap.alloc_unique(SimpleClass::new("Token").build());
    let err = thread.thread_data_set("token", token).unwrap_err();
    assert_eq!(err.code(), "UNIQUE-OBJECT-SHARED");
    assert_eq!(heap.stats().live, 0);
    assert_eq!(thread.thread_data_get("token"), Value::Nothing);
    Ok(())
}

#[test]
fn test_clear_thread_data() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let heap = engine.heap();
    let thread = program.attach_thread()?;

    thread.thread_data_set("a", heap.alloc_string("x"))?;
    thread.thread_data_set("b", Value::Int(1))?;
    let cleared = program.clear_thread_data(std::thread::current().id())?;
    assert_eq!(cleared, 2);
    assert_eq!(heap.stats().live, 0);
    assert_eq!(thread.thread_data_get("a"), Value::Nothing);

    thread.thread_data_set("a", Value::Int(5))?;
    assert_eq!(thread.thread_data_get("a"), Value::Int(5));
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Concurrency
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_compound_updates_on_global() -> anyhow::Result<()> {
    init();
    let engine = Engine::default();
    let program = engine.create_program();
    let counter = LValueExpr::Global(program.define_global("counter", Value::Int(0), TypeConstraint::Any, false)?);
    let program = &program;
    let counter = &counter;

    std::thread::scope(|s| -> anyhow::Result<()> {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(move || -> anyhow::Result<()> {
                    let thread = program.attach_thread()?;
                    for _ in 0..250 {
                        thread.compound_update(counter, CompoundOp::Add, Value::Int(1))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked")?;
        }
        Ok(())
    })?;

    let thread = program.attach_thread()?;
    assert_eq!(thread.get_value(counter)?, Value::Int(1000));
    Ok(())
}

#[test]
fn test_concurrent_appends_to_shared_list() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let heap = engine.heap();
    let list = LValueExpr::Global(program.define_global(
        "log",
        heap.alloc_list(Vec::new()),
        TypeConstraint::Any,
        false,
    )?);
    let program = &program;
    let list = &list;

    std::thread::scope(|s| -> anyhow::Result<()> {
        let workers: Vec<_> = (0..4)
            .map(|n| {
                s.spawn(move || -> anyhow::Result<()> {
                    let thread = program.attach_thread()?;
                    for i in 0..50 {
                        let text = thread.heap().alloc_string(format!("{}-{}", n, i));
                        let updated = thread.compound_update(list, CompoundOp::Add, text)?;
                        thread.heap().release_value(updated);
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked")?;
        }
        Ok(())
    })?;

    let thread = program.attach_thread()?;
    match thread.snapshot(list)? {
        Snapshot::List(items) => assert_eq!(items.len(), 200),
        other => panic!("expected a list, got {:?}", other),
    }
    assert_eq!(heap.stats().live, 201);
    Ok(())
}

#[test]
fn test_concurrent_sharing_balances_refcounts() -> anyhow::Result<()> {
    let engine = Engine::default();
    let heap = engine.heap();
    let shared = heap.alloc_list(vec![heap.alloc_string("payload")]);
    let id = shared.handle().expect("lists are handles");

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for _ in 0..500 {
                    let copy = heap.dup(shared);
                    heap.release_value(copy);
                }
            });
        }
    });

    assert_eq!(heap.ref_count(id), Some(1));
    heap.release_value(shared);
    assert_eq!(heap.stats().live, 0);
    Ok(())
}
