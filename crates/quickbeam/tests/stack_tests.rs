//! Variable stack and closure tests

use pretty_assertions::assert_eq;
use quickbeam::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const X: VarIdent = VarIdent::new(1);
const Y: VarIdent = VarIdent::new(2);

fn local(ident: VarIdent) -> LValueExpr {
    LValueExpr::Local(ident)
}

// ═══════════════════════════════════════════════════════════════════════
// Scoping and Shadowing
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_lexical_shadowing() -> anyhow::Result<()> {
    init();
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    thread.instantiate_local(X, "x", Value::Int(1), TypeConstraint::Any)?;
    {
        let inner = thread.scope();
        inner.instantiate_local(X, "x", Value::Int(2), TypeConstraint::Any)?;
        assert_eq!(inner.get_value(&local(X))?, Value::Int(2));
    }
    assert_eq!(thread.get_value(&local(X))?, Value::Int(1));

    assert!(thread.uninstantiate_local());
    assert!(!thread.uninstantiate_local());
    Ok(())
}

#[test]
fn test_skip_hides_inner_declaration() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;
    let _scope = thread.scope();

    thread.instantiate_local(X, "x", Value::Int(1), TypeConstraint::Any)?;
    thread.instantiate_local(X, "x", Value::Int(2), TypeConstraint::Any)?;
    assert!(thread.set_skip(X, true));
    assert_eq!(thread.get_value(&local(X))?, Value::Int(1));
    thread.assign(&local(X), Value::Int(10))?;

    assert!(thread.set_skip(X, false));
    assert_eq!(thread.get_value(&local(X))?, Value::Int(2));
    Ok(())
}

#[test]
fn test_declared_type_is_enforced_on_locals() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;
    let _scope = thread.scope();

    let err = thread
        .instantiate_local(X, "x", Value::Bool(true), TypeConstraint::Kind(ValueKind::Int))
        .unwrap_err();
    assert_eq!(err.code(), "RUNTIME-TYPE-ERROR");

    thread.instantiate_local(X, "x", Value::Nothing, TypeConstraint::OrNothing(ValueKind::Int))?;
    thread.assign(&local(X), Value::Int(4))?;
    let err = thread.assign(&local(X), Value::Float(4.5)).unwrap_err();
    assert_eq!(err.code(), "RUNTIME-TYPE-ERROR");
    assert_eq!(thread.get_value(&local(X))?, Value::Int(4));
    Ok(())
}

#[test]
fn test_small_blocks_grow_and_shrink() -> anyhow::Result<()> {
    let engine = Engine::new(EngineConfig::new().with_stack_block_size(2));
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    let mark = thread.mark();
    for i in 0..5 {
        let list = engine.heap().alloc_list(vec![Value::Int(i)]);
        thread.instantiate_local(VarIdent::new(i as u64), "v", list, TypeConstraint::Any)?;
    }
    assert_eq!(thread.entry().local_count(), 5);
    assert_eq!(
        thread.snapshot(&local(VarIdent::new(3)))?,
        Snapshot::List(vec![Snapshot::Int(3)])
    );

    thread.unwind_to(mark);
    assert_eq!(thread.entry().local_count(), 0);
    assert_eq!(engine.heap().stats().live, 0);
    Ok(())
}

#[test]
fn test_scope_releases_local_values() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    {
        let scope = thread.scope();
        let text = scope.heap().alloc_string("temporary");
        scope.instantiate_local(X, "x", text, TypeConstraint::Any)?;
        assert_eq!(engine.heap().stats().live, 1);
    }
    assert_eq!(engine.heap().stats().live, 0);
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Closures
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_closure_outlives_its_frame() -> anyhow::Result<()> {
    init();
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    let closure = {
        let frame = thread.scope();
        frame.instantiate_closure_var(Y, "y", Value::Int(5), TypeConstraint::Any)?;
        frame.create_closure("get_y", &[Y])?
    };
    assert_eq!(thread.entry().local_count(), 0);
    assert_eq!(engine.heap().stats().live, 2);

    let call = thread.enter_closure(&closure)?;
    assert_eq!(thread.get_value(&local(Y))?, Value::Int(5));
    thread.leave_closure(call);

    engine.heap().release_value(closure);
    assert_eq!(engine.heap().stats().live, 0);
    Ok(())
}

#[test]
fn test_closure_state_persists_between_calls() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    let counter = {
        let frame = thread.scope();
        frame.instantiate_closure_var(Y, "count", Value::Int(0), TypeConstraint::Any)?;
        frame.create_closure("next", &[Y])?
    };

    for expected in 1..=3 {
        let call = thread.enter_closure(&counter)?;
        let value = thread.compound_update(&local(Y), CompoundOp::Add, Value::Int(1))?;
        thread.leave_closure(call);
        assert_eq!(value, Value::Int(expected));
    }

    engine.heap().release_value(counter);
    assert_eq!(engine.heap().stats().live, 0);
    Ok(())
}

#[test]
fn test_closures_share_captured_variable() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;

    let (setter, getter) = {
        let frame = thread.scope();
        frame.instantiate_closure_var(Y, "shared", Value::Nothing, TypeConstraint::Any)?;
        (frame.create_closure("set", &[Y])?, frame.create_closure("get", &[Y])?)
    };

    let call = thread.enter_closure(&setter)?;
    thread.assign(&local(Y), Value::Int(9))?;
    thread.leave_closure(call);

    let call = thread.enter_closure(&getter)?;
    assert_eq!(thread.get_value(&local(Y))?, Value::Int(9));
    thread.leave_closure(call);

    engine.heap().release_value(setter);
    assert_eq!(engine.heap().stats().live, 2);
    engine.heap().release_value(getter);
    assert_eq!(engine.heap().stats().live, 0);
    Ok(())
}

#[test]
fn test_capturing_plain_local_fails() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;
    let _scope = thread.scope();

    thread.instantiate_local(X, "x", Value::Int(1), TypeConstraint::Any)?;
    let err = thread.create_closure("f", &[X]).unwrap_err();
    assert_eq!(err.code(), "UNDEFINED-VARIABLE");
    Ok(())
}

#[test]
fn test_enter_closure_rejects_non_closure() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let thread = program.attach_thread()?;
    let err = thread.enter_closure(&Value::Int(1)).unwrap_err();
    assert_eq!(err.code(), "RUNTIME-TYPE-ERROR");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Threads
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_each_thread_has_its_own_stack() -> anyhow::Result<()> {
    let engine = Engine::default();
    let program = engine.create_program();
    let program = &program;

    std::thread::scope(|s| -> anyhow::Result<()> {
        let workers: Vec<_> = (0..4i64)
            .map(|n| {
                s.spawn(move || -> anyhow::Result<i64> {
                    let thread = program.attach_thread()?;
                    let _scope = thread.scope();
                    thread.instantiate_local(X, "x", Value::Int(n), TypeConstraint::Any)?;
                    for _ in 0..100 {
                        thread.compound_update(&local(X), CompoundOp::Add, Value::Int(1))?;
                    }
                    Ok(thread.get_value(&local(X))?.as_int().unwrap_or(-1) - n)
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().expect("worker panicked")?, 100);
        }
        Ok(())
    })?;

    assert!(engine.registry().is_empty());
    Ok(())
}
