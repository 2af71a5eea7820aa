// tests/event_tests.rs

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fennel::scope::Scope;
use fennel::value::Value;

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

// ============================================================================
// Delivery basics
// ============================================================================

#[test]
fn test_emit_passes_arguments_to_listeners() {
    let scope = Scope::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in = seen.clone();
    scope.on("ping", move |event, args| {
        assert_eq!(event.name(), "ping");
        seen_in.borrow_mut().extend(args.iter().cloned());
        Ok(())
    });

    scope.emit("ping", &[Value::Integer(1), Value::String("x".into())]);
    assert_eq!(
        *seen.borrow(),
        vec![Value::Integer(1), Value::String("x".into())]
    );
}

#[test]
fn test_listeners_only_receive_their_event_name() {
    let scope = Scope::new();
    let pings = Rc::new(Cell::new(0));
    let pongs = Rc::new(Cell::new(0));

    let pings_in = pings.clone();
    scope.on("ping", move |_e, _a| {
        pings_in.set(pings_in.get() + 1);
        Ok(())
    });
    let pongs_in = pongs.clone();
    scope.on("pong", move |_e, _a| {
        pongs_in.set(pongs_in.get() + 1);
        Ok(())
    });

    scope.emit("ping", &[]);
    assert_eq!(pings.get(), 1);
    assert_eq!(pongs.get(), 0);
}

#[test]
fn test_listener_errors_do_not_interrupt_delivery() {
    let scope = Scope::new();
    let calls = Rc::new(Cell::new(0));

    scope.on("ping", |_e, _a| Err(fennel::EvalError::Type("boom".into())));
    let calls_in = calls.clone();
    scope.on("ping", move |_e, _a| {
        calls_in.set(calls_in.get() + 1);
        Ok(())
    });

    scope.emit("ping", &[]);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_deregistered_listener_no_longer_fires() {
    let scope = Scope::new();
    let calls = Rc::new(Cell::new(0));
    let calls_in = calls.clone();
    let dereg = scope.on("ping", move |_e, _a| {
        calls_in.set(calls_in.get() + 1);
        Ok(())
    });

    scope.emit("ping", &[]);
    dereg();
    scope.emit("ping", &[]);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_deregistering_during_delivery_skips_but_does_not_shift() {
    let scope = Scope::new();
    let order = log();

    let dereg_slot: Rc<RefCell<Option<Box<dyn Fn()>>>> = Rc::new(RefCell::new(None));
    let order_a = order.clone();
    let dereg_in = dereg_slot.clone();
    scope.on("ping", move |_e, _a| {
        order_a.borrow_mut().push("a".into());
        // Removes the next listener mid-delivery
        if let Some(d) = dereg_in.borrow_mut().take() {
            d();
        }
        Ok(())
    });
    let order_b = order.clone();
    *dereg_slot.borrow_mut() = Some(scope.on("ping", move |_e, _a| {
        order_b.borrow_mut().push("b".into());
        Ok(())
    }));
    let order_c = order.clone();
    scope.on("ping", move |_e, _a| {
        order_c.borrow_mut().push("c".into());
        Ok(())
    });

    scope.emit("ping", &[]);
    assert_eq!(*order.borrow(), vec!["a", "c"]);
}

// ============================================================================
// Emit: upward propagation
// ============================================================================

#[test]
fn test_emit_walks_up_to_the_root() {
    let root = Scope::new();
    let middle = root.new_child(false);
    let leaf = middle.new_child(false);
    let order = log();

    for (scope, label) in [(&root, "root"), (&middle, "middle"), (&leaf, "leaf")] {
        let order = order.clone();
        let label = label.to_string();
        scope.on("ping", move |_e, _a| {
            order.borrow_mut().push(label.clone());
            Ok(())
        });
    }

    leaf.emit("ping", &[]);
    assert_eq!(*order.borrow(), vec!["leaf", "middle", "root"]);
}

#[test]
fn test_emit_does_not_visit_children_or_siblings() {
    let root = Scope::new();
    let child = root.new_child(false);
    let sibling = root.new_child(false);
    let fired = Rc::new(Cell::new(false));

    let fired_in = fired.clone();
    sibling.on("ping", move |_e, _a| {
        fired_in.set(true);
        Ok(())
    });

    child.emit("ping", &[]);
    assert!(!fired.get());
}

#[test]
fn test_stop_propagation_halts_the_upward_walk() {
    let root = Scope::new();
    let child = root.new_child(false);
    let order = log();

    let order_root = order.clone();
    root.on("ping", move |_e, _a| {
        order_root.borrow_mut().push("root".into());
        Ok(())
    });
    let order_stop = order.clone();
    child.on("ping", move |event, _a| {
        order_stop.borrow_mut().push("stopper".into());
        event.stop_propagation();
        Ok(())
    });
    // Registered after the stopping listener on the same scope: still fires
    let order_after = order.clone();
    child.on("ping", move |_e, _a| {
        order_after.borrow_mut().push("after".into());
        Ok(())
    });

    child.emit("ping", &[]);
    assert_eq!(*order.borrow(), vec!["stopper", "after"]);
}

#[test]
fn test_event_exposes_target_and_current_scope() {
    let root = Scope::new();
    let child = root.new_child(false);
    let checks = Rc::new(Cell::new(0));

    let child_for_cmp = child.clone();
    let root_for_cmp = root.clone();
    let checks_in = checks.clone();
    root.on("ping", move |event, _a| {
        assert_eq!(event.target(), child_for_cmp);
        assert_eq!(event.current_scope().unwrap(), root_for_cmp);
        checks_in.set(checks_in.get() + 1);
        Ok(())
    });

    let event = child.emit("ping", &[]);
    assert_eq!(checks.get(), 1);
    // Delivery is over, so there is no current scope any more
    assert!(event.current_scope().is_none());
    assert_eq!(event.target(), child);
}

#[test]
fn test_prevent_default_is_sticky() {
    let scope = Scope::new();
    scope.on("ping", |event, _a| {
        event.prevent_default();
        Ok(())
    });
    let event = scope.emit("ping", &[]);
    assert!(event.default_prevented());
}

// ============================================================================
// Broadcast: downward propagation
// ============================================================================

#[test]
fn test_broadcast_visits_descendants_preorder() {
    let root = Scope::new();
    let a = root.new_child(false);
    let a1 = a.new_child(false);
    let b = root.new_child(false);
    let order = log();

    for (scope, label) in [(&root, "root"), (&a, "a"), (&a1, "a1"), (&b, "b")] {
        let order = order.clone();
        let label = label.to_string();
        scope.on("ping", move |_e, _a| {
            order.borrow_mut().push(label.clone());
            Ok(())
        });
    }

    root.broadcast("ping", &[]);
    assert_eq!(*order.borrow(), vec!["root", "a", "a1", "b"]);
}

#[test]
fn test_broadcast_reaches_isolated_children() {
    let root = Scope::new();
    let isolated = root.new_child(true);
    let fired = Rc::new(Cell::new(false));

    let fired_in = fired.clone();
    isolated.on("ping", move |_e, _a| {
        fired_in.set(true);
        Ok(())
    });

    root.broadcast("ping", &[]);
    assert!(fired.get());
}

#[test]
fn test_broadcast_ignores_stop_propagation() {
    let root = Scope::new();
    let child = root.new_child(false);
    let fired = Rc::new(Cell::new(false));

    root.on("ping", |event, _a| {
        event.stop_propagation();
        Ok(())
    });
    let fired_in = fired.clone();
    child.on("ping", move |_e, _a| {
        fired_in.set(true);
        Ok(())
    });

    root.broadcast("ping", &[]);
    assert!(fired.get());
}

#[test]
fn test_broadcast_does_not_travel_upward() {
    let root = Scope::new();
    let child = root.new_child(false);
    let fired = Rc::new(Cell::new(false));

    let fired_in = fired.clone();
    root.on("ping", move |_e, _a| {
        fired_in.set(true);
        Ok(())
    });

    child.broadcast("ping", &[]);
    assert!(!fired.get());
}
