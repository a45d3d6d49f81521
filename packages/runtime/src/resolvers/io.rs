//! Effects against the I/O boundary: actions, state, streams and events.

use std::cell::RefCell;
use std::rc::Rc;

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::io::{Io, Listener, Unsubscribe};
use crate::runtime::Engine;
use crate::task::Task;
use crate::value::Value;

use super::reject;

pub(super) fn put_action(effect: Effect, io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::PutAction { action } => {
            done.succeed(io.dispatch(action));
        }
        other => reject(EffectKind::PutAction, &other, done),
    }
}

pub(super) fn take_action(effect: Effect, io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    let pattern = match effect {
        Effect::TakeAction { pattern } => pattern,
        other => return reject(EffectKind::TakeAction, &other, done),
    };
    take_once(done, move |action| pattern.matches(action), |listener| io.subscribe(listener));
}

pub(super) fn select(effect: Effect, io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    let selector = match effect {
        Effect::Select { selector } => selector,
        other => return reject(EffectKind::Select, &other, done),
    };
    let state = io.get_state();
    done.succeed(match selector {
        Some(selector) => selector.apply(&state),
        None => state,
    });
}

pub(super) fn put_stream(effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::PutStream { stream, data } => {
            stream.write(data);
            done.succeed(Value::Null);
        }
        other => reject(EffectKind::PutStream, &other, done),
    }
}

pub(super) fn take_stream(effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    let stream = match effect {
        Effect::TakeStream { stream } => stream,
        other => return reject(EffectKind::TakeStream, &other, done),
    };
    take_once(done, |_| true, |listener| stream.on_data(listener));
}

pub(super) fn put_event(effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::PutEvent {
            emitter,
            event,
            data,
        } => {
            emitter.emit(&event, data);
            done.succeed(Value::Null);
        }
        other => reject(EffectKind::PutEvent, &other, done),
    }
}

pub(super) fn take_event(effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    let (emitter, event) = match effect {
        Effect::TakeEvent { emitter, event } => (emitter, event),
        other => return reject(EffectKind::TakeEvent, &other, done),
    };
    take_once(done, |_| true, |listener| emitter.on(&event, listener));
}

/// Register a one-shot listener through `register`.
///
/// The listener completes `done` with the first value `accept` admits and
/// removes itself. It is also removed as soon as `done` is released, so a
/// lost `race` or a cancelled task does not leave it registered.
fn take_once(
    done: Completion,
    accept: impl Fn(&Value) -> bool + 'static,
    register: impl FnOnce(Listener) -> Unsubscribe,
) {
    let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));
    let listener_slot = slot.clone();
    let waiter = done.clone();
    let listener: Listener = Rc::new(move |value: &Value| {
        if waiter.is_abandoned() {
            release(&listener_slot);
        } else if accept(value) {
            release(&listener_slot);
            waiter.succeed(value.clone());
        }
    });

    *slot.borrow_mut() = Some(register(listener));
    done.on_release(move || release(&slot));
}

fn release(slot: &RefCell<Option<Unsubscribe>>) {
    let unsubscribe = slot.borrow_mut().take();
    if let Some(unsubscribe) = unsubscribe {
        unsubscribe.call();
    }
}
