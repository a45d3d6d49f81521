//! Effects that start, wait for and cancel tasks.

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::error::RuntimeError;
use crate::io::Io;
use crate::runtime::Engine;
use crate::task::{FinalCallback, Outcome, Task};
use crate::value::Value;

use super::reject;

/// Start an attached child and resume with its handle.
///
/// The child's first step is queued before the parent's resumption, so the
/// child runs up to its first blocking effect before the parent continues.
pub(super) fn fork(effect: Effect, _io: &dyn Io, engine: &Engine, task: &Task, done: Completion) {
    let (process, args) = match effect {
        Effect::Fork { process, args } => (process, args),
        other => return reject(EffectKind::Fork, &other, done),
    };
    match engine.run(&process, args, Some(task), None) {
        Ok(child) => done.succeed(Value::Task(child)),
        Err(error) => done.fail(error),
    };
}

/// Start a detached task; resume with null.
pub(super) fn spawn(effect: Effect, _io: &dyn Io, engine: &Engine, _task: &Task, done: Completion) {
    let (process, args) = match effect {
        Effect::Spawn { process, args } => (process, args),
        other => return reject(EffectKind::Spawn, &other, done),
    };
    match engine.run(&process, args, None, None) {
        Ok(_) => done.succeed(Value::Null),
        Err(error) => done.fail(error),
    };
}

/// Start an attached child and resume once it settles.
pub(super) fn call_proc(
    effect: Effect,
    _io: &dyn Io,
    engine: &Engine,
    task: &Task,
    done: Completion,
) {
    let (process, args) = match effect {
        Effect::CallProc { process, args } => (process, args),
        other => return reject(EffectKind::CallProc, &other, done),
    };
    let current = task.clone();
    let joiner = done.clone();
    let on_settled: FinalCallback = Box::new(move |outcome| resume_joiner(outcome, &current, &joiner));
    if let Err(error) = engine.run(&process, args, Some(task), Some(on_settled)) {
        done.fail(error);
    }
}

/// Wait for another task to settle.
pub(super) fn join(effect: Effect, _io: &dyn Io, _engine: &Engine, task: &Task, done: Completion) {
    let target = match effect {
        Effect::Join { task } => task,
        other => return reject(EffectKind::Join, &other, done),
    };
    if target == *task {
        done.fail(RuntimeError::SelfJoin(task.id()));
        return;
    }
    let current = task.clone();
    let joiner = done.clone();
    let waiter = target.on_settled(move |outcome| resume_joiner(outcome.clone(), &current, &joiner));
    if let Some(key) = waiter {
        done.on_release(move || target.remove_waiter(key));
    }
}

/// Map a child's outcome onto the waiting task.
///
/// A cancelled child cancels the waiter too; the completion is still
/// delivered but lands on a task that no longer accepts it.
fn resume_joiner(outcome: Outcome, current: &Task, done: &Completion) {
    match outcome {
        Outcome::Done(value) => {
            done.succeed(value);
        }
        Outcome::Errored(error) => {
            done.fail(error);
        }
        Outcome::Cancelled => {
            current.cancel();
            done.succeed(Value::Null);
        }
    }
}

pub(super) fn cancel(effect: Effect, _io: &dyn Io, _engine: &Engine, task: &Task, done: Completion) {
    let target = match effect {
        Effect::Cancel { task } => task,
        other => return reject(EffectKind::Cancel, &other, done),
    };
    target.as_ref().unwrap_or(task).cancel();
    done.succeed(Value::Null);
}

pub(super) fn cancelled(
    effect: Effect,
    _io: &dyn Io,
    _engine: &Engine,
    task: &Task,
    done: Completion,
) {
    match effect {
        Effect::Cancelled => {
            done.succeed(Value::Bool(task.is_cancelled()));
        }
        other => reject(EffectKind::Cancelled, &other, done),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::channel::Channel;
    use crate::error::RuntimeError;
    use crate::process::{process_fn, ProcessRef};
    use crate::resolvers::testing::{done_value, log, run, run_on};
    use crate::runtime::{Runtime, RuntimeConfig};
    use crate::task::{Outcome, TaskState};
    use crate::value::Value;
    use crate::Effect;

    /// A process that logs `name` and then waits on `channel`.
    fn waiter(name: &'static str, channel: &Channel, seen: &Rc<RefCell<Vec<Value>>>) -> ProcessRef {
        let channel = channel.clone();
        let seen = seen.clone();
        process_fn(name, move |co, _args| {
            let channel = channel.clone();
            let seen = seen.clone();
            async move {
                seen.borrow_mut().push(Value::from(name));
                co.perform(Effect::take_channel(&channel)).await
            }
        })
    }

    #[test]
    fn fork_runs_child_before_parent_resumes() {
        let seen = log();
        let channel = Channel::new();
        let child = waiter("child", &channel, &seen);
        let sink = seen.clone();

        let (_runtime, parent) = run(move |co| {
            let child = child.clone();
            let sink = sink.clone();
            async move {
                let handle = co.perform(Effect::fork(&child, Vec::new())).await?;
                sink.borrow_mut().push(Value::from("parent"));
                Ok(handle)
            }
        });

        assert_eq!(*seen.borrow(), vec![Value::from("child"), Value::from("parent")]);
        let child = done_value(&parent);
        let child = child.as_task().unwrap();
        assert!(child.is_running());
        assert_eq!(child.parent(), None, "settled parent releases its forks");
    }

    #[test]
    fn forks_are_attached_and_spawns_are_not() {
        let seen = log();
        let channel = Channel::new();
        let forked = waiter("forked", &channel, &seen);
        let spawned = waiter("spawned", &channel, &seen);
        let gate = Channel::new();
        let parent_gate = gate.clone();

        let (runtime, parent) = run(move |co| {
            let forked = forked.clone();
            let spawned = spawned.clone();
            let gate = parent_gate.clone();
            async move {
                co.perform(Effect::fork(&forked, Vec::new())).await?;
                co.perform(Effect::spawn(&spawned, Vec::new())).await?;
                co.perform(Effect::take_channel(&gate)).await
            }
        });

        assert_eq!(runtime.task_count(), 3);
        assert_eq!(parent.children().len(), 1);

        parent.cancel();
        assert_eq!(runtime.task_count(), 1, "only the spawned task survives");
        let survivor = runtime.get_task(runtime.tasks()[0]).unwrap();
        assert_eq!(survivor.name(), "spawned");
    }

    #[test]
    fn call_proc_waits_for_the_child() {
        let seen = log();
        let channel = Channel::new();
        let child = waiter("child", &channel, &seen);

        let (_runtime, parent) = run(move |co| {
            let child = child.clone();
            async move { co.perform(Effect::call_proc(&child, Vec::new())).await }
        });

        assert!(parent.is_running());
        assert_eq!(parent.children().len(), 1);
        channel.put(Value::from("result"));
        assert_eq!(done_value(&parent), Value::from("result"));
    }

    #[test]
    fn call_proc_propagates_child_errors() {
        let failing = process_fn("failing", |_co, _args| async {
            Err(RuntimeError::process("child broke"))
        });
        let (_runtime, parent) = run(move |co| {
            let failing = failing.clone();
            async move {
                match co.perform(Effect::call_proc(&failing, Vec::new())).await {
                    Err(error) => Ok(Value::from(error.to_string())),
                    Ok(_) => Ok(Value::Null),
                }
            }
        });
        assert_eq!(done_value(&parent), Value::from("process failed: child broke"));
    }

    #[test]
    fn join_returns_the_child_result() {
        let seen = log();
        let channel = Channel::new();
        let child = waiter("child", &channel, &seen);

        let (_runtime, parent) = run(move |co| {
            let child = child.clone();
            async move {
                let handle = co.perform(Effect::fork(&child, Vec::new())).await?;
                let handle = handle.as_task().cloned().unwrap_or_else(|| unreachable!());
                co.perform(Effect::join(&handle)).await
            }
        });

        channel.put(Value::from(7));
        assert_eq!(done_value(&parent), Value::from(7));
    }

    #[test]
    fn join_on_cancelled_child_cancels_the_joiner() {
        let seen = log();
        let channel = Channel::new();
        let child = waiter("child", &channel, &seen);
        let forked = Rc::new(RefCell::new(None));
        let slot = forked.clone();

        let (_runtime, parent) = run(move |co| {
            let child = child.clone();
            let slot = slot.clone();
            async move {
                let handle = co.perform(Effect::fork(&child, Vec::new())).await?;
                *slot.borrow_mut() = handle.as_task().cloned();
                let handle = handle.as_task().cloned().unwrap_or_else(|| unreachable!());
                co.perform(Effect::join(&handle)).await?;
                Ok(Value::from("unreachable"))
            }
        });

        let child = forked.borrow().clone().unwrap();
        child.cancel();
        assert_eq!(parent.state(), TaskState::Cancelled);
    }

    #[test]
    fn self_join_fails() {
        let runtime = Runtime::new(RuntimeConfig::default());
        let own = Rc::new(RefCell::new(None));
        let slot = own.clone();
        let gate = Channel::new();
        let gate_in = gate.clone();
        let task = run_on(&runtime, move |co| {
            let slot = slot.clone();
            let gate = gate_in.clone();
            async move {
                co.perform(Effect::take_channel(&gate)).await?;
                let me = slot.borrow().clone().unwrap_or_else(|| unreachable!());
                match co.perform(Effect::join(&me)).await {
                    Err(RuntimeError::SelfJoin(id)) => Ok(Value::from(id.raw() as i64)),
                    other => other,
                }
            }
        });
        *own.borrow_mut() = Some(task.clone());
        gate.put(Value::Null);

        assert_eq!(done_value(&task), Value::from(task.id().raw() as i64));
    }

    #[test]
    fn cancel_self_and_cancelled_flag() {
        let seen = log();
        let sink = seen.clone();
        let (_runtime, task) = run(move |co| {
            let sink = sink.clone();
            async move {
                let before = co.perform(Effect::cancelled()).await?;
                sink.borrow_mut().push(before);
                co.perform(Effect::cancel_self()).await?;
                sink.borrow_mut().push(Value::from("resumed after cancel"));
                Ok(Value::Null)
            }
        });

        assert_eq!(*seen.borrow(), vec![Value::from(false)]);
        assert_eq!(task.outcome(), Some(Outcome::Cancelled));
    }
}
