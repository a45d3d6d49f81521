//! `call`, `safe_call`, `cps` and `delay`.

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind, Invocation};
use crate::error::Result;
use crate::io::Io;
use crate::runtime::Engine;
use crate::task::Task;
use crate::value::Value;

use super::reject;

pub(super) fn call(effect: Effect, _io: &dyn Io, engine: &Engine, _task: &Task, done: Completion) {
    let (func, args) = match effect {
        Effect::Call { func, args } => (func, args),
        other => return reject(EffectKind::Call, &other, done),
    };
    match func.invoke(args) {
        Invocation::Ready(result) => {
            done.complete(result);
        }
        Invocation::Pending(future) => engine.spawn_local(async move {
            done.complete(future.await);
        }),
    }
}

pub(super) fn safe_call(
    effect: Effect,
    _io: &dyn Io,
    engine: &Engine,
    _task: &Task,
    done: Completion,
) {
    let (func, args) = match effect {
        Effect::SafeCall { func, args } => (func, args),
        other => return reject(EffectKind::SafeCall, &other, done),
    };
    match func.invoke(args) {
        Invocation::Ready(result) => {
            done.succeed(error_first(result));
        }
        Invocation::Pending(future) => engine.spawn_local(async move {
            done.succeed(error_first(future.await));
        }),
    }
}

/// `[null, value]` on success, `[error, null]` on failure.
fn error_first(result: Result<Value>) -> Value {
    match result {
        Ok(value) => Value::Array(vec![Value::Null, value]),
        Err(error) => Value::Array(vec![Value::Error(error), Value::Null]),
    }
}

pub(super) fn cps(effect: Effect, _io: &dyn Io, _engine: &Engine, task: &Task, done: Completion) {
    match effect {
        Effect::Cps { func, args } => func.invoke(args, task, done),
        other => reject(EffectKind::Cps, &other, done),
    }
}

pub(super) fn delay(effect: Effect, _io: &dyn Io, engine: &Engine, _task: &Task, done: Completion) {
    let (duration, value) = match effect {
        Effect::Delay { duration, value } => (duration, value),
        other => return reject(EffectKind::Delay, &other, done),
    };
    engine.spawn_local(async move {
        tokio::time::sleep(duration).await;
        done.succeed(value);
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::task::LocalSet;
    use tokio::time::Instant;

    use crate::effect::{CpsFunction, Function};
    use crate::error::RuntimeError;
    use crate::resolvers::testing::{done_value, log, run};
    use crate::task::Outcome;
    use crate::value::Value;
    use crate::Effect;

    fn add() -> Function {
        Function::sync("add", |args| {
            Ok(Value::from(args.iter().filter_map(Value::as_i64).sum::<i64>()))
        })
    }

    fn refuse() -> Function {
        Function::sync("refuse", |_args| Err(RuntimeError::effect("refused")))
    }

    #[test]
    fn sync_call_resumes_in_the_same_turn() {
        let (_runtime, task) = run(|co| async move {
            co.perform(Effect::call(add(), vec![Value::from(2), Value::from(3)]))
                .await
        });
        assert_eq!(done_value(&task), Value::from(5));
    }

    #[test]
    fn call_errors_are_injected() {
        let (_runtime, task) = run(|co| async move {
            match co.perform(Effect::call(refuse(), Vec::new())).await {
                Err(error) => Ok(Value::from(error.to_string())),
                Ok(_) => Ok(Value::Null),
            }
        });
        assert_eq!(done_value(&task), Value::from("effect failed: refused"));
    }

    #[test]
    fn safe_call_returns_error_first_pairs() {
        let (_runtime, task) = run(|co| async move {
            let ok = co.perform(Effect::safe_call(add(), vec![Value::from(1)])).await?;
            let failed = co.perform(Effect::safe_call(refuse(), Vec::new())).await?;
            Ok(Value::Array(vec![ok, failed]))
        });
        assert_eq!(
            done_value(&task),
            Value::Array(vec![
                Value::Array(vec![Value::Null, Value::from(1)]),
                Value::Array(vec![
                    Value::Error(RuntimeError::effect("refused")),
                    Value::Null
                ]),
            ])
        );
    }

    #[test]
    fn cps_function_completes_through_its_token() {
        let seen = log();
        let sink = seen.clone();
        let double = CpsFunction::new("double", move |args, task, done| {
            sink.borrow_mut().push(Value::from(task.name()));
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            done.succeed(Value::from(n * 2));
        });
        let (_runtime, task) = run(move |co| {
            let double = double.clone();
            async move { co.perform(Effect::cps(double, vec![Value::from(21)])).await }
        });

        assert_eq!(done_value(&task), Value::from(42));
        assert_eq!(*seen.borrow(), vec![Value::from("test")]);
    }

    #[tokio::test(start_paused = true)]
    async fn async_call_and_delay() {
        LocalSet::new()
            .run_until(async {
                let slow = Function::future("slow", |args| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Value::Array(args))
                });
                let start = Instant::now();
                let (_runtime, task) = run(move |co| {
                    let slow = slow.clone();
                    async move {
                        let echoed = co.perform(Effect::call(slow, vec![Value::from("a")])).await?;
                        let later = co
                            .perform(Effect::delay(Duration::from_millis(100), "tick"))
                            .await?;
                        Ok(Value::Array(vec![echoed, later]))
                    }
                });
                assert!(task.is_running());

                let outcome = task.done().await;
                assert_eq!(
                    outcome,
                    Outcome::Done(Value::Array(vec![
                        Value::Array(vec![Value::from("a")]),
                        Value::from("tick"),
                    ]))
                );
                assert!(start.elapsed() >= Duration::from_millis(150));
            })
            .await;
    }
}
