//! `parallel` and `race`.
//!
//! Both resolve their members through the engine with completions linked
//! to the combinator's own, so a member that is still waiting when the
//! combinator finishes (or when the task is cancelled) is abandoned and its
//! result ignored. Members are not cancelled: a losing `delay` still runs
//! out its timer, a losing `take_channel` still sits in the channel's queue
//! until the next put skips it.

use std::cell::RefCell;
use std::rc::Rc;

use collection_literals::btree;

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::io::Io;
use crate::runtime::Engine;
use crate::task::Task;
use crate::value::Value;

use super::reject;

struct Gather {
    results: Vec<Option<Value>>,
    remaining: usize,
}

/// Resume with every member's result, in input order or by label.
/// The first member to fail fails the whole effect.
pub(super) fn parallel(effect: Effect, _io: &dyn Io, engine: &Engine, task: &Task, done: Completion) {
    let effects = match effect {
        Effect::Parallel { effects } => effects,
        other => return reject(EffectKind::Parallel, &other, done),
    };
    let (labels, members) = effects.into_parts();
    if members.is_empty() {
        done.succeed(assemble(labels.as_deref(), Vec::new()));
        return;
    }

    let labels = Rc::new(labels);
    let gather = Rc::new(RefCell::new(Gather {
        results: vec![None; members.len()],
        remaining: members.len(),
    }));

    for (index, member) in members.into_iter().enumerate() {
        let parent = done.clone();
        let labels = labels.clone();
        let gather = gather.clone();
        let branch = done.linked(move |result| {
            if parent.is_completed() {
                return;
            }
            let value = match result {
                Ok(value) => value,
                Err(error) => {
                    parent.fail(error);
                    return;
                }
            };
            let finished: Option<Vec<Value>> = {
                let mut gather = gather.borrow_mut();
                gather.results[index] = Some(value);
                gather.remaining -= 1;
                if gather.remaining == 0 {
                    Some(gather.results.drain(..).map(Option::unwrap_or_default).collect())
                } else {
                    None
                }
            };
            if let Some(values) = finished {
                parent.succeed(assemble((*labels).as_deref(), values));
            }
        });
        engine.resolve_effect(member, task, branch);
    }
}

fn assemble(labels: Option<&[String]>, values: Vec<Value>) -> Value {
    match labels {
        Some(labels) => Value::Map(labels.iter().cloned().zip(values).collect()),
        None => Value::Array(values),
    }
}

/// Resume with the first member to settle, success or failure.
///
/// Labeled input resumes with a single-entry map `{label: result}`. An
/// empty race resumes with null.
pub(super) fn race(effect: Effect, _io: &dyn Io, engine: &Engine, task: &Task, done: Completion) {
    let effects = match effect {
        Effect::Race { effects } => effects,
        other => return reject(EffectKind::Race, &other, done),
    };
    let (labels, members) = effects.into_parts();
    if members.is_empty() {
        done.succeed(Value::Null);
        return;
    }

    for (index, member) in members.into_iter().enumerate() {
        let parent = done.clone();
        let label = labels.as_ref().and_then(|labels| labels.get(index).cloned());
        let branch = done.linked(move |result| {
            if parent.is_completed() {
                return;
            }
            match (result, label) {
                (Ok(value), Some(label)) => parent.succeed(Value::Map(btree! { label => value })),
                (Ok(value), None) => parent.succeed(value),
                (Err(error), _) => parent.fail(error),
            };
        });
        engine.resolve_effect(member, task, branch);
    }
}
