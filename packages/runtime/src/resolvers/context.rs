//! `get_context` and `set_context`.

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::io::Io;
use crate::runtime::Engine;
use crate::task::Task;
use crate::value::Value;

use super::reject;

pub(super) fn get_context(effect: Effect, _io: &dyn Io, engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::GetContext => {
            done.succeed(engine.context().snapshot());
        }
        other => reject(EffectKind::GetContext, &other, done),
    }
}

pub(super) fn set_context(effect: Effect, _io: &dyn Io, engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::SetContext { partial } => {
            engine.context().merge(partial);
            done.succeed(Value::Null);
        }
        other => reject(EffectKind::SetContext, &other, done),
    }
}

#[cfg(test)]
mod tests {
    use collection_literals::btree;

    use crate::context::Context;
    use crate::process::process_fn;
    use crate::resolvers::testing::done_value;
    use crate::runtime::{Runtime, RuntimeConfig};
    use crate::value::Value;
    use crate::Effect;

    #[test]
    fn children_share_the_parent_context() {
        let writer = process_fn("writer", |co, _args| async move {
            co.perform(Effect::set_context(btree! {
                "written_by".to_string() => Value::from("child"),
            }))
            .await
        });
        let parent = process_fn("parent", move |co, _args| {
            let writer = writer.clone();
            async move {
                co.perform(Effect::call_proc(&writer, Vec::new())).await?;
                co.perform(Effect::get_context()).await
            }
        });

        let runtime = Runtime::new(RuntimeConfig::default());
        let context = Context::from_map(btree! { "user".to_string() => Value::from("alice") });
        let task = runtime
            .run(parent, context.clone(), None, Vec::new())
            .unwrap();

        let expected = Value::Map(btree! {
            "user".to_string() => Value::from("alice"),
            "written_by".to_string() => Value::from("child"),
        });
        assert_eq!(done_value(&task), expected);
        assert_eq!(context.snapshot(), expected);
    }
}
