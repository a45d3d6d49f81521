//! `put_channel` and `take_channel`.

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::io::Io;
use crate::runtime::Engine;
use crate::task::Task;
use crate::value::Value;

use super::reject;

pub(super) fn put_channel(effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::PutChannel { channel, message } => {
            channel.put(message);
            done.succeed(Value::Null);
        }
        other => reject(EffectKind::PutChannel, &other, done),
    }
}

pub(super) fn take_channel(effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion) {
    match effect {
        Effect::TakeChannel { channel } => channel.take_with(done),
        other => reject(EffectKind::TakeChannel, &other, done),
    }
}
