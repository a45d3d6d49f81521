//! Built-in resolvers.
//!
//! Each resolver is a plain function matching the [`Resolver`] closure
//! shape. A resolver that receives a descriptor of a different kind (only
//! possible through a hand-built registry) fails the effect with
//! `MalformedDescriptor`.
//!
//! [`Resolver`]: crate::registry::Resolver

mod call;
mod channel;
mod combinator;
mod context;
mod io;
mod task;

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::error::RuntimeError;
use crate::registry::EffectRegistry;

pub(crate) fn register_builtins(registry: &mut EffectRegistry) {
    registry
        .register(EffectKind::Call, call::call)
        .register(EffectKind::SafeCall, call::safe_call)
        .register(EffectKind::Cps, call::cps)
        .register(EffectKind::Delay, call::delay)
        .register(EffectKind::Fork, task::fork)
        .register(EffectKind::Spawn, task::spawn)
        .register(EffectKind::CallProc, task::call_proc)
        .register(EffectKind::Join, task::join)
        .register(EffectKind::Cancel, task::cancel)
        .register(EffectKind::Cancelled, task::cancelled)
        .register(EffectKind::Parallel, combinator::parallel)
        .register(EffectKind::Race, combinator::race)
        .register(EffectKind::PutAction, io::put_action)
        .register(EffectKind::TakeAction, io::take_action)
        .register(EffectKind::PutStream, io::put_stream)
        .register(EffectKind::TakeStream, io::take_stream)
        .register(EffectKind::PutEvent, io::put_event)
        .register(EffectKind::TakeEvent, io::take_event)
        .register(EffectKind::PutChannel, channel::put_channel)
        .register(EffectKind::TakeChannel, channel::take_channel)
        .register(EffectKind::GetContext, context::get_context)
        .register(EffectKind::SetContext, context::set_context)
        .register(EffectKind::Select, io::select);
}

/// Fail `done` because a resolver for `expected` was handed `got`.
fn reject(expected: EffectKind, got: &Effect, done: Completion) {
    done.fail(RuntimeError::MalformedDescriptor(format!(
        "{expected} resolver cannot resolve a {} effect",
        got.kind()
    )));
}
