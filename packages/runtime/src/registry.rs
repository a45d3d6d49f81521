//! The effect registry: which resolver handles which kind of effect.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::completion::Completion;
use crate::effect::{Effect, EffectKind};
use crate::io::Io;
use crate::resolvers;
use crate::runtime::Engine;
use crate::task::Task;

/// Carries out one kind of effect.
///
/// A resolver must eventually complete `done` exactly once, either right
/// away (non-blocking effects) or from a timer, listener or future it sets
/// up. `task` is the task that yielded the effect; `engine` gives access to
/// the shared context and lets the resolver start tasks or resolve nested
/// effects.
pub trait Resolver {
    fn resolve(&self, effect: Effect, io: &dyn Io, engine: &Engine, task: &Task, done: Completion);
}

impl<F> Resolver for F
where
    F: Fn(Effect, &dyn Io, &Engine, &Task, Completion),
{
    fn resolve(&self, effect: Effect, io: &dyn Io, engine: &Engine, task: &Task, done: Completion) {
        self(effect, io, engine, task, done)
    }
}

/// Mapping from effect kind to resolver.
///
/// # Example
///
/// ```ignore
/// let mut registry = EffectRegistry::builtin();
/// registry.register(
///     EffectKind::Custom("log".into()),
///     |effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion| {
///         println!("{effect:?}");
///         done.succeed(Value::Null);
///     },
/// );
/// ```
#[derive(Clone, Default)]
pub struct EffectRegistry {
    resolvers: BTreeMap<EffectKind, Rc<dyn Resolver>>,
}

impl EffectRegistry {
    /// An empty registry. Every effect yielded against it fails with
    /// `UnknownEffectKind` until resolvers are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in resolver.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        resolvers::register_builtins(&mut registry);
        registry
    }

    /// Built-in resolvers for `kinds` only.
    pub fn builtin_subset(kinds: &[EffectKind]) -> Self {
        let all = Self::builtin();
        let resolvers = kinds
            .iter()
            .filter_map(|kind| Some((kind.clone(), all.get(kind)?)))
            .collect();
        Self { resolvers }
    }

    /// Register `resolver` for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: EffectKind, resolver: impl Resolver + 'static) -> &mut Self {
        self.resolvers.insert(kind, Rc::new(resolver));
        self
    }

    /// Builder-style `register`.
    pub fn with(mut self, kind: EffectKind, resolver: impl Resolver + 'static) -> Self {
        self.register(kind, resolver);
        self
    }

    /// Remove the resolver for `kind`. Returns true if there was one.
    pub fn remove(&mut self, kind: &EffectKind) -> bool {
        self.resolvers.remove(kind).is_some()
    }

    pub fn get(&self, kind: &EffectKind) -> Option<Rc<dyn Resolver>> {
        self.resolvers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &EffectKind) -> bool {
        self.resolvers.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EffectKind> {
        self.resolvers.keys()
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.resolvers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn new_registry_is_empty() {
        let registry = EffectRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(&EffectKind::Call).is_none());
    }

    #[test]
    fn builtin_covers_every_builtin_kind() {
        let registry = EffectRegistry::builtin();
        for kind in EffectKind::builtin() {
            assert!(registry.contains(&kind), "missing resolver for {kind}");
        }
        assert_eq!(registry.len(), EffectKind::builtin().len());
    }

    #[test]
    fn subset_and_custom_kinds() {
        let mut registry = EffectRegistry::builtin_subset(&[EffectKind::Call, EffectKind::Fork]);
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(&EffectKind::Race));

        let log = EffectKind::Custom("log".to_string());
        registry.register(
            log.clone(),
            |_effect: Effect, _io: &dyn Io, _engine: &Engine, _task: &Task, done: Completion| {
                done.succeed(Value::Null);
            },
        );
        assert!(registry.contains(&log));
        assert!(registry.remove(&log));
        assert!(!registry.remove(&log));
    }
}
