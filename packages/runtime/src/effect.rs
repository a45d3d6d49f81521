//! Effect descriptors.
//!
//! An [`Effect`] is plain data describing something a process wants done.
//! Building one has no side effects; the runtime hands the descriptor to the
//! resolver registered for its [`EffectKind`] when the process yields it.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::FutureExt;

use crate::channel::Channel;
use crate::completion::Completion;
use crate::error::Result;
use crate::io::{DataStream, Emitter};
use crate::process::ProcessRef;
use crate::task::Task;
use crate::value::Value;

/// Discriminant of an effect descriptor; the registry key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EffectKind {
    Call,
    SafeCall,
    Cps,
    Delay,
    Fork,
    Spawn,
    CallProc,
    Join,
    Cancel,
    Cancelled,
    Parallel,
    Race,
    PutAction,
    TakeAction,
    PutStream,
    TakeStream,
    PutEvent,
    TakeEvent,
    PutChannel,
    TakeChannel,
    GetContext,
    SetContext,
    Select,
    /// A host-registered kind.
    Custom(String),
}

impl EffectKind {
    pub fn as_str(&self) -> &str {
        match self {
            EffectKind::Call => "call",
            EffectKind::SafeCall => "safe_call",
            EffectKind::Cps => "cps",
            EffectKind::Delay => "delay",
            EffectKind::Fork => "fork",
            EffectKind::Spawn => "spawn",
            EffectKind::CallProc => "call_proc",
            EffectKind::Join => "join",
            EffectKind::Cancel => "cancel",
            EffectKind::Cancelled => "cancelled",
            EffectKind::Parallel => "parallel",
            EffectKind::Race => "race",
            EffectKind::PutAction => "put_action",
            EffectKind::TakeAction => "take_action",
            EffectKind::PutStream => "put_stream",
            EffectKind::TakeStream => "take_stream",
            EffectKind::PutEvent => "put_event",
            EffectKind::TakeEvent => "take_event",
            EffectKind::PutChannel => "put_channel",
            EffectKind::TakeChannel => "take_channel",
            EffectKind::GetContext => "get_context",
            EffectKind::SetContext => "set_context",
            EffectKind::Select => "select",
            EffectKind::Custom(kind) => kind,
        }
    }

    /// Every kind the runtime ships a resolver for.
    pub fn builtin() -> Vec<EffectKind> {
        vec![
            EffectKind::Call,
            EffectKind::SafeCall,
            EffectKind::Cps,
            EffectKind::Delay,
            EffectKind::Fork,
            EffectKind::Spawn,
            EffectKind::CallProc,
            EffectKind::Join,
            EffectKind::Cancel,
            EffectKind::Cancelled,
            EffectKind::Parallel,
            EffectKind::Race,
            EffectKind::PutAction,
            EffectKind::TakeAction,
            EffectKind::PutStream,
            EffectKind::TakeStream,
            EffectKind::PutEvent,
            EffectKind::TakeEvent,
            EffectKind::PutChannel,
            EffectKind::TakeChannel,
            EffectKind::GetContext,
            EffectKind::SetContext,
            EffectKind::Select,
        ]
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type SyncBody = Rc<dyn Fn(Vec<Value>) -> Result<Value>>;
type AsyncBody = Rc<dyn Fn(Vec<Value>) -> LocalBoxFuture<'static, Result<Value>>>;

#[derive(Clone)]
enum FunctionBody {
    Sync(SyncBody),
    Async(AsyncBody),
}

/// A host function callable through `call` and `safe_call`.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    body: FunctionBody,
}

/// Result of invoking a [`Function`].
pub(crate) enum Invocation {
    Ready(Result<Value>),
    Pending(LocalBoxFuture<'static, Result<Value>>),
}

impl Function {
    /// Wrap a function that returns its result directly.
    pub fn sync<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + 'static,
    {
        Self {
            name: name.into(),
            body: FunctionBody::Sync(Rc::new(f)),
        }
    }

    /// Wrap a function that returns a future.
    pub fn future<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + 'static,
        Fut: Future<Output = Result<Value>> + 'static,
    {
        Self {
            name: name.into(),
            body: FunctionBody::Async(Rc::new(move |args| f(args).boxed_local())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, args: Vec<Value>) -> Invocation {
        match &self.body {
            FunctionBody::Sync(f) => Invocation::Ready(f(args)),
            FunctionBody::Async(f) => Invocation::Pending(f(args)),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&&*self.name).finish()
    }
}

type CpsBody = Rc<dyn Fn(Vec<Value>, &Task, Completion)>;

/// A continuation-passing function: it receives a [`Completion`] and must
/// complete it exactly once, now or later.
#[derive(Clone)]
pub struct CpsFunction {
    name: Rc<str>,
    body: CpsBody,
}

impl CpsFunction {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(Vec<Value>, &Task, Completion) + 'static,
    {
        Self {
            name: name.into(),
            body: Rc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self, args: Vec<Value>, task: &Task, done: Completion) {
        (self.body)(args, task, done)
    }
}

impl fmt::Debug for CpsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CpsFunction").field(&&*self.name).finish()
    }
}

/// Projection applied to the I/O backend's state by `select`.
#[derive(Clone)]
pub struct Selector {
    name: Rc<str>,
    body: Rc<dyn Fn(&Value) -> Value>,
}

impl Selector {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Value) -> Value + 'static,
    {
        Self {
            name: name.into(),
            body: Rc::new(f),
        }
    }

    /// Select the field `key` of a map state, or null.
    pub fn field(key: &str) -> Self {
        let field = key.to_string();
        Self::new(key, move |state| state.get(&field).cloned().unwrap_or_default())
    }

    pub fn apply(&self, state: &Value) -> Value {
        (self.body)(state)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&&*self.name).finish()
    }
}

/// The members of a `parallel` or `race`: positional or labeled.
#[derive(Clone, Debug)]
pub enum EffectSet {
    List(Vec<Effect>),
    Labeled(BTreeMap<String, Effect>),
}

impl EffectSet {
    pub fn len(&self) -> usize {
        match self {
            EffectSet::List(effects) => effects.len(),
            EffectSet::Labeled(effects) => effects.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Split into labels (for labeled sets) and effects in iteration order.
    pub(crate) fn into_parts(self) -> (Option<Vec<String>>, Vec<Effect>) {
        match self {
            EffectSet::List(effects) => (None, effects),
            EffectSet::Labeled(effects) => {
                let (labels, effects) = effects.into_iter().unzip();
                (Some(labels), effects)
            }
        }
    }
}

impl From<Vec<Effect>> for EffectSet {
    fn from(effects: Vec<Effect>) -> Self {
        EffectSet::List(effects)
    }
}

impl From<BTreeMap<String, Effect>> for EffectSet {
    fn from(effects: BTreeMap<String, Effect>) -> Self {
        EffectSet::Labeled(effects)
    }
}

/// Which actions a `take_action` accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionPattern {
    Any,
    Type(String),
}

impl ActionPattern {
    /// `""` and `"*"` match every action.
    pub fn parse(pattern: &str) -> Self {
        match pattern {
            "" | "*" => ActionPattern::Any,
            other => ActionPattern::Type(other.to_string()),
        }
    }

    pub fn matches(&self, action: &Value) -> bool {
        match self {
            ActionPattern::Any => true,
            ActionPattern::Type(expected) => action.action_type() == Some(expected.as_str()),
        }
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPattern::Any => f.write_str("*"),
            ActionPattern::Type(t) => f.write_str(t),
        }
    }
}

/// An effect descriptor.
///
/// Use the associated constructors (`Effect::call`, `Effect::fork`, ...)
/// rather than the variants directly; they take care of the small
/// conversions (wrapping streams, parsing action patterns).
#[derive(Clone, Debug)]
pub enum Effect {
    Call { func: Function, args: Vec<Value> },
    SafeCall { func: Function, args: Vec<Value> },
    Cps { func: CpsFunction, args: Vec<Value> },
    Delay { duration: Duration, value: Value },
    Fork { process: ProcessRef, args: Vec<Value> },
    Spawn { process: ProcessRef, args: Vec<Value> },
    CallProc { process: ProcessRef, args: Vec<Value> },
    Join { task: Task },
    /// `None` cancels the yielding task itself.
    Cancel { task: Option<Task> },
    Cancelled,
    Parallel { effects: EffectSet },
    Race { effects: EffectSet },
    PutAction { action: Value },
    TakeAction { pattern: ActionPattern },
    PutStream { stream: Rc<dyn DataStream>, data: Value },
    TakeStream { stream: Rc<dyn DataStream> },
    PutEvent { emitter: Rc<dyn Emitter>, event: String, data: Value },
    TakeEvent { emitter: Rc<dyn Emitter>, event: String },
    PutChannel { channel: Channel, message: Value },
    TakeChannel { channel: Channel },
    GetContext,
    SetContext { partial: BTreeMap<String, Value> },
    /// `None` selects the whole state.
    Select { selector: Option<Selector> },
    Custom { kind: String, payload: Value },
}

impl Effect {
    pub fn kind(&self) -> EffectKind {
        match self {
            Effect::Call { .. } => EffectKind::Call,
            Effect::SafeCall { .. } => EffectKind::SafeCall,
            Effect::Cps { .. } => EffectKind::Cps,
            Effect::Delay { .. } => EffectKind::Delay,
            Effect::Fork { .. } => EffectKind::Fork,
            Effect::Spawn { .. } => EffectKind::Spawn,
            Effect::CallProc { .. } => EffectKind::CallProc,
            Effect::Join { .. } => EffectKind::Join,
            Effect::Cancel { .. } => EffectKind::Cancel,
            Effect::Cancelled => EffectKind::Cancelled,
            Effect::Parallel { .. } => EffectKind::Parallel,
            Effect::Race { .. } => EffectKind::Race,
            Effect::PutAction { .. } => EffectKind::PutAction,
            Effect::TakeAction { .. } => EffectKind::TakeAction,
            Effect::PutStream { .. } => EffectKind::PutStream,
            Effect::TakeStream { .. } => EffectKind::TakeStream,
            Effect::PutEvent { .. } => EffectKind::PutEvent,
            Effect::TakeEvent { .. } => EffectKind::TakeEvent,
            Effect::PutChannel { .. } => EffectKind::PutChannel,
            Effect::TakeChannel { .. } => EffectKind::TakeChannel,
            Effect::GetContext => EffectKind::GetContext,
            Effect::SetContext { .. } => EffectKind::SetContext,
            Effect::Select { .. } => EffectKind::Select,
            Effect::Custom { kind, .. } => EffectKind::Custom(kind.clone()),
        }
    }

    pub fn call(func: Function, args: Vec<Value>) -> Self {
        Effect::Call { func, args }
    }

    /// Like `call`, but resumes with `[error, value]` instead of failing.
    pub fn safe_call(func: Function, args: Vec<Value>) -> Self {
        Effect::SafeCall { func, args }
    }

    pub fn cps(func: CpsFunction, args: Vec<Value>) -> Self {
        Effect::Cps { func, args }
    }

    pub fn delay(duration: Duration, value: impl Into<Value>) -> Self {
        Effect::Delay {
            duration,
            value: value.into(),
        }
    }

    pub fn fork(process: &ProcessRef, args: Vec<Value>) -> Self {
        Effect::Fork {
            process: process.clone(),
            args,
        }
    }

    pub fn spawn(process: &ProcessRef, args: Vec<Value>) -> Self {
        Effect::Spawn {
            process: process.clone(),
            args,
        }
    }

    pub fn call_proc(process: &ProcessRef, args: Vec<Value>) -> Self {
        Effect::CallProc {
            process: process.clone(),
            args,
        }
    }

    pub fn join(task: &Task) -> Self {
        Effect::Join { task: task.clone() }
    }

    pub fn cancel(task: &Task) -> Self {
        Effect::Cancel {
            task: Some(task.clone()),
        }
    }

    pub fn cancel_self() -> Self {
        Effect::Cancel { task: None }
    }

    pub fn cancelled() -> Self {
        Effect::Cancelled
    }

    pub fn parallel(effects: impl Into<EffectSet>) -> Self {
        Effect::Parallel {
            effects: effects.into(),
        }
    }

    pub fn race(effects: impl Into<EffectSet>) -> Self {
        Effect::Race {
            effects: effects.into(),
        }
    }

    pub fn put_action(action: impl Into<Value>) -> Self {
        Effect::PutAction {
            action: action.into(),
        }
    }

    /// Wait for the next action whose `type` is `pattern` (`""`/`"*"` for any).
    pub fn take_action(pattern: &str) -> Self {
        Effect::TakeAction {
            pattern: ActionPattern::parse(pattern),
        }
    }

    pub fn put_stream(stream: impl DataStream + 'static, data: impl Into<Value>) -> Self {
        Effect::PutStream {
            stream: Rc::new(stream),
            data: data.into(),
        }
    }

    pub fn take_stream(stream: impl DataStream + 'static) -> Self {
        Effect::TakeStream {
            stream: Rc::new(stream),
        }
    }

    pub fn put_event(
        emitter: impl Emitter + 'static,
        event: &str,
        data: impl Into<Value>,
    ) -> Self {
        Effect::PutEvent {
            emitter: Rc::new(emitter),
            event: event.to_string(),
            data: data.into(),
        }
    }

    pub fn take_event(emitter: impl Emitter + 'static, event: &str) -> Self {
        Effect::TakeEvent {
            emitter: Rc::new(emitter),
            event: event.to_string(),
        }
    }

    pub fn put_channel(channel: &Channel, message: impl Into<Value>) -> Self {
        Effect::PutChannel {
            channel: channel.clone(),
            message: message.into(),
        }
    }

    pub fn take_channel(channel: &Channel) -> Self {
        Effect::TakeChannel {
            channel: channel.clone(),
        }
    }

    pub fn get_context() -> Self {
        Effect::GetContext
    }

    pub fn set_context(partial: BTreeMap<String, Value>) -> Self {
        Effect::SetContext { partial }
    }

    pub fn select(selector: Selector) -> Self {
        Effect::Select {
            selector: Some(selector),
        }
    }

    pub fn select_state() -> Self {
        Effect::Select { selector: None }
    }

    /// A descriptor for a host-registered kind.
    pub fn custom(kind: &str, payload: impl Into<Value>) -> Self {
        Effect::Custom {
            kind: kind.to_string(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection_literals::btree;
    use serde_json::json;

    #[test]
    fn kinds_match_constructors() {
        assert_eq!(Effect::cancelled().kind(), EffectKind::Cancelled);
        assert_eq!(Effect::take_action("PING").kind(), EffectKind::TakeAction);
        assert_eq!(
            Effect::delay(Duration::from_millis(5), 1).kind(),
            EffectKind::Delay
        );
        assert_eq!(
            Effect::custom("teleport", Value::Null).kind(),
            EffectKind::Custom("teleport".to_string())
        );
    }

    #[test]
    fn kind_names() {
        assert_eq!(EffectKind::SafeCall.to_string(), "safe_call");
        assert_eq!(EffectKind::Custom("log".to_string()).to_string(), "log");
        assert_eq!(EffectKind::builtin().len(), 23);
    }

    #[test]
    fn action_patterns() {
        let ping = Value::from(json!({"type": "PING"}));
        let untyped = Value::from(json!({"payload": 1}));

        assert_eq!(ActionPattern::parse(""), ActionPattern::Any);
        assert_eq!(ActionPattern::parse("*"), ActionPattern::Any);
        assert!(ActionPattern::Any.matches(&untyped));
        assert!(ActionPattern::parse("PING").matches(&ping));
        assert!(!ActionPattern::parse("PONG").matches(&ping));
        assert!(!ActionPattern::parse("PING").matches(&untyped));
    }

    #[test]
    fn labeled_sets_split_in_key_order() {
        let set = EffectSet::from(btree! {
            "b".to_string() => Effect::cancelled(),
            "a".to_string() => Effect::get_context(),
        });
        assert_eq!(set.len(), 2);

        let (labels, effects) = set.into_parts();
        assert_eq!(labels, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(effects[0].kind(), EffectKind::GetContext);
    }

    #[test]
    fn descriptors_are_inspectable() {
        let f = Function::sync("double", |args| {
            Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
        });
        let rendered = format!("{:?}", Effect::call(f, vec![Value::from(2)]));
        assert!(rendered.contains("double"));
        assert!(rendered.contains("Integer(2)"));
    }

    #[test]
    fn field_selector() {
        let state = Value::from(json!({"count": 3}));
        assert_eq!(Selector::field("count").apply(&state), Value::from(3));
        assert_eq!(Selector::field("missing").apply(&state), Value::Null);
    }
}
