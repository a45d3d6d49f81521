//! Unbuffered rendezvous channel between processes.
//!
//! A [`Channel`] pairs puts with takes in FIFO order:
//!
//! - **put** hands the value to the oldest waiting taker, or queues it
//! - **take** receives the oldest queued value, or waits for the next put
//!
//! At most one of the two queues is non-empty at any time. There is no
//! capacity limit and no close operation.
//!
//! # Example
//!
//! ```ignore
//! let channel = Channel::new();
//!
//! // In a consumer process
//! let message = co.perform(Effect::take_channel(&channel)).await?;
//!
//! // In a producer process, or from the host
//! co.perform(Effect::put_channel(&channel, "hello")).await?;
//! channel.put(Value::from("hello"));
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::completion::Completion;
use crate::value::Value;

#[derive(Default)]
struct ChannelState {
    values: VecDeque<Value>,
    takers: VecDeque<Completion>,
}

/// Shared handle to a channel. Clones refer to the same queues.
#[derive(Clone, Default)]
pub struct Channel {
    state: Rc<RefCell<ChannelState>>,
}

impl Channel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `value` to the oldest live taker, or queue it.
    ///
    /// Takers whose task was cancelled (or whose `race` was lost) are
    /// dropped from the queue without receiving anything.
    pub fn put(&self, value: Value) {
        loop {
            let taker = self.state.borrow_mut().takers.pop_front();
            match taker {
                Some(taker) if taker.is_abandoned() => continue,
                Some(taker) => {
                    taker.succeed(value);
                    return;
                }
                None => {
                    self.state.borrow_mut().values.push_back(value);
                    return;
                }
            }
        }
    }

    /// Receive the next value through `receiver`.
    pub fn take(&self, receiver: impl FnOnce(Value) + 'static) {
        self.take_with(Completion::new(move |result| {
            if let Ok(value) = result {
                receiver(value);
            }
        }));
    }

    pub(crate) fn take_with(&self, taker: Completion) {
        let value = {
            let mut state = self.state.borrow_mut();
            state.takers.retain(|waiting| !waiting.is_abandoned());
            let value = state.values.pop_front();
            if value.is_none() {
                state.takers.push_back(taker.clone());
            }
            value
        };
        match value {
            Some(value) => {
                taker.succeed(value);
            }
            None => {
                let state: Weak<RefCell<ChannelState>> = Rc::downgrade(&self.state);
                taker.on_release(move || {
                    if let Some(state) = state.upgrade() {
                        state
                            .borrow_mut()
                            .takers
                            .retain(|waiting| !waiting.is_abandoned());
                    }
                });
            }
        }
    }

    /// Number of queued values.
    pub fn len(&self) -> usize {
        self.state.borrow().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().values.is_empty()
    }

    /// Number of registered takers still waiting for a value.
    pub fn pending_takers(&self) -> usize {
        self.state.borrow().takers.len()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Channel")
            .field("values", &state.values.len())
            .field("takers", &state.takers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collector() -> (Rc<RefCell<Vec<Value>>>, impl Fn() -> Box<dyn FnOnce(Value)>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let make = move || {
            let sink = sink.clone();
            Box::new(move |v| sink.borrow_mut().push(v)) as Box<dyn FnOnce(Value)>
        };
        (seen, make)
    }

    #[test]
    fn put_then_take() {
        let channel = Channel::new();
        let (seen, receiver) = collector();

        channel.put(Value::from("a"));
        channel.put(Value::from("b"));
        assert_eq!(channel.len(), 2);

        channel.take(receiver());
        assert_eq!(*seen.borrow(), vec![Value::from("a")]);
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn take_then_put_in_fifo_order() {
        let channel = Channel::new();
        let first = Rc::new(RefCell::new(None));
        let second = Rc::new(RefCell::new(None));

        let slot = first.clone();
        channel.take(move |v| *slot.borrow_mut() = Some(v));
        let slot = second.clone();
        channel.take(move |v| *slot.borrow_mut() = Some(v));
        assert_eq!(channel.pending_takers(), 2);
        assert!(channel.is_empty());

        channel.put(Value::from(1));
        channel.put(Value::from(2));

        assert_eq!(*first.borrow(), Some(Value::from(1)));
        assert_eq!(*second.borrow(), Some(Value::from(2)));
        assert_eq!(channel.pending_takers(), 0);
        assert!(channel.is_empty());
    }

    #[test]
    fn abandoned_takers_are_skipped() {
        let channel = Channel::new();
        let (seen, receiver) = collector();

        let race = Completion::new(|_| {});
        channel.take_with(race.linked(|_| panic!("abandoned taker received a value")));
        channel.take(receiver());
        race.succeed(Value::Null);

        channel.put(Value::from("x"));
        assert_eq!(*seen.borrow(), vec![Value::from("x")]);
        assert_eq!(channel.pending_takers(), 0);
    }

    #[test]
    fn losing_takers_leave_the_queue_when_their_race_ends() {
        let channel = Channel::new();
        for _ in 0..3 {
            let race = Completion::new(|_| {});
            channel.take_with(race.linked(|_| {}));
            assert_eq!(channel.pending_takers(), 1);
            race.succeed(Value::Null);
            assert_eq!(channel.pending_takers(), 0);
        }

        channel.put(Value::from("kept"));
        assert_eq!(channel.len(), 1);
    }

    #[test]
    fn values_delivered_in_put_order() {
        let channel = Channel::new();
        let (seen, receiver) = collector();

        for i in 0..3 {
            channel.put(Value::from(i));
        }
        for _ in 0..3 {
            channel.take(receiver());
        }
        assert_eq!(
            *seen.borrow(),
            vec![Value::from(0), Value::from(1), Value::from(2)]
        );
    }
}
