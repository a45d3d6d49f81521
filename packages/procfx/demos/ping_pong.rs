//! Two processes playing ping-pong through store actions.
//!
//! Run with `RUST_LOG=debug cargo run --example ping_pong` to also see the
//! runtime's task logging.

use std::rc::Rc;
use std::time::Duration;

use procfx::prelude::*;
use procfx::FinalCallback;
use serde_json::json;
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ROUNDS: i64 = 3;
const PAUSE: Duration = Duration::from_millis(500);

/// Counts pings and pongs.
fn reducer(state: &Value, action: &Value) -> Value {
    let key = match action.action_type() {
        Some("PING") => "pings",
        Some("PONG") => "pongs",
        _ => return state.clone(),
    };
    let mut next = state.clone();
    let count = next.get(key).and_then(Value::as_i64).unwrap_or(0);
    next.insert(key, Value::from(count + 1));
    next
}

/// An async function call, as opposed to the `delay` effect.
fn sleep(duration: Duration) -> Effect {
    let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    Effect::call(
        Function::future("sleep", |args: Vec<Value>| async move {
            let millis = args.first().and_then(Value::as_i64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(u64::try_from(millis).unwrap_or(0))).await;
            Ok(Value::Null)
        }),
        vec![Value::from(millis)],
    )
}

async fn pong(co: Co) -> Result<Value> {
    loop {
        co.perform(Effect::take_action("PING")).await?;
        co.perform(sleep(PAUSE)).await?;
        co.perform(Effect::put_action(json!({"type": "PONG"}))).await?;
    }
}

async fn ping(co: Co, rounds: i64) -> Result<Value> {
    for round in 1..=rounds {
        co.perform(Effect::put_action(json!({"type": "PING", "round": round})))
            .await?;
        co.perform(Effect::take_action("PONG")).await?;
        info!(round, "pong received");
        co.perform(Effect::delay(PAUSE, Value::Null)).await?;
    }
    Ok(Value::from(rounds))
}

fn report(process: &'static str) -> FinalCallback {
    Box::new(move |outcome| info!(process, ?outcome, "process finished"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = Store::new(reducer, Value::map());
    let _log_actions = store.subscribe(Rc::new(|action: &Value| {
        info!(action = %action.to_json(), "action dispatched");
    }));

    let runtime = Runtime::builder()
        .io(store.clone())
        .middleware(TracingMiddleware)
        .build();

    LocalSet::new()
        .run_until(async move {
            let context = Context::new();
            let ponger = runtime.run(
                process_fn("ponger", |co, _args| pong(co)),
                context.clone(),
                Some(report("ponger")),
                Vec::new(),
            )?;
            let pinger = runtime.run(
                process_fn("pinger", |co, args: Vec<Value>| {
                    let rounds = args.first().and_then(Value::as_i64).unwrap_or(1);
                    ping(co, rounds)
                }),
                context,
                Some(report("pinger")),
                vec![Value::from(ROUNDS)],
            )?;

            pinger.done().await;
            ponger.cancel();
            info!(state = %store.state().to_json(), "final state");
            Ok::<(), RuntimeError>(())
        })
        .await
}
