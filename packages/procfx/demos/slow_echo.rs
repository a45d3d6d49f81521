//! Forked workers echoing stream input one character at a time.
//!
//! The host pushes lines into a [`MemoryStream`]; each worker takes a line
//! and hands it to a `slow_print` child process, which writes it to the
//! worker's console with a pause after every character. Cancelling the root
//! task stops both workers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use procfx::prelude::*;
use procfx::{Listener, Unsubscribe};
use tokio::task::LocalSet;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const WORKERS: usize = 2;
const CHAR_INTERVAL: Duration = Duration::from_millis(50);

/// Prints whole lines, prefixed with a label, as characters arrive.
#[derive(Clone)]
struct Console {
    label: Rc<str>,
    line: Rc<RefCell<String>>,
}

impl Console {
    fn new(label: impl Into<Rc<str>>) -> Self {
        Self {
            label: label.into(),
            line: Rc::default(),
        }
    }
}

impl DataStream for Console {
    fn write(&self, data: Value) {
        let Some(text) = data.as_str() else { return };
        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut *self.line.borrow_mut());
                println!("[{}] {line}", self.label);
            } else {
                self.line.borrow_mut().push(ch);
            }
        }
    }

    fn on_data(&self, _listener: Listener) -> Unsubscribe {
        Unsubscribe::noop()
    }
}

async fn slow_print(co: Co, out: Console, args: Vec<Value>) -> Result<Value> {
    let text = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
    for ch in text.chars() {
        co.perform(Effect::put_stream(out.clone(), ch.to_string()))
            .await?;
        co.perform(Effect::delay(CHAR_INTERVAL, Value::Null)).await?;
    }
    Ok(Value::from(text.chars().count() as i64))
}

async fn echo(co: Co, input: MemoryStream, printer: ProcessRef) -> Result<Value> {
    loop {
        let line = co.perform(Effect::take_stream(input.clone())).await?;
        co.perform(Effect::call_proc(&printer, vec![line])).await?;
    }
}

fn echo_worker(input: MemoryStream, out: Console) -> ProcessRef {
    let printer = process_fn("slow_print", move |co, args| slow_print(co, out.clone(), args));
    process_fn("echo_worker", move |co, _args| {
        echo(co, input.clone(), printer.clone())
    })
}

async fn fork_workers(co: Co, input: MemoryStream) -> Result<Value> {
    let mut workers = Vec::new();
    for n in 1..=WORKERS {
        let worker = echo_worker(input.clone(), Console::new(format!("worker-{n}")));
        let task = co.perform(Effect::fork(&worker, Vec::new())).await?;
        let task = task
            .as_task()
            .cloned()
            .ok_or_else(|| RuntimeError::process("fork did not resume with a task"))?;
        workers.push(task);
    }
    for worker in &workers {
        co.perform(Effect::join(worker)).await?;
    }
    Ok(Value::Null)
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

    let input = MemoryStream::new();
    let runtime = Runtime::builder().middleware(TracingMiddleware).build();

    LocalSet::new()
        .run_until(async move {
            let workers_input = input.clone();
            let root = runtime.start(
                process_fn("echo_fork", move |co, _args| {
                    fork_workers(co, workers_input.clone())
                }),
                Vec::new(),
            )?;

            for line in ["hello, world\n", "effects are data\n"] {
                input.push(line);
                tokio::time::sleep(CHAR_INTERVAL * 25).await;
            }

            root.cancel();
            let outcome = root.done().await;
            info!(?outcome, live_tasks = runtime.task_count(), "echo stopped");
            Ok::<(), RuntimeError>(())
        })
        .await
}
