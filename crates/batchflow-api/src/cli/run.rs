//! `bflow run`: execute a demonstration batch and report its lifecycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use console::style;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::TryRecvError;

use batchflow_core::{ActionRegistry, ActionResult, Invoker, Task, Workflow};
use batchflow_types::config::EngineConfig;
use batchflow_types::event::{TaskEvent, WorkflowEvent};
use batchflow_types::response::WorkflowResponse;
use batchflow_types::task::{Caller, Metadata};

use super::Mode;
use super::demo::{ACTION_NAME, DataProcessingAction};

pub struct RunOptions {
    pub mode: Mode,
    pub tasks: u32,
    pub polls: u32,
    pub interval_ms: Option<u64>,
    pub json: bool,
    pub quiet: bool,
}

/// Where an event came from.
struct Source {
    kind: &'static str,
    id: String,
}

/// Prints events as they are drained from the entity channels.
struct EventPrinter {
    json: bool,
    quiet: bool,
    workflow: (Source, Receiver<WorkflowEvent>),
    tasks: Vec<(Source, Receiver<TaskEvent>)>,
}

impl EventPrinter {
    fn attach(workflow: &Workflow, json: bool, quiet: bool) -> Self {
        let source = |kind, id: &str| Source {
            kind,
            id: id.to_string(),
        };
        Self {
            json,
            quiet,
            workflow: (source("workflow", workflow.id()), workflow.events().subscribe()),
            tasks: workflow
                .tasks()
                .iter()
                .map(|task| (source("task", task.id()), task.events().subscribe()))
                .collect(),
        }
    }

    fn drain(&mut self) {
        let (json, quiet) = (self.json, self.quiet);
        for (source, rx) in &mut self.tasks {
            drain_one(source, rx, json, quiet);
        }
        let (source, rx) = &mut self.workflow;
        drain_one(source, rx, json, quiet);
    }
}

fn drain_one<E: Clone + Serialize>(source: &Source, rx: &mut Receiver<E>, json: bool, quiet: bool) {
    loop {
        match rx.try_recv() {
            Ok(event) => print_event(source, &event, json, quiet),
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(source = source.kind, id = %source.id, skipped, "event receiver lagged");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn print_event<E: Serialize>(source: &Source, event: &E, json: bool, quiet: bool) {
    if quiet {
        return;
    }
    let value = serde_json::to_value(event).unwrap_or_default();
    if json {
        println!(
            "{}",
            json!({ "source": source.kind, "id": source.id, "event": value })
        );
        return;
    }

    let kind = value.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
    let detail = match kind {
        "progress" => value
            .get("percent")
            .map(|p| format!(" {p}%"))
            .unwrap_or_default(),
        "failure" => value
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .map(|m| format!(" {}", style(m).red()))
            .unwrap_or_default(),
        _ => String::new(),
    };
    let label = match kind {
        "start" => style(kind).cyan(),
        "complete" => style(kind).green(),
        "failure" => style(kind).red(),
        _ => style(kind).dim(),
    };
    println!(
        "  {:<8} {} {label}{detail}",
        style(source.kind).dim(),
        style(&source.id).bold()
    );
}

/// Build the demo tasks, each carrying the configured retry settings and
/// event buffer size.
fn build_tasks(
    config: &EngineConfig,
    options: &RunOptions,
    action: &Arc<DataProcessingAction>,
) -> Result<Vec<Task>> {
    (1..=options.tasks)
        .map(|n| {
            let builder = match options.mode {
                Mode::Jit => {
                    let action = Arc::clone(action);
                    Task::inline(move |task, _| {
                        let response = action.step(task, task.payload());
                        Box::pin(async move { ActionResult::Ok(response) })
                    })
                }
                Mode::Deferred => Task::registered(ACTION_NAME),
            };
            builder
                .id(format!("T_{n}"))
                .name(format!("batch-{n}"))
                .order(n)
                .retry(config.default_retry.clone())
                .event_capacity(config.event_capacity)
                .payload(json!({ "rows": u64::from(n) * 1000 }))
                .build()
                .with_context(|| format!("failed to build task T_{n}"))
        })
        .collect()
}

/// Run the demonstration batch in the requested mode.
pub async fn run_batch(config: &EngineConfig, options: RunOptions) -> Result<()> {
    let interval = options
        .interval_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or_else(|| config.heartbeat_interval());
    let invoker = Invoker::with_interval(interval);

    let registry = ActionRegistry::new();
    registry
        .register(DataProcessingAction::new(options.polls), &json!({ "polls": options.polls }))
        .await
        .context("failed to register the data-processing action")?;
    let inline_action = Arc::new(DataProcessingAction::new(options.polls));

    let workflow = Workflow::standard_builder(&invoker)
        .id("W_DEMO")
        .name("demo-batch")
        .jit(options.mode == Mode::Jit)
        .container(registry)
        .event_capacity(config.event_capacity)
        .metadata(Metadata {
            caller: Caller {
                name: "bflow".to_string(),
                address: "localhost".to_string(),
            },
            additional_info: None,
        })
        .tasks(build_tasks(config, &options, &inline_action)?)
        .build()
        .context("failed to build workflow")?;
    let workflow = Arc::new(workflow);

    let mut printer = EventPrinter::attach(&workflow, options.json, options.quiet);
    if !options.json && !options.quiet {
        println!();
        println!(
            "  {} Running {} with {} task(s) in {} mode",
            style("*").green().bold(),
            style(workflow.name()).cyan(),
            workflow.tasks().len(),
            options.mode.as_str()
        );
        println!();
    }

    let started = Instant::now();
    let (rounds, last) = match options.mode {
        Mode::Jit => drive_jit(&invoker, &workflow, &mut printer, &options).await,
        Mode::Deferred => drive_deferred(&invoker, &workflow, &mut printer, interval).await,
    };
    printer.drain();

    print_summary(&workflow, &options, rounds, &last, started.elapsed());

    if !workflow.is_completed() {
        bail!(
            "workflow {} did not complete (state {})",
            workflow.id(),
            workflow.state()
        );
    }
    Ok(())
}

/// Re-run the workflow until it stops answering Pending.
async fn drive_jit(
    invoker: &Invoker,
    workflow: &Arc<Workflow>,
    printer: &mut EventPrinter,
    options: &RunOptions,
) -> (u32, WorkflowResponse) {
    // Each round advances one task by one poll.
    let max_rounds = options.tasks.saturating_mul(options.polls).saturating_add(1);
    let mut rounds = 0;
    loop {
        rounds += 1;
        let response = invoker.run(workflow).await;
        printer.drain();
        if !response.is_pending() || rounds >= max_rounds {
            return (rounds, response);
        }
    }
}

/// Enqueue the workflow and wait for the heartbeat to drain the pool.
async fn drive_deferred(
    invoker: &Invoker,
    workflow: &Arc<Workflow>,
    printer: &mut EventPrinter,
    interval: Duration,
) -> (u32, WorkflowResponse) {
    let accepted = invoker.run(workflow).await;
    if !accepted.is_success() {
        return (0, accepted);
    }

    let pool = invoker.pool();
    let mut ticker = tokio::time::interval(interval);
    let mut ticks = 0;
    loop {
        tokio::select! {
            _ = pool.wait_idle() => break,
            _ = ticker.tick() => {
                ticks += 1;
                printer.drain();
            }
        }
    }
    (ticks, accepted)
}

fn print_summary(
    workflow: &Workflow,
    options: &RunOptions,
    rounds: u32,
    last: &WorkflowResponse,
    elapsed: Duration,
) {
    let completed = workflow.tasks().iter().filter(|task| task.is_completed()).count();

    if options.json {
        let summary = json!({
            "workflow_id": workflow.id(),
            "mode": options.mode.as_str(),
            "state": workflow.state(),
            "tasks": workflow.tasks().len(),
            "tasks_completed": completed,
            "rounds": rounds,
            "last_response": last,
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        println!("{summary}");
        return;
    }
    if options.quiet {
        return;
    }

    let state = if workflow.is_completed() {
        style(workflow.state().to_string()).green()
    } else {
        style(workflow.state().to_string()).red()
    };
    println!();
    println!("  {}", style("── Summary ──").dim());
    println!("  Workflow: {} ({})", style(workflow.name()).cyan(), workflow.id());
    println!("  State:    {state}");
    println!("  Tasks:    {}/{} completed", completed, workflow.tasks().len());
    let unit = match options.mode {
        Mode::Jit => "Runs",
        Mode::Deferred => "Ticks",
    };
    println!("  {unit:<9} {rounds}");
    println!("  Elapsed:  {} ms", elapsed.as_millis());
    if let Some(err) = last.error.as_ref().filter(|_| last.is_failure()) {
        println!("  Error:    {}", style(err).red());
    }
    println!();
}
