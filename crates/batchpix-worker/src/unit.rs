//! Worker units.
//!
//! A worker unit is a tokio task that owns the receiving end of a one-slot
//! task channel. It runs one task at a time to completion and reports exactly
//! one result per task on the pool's event channel. Handled failures (fetch,
//! transcode, output write) become failure results and the unit keeps going.
//! A panic terminates the unit; its supervisor reports the exit so the pool
//! can fail the in-flight task and start a replacement.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, Instrument};

use batchpix_media::{Fetcher, MediaError, MediaResult, Transcoder};
use batchpix_models::{Task, TaskOutput, TaskResult};

use crate::logging::TaskLogger;
use crate::metrics;

/// Messages from worker units to the pool.
#[derive(Debug)]
pub(crate) enum UnitEvent {
    /// A task finished, successfully or with a handled failure.
    Report {
        slot_id: usize,
        generation: u64,
        result: TaskResult,
    },
    /// The unit terminated without being asked to.
    Exited {
        slot_id: usize,
        generation: u64,
        reason: String,
    },
}

/// Immutable capabilities shared by every unit of a pool.
#[derive(Clone)]
pub(crate) struct UnitContext {
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    output_dir: PathBuf,
    fetch_timeout: Duration,
}

impl UnitContext {
    pub(crate) fn new(
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
        output_dir: PathBuf,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            transcoder,
            output_dir,
            fetch_timeout,
        }
    }
}

/// The pool's handle on a running unit.
pub(crate) struct UnitHandle {
    tasks: mpsc::Sender<Task>,
    abort: AbortHandle,
}

impl UnitHandle {
    /// Hand a task to the unit. Gives the task back if the unit is gone or busy.
    pub(crate) fn dispatch(&self, task: Task) -> Result<(), Task> {
        self.tasks.try_send(task).map_err(|e| e.into_inner())
    }

    /// Stop the unit. Its supervisor stays silent for cancelled units.
    pub(crate) fn terminate(&self) {
        self.abort.abort();
    }
}

/// Start a unit for `slot_id` and a supervisor that reports its exit.
pub(crate) fn spawn_unit(
    slot_id: usize,
    generation: u64,
    ctx: UnitContext,
    events: mpsc::UnboundedSender<UnitEvent>,
) -> UnitHandle {
    let (tasks_tx, tasks_rx) = mpsc::channel(1);

    let unit = WorkerUnit {
        slot_id,
        generation,
        ctx,
        tasks: tasks_rx,
        events: events.clone(),
    };
    let join = tokio::spawn(unit.run());
    let abort = join.abort_handle();

    tokio::spawn(async move {
        let reason = match join.await {
            Ok(()) => "worker unit stopped unexpectedly".to_string(),
            Err(e) if e.is_cancelled() => return,
            Err(e) if e.is_panic() => {
                format!("worker unit panicked: {}", panic_message(&*e.into_panic()))
            }
            Err(e) => format!("worker unit failed: {}", e),
        };
        let _ = events.send(UnitEvent::Exited {
            slot_id,
            generation,
            reason,
        });
    });

    UnitHandle {
        tasks: tasks_tx,
        abort,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

struct WorkerUnit {
    slot_id: usize,
    generation: u64,
    ctx: UnitContext,
    tasks: mpsc::Receiver<Task>,
    events: mpsc::UnboundedSender<UnitEvent>,
}

impl WorkerUnit {
    async fn run(mut self) {
        debug!(
            slot_id = self.slot_id,
            generation = self.generation,
            "Worker unit started"
        );

        while let Some(task) = self.tasks.recv().await {
            let logger = TaskLogger::new(&task.task_id, self.slot_id);
            let span = logger.create_span();
            let result = execute(&self.ctx, task, &logger).instrument(span).await;

            let report = UnitEvent::Report {
                slot_id: self.slot_id,
                generation: self.generation,
                result,
            };
            if self.events.send(report).is_err() {
                // Pool is gone.
                break;
            }
        }
    }
}

/// Run one task and turn every handled error into a failure result.
async fn execute(ctx: &UnitContext, task: Task, logger: &TaskLogger) -> TaskResult {
    logger.log_start(&task.source_ref);
    let started = Instant::now();

    match process(ctx, &task, logger).await {
        Ok(output) => {
            logger.log_completion(&output.output_ref, output.input_bytes, output.output_bytes);
            metrics::record_task_completed("success", started.elapsed().as_secs_f64());
            TaskResult::success(task.task_id, output)
        }
        Err(e) => {
            let kind = e.failure_kind();
            logger.log_failure(&e.to_string());
            metrics::record_task_completed(kind.as_str(), started.elapsed().as_secs_f64());
            TaskResult::failure(task.task_id, kind, e.to_string())
        }
    }
}

/// Fetch, transcode, write.
async fn process(ctx: &UnitContext, task: &Task, logger: &TaskLogger) -> MediaResult<TaskOutput> {
    let input = match tokio::time::timeout(ctx.fetch_timeout, ctx.fetcher.fetch(&task.source_ref)).await {
        Ok(fetched) => fetched?,
        Err(_) => return Err(MediaError::Timeout(ctx.fetch_timeout)),
    };
    let input_bytes = input.len() as u64;

    let transcoder = Arc::clone(&ctx.transcoder);
    let output = match tokio::task::spawn_blocking(move || transcoder.transcode(&input)).await {
        Ok(transcoded) => transcoded?,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            logger.log_crash(&panic_message(&*payload));
            std::panic::resume_unwind(payload)
        }
        Err(e) => return Err(MediaError::internal(format!("transcode task failed: {}", e))),
    };

    let path = ctx
        .output_dir
        .join(output_file_name(task, ctx.transcoder.extension()));
    tokio::fs::write(&path, &output).await?;

    Ok(TaskOutput::new(
        path.display().to_string(),
        input_bytes,
        output.len() as u64,
    ))
}

/// `<hint>_<task_id>.<ext>`, with anything outside `[A-Za-z0-9_-]` in the
/// hint replaced by `_`. Task IDs are unique among in-flight tasks, so two
/// units never write the same file, and the name never leaves `output_dir`.
fn output_file_name(task: &Task, extension: &str) -> String {
    let hint: String = task
        .destination_hint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if hint.is_empty() {
        format!("{}.{}", task.task_id, extension)
    } else {
        format!("{}_{}.{}", hint, task.task_id, extension)
    }
}
