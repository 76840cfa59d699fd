//! Fixed-size worker pool.
//!
//! All pool state (slots, the FIFO queue, pending replies) is owned by a single
//! actor task. Callers talk to it through [`WorkerPool`], which only sends
//! commands; worker units talk to it through their event channel. Every state
//! change happens while the actor handles one message, so no locks are needed.
//!
//! Results are matched to callers by task ID. Units finish in any order, so
//! the head of the queue says nothing about which task just completed.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use batchpix_media::{Fetcher, Transcoder};
use batchpix_models::{FailureKind, Task, TaskId, TaskResult};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::unit::{spawn_unit, UnitContext, UnitEvent, UnitHandle};

type Reply = oneshot::Sender<WorkerResult<TaskResult>>;

enum PoolCommand {
    Submit { task: Task, reply: Reply },
    Stats { reply: oneshot::Sender<PoolStats> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of slots; constant for the pool's lifetime
    pub size: usize,
    pub idle: usize,
    pub busy: usize,
    /// Tasks waiting for a free slot
    pub queued: usize,
    /// Worker units replaced after a crash
    pub replacements: u64,
}

/// Occupancy of a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Idle,
    Busy(TaskId),
}

struct WorkerSlot {
    /// Stable across replacements
    slot_id: usize,
    /// Incremented each time the unit is replaced
    generation: u64,
    handle: UnitHandle,
    state: SlotState,
}

impl WorkerSlot {
    fn is_idle(&self) -> bool {
        self.state == SlotState::Idle
    }
}

/// Future for the result of a submitted task.
///
/// Resolves with [`WorkerError::PoolShutDown`] if the pool stops before the
/// task finishes.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    reply: oneshot::Receiver<WorkerResult<TaskResult>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }
}

impl Future for TaskHandle {
    type Output = WorkerResult<TaskResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(WorkerError::PoolShutDown),
        })
    }
}

/// Handle to a running worker pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    commands: mpsc::UnboundedSender<PoolCommand>,
    size: usize,
}

impl WorkerPool {
    /// Start a pool of `config.pool_size()` worker units, all idle.
    ///
    /// Must be called from within a tokio runtime. The pool runs until
    /// [`WorkerPool::shutdown`] is called or every handle is dropped.
    pub async fn start(
        config: &WorkerConfig,
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> WorkerResult<Self> {
        let size = config.pool_size();
        let output_dir = PathBuf::from(&config.output_dir);
        tokio::fs::create_dir_all(&output_dir).await?;

        let ctx = UnitContext::new(fetcher, transcoder, output_dir, config.fetch_timeout);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let slots = (0..size)
            .map(|slot_id| WorkerSlot {
                slot_id,
                generation: 0,
                handle: spawn_unit(slot_id, 0, ctx.clone(), events_tx.clone()),
                state: SlotState::Idle,
            })
            .collect();

        let actor = PoolActor {
            ctx,
            slots,
            queue: VecDeque::new(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
            events_tx,
            replacements: 0,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        info!(
            size,
            max_workers = config.max_workers,
            output_dir = %config.output_dir,
            "Worker pool started"
        );

        Ok(Self {
            commands: commands_tx,
            size,
        })
    }

    /// Number of worker units.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue a task. Returns immediately; await the handle for the result.
    pub fn submit(&self, task: Task) -> TaskHandle {
        let (reply, rx) = oneshot::channel();
        let task_id = task.task_id.clone();

        // A closed channel drops `reply`, and the handle resolves to PoolShutDown.
        if self.commands.send(PoolCommand::Submit { task, reply }).is_ok() {
            metrics::record_task_submitted();
        }

        TaskHandle { task_id, reply: rx }
    }

    /// Current occupancy.
    pub async fn stats(&self) -> WorkerResult<PoolStats> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(PoolCommand::Stats { reply })
            .map_err(|_| WorkerError::PoolShutDown)?;
        rx.await.map_err(|_| WorkerError::PoolShutDown)
    }

    /// Terminate every worker unit and drop queued tasks.
    ///
    /// Handles of unfinished tasks resolve to [`WorkerError::PoolShutDown`].
    /// Calling this on a stopped pool is a no-op.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(PoolCommand::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

struct PoolActor {
    ctx: UnitContext,
    slots: Vec<WorkerSlot>,
    queue: VecDeque<Task>,
    /// Reply channel for every queued or in-flight task
    pending: HashMap<TaskId, Reply>,
    /// Slot index of every dispatched task
    in_flight: HashMap<TaskId, usize>,
    events_tx: mpsc::UnboundedSender<UnitEvent>,
    replacements: u64,
}

impl PoolActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<PoolCommand>,
        mut events: mpsc::UnboundedReceiver<UnitEvent>,
    ) {
        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event),
                command = commands.recv() => match command {
                    Some(PoolCommand::Submit { task, reply }) => self.submit(task, reply),
                    Some(PoolCommand::Stats { reply }) => {
                        let _ = reply.send(self.stats());
                    }
                    Some(PoolCommand::Shutdown { reply }) => {
                        self.terminate();
                        let _ = reply.send(());
                        break;
                    }
                    None => {
                        self.terminate();
                        break;
                    }
                },
            }
        }

        info!("Worker pool stopped");
    }

    fn submit(&mut self, task: Task, reply: Reply) {
        if self.pending.contains_key(&task.task_id) {
            warn!(task_id = %task.task_id, "Rejected duplicate task ID");
            let _ = reply.send(Err(WorkerError::DuplicateTask(task.task_id)));
            return;
        }

        debug!(task_id = %task.task_id, queued = self.queue.len(), "Task queued");
        self.pending.insert(task.task_id.clone(), reply);
        self.queue.push_back(task);
        self.dispatch();
    }

    /// Hand queued tasks to idle slots in FIFO order.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(index) = self.slots.iter().position(WorkerSlot::is_idle) else {
                break;
            };
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            self.assign(index, task);
        }

        metrics::set_queue_depth(self.queue.len());
        metrics::set_busy_workers(self.slots.iter().filter(|s| !s.is_idle()).count());
    }

    fn assign(&mut self, index: usize, task: Task) {
        let task_id = task.task_id.clone();

        match self.slots[index].handle.dispatch(task) {
            Ok(()) => {
                debug!(task_id = %task_id, slot_id = index, "Task dispatched");
                self.slots[index].state = SlotState::Busy(task_id.clone());
                self.in_flight.insert(task_id, index);
            }
            Err(task) => {
                // The unit died and its exit notice is still in the event channel.
                self.queue.push_front(task);
                self.replace(index, "task channel closed");
            }
        }
    }

    fn handle_event(&mut self, event: UnitEvent) {
        match event {
            UnitEvent::Report {
                slot_id,
                generation,
                result,
            } => self.complete(slot_id, generation, result),
            UnitEvent::Exited {
                slot_id,
                generation,
                reason,
            } => self.crashed(slot_id, generation, &reason),
        }
    }

    fn complete(&mut self, slot_id: usize, generation: u64, result: TaskResult) {
        let task_id = result.task_id.clone();

        let Some(index) = self.in_flight.remove(&task_id) else {
            warn!(task_id = %task_id, slot_id, "Result for unknown task dropped");
            return;
        };
        if index != slot_id {
            warn!(
                task_id = %task_id,
                expected_slot = index,
                reporting_slot = slot_id,
                generation,
                "Result reported by unexpected slot"
            );
        }

        if let Some(reply) = self.pending.remove(&task_id) {
            let _ = reply.send(Ok(result));
        }

        let slot = &mut self.slots[index];
        if slot.state == SlotState::Busy(task_id) {
            slot.state = SlotState::Idle;
        }

        self.dispatch();
    }

    fn crashed(&mut self, slot_id: usize, generation: u64, reason: &str) {
        let Some(slot) = self.slots.get(slot_id) else {
            return;
        };
        if slot.generation != generation {
            debug!(slot_id, generation, "Ignoring exit of replaced worker unit");
            return;
        }

        error!(slot_id, generation, reason, "Worker unit crashed");

        if let SlotState::Busy(task_id) = slot.state.clone() {
            self.in_flight.remove(&task_id);
            if let Some(reply) = self.pending.remove(&task_id) {
                let result = TaskResult::failure(
                    task_id,
                    FailureKind::WorkerCrash,
                    format!("worker on slot {} crashed: {}", slot_id, reason),
                );
                let _ = reply.send(Ok(result));
            }
        }

        self.replace(slot_id, reason);
        self.dispatch();
    }

    /// Start a fresh unit under the same slot ID.
    fn replace(&mut self, index: usize, reason: &str) {
        let slot = &mut self.slots[index];
        slot.handle.terminate();
        slot.generation += 1;
        slot.handle = spawn_unit(
            slot.slot_id,
            slot.generation,
            self.ctx.clone(),
            self.events_tx.clone(),
        );
        slot.state = SlotState::Idle;

        warn!(
            slot_id = slot.slot_id,
            generation = slot.generation,
            reason,
            "Replaced worker unit"
        );
        metrics::record_worker_replaced(slot.slot_id);
        self.replacements += 1;
    }

    fn stats(&self) -> PoolStats {
        let busy = self.slots.iter().filter(|s| !s.is_idle()).count();
        PoolStats {
            size: self.slots.len(),
            idle: self.slots.len() - busy,
            busy,
            queued: self.queue.len(),
            replacements: self.replacements,
        }
    }

    fn terminate(&mut self) {
        for slot in &self.slots {
            slot.handle.terminate();
        }

        let dropped = self.queue.len() + self.in_flight.len();
        if dropped > 0 {
            warn!(dropped, "Dropping unfinished tasks on shutdown");
        }

        // Dropping the reply senders resolves every outstanding handle.
        self.queue.clear();
        self.pending.clear();
        self.in_flight.clear();
        self.slots.clear();
    }
}
