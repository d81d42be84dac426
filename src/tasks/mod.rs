//! Background dag-run poller.
//!
//! Tasks sit in a durable FIFO. Each tick checks the head task once: terminal runs
//! are announced through the notification center and dropped, everything else goes
//! back to the tail.

use crate::api::{ApiClient, ApiError, ApiResult};
use crate::models::{CommandRequest, DagRun, DagRunState};
use crate::notify::NotificationCenter;
use crate::storage::{load_json, save_json, SharedStore};
use crate::timer::{Scheduler, TimerHandle};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

pub(crate) const TASKS_KEY: &str = "zetsubou_airflow_tasks";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskRecord {
    #[serde(rename = "dagID")]
    pub dag_id: String,
    #[serde(rename = "dagRunID")]
    pub run_id: String,
    pub state: DagRunState,
    #[serde(
        rename = "successMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub success_message: Option<String>,
    #[serde(
        rename = "failedMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub failed_message: Option<String>,
}

impl TaskRecord {
    pub fn new(dag_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            dag_id: dag_id.into(),
            run_id: run_id.into(),
            state: DagRunState::Queued,
            success_message: None,
            failed_message: None,
        }
    }

    pub fn with_success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn with_failed_message(mut self, message: impl Into<String>) -> Self {
        self.failed_message = Some(message.into());
        self
    }

    /// Build a record from a freshly triggered run. `None` when the backend did not
    /// report a run id.
    pub fn from_dag_run(run: &DagRun, requested_dag_id: &str) -> Option<Self> {
        let run_id = run.dag_run_id.clone()?;
        let dag_id = run
            .dag_id
            .clone()
            .unwrap_or_else(|| requested_dag_id.to_string());
        let mut record = Self::new(dag_id, run_id);
        if let Some(state) = run.state {
            record.state = state;
        }
        Some(record)
    }

    fn completion_message(&self, run: &DagRun, state: DagRunState) -> String {
        let dag_id = run.dag_id.as_deref().unwrap_or(&self.dag_id);
        let custom = match state {
            DagRunState::Success => self.success_message.as_ref(),
            _ => self.failed_message.as_ref(),
        };
        custom
            .cloned()
            .unwrap_or_else(|| format!("{} {}", dag_id, state.as_ref()))
    }
}

/// Where run status comes from.
#[allow(async_fn_in_trait)]
pub trait TaskStatusSource {
    async fn dag_run(&self, dag_id: &str, run_id: &str) -> ApiResult<DagRun>;
}

/// Starts new runs.
#[allow(async_fn_in_trait)]
pub trait TaskLauncher {
    async fn trigger(&self, dag_id: &str, request: &CommandRequest) -> ApiResult<DagRun>;
}

impl TaskStatusSource for ApiClient {
    async fn dag_run(&self, dag_id: &str, run_id: &str) -> ApiResult<DagRun> {
        self.get_dag_run(dag_id, run_id).await
    }
}

impl TaskLauncher for ApiClient {
    async fn trigger(&self, dag_id: &str, request: &CommandRequest) -> ApiResult<DagRun> {
        self.trigger_dag_run(dag_id, request).await
    }
}

/// Result of one poll step.
#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// Nothing queued.
    Empty,
    /// The previous tick is still waiting on its request.
    Busy,
    /// Still queued or running; moved to the tail.
    Pending(TaskRecord),
    /// Reached a terminal state; announced and dropped.
    Completed { task: TaskRecord, message: String },
    /// Status request failed; moved to the tail untouched.
    Retry { task: TaskRecord, error: ApiError },
}

pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

struct Inner<S> {
    source: S,
    queue: RefCell<VecDeque<TaskRecord>>,
    polling: Cell<bool>,
    store: SharedStore,
    messages: NotificationCenter,
    listeners: RefCell<Vec<Rc<dyn Fn(&[TaskRecord])>>>,
}

pub struct TaskTracker<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for TaskTracker<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct PollGuard<'a>(&'a Cell<bool>);

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<S: TaskStatusSource + 'static> TaskTracker<S> {
    /// Restores the queue persisted by a previous session.
    pub fn new(source: S, store: SharedStore, messages: NotificationCenter) -> Self {
        let queue: VecDeque<TaskRecord> =
            load_json::<Vec<TaskRecord>>(store.as_ref(), TASKS_KEY)
                .unwrap_or_default()
                .into();
        if !queue.is_empty() {
            tracing::info!(count = queue.len(), "restored tracked tasks");
        }
        Self {
            inner: Rc::new(Inner {
                source,
                queue: RefCell::new(queue),
                polling: Cell::new(false),
                store,
                messages,
                listeners: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn enqueue(&self, task: TaskRecord) {
        tracing::debug!(dag_id = %task.dag_id, run_id = %task.run_id, "track task");
        self.inner.queue.borrow_mut().push_back(task);
        self.changed();
    }

    /// Snapshot in poll order.
    pub fn pending(&self) -> Vec<TaskRecord> {
        self.inner.queue.borrow().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.borrow().is_empty()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.polling.get()
    }

    /// Check the head task once.
    ///
    /// The head stays in the durable queue until its response arrives, so a reload
    /// mid-request loses nothing.
    pub async fn tick(&self) -> PollOutcome {
        if self.inner.polling.get() {
            return PollOutcome::Busy;
        }
        let Some(head) = self.inner.queue.borrow().front().cloned() else {
            return PollOutcome::Empty;
        };

        self.inner.polling.set(true);
        let _guard = PollGuard(&self.inner.polling);

        let result = self.inner.source.dag_run(&head.dag_id, &head.run_id).await;

        // Only ticks pop, and ticks never overlap, so the head is still ours.
        let mut task = self.inner.queue.borrow_mut().pop_front().unwrap_or(head);

        let outcome = match result {
            Ok(run) => match run.state {
                Some(state) if state.is_terminal() => {
                    let message = task.completion_message(&run, state);
                    task.state = state;
                    tracing::info!(dag_id = %task.dag_id, run_id = %task.run_id, state = state.as_ref(), "task finished");
                    self.inner.messages.push(message.clone());
                    PollOutcome::Completed { task, message }
                }
                observed => {
                    if let Some(state) = observed {
                        task.state = state;
                    }
                    self.inner.queue.borrow_mut().push_back(task.clone());
                    PollOutcome::Pending(task)
                }
            },
            Err(error) => {
                tracing::warn!(dag_id = %task.dag_id, run_id = %task.run_id, %error, "task status check failed");
                self.inner.queue.borrow_mut().push_back(task.clone());
                PollOutcome::Retry { task, error }
            }
        };

        self.changed();
        outcome
    }

    /// Arm the repeating poll. `spawn` runs each tick's future on the local executor.
    ///
    /// Ticks that fire while a request is still outstanding are skipped.
    pub fn start_with(
        &self,
        scheduler: &dyn Scheduler,
        interval_ms: u32,
        spawn: impl Fn(LocalTask) + 'static,
    ) -> TimerHandle {
        tracing::info!(interval_ms, "starting task poller");
        let tracker = self.clone();
        scheduler.set_interval(
            interval_ms,
            Box::new(move || {
                if tracker.is_polling() {
                    tracing::debug!("previous poll still in flight, skipping tick");
                    return;
                }
                let tracker = tracker.clone();
                spawn(Box::pin(async move {
                    tracker.tick().await;
                }));
            }),
        )
    }

    /// `start_with` on the Leptos executor.
    pub fn start(&self, scheduler: &dyn Scheduler, interval_ms: u32) -> TimerHandle {
        self.start_with(scheduler, interval_ms, |fut| {
            leptos::task::spawn_local(fut)
        })
    }

    /// Run `f` with the queue after every enqueue and tick.
    pub fn subscribe(&self, f: impl Fn(&[TaskRecord]) + 'static) {
        self.inner.listeners.borrow_mut().push(Rc::new(f));
    }

    fn changed(&self) {
        let queue: Vec<TaskRecord> = self.pending();
        if let Err(e) = save_json(self.inner.store.as_ref(), TASKS_KEY, &queue) {
            tracing::warn!(error = %e, "could not persist tracked tasks");
        }
        let listeners: Vec<Rc<dyn Fn(&[TaskRecord])>> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(&queue);
        }
    }
}

impl<S: TaskStatusSource + TaskLauncher + 'static> TaskTracker<S> {
    /// Start a run and track it until it finishes.
    ///
    /// Failures are pushed to the notification center and returned.
    pub async fn trigger_and_track(
        &self,
        dag_id: &str,
        request: &CommandRequest,
        success_message: Option<String>,
        failed_message: Option<String>,
    ) -> ApiResult<TaskRecord> {
        let run = match self.inner.source.trigger(dag_id, request).await {
            Ok(run) => run,
            Err(e) => return self.inner.messages.push_error(e),
        };
        let Some(mut task) = TaskRecord::from_dag_run(&run, dag_id) else {
            return self
                .inner
                .messages
                .push_error(ApiError::Parse("dag run response has no dag_run_id".to_string()));
        };
        task.success_message = success_message;
        task.failed_message = failed_message;
        self.enqueue(task.clone());
        Ok(task)
    }
}
