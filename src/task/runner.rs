// Task + executor pair
// A Task is bound to exactly one Executor per run; the executor owns the
// worker and reports the outcome through the registered status channel.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::TaskError;
use crate::task::cancel::{CancelToken, Interrupted};
use crate::task::status::{StatusChannel, TaskEvent};

/// Unit of work run off the caller's thread.
pub trait BackgroundTask: Send + 'static {
    type Output: Send + 'static;

    /// The work itself. Runs on the worker thread and should poll
    /// `ctx.is_cancelled()` at safe checkpoints.
    fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Cancelled | RunState::Failed)
    }
}

/// State shared between a task handle, its executor and the running body.
struct Control {
    name: String,
    state: Mutex<RunState>,
    progress: AtomicU8,
    cancel: CancelToken,
    listener: Mutex<Option<Arc<dyn StatusChannel>>>,
    failure: Mutex<Option<String>>,
    // Flipped after done() has been delivered, so waiters never race it
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl Control {
    fn listener(&self) -> Option<Arc<dyn StatusChannel>> {
        self.listener.lock().clone()
    }

    fn notify(&self, event: TaskEvent) {
        if let Some(listener) = self.listener() {
            listener.notify(event);
        }
    }

    /// Report a terminal state that has already been stored.
    fn finish(&self, state: RunState, failure: Option<String>) {
        match state {
            RunState::Completed => info!(task = %self.name, "task completed"),
            RunState::Cancelled => info!(task = %self.name, "task cancelled"),
            _ => {}
        }

        if let Some(message) = &failure {
            *self.failure.lock() = Some(message.clone());
            self.notify(TaskEvent::Failed(message.clone()));
        } else if state == RunState::Cancelled {
            self.notify(TaskEvent::Cancelled);
        }

        if let Some(listener) = self.listener() {
            listener.done();
        }

        let mut finished = self.finished.lock();
        *finished = true;
        self.finished_cv.notify_all();
    }
}

/// What a task body sees of its surroundings.
pub struct TaskContext {
    control: Arc<Control>,
}

impl TaskContext {
    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// Report progress. Values above 100 are capped and values lower than the
    /// last report are ignored, so listeners only ever see an increasing sequence.
    pub fn step_on(&self, progress: u8) {
        let progress = progress.min(100);
        let previous = self.control.progress.fetch_max(progress, Ordering::SeqCst);
        if progress > previous {
            self.control.notify(TaskEvent::Progress(progress));
        }
    }

    pub fn progress(&self) -> u8 {
        self.control.progress.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.control.cancel
    }

    /// Interruptible sleep; an interrupting `cancel(true)` cuts it short.
    pub fn pause(&self, duration: Duration) -> Result<(), Interrupted> {
        self.control.cancel.pause(duration)
    }

    pub fn notify(&self, message: impl Into<String>) {
        self.control.notify(TaskEvent::Message(message.into()));
    }
}

/// A background task handle.
///
/// Not reusable: once executed it can never be executed again, build a fresh
/// `Task` for the next run.
pub struct Task<B: BackgroundTask> {
    control: Arc<Control>,
    body: Mutex<Option<B>>,
    result: Arc<Mutex<Option<B::Output>>>,
}

impl<B: BackgroundTask> Task<B> {
    pub fn new(name: impl Into<String>, body: B) -> Self {
        Self {
            control: Arc::new(Control {
                name: name.into(),
                state: Mutex::new(RunState::Idle),
                progress: AtomicU8::new(0),
                cancel: CancelToken::new(),
                listener: Mutex::new(None),
                failure: Mutex::new(None),
                finished: Mutex::new(false),
                finished_cv: Condvar::new(),
            }),
            body: Mutex::new(Some(body)),
            result: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.control.name
    }

    /// Register the listener for this task. A task holds at most one; a later
    /// call replaces the earlier listener.
    pub fn set_status_channel(&self, listener: Arc<dyn StatusChannel>) {
        *self.control.listener.lock() = Some(listener);
    }

    /// Bind a fresh executor to this task and start it. Returns immediately.
    pub fn execute(&self) -> Result<(), TaskError> {
        let body = {
            let mut state = self.control.state.lock();
            if *state != RunState::Idle {
                return Err(TaskError::IllegalState);
            }
            let body = self.body.lock().take().ok_or(TaskError::IllegalState)?;
            *state = RunState::Running;
            body
        };

        debug!(task = %self.control.name, "starting executor");
        let executor = Executor {
            control: Arc::clone(&self.control),
            body,
            result: Arc::clone(&self.result),
        };
        executor.spawn()
    }

    /// Request cancellation. Returns false when the task is not running.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        // The flag is raised under the state lock, the executor settles under it too
        let state = self.control.state.lock();
        if *state != RunState::Running {
            return false;
        }
        debug!(task = %self.control.name, may_interrupt, "cancel requested");
        self.control.cancel.cancel(may_interrupt);
        true
    }

    pub fn state(&self) -> RunState {
        *self.control.state.lock()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == RunState::Cancelled
    }

    pub fn progress(&self) -> u8 {
        self.control.progress.load(Ordering::SeqCst)
    }

    /// Description of the failure, if the run ended in `Failed`.
    pub fn failure(&self) -> Option<String> {
        self.control.failure.lock().clone()
    }

    /// Block until the run has ended and its listener was told. Returns false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut finished = self.control.finished.lock();
        while !*finished {
            if self
                .control
                .finished_cv
                .wait_until(&mut finished, deadline)
                .timed_out()
            {
                return *finished;
            }
        }
        true
    }

    /// Hand back the body's output. Only available once, after a run that
    /// produced one.
    pub fn take_result(&self) -> Option<B::Output> {
        self.result.lock().take()
    }
}

/// Runs one task body on a dedicated worker and relays its outcome.
struct Executor<B: BackgroundTask> {
    control: Arc<Control>,
    body: B,
    result: Arc<Mutex<Option<B::Output>>>,
}

impl<B: BackgroundTask> Executor<B> {
    fn spawn(self) -> Result<(), TaskError> {
        // Inside a tokio runtime the blocking pool gives us a dedicated thread
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn_blocking(move || self.run());
            return Ok(());
        }

        let control = Arc::clone(&self.control);
        let spawned = thread::Builder::new()
            .name(format!("task-{}", control.name))
            .spawn(move || self.run());

        match spawned {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(task = %control.name, "failed to spawn worker: {}", e);
                *control.state.lock() = RunState::Failed;
                control.finish(RunState::Failed, Some(format!("failed to spawn worker: {}", e)));
                Err(TaskError::Spawn(e.to_string()))
            }
        }
    }

    fn run(mut self) {
        let ctx = TaskContext {
            control: Arc::clone(&self.control),
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.body.run(&ctx)));

        let mut current = self.control.state.lock();
        let cancelled = self.control.cancel.is_cancelled();
        let (state, failure) = match outcome {
            Ok(Ok(value)) => {
                *self.result.lock() = Some(value);
                if cancelled {
                    (RunState::Cancelled, None)
                } else {
                    (RunState::Completed, None)
                }
            }
            Ok(Err(_)) if cancelled => (RunState::Cancelled, None),
            Ok(Err(e)) => {
                warn!(task = %self.control.name, "task failed: {:#}", e);
                (RunState::Failed, Some(format!("{:#}", e)))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = %self.control.name, "task panicked: {}", message);
                (RunState::Failed, Some(format!("task panicked: {}", message)))
            }
        };
        *current = state;
        drop(current);

        self.control.finish(state, failure);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::status::{ChannelListener, ListenerMessage};
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct CountingListener {
        done: AtomicUsize,
        events: Mutex<Vec<TaskEvent>>,
    }

    impl StatusChannel for CountingListener {
        fn done(&self) {
            self.done.fetch_add(1, Ordering::SeqCst);
        }

        fn notify(&self, event: TaskEvent) {
            self.events.lock().push(event);
        }
    }

    struct Steps(Vec<u8>);

    impl BackgroundTask for Steps {
        type Output = usize;

        fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<usize> {
            for &p in &self.0 {
                ctx.step_on(p);
            }
            Ok(self.0.len())
        }
    }

    struct Failing;

    impl BackgroundTask for Failing {
        type Output = ();

        fn run(&mut self, _ctx: &TaskContext) -> anyhow::Result<()> {
            anyhow::bail!("device exploded")
        }
    }

    struct Panicking;

    impl BackgroundTask for Panicking {
        type Output = ();

        fn run(&mut self, _ctx: &TaskContext) -> anyhow::Result<()> {
            panic!("boom")
        }
    }

    /// Sleeps in short pauses until cancelled
    struct Spinner;

    impl BackgroundTask for Spinner {
        type Output = u32;

        fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<u32> {
            let mut rounds = 0;
            while !ctx.is_cancelled() {
                let _ = ctx.pause(Duration::from_millis(5));
                rounds += 1;
            }
            Ok(rounds)
        }
    }

    /// Parks in one long pause; only an interrupt gets it out early
    struct Sleeper;

    impl BackgroundTask for Sleeper {
        type Output = bool;

        fn run(&mut self, ctx: &TaskContext) -> anyhow::Result<bool> {
            Ok(ctx.pause(Duration::from_secs(30)).is_err())
        }
    }

    /// Blocks until released, then returns normally
    struct Gated(crossbeam_channel::Receiver<()>);

    impl BackgroundTask for Gated {
        type Output = ();

        fn run(&mut self, _ctx: &TaskContext) -> anyhow::Result<()> {
            self.0.recv_timeout(WAIT)?;
            Ok(())
        }
    }

    #[test]
    fn test_completed_run_reports_progress_and_result() {
        let listener = Arc::new(CountingListener::default());
        let task = Task::new("steps", Steps(vec![10, 40, 30, 100, 100]));
        task.set_status_channel(listener.clone());

        task.execute().unwrap();
        assert!(task.wait(WAIT));

        assert_eq!(task.state(), RunState::Completed);
        assert!(task.is_done());
        assert!(!task.is_running());
        assert!(!task.is_cancelled());
        assert_eq!(task.progress(), 100);
        assert_eq!(task.take_result(), Some(5));
        assert_eq!(task.take_result(), None);
        assert_eq!(listener.done.load(Ordering::SeqCst), 1);
        // 30 is lower than 40 and the repeated 100 adds nothing
        assert_eq!(
            *listener.events.lock(),
            vec![
                TaskEvent::Progress(10),
                TaskEvent::Progress(40),
                TaskEvent::Progress(100),
            ]
        );
    }

    #[test]
    fn test_failure_is_captured_not_propagated() {
        let listener = Arc::new(CountingListener::default());
        let task = Task::new("failing", Failing);
        task.set_status_channel(listener.clone());

        assert!(task.execute().is_ok());
        assert!(task.wait(WAIT));

        assert_eq!(task.state(), RunState::Failed);
        assert_eq!(task.failure().as_deref(), Some("device exploded"));
        assert_eq!(listener.done.load(Ordering::SeqCst), 1);
        assert_eq!(
            *listener.events.lock(),
            vec![TaskEvent::Failed("device exploded".to_string())]
        );
    }

    #[test]
    fn test_panic_is_captured_as_failure() {
        let listener = Arc::new(CountingListener::default());
        let task = Task::new("panicking", Panicking);
        task.set_status_channel(listener.clone());

        task.execute().unwrap();
        assert!(task.wait(WAIT));

        assert_eq!(task.state(), RunState::Failed);
        assert!(task.failure().unwrap().contains("boom"));
        assert_eq!(listener.done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cooperative_cancel() {
        let listener = Arc::new(CountingListener::default());
        let task = Task::new("spinner", Spinner);
        task.set_status_channel(listener.clone());

        task.execute().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(task.cancel(false));
        assert!(task.wait(WAIT));

        assert_eq!(task.state(), RunState::Cancelled);
        assert!(task.is_cancelled());
        assert!(task.failure().is_none());
        assert_eq!(listener.done.load(Ordering::SeqCst), 1);
        assert_eq!(*listener.events.lock(), vec![TaskEvent::Cancelled]);
        // Cancelling a finished task is refused
        assert!(!task.cancel(true));
    }

    #[test]
    fn test_interrupting_cancel_wakes_pause() {
        let task = Task::new("sleeper", Sleeper);
        task.execute().unwrap();
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        assert!(task.cancel(true));
        assert!(task.wait(WAIT));
        assert!(started.elapsed() < WAIT);

        assert_eq!(task.state(), RunState::Cancelled);
        assert_eq!(task.take_result(), Some(true));
    }

    #[test]
    fn test_accepted_cancel_always_ends_cancelled() {
        for _ in 0..200 {
            let task = Task::new("race", Steps(vec![100]));
            task.execute().unwrap();
            let accepted = task.cancel(false);
            assert!(task.wait(WAIT));

            if accepted {
                assert_eq!(task.state(), RunState::Cancelled);
                assert!(task.is_cancelled());
            } else {
                assert_eq!(task.state(), RunState::Completed);
                assert!(!task.is_cancelled());
            }
        }
    }

    #[test]
    fn test_is_cancelled_follows_state() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let task = Task::new("gated", Gated(release_rx));
        task.execute().unwrap();
        thread::sleep(Duration::from_millis(20));

        assert!(task.cancel(false));
        // Requested but not observed yet
        assert!(task.is_running());
        assert!(!task.is_cancelled());

        release_tx.send(()).unwrap();
        assert!(task.wait(WAIT));
        assert_eq!(task.state(), RunState::Cancelled);
        assert!(task.is_cancelled());
        assert_eq!(task.take_result(), Some(()));
    }

    #[test]
    fn test_execute_twice_is_illegal() {
        let task = Task::new("once", Steps(vec![100]));
        task.execute().unwrap();
        assert_eq!(task.execute(), Err(TaskError::IllegalState));
        assert!(task.wait(WAIT));
        assert_eq!(task.execute(), Err(TaskError::IllegalState));
    }

    #[test]
    fn test_cancel_before_execute_is_refused() {
        let task = Task::new("idle", Steps(vec![]));
        assert_eq!(task.state(), RunState::Idle);
        assert!(!task.cancel(true));
        assert!(!task.is_cancelled());
    }

    #[tokio::test]
    async fn test_runtime_executor_delivers_through_channel() {
        let (listener, mut rx) = ChannelListener::new();
        let task = Task::new("steps", Steps(vec![50, 100]));
        task.set_status_channel(Arc::new(listener));
        task.execute().unwrap();

        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            let done = message == ListenerMessage::Done;
            messages.push(message);
            if done {
                break;
            }
        }

        assert_eq!(
            messages,
            vec![
                ListenerMessage::Event(TaskEvent::Progress(50)),
                ListenerMessage::Event(TaskEvent::Progress(100)),
                ListenerMessage::Done,
            ]
        );
        assert_eq!(task.state(), RunState::Completed);
    }
}
