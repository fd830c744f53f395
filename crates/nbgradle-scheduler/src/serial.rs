use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use crossbeam_channel as channel;

use crate::panic_payload_to_str;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs, possibly on another thread.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn execute(&self, job: Job) {
        run_job("inline", job);
    }
}

enum Message {
    Run(Job),
    Flush(channel::Sender<()>),
}

/// Executes submitted jobs one at a time, in submission order, on a dedicated thread.
///
/// Clones share the same worker. The worker exits once every clone is dropped and the queue
/// has drained. If the worker thread cannot be spawned, jobs run inline on the submitting
/// thread instead.
#[derive(Clone)]
pub struct SerialExecutor {
    inner: Arc<Inner>,
}

struct Inner {
    name: Arc<str>,
    sender: Option<channel::Sender<Message>>,
    pending: Arc<AtomicUsize>,
    worker: Arc<OnceLock<ThreadId>>,
}

impl SerialExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = Arc::new(OnceLock::new());
        let (sender, receiver) = channel::unbounded::<Message>();

        let worker_name = Arc::clone(&name);
        let worker_pending = Arc::clone(&pending);
        let worker_id = Arc::clone(&worker);
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _ = worker_id.set(thread::current().id());
                for message in receiver.iter() {
                    match message {
                        Message::Run(job) => {
                            run_job(&worker_name, job);
                            worker_pending.fetch_sub(1, Ordering::AcqRel);
                        }
                        Message::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            });

        let sender = match spawned {
            Ok(_) => Some(sender),
            Err(err) => {
                tracing::warn!(
                    target: "nbgradle.scheduler",
                    executor = %name,
                    error = %err,
                    "failed to spawn executor thread; running jobs inline"
                );
                None
            }
        };

        Self {
            inner: Arc::new(Inner {
                name,
                sender,
                pending,
                worker,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Queues `job` behind every previously submitted job.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_boxed(Box::new(job));
    }

    fn submit_boxed(&self, job: Job) {
        let Some(sender) = &self.inner.sender else {
            run_job(&self.inner.name, job);
            return;
        };

        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(channel::SendError(message)) = sender.send(Message::Run(job)) {
            self.inner.pending.fetch_sub(1, Ordering::AcqRel);
            if let Message::Run(job) = message {
                run_job(&self.inner.name, job);
            }
        }
    }

    /// Returns `true` when called from this executor's worker thread.
    pub fn is_current(&self) -> bool {
        self.inner
            .worker
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// Number of queued or running jobs.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Blocks until every job submitted before this call has finished.
    ///
    /// Returns immediately when called from the worker itself.
    pub fn flush(&self) {
        if self.is_current() {
            return;
        }
        let Some(sender) = &self.inner.sender else {
            return;
        };
        let (done_tx, done_rx) = channel::bounded(1);
        if sender.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl TaskExecutor for SerialExecutor {
    fn execute(&self, job: Job) {
        self.submit_boxed(job);
    }
}

impl std::fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("name", &self.inner.name)
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_job(executor: &str, job: Job) {
    if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        let message = panic_payload_to_str(&*panic);
        tracing::error!(
            target: "nbgradle.scheduler",
            executor,
            panic = %message,
            "job panicked"
        );
    }
}
