//! Job progress broadcaster
//!
//! Every subscriber owns an unbounded `tokio::sync::mpsc` channel, so a slow
//! reader never loses progress events. The job's `JobPublisher` fans each
//! event out to every live channel. The terminal event is also recorded on the
//! job, so subscribing after completion still yields it. A job record is
//! deleted once it is terminal and no subscriber remains, or after the
//! retention window if nobody ever subscribed.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::JobsConfig;
use crate::error::{Error, Result};
use crate::types::JobEvent;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    /// Parse a wire id; malformed ids cannot name a job.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|_| Error::JobNotFound(s.to_string()))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Default)]
struct EntryState {
    senders: Vec<mpsc::UnboundedSender<JobEvent>>,
    /// Set exactly once. Senders are dropped when it is.
    terminal: Option<JobEvent>,
}

struct JobEntry {
    state: Mutex<EntryState>,
    subscribers: AtomicUsize,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl JobEntry {
    fn is_terminal(&self) -> bool {
        self.state.lock().terminal.is_some()
    }

    /// Deliver a progress event to every live subscriber. No-op once terminal.
    fn fan_out(&self, event: JobEvent) {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return;
        }
        state.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Record the terminal event and close every channel after delivering it.
    /// Returns false if a terminal event was already recorded.
    fn finish(&self, event: JobEvent) -> bool {
        let mut state = self.state.lock();
        if state.terminal.is_some() {
            return false;
        }
        for tx in state.senders.drain(..) {
            let _ = tx.send(event.clone());
        }
        state.terminal = Some(event);
        true
    }
}

struct RegistryInner {
    jobs: DashMap<JobId, Arc<JobEntry>>,
    retention: Duration,
    closed: AtomicBool,
}

/// Registry of running and recently finished jobs. Clones share state.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    pub fn new(config: &JobsConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                jobs: DashMap::new(),
                retention: config.terminal_retention(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn create_job(&self) -> Result<(JobId, JobPublisher)> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Unavailable("job registry is shut down".into()));
        }
        let entry = Arc::new(JobEntry {
            state: Mutex::new(EntryState::default()),
            subscribers: AtomicUsize::new(0),
            handle: Mutex::new(None),
        });
        let id = JobId::new();
        self.inner.jobs.insert(id, Arc::clone(&entry));
        let publisher = JobPublisher { id, entry, registry: self.clone(), finished: false };
        Ok((id, publisher))
    }

    /// Remember the task running `id` so `shutdown` can abort it.
    pub fn attach(&self, id: JobId, handle: JoinHandle<()>) {
        match self.inner.jobs.get(&id) {
            Some(entry) if !entry.is_terminal() => *entry.handle.lock() = Some(handle),
            // Already finished; nothing left to abort.
            _ => {}
        }
    }

    /// Every event published from now on until (and including) the terminal
    /// one. A finished job yields just its terminal event.
    pub fn subscribe(&self, id: JobId) -> Result<JobSubscription> {
        let entry = self
            .inner
            .jobs
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;

        let (receiver, recorded) = {
            let mut state = entry.state.lock();
            match state.terminal.clone() {
                Some(terminal) => (None, Some(terminal)),
                None => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    state.senders.push(tx);
                    (Some(rx), None)
                }
            }
        };
        entry.subscribers.fetch_add(1, Ordering::AcqRel);

        Ok(JobSubscription {
            id,
            entry,
            registry: self.clone(),
            receiver,
            recorded,
            released: false,
        })
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.inner.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.jobs.is_empty()
    }

    /// Jobs that have not published a terminal event.
    pub fn running(&self) -> usize {
        self.inner.jobs.iter().filter(|e| !e.is_terminal()).count()
    }

    /// Abort running jobs (their transactions roll back) and forget all jobs.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut aborted = 0;
        for entry in self.inner.jobs.iter() {
            if let Some(handle) = entry.handle.lock().take() {
                if !handle.is_finished() {
                    handle.abort();
                    aborted += 1;
                }
            }
        }
        self.inner.jobs.clear();
        tracing::info!(aborted, "job registry shut down");
    }

    /// Delete `id` if it is terminal and unobserved.
    fn reap(&self, id: JobId) {
        let removed = self
            .inner
            .jobs
            .remove_if(&id, |_, e| e.is_terminal() && e.subscribers.load(Ordering::Acquire) == 0);
        if removed.is_some() {
            tracing::debug!(job = %id, "job record removed");
        }
    }

    fn on_terminal(&self, id: JobId, entry: &JobEntry) {
        if entry.subscribers.load(Ordering::Acquire) > 0 {
            return;
        }
        // Keep the terminal event around for late subscribers.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let registry = self.clone();
                let retention = self.inner.retention;
                runtime.spawn(async move {
                    tokio::time::sleep(retention).await;
                    registry.reap(id);
                });
            }
            Err(_) => self.reap(id),
        }
    }
}

/// Sending half of a job. Dropping it without a terminal event publishes
/// `error("job aborted")`.
pub struct JobPublisher {
    id: JobId,
    entry: Arc<JobEntry>,
    registry: JobRegistry,
    finished: bool,
}

impl JobPublisher {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Ignored after the terminal event.
    pub fn progress(&self, rows: u64) {
        if self.finished {
            return;
        }
        self.entry.fan_out(JobEvent::Progress { rows });
    }

    /// Publish `event`. Anything after the terminal event is ignored.
    pub fn publish(&mut self, event: JobEvent) {
        if self.finished {
            return;
        }
        if !event.is_terminal() {
            self.entry.fan_out(event);
            return;
        }
        self.finished = true;
        if !self.entry.finish(event) {
            return;
        }
        self.entry.handle.lock().take();
        self.registry.on_terminal(self.id, &self.entry);
    }

    pub fn done(mut self) {
        self.publish(JobEvent::Done);
    }

    pub fn fail(mut self, message: impl Into<String>) {
        self.publish(JobEvent::Error { message: message.into() });
    }
}

impl Drop for JobPublisher {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(job = %self.id, "job ended without a terminal event");
            self.publish(JobEvent::Error { message: "job aborted".into() });
        }
    }
}

/// Receiving half for one subscriber.
pub struct JobSubscription {
    id: JobId,
    entry: Arc<JobEntry>,
    registry: JobRegistry,
    /// `None` when the job was already terminal at subscribe time.
    receiver: Option<mpsc::UnboundedReceiver<JobEvent>>,
    /// Terminal event recorded before this subscription existed.
    recorded: Option<JobEvent>,
    released: bool,
}

impl JobSubscription {
    pub fn job_id(&self) -> JobId {
        self.id
    }

    /// Next event; `None` after the terminal event has been returned.
    pub async fn next(&mut self) -> Option<JobEvent> {
        if self.released {
            return None;
        }
        if let Some(event) = self.recorded.take() {
            self.release();
            return Some(event);
        }
        let received = match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        };
        match received {
            Some(event) => {
                if event.is_terminal() {
                    self.release();
                }
                Some(event)
            }
            None => {
                let recorded = self.entry.state.lock().terminal.clone();
                self.release();
                recorded
            }
        }
    }

    fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        let remaining = self.entry.subscribers.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 && self.entry.is_terminal() {
            self.registry.reap(self.id);
        }
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> JobRegistry {
        JobRegistry::new(&JobsConfig::default())
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let registry = registry();
        let (id, mut publisher) = registry.create_job().unwrap();
        let mut a = registry.subscribe(id).unwrap();
        let mut b = registry.subscribe(id).unwrap();

        publisher.progress(10);
        publisher.publish(JobEvent::Done);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.next().await, Some(JobEvent::Progress { rows: 10 }));
            assert_eq!(sub.next().await, Some(JobEvent::Done));
            assert_eq!(sub.next().await, None);
        }
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_slow_subscriber_receives_every_event() {
        let registry = registry();
        let (id, mut publisher) = registry.create_job().unwrap();
        let mut fast = registry.subscribe(id).unwrap();
        let mut slow = registry.subscribe(id).unwrap();

        let mut fast_seen = 0;
        for rows in 1..=40u64 {
            publisher.progress(rows);
            assert_eq!(fast.next().await, Some(JobEvent::Progress { rows }));
            fast_seen += 1;
        }
        publisher.publish(JobEvent::Done);
        assert_eq!(fast.next().await, Some(JobEvent::Done));
        assert_eq!(fast_seen + 1, 41);

        let mut slow_events = Vec::new();
        while let Some(event) = slow.next().await {
            slow_events.push(event);
        }
        assert_eq!(slow_events.len(), 41);
        assert_eq!(slow_events[39], JobEvent::Progress { rows: 40 });
        assert_eq!(slow_events[40], JobEvent::Done);
    }

    #[tokio::test]
    async fn test_progress_after_terminal_is_dropped() {
        let registry = registry();
        let (id, mut publisher) = registry.create_job().unwrap();
        let mut sub = registry.subscribe(id).unwrap();
        let mut extra = registry.subscribe(id).unwrap();

        publisher.publish(JobEvent::Done);
        publisher.progress(99);
        publisher.publish(JobEvent::Progress { rows: 100 });
        publisher.publish(JobEvent::Error { message: "late".into() });

        for s in [&mut sub, &mut extra] {
            assert_eq!(s.next().await, Some(JobEvent::Done));
            assert_eq!(s.next().await, None);
        }
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_terminal() {
        let registry = registry();
        let (id, publisher) = registry.create_job().unwrap();
        publisher.fail("disk full");

        let mut late = registry.subscribe(id).unwrap();
        assert_eq!(late.next().await, Some(JobEvent::Error { message: "disk full".into() }));
        assert_eq!(late.next().await, None);
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_dropped_publisher_reports_abort() {
        let registry = registry();
        let (id, publisher) = registry.create_job().unwrap();
        let mut sub = registry.subscribe(id).unwrap();
        drop(publisher);
        assert!(matches!(sub.next().await, Some(JobEvent::Error { message }) if message == "job aborted"));
    }

    #[tokio::test]
    async fn test_subscription_drop_releases_job() {
        let registry = registry();
        let (id, publisher) = registry.create_job().unwrap();
        let sub = registry.subscribe(id).unwrap();
        drop(sub);
        assert!(registry.contains(id));
        publisher.done();
        // No subscribers: kept for the retention window.
        assert!(registry.contains(id));
        assert_eq!(registry.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_terminal_job_is_reaped() {
        let registry = registry();
        let (id, publisher) = registry.create_job().unwrap();
        publisher.done();
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let registry = registry();
        assert!(matches!(registry.subscribe(JobId::new()), Err(Error::JobNotFound(_))));
        assert!(matches!(JobId::parse("nope"), Err(Error::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_jobs() {
        let registry = registry();
        registry.shutdown();
        assert!(registry.create_job().is_err());
    }
}
