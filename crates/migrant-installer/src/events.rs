use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use crate::{Job, WorkerStats};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Started { total: usize },
    JobStatusChanged { entry_index: usize, job: Job },
    JobProgress { entry_index: usize, message: String },
    JobRetrying {
        entry_index: usize,
        attempt: u32,
        delay: Duration,
    },
    Paused,
    Resumed,
    Cancelled,
    Completed { stats: WorkerStats },
}

/// Receives worker events. Called from worker threads, never while the
/// worker's own lock is held, so implementations may query the worker.
pub trait WorkerObserver: Send + Sync {
    fn on_event(&self, event: &WorkerEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl WorkerObserver for NoopObserver {
    fn on_event(&self, _event: &WorkerEvent) {}
}

/// Forwards every event into a channel; a dropped receiver is ignored.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: Sender<WorkerEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<WorkerEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, Receiver<WorkerEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self::new(sender), receiver)
    }
}

impl WorkerObserver for ChannelObserver {
    fn on_event(&self, event: &WorkerEvent) {
        let _ = self.sender.send(event.clone());
    }
}
