//! Background timer that keeps one context reconciled.

use std::sync::mpsc::{channel, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::directory::GuideDirectory;
use crate::storage::KeyValueStore;

/// Statistics from the reconciler thread.
#[derive(Debug, Default, Clone)]
pub struct ReconcileStats {
    pub ticks: usize,
    /// Added, updated and removed guides summed over every tick.
    pub changes: usize,
    pub notices: usize,
    pub errors: usize,
}

/// Runs [`GuideDirectory::sync`] on a fixed interval.
///
/// The thread exits on [`ReconcilerThread::stop`], when the handle is
/// dropped, or once the directory is closed.
///
/// ```ignore
/// let worker = ReconcilerThread::spawn(directory.clone(), config.poll_interval());
/// // ... contexts commit and toggle ...
/// let stats = worker.stop();
/// ```
pub struct ReconcilerThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<ReconcileStats>>,
}

impl ReconcilerThread {
    pub fn spawn<S>(directory: GuideDirectory<S>, interval: Duration) -> Self
    where
        S: KeyValueStore + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = ReconcileStats::default();

            loop {
                match stop_rx.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }
                if directory.is_closed() {
                    break;
                }

                match directory.sync() {
                    Ok(outcome) => {
                        stats.ticks += 1;
                        stats.changes += outcome.report.changes();
                        stats.notices += outcome.notices;
                    }
                    Err(e) => {
                        tracing::warn!(context = directory.context_id(), "reconcile tick failed: {e}");
                        stats.errors += 1;
                    }
                }

                thread::sleep(interval);
            }

            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(mut self) -> ReconcileStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => ReconcileStats::default(),
        }
    }

    /// Signal the thread to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for ReconcilerThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
