use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// A periodic job on its own thread
///
/// The job runs every `interval` until [`BackgroundTask::shutdown`] is called
/// or the handle is dropped; both wake the thread immediately and join it.
pub struct BackgroundTask {
    name: String,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundTask {
    /// Spawn `job`, running it once right away when `run_immediately` is set
    pub fn spawn<F>(
        name: &str,
        interval: Duration,
        run_immediately: bool,
        mut job: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let thread_name = name.to_string();

        let handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if run_immediately {
                    job();
                }
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => job(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("{} stopped", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the task and wait for the current run to finish
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("{} panicked", self.name);
            }
        }
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_runs_periodically_and_stops() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = BackgroundTask::spawn("test-task", Duration::from_millis(10), true, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(60));
        task.shutdown();
        let after_shutdown = runs.load(Ordering::SeqCst);
        assert!(after_shutdown >= 2);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(runs.load(Ordering::SeqCst), after_shutdown);
    }

    #[test]
    fn test_shutdown_does_not_wait_for_interval() {
        let task = BackgroundTask::spawn("idle-task", Duration::from_secs(3600), false, || {})
            .unwrap();
        assert_eq!(task.name(), "idle-task");

        let start = Instant::now();
        drop(task);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
