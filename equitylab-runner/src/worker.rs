//! Background worker — runs one simulation off the caller's thread.
//!
//! `SimulationEngine::submit` validates the config synchronously, then spawns
//! a named worker thread that streams `EngineMessage`s back over an `mpsc`
//! channel: zero or more `Progress`, then exactly one `Done` or `Failed`.
//! After `cancel()` the handle never yields a completion, even if the worker
//! finished the last path before it observed the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use equitylab_core::SimulationConfig;

use crate::engine::{run_simulation, EngineError, EngineOptions, SimulationEngine, SimulationReport};

/// Messages sent from the worker back to the caller.
#[derive(Debug)]
pub enum EngineMessage {
    /// Percent complete, 0–100. Best effort.
    Progress { value: u8 },
    Done { report: Box<SimulationReport> },
    Failed { error: EngineError },
}

type ProgressCallback = Box<dyn FnMut(u8) + Send>;

/// Handle to an in-flight simulation.
pub struct SimulationHandle {
    rx: Receiver<EngineMessage>,
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    callbacks: Vec<ProgressCallback>,
    finished: bool,
}

impl SimulationEngine {
    /// Start a simulation on a background thread.
    ///
    /// Configuration errors are returned here, before any thread is spawned.
    pub fn submit(&self, config: SimulationConfig) -> Result<SimulationHandle, EngineError> {
        config.validate()?;

        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let worker_cancel = Arc::clone(&cancel);
        let options = self.options().clone();

        let thread = thread::Builder::new()
            .name("equitylab-worker".into())
            .spawn(move || worker_main(config, options, tx, worker_cancel))
            .map_err(EngineError::Spawn)?;

        Ok(SimulationHandle {
            rx,
            cancel,
            thread: Some(thread),
            callbacks: Vec::new(),
            finished: false,
        })
    }
}

fn worker_main(
    config: SimulationConfig,
    options: EngineOptions,
    tx: Sender<EngineMessage>,
    cancel: Arc<AtomicBool>,
) {
    let progress_tx = tx.clone();
    let on_progress = move |value: u8| {
        // Receiver gone means nobody is listening; progress is best effort.
        let _ = progress_tx.send(EngineMessage::Progress { value });
    };

    let outcome = run_simulation(&config, &options, Some(&on_progress), Some(cancel.as_ref()));

    if cancel.load(Ordering::Relaxed) {
        debug!("worker observed cancel, dropping outcome");
        return;
    }
    let message = match outcome {
        Ok(report) => EngineMessage::Done {
            report: Box::new(report),
        },
        Err(EngineError::Cancelled) => return,
        Err(error) => EngineMessage::Failed { error },
    };
    if tx.send(message).is_err() {
        debug!("simulation handle dropped before completion");
    }
}

impl SimulationHandle {
    /// Register a callback for progress messages drained by `poll` or `result`.
    pub fn on_progress(&mut self, callback: impl FnMut(u8) + Send + 'static) -> &mut Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Request cancellation. The worker stops before its next path.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// True once a terminal message has been taken or the run was cancelled.
    pub fn is_finished(&self) -> bool {
        self.finished || self.is_cancelled()
    }

    /// Non-blocking: next pending message, if any.
    ///
    /// Progress messages also go to the registered callbacks. Returns `None`
    /// forever once the run is cancelled. A worker that exits without a
    /// terminal message yields one `Failed { WorkerPanicked }`.
    pub fn poll(&mut self) -> Option<EngineMessage> {
        if self.is_cancelled() || self.finished {
            return None;
        }
        match self.rx.try_recv() {
            Ok(message) => Some(self.observe(message)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join_worker();
                self.finished = true;
                Some(EngineMessage::Failed {
                    error: EngineError::WorkerPanicked,
                })
            }
        }
    }

    /// Block until the run completes.
    pub fn result(mut self) -> Result<SimulationReport, EngineError> {
        loop {
            if self.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.rx.recv() {
                Ok(message) => match self.observe(message) {
                    EngineMessage::Progress { .. } => continue,
                    EngineMessage::Done { report } => {
                        if self.is_cancelled() {
                            return Err(EngineError::Cancelled);
                        }
                        return Ok(*report);
                    }
                    EngineMessage::Failed { error } => return Err(error),
                },
                Err(_) => {
                    // Sender gone without a terminal message.
                    if self.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    self.join_worker();
                    self.finished = true;
                    return Err(EngineError::WorkerPanicked);
                }
            }
        }
    }

    fn observe(&mut self, message: EngineMessage) -> EngineMessage {
        match &message {
            EngineMessage::Progress { value } => {
                for callback in &mut self.callbacks {
                    callback(*value);
                }
            }
            EngineMessage::Done { .. } | EngineMessage::Failed { .. } => {
                self.finished = true;
            }
        }
        message
    }

    fn join_worker(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("simulation worker panicked");
            }
        }
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel();
        }
        self.join_worker();
    }
}
