//! Fixed-size pool of evaluation workers.
//!
//! Workers are OS threads because an evaluation spends its time blocked on
//! external processes. Jobs travel over a zero-capacity channel by default,
//! so `submit` only returns once a worker has taken the job.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use sc_types::{internal_error, CalibrationError, Candidate, Objective, ScError, ScResult};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

struct Job {
    objective: Arc<dyn Objective>,
    candidate: Candidate,
    reply: Sender<ScResult<f64>>,
}

/// Pending result of a submitted evaluation.
#[derive(Debug)]
pub struct EvaluationHandle {
    receiver: Receiver<ScResult<f64>>,
}

impl EvaluationHandle {
    /// Block until the evaluation finishes.
    pub fn wait(self) -> ScResult<f64> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(internal_error!("evaluation worker went away")))
    }

    pub(crate) fn receiver(&self) -> &Receiver<ScResult<f64>> {
        &self.receiver
    }
}

pub struct Coordinator {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancelled: Arc<AtomicBool>,
    size: usize,
}

impl Coordinator {
    /// Spawn `worker_count` workers fed by a rendezvous channel.
    pub fn new(worker_count: usize) -> ScResult<Self> {
        Self::with_queue_capacity(worker_count, 0)
    }

    /// Like [`Coordinator::new`], but up to `capacity` jobs may wait for a
    /// free worker.
    pub fn with_queue_capacity(worker_count: usize, capacity: usize) -> ScResult<Self> {
        if worker_count == 0 {
            return Err(sc_types::config_error!("worker count must be at least 1"));
        }

        let (sender, receiver) = bounded::<Job>(capacity);
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let cancelled = Arc::clone(&cancelled);
            let handle = thread::Builder::new()
                .name(format!("calib-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, receiver, cancelled))?;
            workers.push(handle);
        }
        debug!("Started {} evaluation workers", worker_count);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            cancelled,
            size: worker_count,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hand a candidate to the next free worker.
    pub fn submit(
        &self,
        objective: Arc<dyn Objective>,
        candidate: Candidate,
    ) -> ScResult<EvaluationHandle> {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(CalibrationError::Cancelled)?;
        let (reply, receiver) = bounded(1);
        sender
            .send(Job {
                objective,
                candidate,
                reply,
            })
            .map_err(|_| internal_error!("evaluation workers are gone"))?;
        Ok(EvaluationHandle { receiver })
    }

    /// Cancel queued work and join every worker. Running evaluations finish.
    pub fn shutdown(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.sender.lock().take();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("evaluation worker exited abnormally");
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(worker_id: usize, receiver: Receiver<Job>, cancelled: Arc<AtomicBool>) {
    for job in receiver.iter() {
        if cancelled.load(Ordering::SeqCst) {
            let _ = job.reply.send(Err(CalibrationError::Cancelled.into()));
            continue;
        }

        debug!("worker {} evaluating {}", worker_id, job.candidate);
        let objective = job.objective;
        let candidate = job.candidate;
        let result = panic::catch_unwind(AssertUnwindSafe(|| objective.evaluate(&candidate)))
            .unwrap_or_else(|payload| {
                Err(ScError::from(CalibrationError::WorkerPanicked {
                    message: panic_message(payload.as_ref()),
                }))
            });

        // The submitter may have stopped listening.
        let _ = job.reply.send(result);
    }
    debug!("worker {} stopped", worker_id);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
