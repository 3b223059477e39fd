//! Per-operation dependency recording.
//!
//! Every in-flight operation owns a frame. The frame accumulates, in
//! program order, the file system facts the operation observed and the
//! child operations it invoked. Order is what makes replay sound: an
//! earlier probe's answer may control whether a later probe happens at all,
//! so validation re-performs the same probes in the same order and stops at
//! the first divergence.

use std::sync::{Arc, Mutex};

use kiln_cache::{CacheEntry, FileFact, Step};

/// The recording frame of one in-flight operation.
///
/// Cloning shares the underlying step list, so a `Builder` handed across
/// threads by the embedder appends to the same frame.
#[derive(Clone)]
pub(crate) struct Frame {
    steps: Arc<Mutex<Vec<Step>>>,
}

impl Frame {
    /// Creates an empty frame.
    pub fn new() -> Self {
        Self {
            steps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Appends an observed file system fact.
    pub fn record_fact(&self, fact: FileFact) {
        self.steps.lock().unwrap().push(Step::Fact(fact));
    }

    /// Appends a completed child operation.
    pub fn record_child(&self, entry: CacheEntry) {
        self.steps.lock().unwrap().push(Step::Child(entry));
    }

    /// Takes the recorded steps, sealing the frame's contents into an
    /// entry. Called once, when the operation completes.
    pub fn take_steps(&self) -> Vec<Step> {
        std::mem::take(&mut *self.steps.lock().unwrap())
    }
}
