//! Mock sensor and trigger for testing.
//!
//! [`MockSource`] replays a script of readings and failures; [`MockTrigger`]
//! records every call and can be told to fail. Both expose shared handles
//! so tests can inspect them after handing ownership to a
//! [`Sampler`](crate::Sampler).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::presence::Transition;
use crate::source::SampleSource;
use crate::trigger::RecordingTrigger;

/// One scripted read.
#[derive(Debug)]
pub enum MockRead {
    Value(i64),
    Transient(&'static str),
    Hardware(&'static str),
}

/// A sample source that replays a script.
///
/// When the script runs out, reads fail with [`Error::Hardware`], which
/// ends a sampling loop.
#[derive(Debug)]
pub struct MockSource {
    script: VecDeque<MockRead>,
    reads: Arc<AtomicU32>,
    released: Arc<AtomicBool>,
    release_count: Arc<AtomicU32>,
}

impl MockSource {
    /// Replay `values`, then fail.
    pub fn new(values: Vec<i64>) -> Self {
        Self::with_script(values.into_iter().map(MockRead::Value).collect())
    }

    /// Replay an arbitrary script of values and failures.
    pub fn with_script(script: Vec<MockRead>) -> Self {
        Self {
            script: script.into(),
            reads: Arc::new(AtomicU32::new(0)),
            released: Arc::new(AtomicBool::new(false)),
            release_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Set once [`SampleSource::release`] has been called.
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    /// How many times the source was released.
    pub fn release_count(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.release_count)
    }

    /// Number of reads attempted so far.
    pub fn read_count(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.reads)
    }
}

#[async_trait]
impl SampleSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn read(&mut self) -> Result<i64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.script.pop_front() {
            Some(MockRead::Value(v)) => Ok(v),
            Some(MockRead::Transient(msg)) => Err(Error::transient(msg)),
            Some(MockRead::Hardware(msg)) => Err(Error::hardware(msg)),
            None => Err(Error::hardware("mock script exhausted")),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A recording trigger that records calls.
///
/// Clones share the same call log, so keep one clone for assertions.
#[derive(Debug, Clone, Default)]
pub struct MockTrigger {
    calls: Arc<Mutex<Vec<Transition>>>,
    should_fail: Arc<AtomicBool>,
}

impl MockTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail (they are still recorded).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<Transition> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, transition: Transition) -> usize {
        self.calls().iter().filter(|t| **t == transition).count()
    }

    fn record(&self, transition: Transition) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(transition);
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Trigger {
                action: transition.to_string(),
                reason: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordingTrigger for MockTrigger {
    async fn start(&self) -> Result<()> {
        self.record(Transition::Start)
    }

    async fn stop(&self) -> Result<()> {
        self.record(Transition::Stop)
    }
}
