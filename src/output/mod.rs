//! Presentation of probe results

mod console;

pub use console::{render, ConsoleSink};

use crate::models::ProbeResult;

/// Receives every completed probe, in completion order
pub trait ResultSink: Send {
    fn record(&mut self, result: &ProbeResult);
}

/// Collects results in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub results: Vec<ProbeResult>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn record(&mut self, result: &ProbeResult) {
        self.results.push(result.clone());
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    fn record(&mut self, result: &ProbeResult) {
        (**self).record(result);
    }
}
