//! Document walkers
//!
//! Two implementations of one capability: the in-memory walker parses the
//! whole document into a tree before walking it, the streaming walker drives
//! the statistics straight from parser events. The caller picks one once,
//! from the input size, with [`walker_for_size`].

mod collector;
mod in_memory;
mod streaming;

use std::io::BufRead;

pub use collector::{CaptureLimits, StatsCollector};
pub use in_memory::InMemoryWalker;
pub use streaming::StreamingWalker;

use crate::cancel::CancellationFlag;
use crate::error::Result;
use crate::model::{StructureSummary, WalkMode};

/// Size and capture bounds shared by both walkers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkerLimits {
    /// Inputs larger than this are streamed
    pub large_file_threshold_bytes: u64,
    /// In-memory walk stops (truncates) past this depth
    pub max_depth_in_memory: usize,
    /// In-memory walk stops (truncates) past this many elements
    pub max_elements_in_memory: usize,
    /// Streaming walk fails with `TooLarge` past this many elements
    pub max_elements_streaming: usize,
    pub capture: CaptureLimits,
}

impl Default for WalkerLimits {
    fn default() -> Self {
        Self {
            large_file_threshold_bytes: 10 * 1024 * 1024,
            max_depth_in_memory: 1_000,
            max_elements_in_memory: 100_000,
            max_elements_streaming: 10_000_000,
            capture: CaptureLimits::default(),
        }
    }
}

/// Builds a [`StructureSummary`] from a byte source
pub trait Walker: Send + Sync {
    fn mode(&self) -> WalkMode;

    fn analyze(
        &self,
        source: &mut dyn BufRead,
        cancel: &CancellationFlag,
    ) -> Result<StructureSummary>;
}

/// Pick the walker for an input of `size` bytes
pub fn walker_for_size(size: u64, limits: WalkerLimits) -> Box<dyn Walker> {
    if size > limits.large_file_threshold_bytes {
        walker_for_mode(WalkMode::Streaming, limits)
    } else {
        walker_for_mode(WalkMode::InMemory, limits)
    }
}

pub fn walker_for_mode(mode: WalkMode, limits: WalkerLimits) -> Box<dyn Walker> {
    match mode {
        WalkMode::InMemory => Box::new(InMemoryWalker::new(limits)),
        WalkMode::Streaming => Box::new(StreamingWalker::new(limits)),
    }
}

/// Convenience for analysing a string already in memory
pub fn analyze_str(
    input: &str,
    mode: WalkMode,
    limits: WalkerLimits,
) -> Result<StructureSummary> {
    let walker = walker_for_mode(mode, limits);
    let mut source = input.as_bytes();
    walker.analyze(&mut source, &CancellationFlag::new())
}
