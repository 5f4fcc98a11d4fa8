//
// Chunker: three interchangeable boundary-detection strategies sharing the
// `write`/`split` contract, modeled as a variant (no inheritance).
//
// `cur`/`off` are common to all three strategies, so they live on the
// wrapper `Chunker` rather than being duplicated per strategy. Only the
// boundary-detection state (the rolling hash / order-1 predictor / entropy
// histogram) differs, and that lives in `Algorithm`.
//

mod entropy;
mod fixed;
mod rolling;

use crate::error::Result;
use crate::mode::Mode;
use crate::pool::BlockSink;

use entropy::EntropyState;
use rolling::RollingState;

enum Algorithm {
    Fixed,
    Rolling(RollingState),
    Entropy(EntropyState),
}

/// Consumes bytes, emits fully-formed blocks to a [`BlockSink`] as a side
/// effect, and buffers any tail in `cur`.
pub(crate) struct Chunker {
    cur: Vec<u8>,
    off: usize,
    max_size: usize,
    algo: Algorithm,
}

impl Chunker {
    pub(crate) fn new(mode: Mode, max_size: usize, sink: &mut dyn BlockSink) -> Result<Self> {
        let cur = sink.acquire()?;
        let algo = match mode {
            Mode::Fixed => Algorithm::Fixed,
            Mode::Dynamic => Algorithm::Rolling(RollingState::new(max_size)),
            Mode::DynamicEntropy => Algorithm::Entropy(EntropyState::new(max_size)),
        };
        Ok(Chunker {
            cur,
            off: 0,
            max_size,
            algo,
        })
    }

    /// Absorbs all of `bytes`, emitting any number of blocks as a side
    /// effect and leaving any tail in `cur`.
    pub(crate) fn write(&mut self, bytes: &[u8], sink: &mut dyn BlockSink) -> Result<()> {
        match &mut self.algo {
            Algorithm::Fixed => fixed::absorb(self, bytes, sink),
            Algorithm::Rolling(_) => rolling::absorb(self, bytes, sink),
            Algorithm::Entropy(_) => entropy::absorb(self, bytes, sink),
        }
    }

    /// Forcibly emits the current tail, if any, as a (possibly short)
    /// block. A no-op when `off == 0`.
    pub(crate) fn split(&mut self, sink: &mut dyn BlockSink) -> Result<()> {
        if self.off == 0 {
            return Ok(());
        }
        self.flush_block(sink)
    }

    /// Number of bytes currently buffered in `cur`.
    pub(crate) fn off(&self) -> usize {
        self.off
    }

    /// The tail bytes currently buffered in `cur` (used by the trailer
    /// writer at close time, after a final `split`).
    pub(crate) fn tail(&self) -> &[u8] {
        &self.cur[..self.off]
    }

    /// Swaps the filled-to-`off` `cur` out for a freshly acquired buffer,
    /// hands the departing buffer (truncated to `off`) to the sink, and
    /// resets boundary-detection state per the rules of the active
    /// strategy. Shared by all three strategies and by `split`.
    fn flush_block(&mut self, sink: &mut dyn BlockSink) -> Result<()> {
        let mut fresh = sink.acquire()?;
        debug_assert_eq!(fresh.len(), self.max_size);
        std::mem::swap(&mut self.cur, &mut fresh);
        fresh.truncate(self.off);
        self.off = 0;
        match &mut self.algo {
            Algorithm::Fixed => {}
            Algorithm::Rolling(state) => state.reset_on_boundary(),
            Algorithm::Entropy(state) => state.reset_on_boundary(),
        }
        sink.emit(fresh)
    }
}
