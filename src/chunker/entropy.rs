//
// Entropy-predictor chunker.
//
// Same boundary rule as the rolling-hash chunker, but the odd/even
// multiplier choice is driven by a per-block byte-frequency histogram
// instead of an order-1 predictor: a "priming" phase fills the histogram
// before any boundary is considered, then a second phase checks boundaries
// using the primed histogram's common-byte threshold.
//

use super::Chunker;
use crate::error::Result;
use crate::pool::BlockSink;

const ODD_MULTIPLIER: u32 = 314_159_265;
const EVEN_MULTIPLIER: u32 = 271_828_182;

fn clamp(value: usize, lo: usize, hi: usize) -> usize {
    value.max(lo).min(hi)
}

pub(super) struct EntropyState {
    h: u32,
    hist: Box<[u16; 256]>,
    hist_len: usize,
    min_fragment: usize,
    max_fragment: usize,
    max_hash: u32,
    avg_hist: usize,
}

impl EntropyState {
    pub(super) fn new(max_size: usize) -> Self {
        let min_fragment = clamp(max_size / 32, 512, 65535);
        EntropyState {
            h: 0,
            hist: Box::new([0u16; 256]),
            hist_len: 0,
            min_fragment,
            max_fragment: max_size,
            max_hash: ((4096u64 << 22) / max_size.max(1) as u64) as u32,
            avg_hist: (min_fragment / 255).max(1),
        }
    }

    /// Reset at a boundary: `h`, `hist_len`, and `hist` all clear. Unlike
    /// the rolling chunker's `o1`, the histogram is per-block state, not
    /// cross-block state.
    pub(super) fn reset_on_boundary(&mut self) {
        self.h = 0;
        self.hist_len = 0;
        self.hist.iter_mut().for_each(|slot| *slot = 0);
    }
}

pub(super) fn absorb(chunker: &mut Chunker, bytes: &[u8], sink: &mut dyn BlockSink) -> Result<()> {
    for &c in bytes {
        let state = match &mut chunker.algo {
            super::Algorithm::Entropy(s) => s,
            _ => unreachable!("entropy::absorb called on non-entropy chunker"),
        };

        chunker.cur[chunker.off] = c;
        chunker.off += 1;

        if state.hist_len < state.min_fragment {
            // Priming phase: fill the histogram. No content-defined boundary
            // check runs here, but the max_fragment ceiling still applies,
            // otherwise a block could grow past max_size before phase 2
            // ever gets a chance to look at it (only possible in practice
            // when min_fragment == max_fragment, the max_size == 512 case).
            state.hist[c as usize] = state.hist[c as usize].saturating_add(1);
            state.hist_len += 1;
            if chunker.off >= state.max_fragment {
                chunker.flush_block(sink)?;
            }
            continue;
        }

        let common = state.hist[c as usize] as usize >= state.avg_hist;
        let mixed = state.h.wrapping_add(c as u32).wrapping_add(1);
        state.h = if common {
            mixed.wrapping_mul(ODD_MULTIPLIER)
        } else {
            mixed.wrapping_mul(EVEN_MULTIPLIER)
        };

        let (min_fragment, max_fragment, max_hash, h) =
            (state.min_fragment, state.max_fragment, state.max_hash, state.h);
        let boundary = (chunker.off >= min_fragment && h < max_hash) || chunker.off >= max_fragment;
        if boundary {
            chunker.flush_block(sink)?;
        }
    }
    Ok(())
}
