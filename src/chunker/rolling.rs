//
// Rolling-hash ("ZPAQ-style") chunker.
//
// An order-1 byte predictor (`o1`) selects which of two odd/even
// multipliers advances the rolling hash `h`. The multipliers are chosen so
// the hash's effective window is roughly the last 32 mispredicted bytes:
// edits earlier than that window don't reshuffle later boundaries.
//

use super::Chunker;
use crate::error::Result;
use crate::pool::BlockSink;

const ODD_MULTIPLIER: u32 = 314_159_265;
const EVEN_MULTIPLIER: u32 = 271_828_182;

pub(super) struct RollingState {
    h: u32,
    c1: u8,
    o1: Box<[u8; 256]>,
    min_fragment: usize,
    max_fragment: usize,
    max_hash: u32,
}

impl RollingState {
    pub(super) fn new(max_size: usize) -> Self {
        RollingState {
            h: 0,
            c1: 0,
            o1: Box::new([0u8; 256]),
            min_fragment: max_size / 64,
            max_fragment: max_size,
            max_hash: ((4096u64 << 22) / max_size.max(1) as u64) as u32,
        }
    }

    /// Reset at a boundary: `h` and `c1` return to zero, but `o1` persists
    /// across blocks.
    pub(super) fn reset_on_boundary(&mut self) {
        self.h = 0;
        self.c1 = 0;
    }
}

pub(super) fn absorb(chunker: &mut Chunker, bytes: &[u8], sink: &mut dyn BlockSink) -> Result<()> {
    for &c in bytes {
        let state = match &mut chunker.algo {
            super::Algorithm::Rolling(s) => s,
            _ => unreachable!("rolling::absorb called on non-rolling chunker"),
        };

        let predicted = c == state.o1[state.c1 as usize];
        let mixed = state.h.wrapping_add(c as u32).wrapping_add(1);
        state.h = if predicted {
            mixed.wrapping_mul(ODD_MULTIPLIER)
        } else {
            mixed.wrapping_mul(EVEN_MULTIPLIER)
        };
        state.o1[state.c1 as usize] = c;
        state.c1 = c;

        chunker.cur[chunker.off] = c;
        chunker.off += 1;

        let (min_fragment, max_fragment, max_hash, h) =
            (state.min_fragment, state.max_fragment, state.max_hash, state.h);
        let boundary = (chunker.off >= min_fragment && h < max_hash) || chunker.off >= max_fragment;
        if boundary {
            chunker.flush_block(sink)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_hash_scales_with_max_size() {
        let small = RollingState::new(4096);
        let large = RollingState::new(65536);
        assert_eq!(small.max_hash, 1 << 22);
        assert_eq!(large.max_hash, (1 << 22) / 16);
    }

    #[test]
    fn test_min_and_max_fragment() {
        let s = RollingState::new(4096);
        assert_eq!(s.min_fragment, 64);
        assert_eq!(s.max_fragment, 4096);
    }
}
