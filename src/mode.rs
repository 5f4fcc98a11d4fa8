//
// Chunker mode selection.
//

use crate::error::Error;

/// Selects which of the three chunking strategies a writer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fixed-size blocks.
    Fixed = 0,
    /// Rolling-hash, ZPAQ-style order-1 predictor.
    Dynamic = 1,
    /// Entropy-predictor, order-1 byte histogram.
    DynamicEntropy = 2,
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(Mode::Fixed),
            1 => Ok(Mode::Dynamic),
            2 => Ok(Mode::DynamicEntropy),
            other => Err(Error::UnknownMode(other)),
        }
    }
}
