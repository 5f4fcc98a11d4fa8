//
// The ordering writer plus the three public writer facades that each embed a
// [`crate::core::Core`]. Each submodule
// owns one variant's order-queue thread body and close-time trailer logic;
// the pipeline machinery (chunker, pool, hash workers, block envelopes) is
// identical across all three and lives entirely in `core`.
//

pub mod fragment;
pub mod single;
pub mod split;

pub use fragment::{Fragment, FragmentWriter};
pub use single::SingleStreamWriter;
pub use split::DedupWriter;
