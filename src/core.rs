//
// Shared coordinator infrastructure: chunker, pool, hash/order queues, hash
// worker pool, and the `nblocks`/latched-error mutex. The three public
// writer facades
// (`writer::split::DedupWriter`, `writer::single::SingleStreamWriter`,
// `writer::fragment::FragmentWriter`) each embed one `Core` and supply
// their own order-queue receiver, writer thread, and close-time trailer
// logic.
//

use crate::chunker::Chunker;
use crate::error::{Error, Result};
use crate::hash::spawn_workers;
use crate::mode::Mode;
use crate::pool::{bufmul, new_pool, BlockSink, Job, Latch, Slot};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

pub(crate) struct Shared {
    pub nblocks: Mutex<u64>,
    pub error: Mutex<Option<Error>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            // 1-origin block numbers: nblocks is the *next* number to hand
            // out, so blocks() == nblocks - 1 starts at 0.
            nblocks: Mutex::new(1),
            error: Mutex::new(None),
        }
    }
}

pub(crate) struct Core {
    pub max_size: usize,
    // `None` only during the brief window inside `Core::new` before the
    // first buffer is acquired from the pool; always `Some` afterward.
    chunker: Option<Chunker>,
    pool_rx: crossbeam_channel::Receiver<Vec<u8>>,
    // Both `None` after `shutdown` runs; dropping them is what lets the
    // hash workers and the ordering writer notice their queues closed.
    hash_tx: Option<Sender<Job>>,
    order_tx: Option<Sender<Job>>,
    hash_threads: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl Core {
    /// Builds the shared infrastructure: buffer pool, hash worker pool, and
    /// an initial chunker. Returns the `Core` plus the order-queue receiver
    /// and the pool's release `Sender`, both of which the caller hands to
    /// its own ordering-writer thread.
    pub(crate) fn new(
        mode: Mode,
        max_size: usize,
    ) -> Result<(Core, crossbeam_channel::Receiver<Job>, Sender<Vec<u8>>)> {
        if max_size < 512 {
            return Err(Error::MaxSizeTooSmall);
        }
        let ncpu = num_cpus::get().max(1);
        let capacity = ncpu * bufmul(max_size);
        let (pool_tx, pool_rx) = new_pool(max_size, capacity);
        let (hash_tx, hash_rx) = crossbeam_channel::bounded(capacity);
        let (order_tx, order_rx) = crossbeam_channel::bounded(capacity);
        let hash_threads = spawn_workers(ncpu, hash_rx);
        log::debug!(
            "dedupstream core started: max_size={max_size} ncpu={ncpu} pool_capacity={capacity}"
        );

        let shared = Arc::new(Shared::new());
        let mut core = Core {
            max_size,
            chunker: None,
            pool_rx,
            hash_tx: Some(hash_tx),
            order_tx: Some(order_tx),
            hash_threads,
            shared,
        };
        let chunker = Chunker::new(mode, max_size, &mut core)?;
        core.chunker = Some(chunker);
        Ok((core, order_rx, pool_tx))
    }

    pub(crate) fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.check_latched_error()?;
        let mut chunker = self.chunker.take().expect("chunker always present");
        let result = chunker.write(bytes, self);
        self.chunker = Some(chunker);
        match result {
            Ok(()) => Ok(bytes.len()),
            Err(e) => {
                self.latch_error(e.clone());
                Err(e)
            }
        }
    }

    pub(crate) fn split(&mut self) -> Result<()> {
        self.check_latched_error()?;
        let mut chunker = self.chunker.take().expect("chunker always present");
        let result = chunker.split(self);
        self.chunker = Some(chunker);
        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                self.latch_error(e.clone());
                Err(e)
            }
        }
    }

    pub(crate) fn blocks(&self) -> u64 {
        *self.shared.nblocks.lock() - 1
    }

    pub(crate) fn chunker_off(&self) -> usize {
        self.chunker.as_ref().expect("chunker always present").off()
    }

    pub(crate) fn chunker_tail(&self) -> Vec<u8> {
        self.chunker
            .as_ref()
            .expect("chunker always present")
            .tail()
            .to_vec()
    }

    pub(crate) fn check_latched_error(&self) -> Result<()> {
        if let Some(e) = self.shared.error.lock().clone() {
            return Err(e);
        }
        Ok(())
    }

    pub(crate) fn latch_error(&self, e: Error) {
        let mut slot = self.shared.error.lock();
        if slot.is_none() {
            log::warn!("dedupstream core latching fatal error: {e}");
            *slot = Some(e);
        }
    }

    pub(crate) fn latched_error(&self) -> Option<Error> {
        self.shared.error.lock().clone()
    }

    /// Drops both queue senders, which unblocks the hash workers' and the
    /// ordering writer's `recv` calls once they drain whatever is already
    /// queued, then joins the hash workers. Idempotent: a second call finds
    /// both senders already gone and an empty thread list.
    pub(crate) fn shutdown(&mut self) {
        self.hash_tx.take();
        self.order_tx.take();
        for handle in std::mem::take(&mut self.hash_threads) {
            let _ = handle.join();
        }
    }
}

impl BlockSink for Core {
    fn acquire(&mut self) -> Result<Vec<u8>> {
        self.pool_rx
            .recv()
            .map_err(|_| Error::Internal("buffer pool closed unexpectedly".to_string()))
    }

    fn emit(&mut self, data: Vec<u8>) -> Result<()> {
        let n = {
            let mut guard = self.shared.nblocks.lock();
            let n = *guard;
            *guard += 1;
            n
        };
        let slot = Arc::new(Slot {
            data,
            digest: Mutex::new([0u8; crate::pool::DIGEST_LEN]),
            n,
        });
        let latch = Arc::new(Latch::new());
        let hash_job = Job {
            slot: slot.clone(),
            latch: latch.clone(),
        };
        let order_job = Job { slot, latch };
        self.hash_tx
            .as_ref()
            .ok_or_else(|| Error::Internal("hash queue closed unexpectedly".to_string()))?
            .send(hash_job)
            .map_err(|_| Error::Internal("hash queue closed unexpectedly".to_string()))?;
        self.order_tx
            .as_ref()
            .ok_or_else(|| Error::Internal("order queue closed unexpectedly".to_string()))?
            .send(order_job)
            .map_err(|_| Error::Internal("order queue closed unexpectedly".to_string()))?;
        Ok(())
    }
}

/// Estimates encoder/decoder memory footprint for a given input size; not a
/// runtime measurement.
pub fn mem_use(bytes: u64, max_size: u64, max_blocks: u64) -> (i64, i64) {
    let mut blocks = bytes.div_ceil(max_size.max(1));
    if max_blocks > 0 {
        blocks = blocks.min(max_blocks);
    }
    let decoder_bytes = blocks.saturating_mul(max_size);
    let per_entry = 20u64 + 8 + 24;
    let encoder_bytes = blocks.saturating_mul(per_entry);
    (
        encoder_bytes.min(i64::MAX as u64) as i64,
        decoder_bytes.min(i64::MAX as u64) as i64,
    )
}
