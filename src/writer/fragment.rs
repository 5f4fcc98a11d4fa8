//
// Fragment writer: no wire framing at all. Each block becomes a structured
// `Fragment` sent over a channel, carrying an owned copy of its payload
// (the block envelope itself gets recycled back to the pool, so the
// fragment can't just borrow it).
//
// The index here is used purely as a set of seen digests, never evicted,
// which means unbounded memory over a long enough stream. Nothing else
// about this variant needs a distance bound: there's no back-reference
// encoding to keep inside a window.
//

use crate::core::Core;
use crate::error::{Error, Result};
use crate::index::DedupIndex;
use crate::mode::Mode;
use crate::pool::{reclaim, take_completed, Job};
use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};

/// One block's worth of output for the fragment variant.
#[derive(Debug, Clone)]
pub struct Fragment {
    /// The block's 20-byte content digest.
    pub hash: [u8; 20],
    /// An owned copy of the block's bytes.
    pub payload: Vec<u8>,
    /// `true` iff this digest had not been seen before this block.
    pub new: bool,
    /// 0-origin ordinal assigned by this writer; distinct from the block's
    /// internal 1-origin sequence number.
    pub n: u64,
}

/// Fragment writer: emits [`Fragment`] records over a channel instead of
/// writing framed bytes to a sink.
pub struct FragmentWriter {
    core: Core,
    handle: Option<JoinHandle<Result<()>>>,
    closed: bool,
    close_result: Result<()>,
}

impl FragmentWriter {
    pub fn new(fragment_tx: Sender<Fragment>, mode: Mode, max_size: usize) -> Result<Self> {
        if max_size < 512 {
            return Err(Error::MaxSizeTooSmall);
        }
        let (core, order_rx, pool_tx) = Core::new(mode, max_size)?;
        let handle = spawn_order_writer(order_rx, pool_tx, fragment_tx, max_size);

        Ok(FragmentWriter {
            core,
            handle: Some(handle),
            closed: false,
            close_result: Ok(()),
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        self.core.write(bytes)
    }

    pub fn split(&mut self) -> Result<()> {
        self.core.split()
    }

    pub fn blocks(&self) -> u64 {
        self.core.blocks()
    }

    pub fn mem_use(&self, bytes: u64) -> (i64, i64) {
        crate::core::mem_use(bytes, self.core.max_size as u64, 0)
    }

    /// Idempotent. Flushes the current tail as a final block (this
    /// variant's only flush hook) before draining the pipeline and closing
    /// the fragment channel.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return self.close_result.clone();
        }
        self.closed = true;

        let split_result = self.core.split();
        self.core.shutdown();

        let joined = self
            .handle
            .take()
            .expect("close only runs once")
            .join()
            .unwrap_or_else(|_| {
                Err(Error::Internal(
                    "ordering writer thread panicked".to_string(),
                ))
            });

        self.close_result = match (self.core.latched_error(), split_result, joined) {
            (Some(e), _, _) => Err(e),
            (None, Err(e), _) => Err(e),
            (None, Ok(()), Err(e)) => Err(e),
            (None, Ok(()), Ok(())) => Ok(()),
        };
        self.close_result.clone()
    }
}

fn spawn_order_writer(
    order_rx: Receiver<Job>,
    pool_tx: Sender<Vec<u8>>,
    fragment_tx: Sender<Fragment>,
    max_size: usize,
) -> JoinHandle<Result<()>> {
    thread::Builder::new()
        .name("dedupstream-order-writer".to_string())
        .spawn(move || -> Result<()> {
            let mut index = DedupIndex::new();
            let mut ordinal: u64 = 0;
            while let Ok(job) = order_rx.recv() {
                let slot = take_completed(job)?;
                let digest = *slot.digest.lock();

                let new = index.get(&digest).is_none();
                if new {
                    index.insert(digest, 0);
                }

                let fragment = Fragment {
                    hash: digest,
                    payload: slot.data.clone(),
                    new,
                    n: ordinal,
                };
                ordinal += 1;
                if fragment_tx.send(fragment).is_err() {
                    // Receiver dropped: nothing left to do with further
                    // blocks, but still drain the queue so upstream stages
                    // don't deadlock against a full order queue.
                    let buf = reclaim(slot.data, max_size);
                    let _ = pool_tx.send(buf);
                    continue;
                }
                let buf = reclaim(slot.data, max_size);
                let _ = pool_tx.send(buf);
            }
            Ok(())
        })
        .expect("failed to spawn ordering writer thread")
}
