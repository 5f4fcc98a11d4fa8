//
// Buffer pool, plus the block envelope (Slot/Job) and per-buffer completion
// latch that the hashing and ordering stages share.
//
// The pool itself is nothing more than a bounded `crossbeam_channel`
// pre-filled with `capacity` zeroed buffers: acquiring pops one (blocking
// when empty), releasing pushes one back. That single channel is both the
// free list and the backpressure mechanism for the whole pipeline.
//

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

pub(crate) const DIGEST_LEN: usize = 20;
pub(crate) type Digest = [u8; DIGEST_LEN];

/// `bufmul = max(2, 256 KiB / max_size)`.
pub(crate) fn bufmul(max_size: usize) -> usize {
    (262_144 / max_size.max(1)).max(2)
}

/// Creates the buffer pool: a bounded channel pre-populated with `capacity`
/// buffers of `max_size` zeroed bytes. The sender side is handed to the
/// ordering writer (for returning buffers); the receiver side is kept by
/// the coordinator (for acquiring them).
pub(crate) fn new_pool(max_size: usize, capacity: usize) -> (Sender<Vec<u8>>, Receiver<Vec<u8>>) {
    let (tx, rx) = bounded(capacity);
    for _ in 0..capacity {
        tx.send(vec![0u8; max_size])
            .expect("pool channel has room for its own prefill");
    }
    (tx, rx)
}

/// A one-shot signal, created alongside a block and reused for that block's
/// entire lifetime. `signal` is called exactly once per hand-off; `wait`
/// blocks until the matching `signal`.
pub(crate) struct Latch {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Latch {
            ready: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn signal(&self) {
        let mut ready = self.ready.lock();
        *ready = true;
        self.cond.notify_one();
    }

    pub(crate) fn wait(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.cond.wait(&mut ready);
        }
    }
}

/// A block envelope: a buffer on loan from the pool, plus the digest slot
/// a hash worker fills in and the block number assigned at
/// boundary time. `digest` is behind a `Mutex` purely so a single
/// cross-thread write (by the worker) and a single cross-thread read (by
/// the ordering writer, after the latch) are both safe without `unsafe`.
pub(crate) struct Slot {
    pub data: Vec<u8>,
    pub digest: Mutex<Digest>,
    pub n: u64,
}

/// What travels down both the hash queue and the order queue. Both queues
/// receive a clone of the same `Job`; the hash worker drops its `slot`
/// clone *before* signalling the latch, so by the time the ordering writer
/// wakes from `latch.wait()` its own clone is the last one standing and
/// `Arc::try_unwrap` is guaranteed to succeed.
#[derive(Clone)]
pub(crate) struct Job {
    pub slot: Arc<Slot>,
    pub latch: Arc<Latch>,
}

/// Implemented by [`crate::core::Core`]; lets the chunker acquire buffers
/// and hand off completed blocks without knowing about queues or pools
/// directly.
pub(crate) trait BlockSink {
    fn acquire(&mut self) -> Result<Vec<u8>>;
    fn emit(&mut self, data: Vec<u8>) -> Result<()>;
}

/// Reclaims a `Slot` back into a plain buffer, sized back up to capacity,
/// ready to re-enter the pool.
pub(crate) fn reclaim(mut data: Vec<u8>, max_size: usize) -> Vec<u8> {
    data.resize(max_size, 0);
    data
}

/// Waits on `job`'s latch and unwraps its slot. Only valid to call from the
/// ordering writer, and only once per job (the contract the hash worker's
/// drop-before-signal ordering establishes).
pub(crate) fn take_completed(job: Job) -> Result<Slot> {
    job.latch.wait();
    match Arc::try_unwrap(job.slot) {
        Ok(slot) => Ok(slot),
        Err(_) => Err(Error::Internal(
            "slot still shared after latch wait".to_string(),
        )),
    }
}
