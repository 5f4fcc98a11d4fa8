//
// Split-stream writer. Two sinks: an index sink carrying varint framing
// only, and a data sink carrying raw inline payloads with no framing at all.
//
// Eviction here is amortized: this format's back-references are unbounded
// in memory for a reader, so the encoder only needs to bound its *own*
// index memory, and can afford to drop a quarter of it at a time instead of
// enforcing a hard distance bound on every emission.
//

use crate::core::Core;
use crate::error::{Error, Result};
use crate::index::DedupIndex;
use crate::mode::Mode;
use crate::pool::{reclaim, take_completed, Job};
use crate::varint::{write_all_checked, write_varint, END_OF_STREAM};
use crossbeam_channel::{Receiver, Sender};
use std::io::Write;
use std::thread::{self, JoinHandle};

/// Split-stream (format 1) dedup writer: an index sink and a data sink.
pub struct DedupWriter<I, D>
where
    I: Write + Send + 'static,
    D: Write + Send + 'static,
{
    core: Core,
    max_blocks: u64,
    handle: Option<JoinHandle<Result<(I, D)>>>,
    closed: bool,
    close_result: Result<()>,
}

impl<I, D> DedupWriter<I, D>
where
    I: Write + Send + 'static,
    D: Write + Send + 'static,
{
    /// `max_memory == 0` means unbounded back-reference distance (the only
    /// variant where that's allowed).
    pub fn new(mut idx: I, data: D, mode: Mode, max_size: usize, max_memory: u64) -> Result<Self> {
        if max_size < 512 {
            return Err(Error::MaxSizeTooSmall);
        }
        let max_blocks = if max_memory == 0 {
            0
        } else {
            max_memory / max_size as u64
        };

        write_varint(&mut idx, 1)?;
        write_varint(&mut idx, max_size as u64)?;

        let (core, order_rx, pool_tx) = Core::new(mode, max_size)?;
        let handle = spawn_order_writer(order_rx, pool_tx, idx, data, max_size, max_blocks);

        Ok(DedupWriter {
            core,
            max_blocks,
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
        crate::core::mem_use(bytes, self.core.max_size as u64, self.max_blocks)
    }

    /// Idempotent. Flushes the end-of-stream trailer on success; on a
    /// previously or newly latched error, shuts everything down anyway and
    /// returns that error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return self.close_result.clone();
        }
        self.closed = true;

        let off = self.core.chunker_off();
        let tail = self.core.chunker_tail();
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

        let max_size = self.core.max_size;
        self.close_result = match (self.core.latched_error(), joined) {
            (Some(e), _) => Err(e),
            (None, Err(e)) => Err(e),
            (None, Ok((mut idx, mut data))) => {
                write_trailer(&mut idx, &mut data, off, &tail, max_size)
            }
        };
        self.close_result.clone()
    }
}

/// Writes the trailer shared by the split-stream and single-stream formats:
/// sentinel, padding amount, tail bytes, continuation flag (always zero
/// here). The tail's own length (`tail.len()`, which equals `off`) is what
/// `write_all_checked` verifies -- not `max_size - off`, which is easy to
/// get backwards.
fn write_trailer<I: Write, D: Write>(
    idx: &mut I,
    data: &mut D,
    off: usize,
    tail: &[u8],
    max_size: usize,
) -> Result<()> {
    write_varint(idx, END_OF_STREAM)?;
    write_varint(idx, (max_size - off) as u64)?;
    write_all_checked(data, tail)?;
    write_varint(idx, 0)?;
    Ok(())
}

fn spawn_order_writer<I, D>(
    order_rx: Receiver<Job>,
    pool_tx: Sender<Vec<u8>>,
    mut idx: I,
    mut data: D,
    max_size: usize,
    max_blocks: u64,
) -> JoinHandle<Result<(I, D)>>
where
    I: Write + Send + 'static,
    D: Write + Send + 'static,
{
    thread::Builder::new()
        .name("dedupstream-order-writer".to_string())
        .spawn(move || -> Result<(I, D)> {
            let mut index = DedupIndex::new();
            while let Ok(job) = order_rx.recv() {
                let slot = take_completed(job)?;
                let digest = *slot.digest.lock();
                let n = slot.n;
                match index.get(&digest) {
                    Some(m) => {
                        let offset = n
                            .checked_sub(m)
                            .filter(|&o| o > 0)
                            .ok_or(Error::NegativeOffset)?;
                        write_varint(&mut idx, offset)?;
                    }
                    None => {
                        write_varint(&mut idx, 0)?;
                        write_varint(&mut idx, (max_size - slot.data.len()) as u64)?;
                        write_all_checked(&mut data, &slot.data)?;
                    }
                }
                index.insert(digest, n);
                index.evict_amortized(max_blocks);
                let buf = reclaim(slot.data, max_size);
                let _ = pool_tx.send(buf);
            }
            Ok((idx, data))
        })
        .expect("failed to spawn ordering writer thread")
}
