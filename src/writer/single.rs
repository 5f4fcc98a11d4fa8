//
// Single-stream writer. One sink carries both the varint framing and the
// raw inline payloads, interleaved block by block.
//
// The distance bound here is a hard correctness requirement of the wire
// format (a memory-bounded reader can't resolve a back-reference farther
// back than it retains), so unlike the split-stream writer's amortized
// eviction, the index both evicts periodically *and* the emission path
// re-checks the distance bound before trusting a lookup hit.
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

/// Single-stream (format 2) dedup writer.
pub struct SingleStreamWriter<S>
where
    S: Write + Send + 'static,
{
    core: Core,
    max_blocks: u64,
    handle: Option<JoinHandle<Result<S>>>,
    closed: bool,
    close_result: Result<()>,
}

impl<S> SingleStreamWriter<S>
where
    S: Write + Send + 'static,
{
    pub fn new(mut sink: S, mode: Mode, max_size: usize, max_memory: u64) -> Result<Self> {
        if max_size < 512 {
            return Err(Error::MaxSizeTooSmall);
        }
        if max_memory < max_size as u64 {
            return Err(Error::MaxMemoryTooSmall);
        }
        let max_blocks = max_memory / max_size as u64;

        write_varint(&mut sink, 2)?;
        write_varint(&mut sink, max_size as u64)?;
        write_varint(&mut sink, max_blocks)?;

        let (core, order_rx, pool_tx) = Core::new(mode, max_size)?;
        let handle = spawn_order_writer(order_rx, pool_tx, sink, max_size, max_blocks);

        Ok(SingleStreamWriter {
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
            (None, Ok(mut sink)) => write_trailer(&mut sink, off, &tail, max_size),
        };
        self.close_result.clone()
    }
}

fn write_trailer<S: Write>(sink: &mut S, off: usize, tail: &[u8], max_size: usize) -> Result<()> {
    write_varint(sink, END_OF_STREAM)?;
    write_varint(sink, (max_size - off) as u64)?;
    write_all_checked(sink, tail)?;
    write_varint(sink, 0)?;
    Ok(())
}

fn spawn_order_writer<S>(
    order_rx: Receiver<Job>,
    pool_tx: Sender<Vec<u8>>,
    mut sink: S,
    max_size: usize,
    max_blocks: u64,
) -> JoinHandle<Result<S>>
where
    S: Write + Send + 'static,
{
    thread::Builder::new()
        .name("dedupstream-order-writer".to_string())
        .spawn(move || -> Result<S> {
            let mut index = DedupIndex::new();
            while let Ok(job) = order_rx.recv() {
                let slot = take_completed(job)?;
                let digest = *slot.digest.lock();
                let n = slot.n;

                // A hit farther than max_blocks is treated as unseen, not
                // just skipped at eviction time, because the distance bound
                // is a hard correctness requirement here.
                let hit = index
                    .get(&digest)
                    .filter(|&m| n.saturating_sub(m) <= max_blocks);

                match hit {
                    Some(m) => {
                        let offset = n
                            .checked_sub(m)
                            .filter(|&o| o > 0)
                            .ok_or(Error::NegativeOffset)?;
                        write_varint(&mut sink, offset)?;
                    }
                    None => {
                        write_varint(&mut sink, 0)?;
                        write_varint(&mut sink, (max_size - slot.data.len()) as u64)?;
                        write_all_checked(&mut sink, &slot.data)?;
                    }
                }
                index.insert(digest, n);
                if n & 0xFFFF == 0xFFFF {
                    index.evict_by_distance(n, max_blocks);
                }
                let buf = reclaim(slot.data, max_size);
                let _ = pool_tx.send(buf);
            }
            Ok(sink)
        })
        .expect("failed to spawn ordering writer thread")
}
