//
// Hash worker pool: computes the content digest for each block in parallel.
//
// SHA-1 is fixed as the on-wire digest identity (20 bytes, interoperable
// with readers); its cryptographic weaknesses are irrelevant here since the
// use case is content-integrity dedup, not adversarial resistance.
//

use crate::pool::{Job, DIGEST_LEN};
use crossbeam_channel::Receiver;
use sha1::{Digest as _, Sha1};
use std::thread::{self, JoinHandle};

pub(crate) fn digest_of(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&result);
    out
}

/// Spawns `count` worker threads that drain `rx` until it disconnects.
/// `rx` is a `crossbeam_channel::Receiver`, which is a multi-consumer
/// handle: cloning it and handing each clone to its own thread is exactly
/// how a pool fans work out over a single queue.
pub(crate) fn spawn_workers(count: usize, rx: Receiver<Job>) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let rx = rx.clone();
            thread::Builder::new()
                .name(format!("dedupstream-hash-{id}"))
                .spawn(move || worker_loop(rx))
                .expect("failed to spawn hash worker thread")
        })
        .collect()
}

fn worker_loop(rx: Receiver<Job>) {
    log::trace!("hash worker starting");
    while let Ok(job) = rx.recv() {
        let digest = digest_of(&job.slot.data);
        *job.slot.digest.lock() = digest;
        let Job { slot, latch } = job;
        // Drop this clone before signalling: the ordering writer's
        // `Arc::try_unwrap` after `latch.wait()` depends on this being the
        // last surviving clone besides its own.
        drop(slot);
        latch.signal();
    }
    log::trace!("hash worker exiting, queue closed");
}
