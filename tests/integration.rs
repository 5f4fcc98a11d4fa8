//! End-to-end scenarios exercising the public writer facades across real
//! threads: no internals are reached into here, only `write`/`split`/
//! `close`/`blocks` and the wire bytes each variant produces.

use dedupstream::{DedupWriter, FragmentWriter, Mode, SingleStreamWriter};
use rand::{RngCore, SeedableRng};
use std::sync::Once;

const END_OF_STREAM: u64 = u64::MAX;

static LOG_INIT: Once = Once::new();

/// Surfaces the crate's `log` output (worker startup, eviction sweeps,
/// latched errors) under `RUST_LOG=dedupstream=trace cargo test -- --nocapture`.
fn init_logging() {
    LOG_INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Decodes one prefix-varint starting at `*pos`, advancing `*pos` past it.
fn read_varint(bytes: &[u8], pos: &mut usize) -> u64 {
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let byte = bytes[*pos];
        *pos += 1;
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    value
}

/// One decoded record from either wire format: either an inline block's
/// padding amount, or a back-reference's offset.
enum Record {
    Inline { padding: u64 },
    Backref { offset: u64 },
}

fn read_record(bytes: &[u8], pos: &mut usize) -> Option<Record> {
    if *pos >= bytes.len() {
        return None;
    }
    let v = read_varint(bytes, pos);
    if v == END_OF_STREAM {
        None
    } else if v == 0 {
        let padding = read_varint(bytes, pos);
        Some(Record::Inline { padding })
    } else {
        Some(Record::Backref { offset: v })
    }
}

// S1 -- pure duplicate: two identical 4096-byte blocks. Uses a sink wrapper
// that keeps a shared copy of everything written to it, since the writer
// itself takes ownership of the sinks it's constructed with.
#[derive(Clone, Default)]
struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn s1_pure_duplicate_wire_bytes() {
    init_logging();
    let idx = SharedBuf::default();
    let data = SharedBuf::default();
    let mut w = DedupWriter::new(idx.clone(), data.clone(), Mode::Fixed, 4096, 0).unwrap();
    w.write(&vec![0x5Au8; 8192]).unwrap();
    assert_eq!(w.blocks(), 2);
    w.close().unwrap();

    let idx_bytes = idx.0.lock().unwrap().clone();
    let data_bytes = data.0.lock().unwrap().clone();

    let mut pos = 0;
    assert_eq!(read_varint(&idx_bytes, &mut pos), 1); // format
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096); // max_size

    match read_record(&idx_bytes, &mut pos).unwrap() {
        Record::Inline { padding } => assert_eq!(padding, 0),
        Record::Backref { .. } => panic!("first block must be inline"),
    }
    match read_record(&idx_bytes, &mut pos).unwrap() {
        Record::Backref { offset } => assert_eq!(offset, 1),
        Record::Inline { .. } => panic!("second block must be a back-reference"),
    }
    // trailer: sentinel was already consumed by read_record returning None
    // on the *next* call; read it explicitly here instead.
    assert_eq!(read_varint(&idx_bytes, &mut pos), END_OF_STREAM);
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096); // padding: off == 0
    assert_eq!(read_varint(&idx_bytes, &mut pos), 0); // continuation flag
    assert_eq!(pos, idx_bytes.len());

    assert_eq!(data_bytes.len(), 4096);
    assert!(data_bytes.iter().all(|&b| b == 0x5A));
}

// S2 -- no duplicates, non-aligned tail.
#[test]
fn s2_no_duplicates_nonaligned_tail() {
    init_logging();
    let idx = SharedBuf::default();
    let data = SharedBuf::default();
    let mut w = DedupWriter::new(idx.clone(), data.clone(), Mode::Fixed, 4096, 0).unwrap();

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let mut input = vec![0u8; 5000];
    rng.fill_bytes(&mut input);
    w.write(&input).unwrap();
    assert_eq!(w.blocks(), 1);
    w.close().unwrap();

    let idx_bytes = idx.0.lock().unwrap().clone();
    let data_bytes = data.0.lock().unwrap().clone();
    let mut pos = 0;
    assert_eq!(read_varint(&idx_bytes, &mut pos), 1);
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096);
    match read_record(&idx_bytes, &mut pos).unwrap() {
        Record::Inline { padding } => assert_eq!(padding, 0),
        Record::Backref { .. } => panic!("only block must be inline"),
    }
    assert_eq!(read_varint(&idx_bytes, &mut pos), END_OF_STREAM);
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096 - 904);

    assert_eq!(data_bytes.len(), 5000);
    assert_eq!(data_bytes, input);
}

// S3 -- explicit split.
#[test]
fn s3_explicit_split_flushes_a_real_block_and_leaves_the_rest_as_tail() {
    init_logging();
    let idx = SharedBuf::default();
    let data = SharedBuf::default();
    let mut w = DedupWriter::new(idx.clone(), data.clone(), Mode::Fixed, 4096, 0).unwrap();

    let a = vec![0x11u8; 100];
    let b = vec![0x22u8; 100];
    w.write(&a).unwrap();
    w.split().unwrap();
    w.write(&b).unwrap();
    assert_eq!(w.blocks(), 1, "b is still buffered, not yet a block");
    w.close().unwrap();

    let data_bytes = data.0.lock().unwrap().clone();
    let mut expected = a.clone();
    expected.extend_from_slice(&b);
    assert_eq!(data_bytes, expected);

    let idx_bytes = idx.0.lock().unwrap().clone();
    let mut pos = 0;
    read_varint(&idx_bytes, &mut pos); // format
    read_varint(&idx_bytes, &mut pos); // max_size
    match read_record(&idx_bytes, &mut pos).unwrap() {
        Record::Inline { padding } => assert_eq!(padding, 4096 - 100),
        Record::Backref { .. } => panic!("a must be inline"),
    }
    assert_eq!(read_varint(&idx_bytes, &mut pos), END_OF_STREAM);
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096 - 100);
}

// S4 -- distance eviction (format 2).
#[test]
fn s4_single_stream_distance_eviction_forces_a_fresh_inline_copy() {
    init_logging();
    let sink = SharedBuf::default();
    let mut w =
        SingleStreamWriter::new(sink.clone(), Mode::Fixed, 512, 2048 /* max_blocks = 4 */)
            .unwrap();

    let block_a = vec![0xAAu8; 512];
    w.write(&block_a).unwrap();
    for tag in 1..=5u8 {
        w.write(&vec![tag; 512]).unwrap();
    }
    w.write(&block_a).unwrap(); // distance back to the first A is 6 > 4
    assert_eq!(w.blocks(), 7);
    w.close().unwrap();

    let bytes = sink.0.lock().unwrap().clone();
    let mut pos = 0;
    assert_eq!(read_varint(&bytes, &mut pos), 2);
    assert_eq!(read_varint(&bytes, &mut pos), 512);
    assert_eq!(read_varint(&bytes, &mut pos), 4);

    for i in 0..7 {
        match read_record(&bytes, &mut pos).unwrap() {
            Record::Inline { padding } => {
                assert_eq!(padding, 0);
                pos += 512; // skip the raw payload
            }
            Record::Backref { .. } => panic!("block {i} unexpectedly encoded as a back-reference"),
        }
    }
    assert_eq!(read_varint(&bytes, &mut pos), END_OF_STREAM);
}

// S5 -- rolling-hash determinism.
#[test]
fn s5_rolling_hash_is_deterministic_across_runs() {
    init_logging();
    fn fragment_summary(input: &[u8]) -> Vec<(usize, [u8; 20])> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut w = FragmentWriter::new(tx, Mode::Dynamic, 4096).unwrap();
        w.write(input).unwrap();
        w.close().unwrap();
        rx.try_iter().map(|f| (f.payload.len(), f.hash)).collect()
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut input = vec![0u8; 64 * 1024];
    rng.fill_bytes(&mut input);

    let a = fragment_summary(&input);
    let b = fragment_summary(&input);
    assert_eq!(a, b, "identical input must produce identical boundaries and digests");

    // every block honors the maxSize ceiling and is never empty
    for (len, _) in &a {
        assert!(*len > 0 && *len <= 4096);
    }
    // reproduces the input exactly when blocks are concatenated in order
    let total: usize = a.iter().map(|(len, _)| len).sum();
    assert_eq!(total, input.len());
}

#[test]
fn s5_rolling_hash_edit_propagation_is_bounded() {
    init_logging();
    fn boundaries(input: &[u8]) -> Vec<usize> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut w = FragmentWriter::new(tx, Mode::Dynamic, 4096).unwrap();
        w.write(input).unwrap();
        w.close().unwrap();
        let mut offset = 0;
        let mut out = Vec::new();
        for f in rx.try_iter() {
            offset += f.payload.len();
            out.push(offset);
        }
        out
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let mut original = vec![0u8; 64 * 1024];
    rng.fill_bytes(&mut original);

    let mut edited = original.clone();
    edited.insert(100, 0xFF);

    let b1 = boundaries(&original);
    let b2 = boundaries(&edited);

    // Far past the insertion point, edited boundaries should track the
    // original ones shifted by exactly the one inserted byte; count how
    // many of the tail boundaries (well beyond the chunker's window) fail
    // to do so and require that to be a small minority.
    let threshold = 100 + 2 * 4096;
    let tail1: Vec<usize> = b1.into_iter().filter(|&p| p > threshold).collect();
    let tail2: Vec<usize> = b2
        .into_iter()
        .filter(|&p| p > threshold)
        .map(|p| p - 1)
        .collect();

    let matching = tail1.iter().zip(tail2.iter()).filter(|(a, b)| a == b).count();
    let total = tail1.len().min(tail2.len());
    assert!(
        total == 0 || matching * 2 >= total,
        "expected most tail boundaries to realign after the insertion window"
    );
}

// S6 -- fragment variant newness.
#[test]
fn s6_fragment_variant_reports_newness_per_digest() {
    init_logging();
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut w = FragmentWriter::new(tx, Mode::Fixed, 512).unwrap();
    w.write(&vec![0x00u8; 512]).unwrap();
    w.write(&vec![0x01u8; 512]).unwrap();
    w.write(&vec![0x00u8; 512]).unwrap();
    w.close().unwrap();

    let fragments: Vec<_> = rx.try_iter().collect();
    let got: Vec<(u64, bool)> = fragments.iter().map(|f| (f.n, f.new)).collect();
    assert_eq!(got, vec![(0, true), (1, true), (2, false)]);
    assert!(rx.try_recv().is_err(), "channel must be closed after close()");
}

// Boundary behaviors around max_size, empty writes, and repeated close().
#[test]
fn max_size_511_is_rejected_and_512_is_accepted() {
    init_logging();
    let err = DedupWriter::new(Vec::new(), Vec::new(), Mode::Fixed, 511, 0).unwrap_err();
    assert!(matches!(err, dedupstream::Error::MaxSizeTooSmall));
    assert!(DedupWriter::new(Vec::new(), Vec::new(), Mode::Fixed, 512, 0).is_ok());
}

#[test]
fn writing_zero_bytes_is_a_noop_and_close_still_emits_header_and_trailer() {
    init_logging();
    let idx = SharedBuf::default();
    let data = SharedBuf::default();
    let mut w = DedupWriter::new(idx.clone(), data, Mode::Fixed, 4096, 0).unwrap();
    w.write(&[]).unwrap();
    assert_eq!(w.blocks(), 0);
    w.close().unwrap();

    let idx_bytes = idx.0.lock().unwrap().clone();
    let mut pos = 0;
    assert_eq!(read_varint(&idx_bytes, &mut pos), 1);
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096);
    assert_eq!(read_varint(&idx_bytes, &mut pos), END_OF_STREAM);
    assert_eq!(read_varint(&idx_bytes, &mut pos), 4096); // off == 0
    assert_eq!(read_varint(&idx_bytes, &mut pos), 0);
}

#[test]
fn close_is_idempotent() {
    init_logging();
    let mut w = DedupWriter::new(Vec::new(), Vec::new(), Mode::Fixed, 4096, 0).unwrap();
    w.write(b"hello").unwrap();
    let first = w.close();
    let second = w.close();
    assert!(first.is_ok());
    assert_eq!(first.is_ok(), second.is_ok());
}
