//
// Fixed-size chunker. Emits a block every time `off` reaches `max_size`;
// no boundary-detection state of its own.
//

use super::Chunker;
use crate::error::Result;
use crate::pool::BlockSink;

pub(super) fn absorb(chunker: &mut Chunker, bytes: &[u8], sink: &mut dyn BlockSink) -> Result<()> {
    let mut pos = 0;
    while pos < bytes.len() {
        let room = chunker.max_size - chunker.off;
        let take = room.min(bytes.len() - pos);
        chunker.cur[chunker.off..chunker.off + take].copy_from_slice(&bytes[pos..pos + take]);
        chunker.off += take;
        pos += take;
        if chunker.off == chunker.max_size {
            chunker.flush_block(sink)?;
        }
    }
    Ok(())
}
