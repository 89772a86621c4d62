//! Outbound reply chunking.
//!
//! Discord rejects messages over its size limit, so long replies are cut
//! into consecutive fixed-size pieces and sent in order. Splitting is purely
//! positional: no word-boundary awareness, no re-encoding, and concatenating
//! the pieces reproduces the reply exactly.

use crate::channels::{ChannelResult, Transport};

/// Partition `text` into consecutive slices of at most `max_chunk_chars`
/// characters; the final slice may be shorter. Empty input yields no chunks.
///
/// Bounds are counted in characters so a slice never ends mid-codepoint.
pub fn split_text(text: &str, max_chunk_chars: usize) -> Vec<String> {
    let bound = max_chunk_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == bound {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Send `text` to `channel_id` as ordered chunks of at most
/// `max_chunk_chars` characters.
///
/// Fail-fast: if the transport rejects a chunk, the remaining chunks are not
/// sent and the error is returned. Chunks already delivered are not
/// retracted. Returns the number of chunks sent.
pub async fn send_chunked(
    transport: &dyn Transport,
    channel_id: &str,
    text: &str,
    max_chunk_chars: usize,
) -> ChannelResult<usize> {
    let chunks = split_text(text, max_chunk_chars);
    let total = chunks.len();

    for (index, chunk) in chunks.iter().enumerate() {
        if let Err(e) = transport.send_text(channel_id, chunk).await {
            tracing::error!(
                chunk = index,
                total,
                error = %e,
                "Chunk send failed, aborting remainder of reply"
            );
            return Err(e);
        }
    }

    Ok(total)
}
