//! Fallback block message framing
//!
//! `[MSG_TYPE_NODE, NODE_INSTRUCTION_FALLBACK_BLOCK] || borsh(FallbackBlock)`.
//! Dispatchers strip the two type bytes and hand the body offset to the
//! fallback processor.

use crate::bitvec::MAX_BIT_VECTOR_LEN;
use crate::error::FallbackError;
use crate::types::FallbackBlock;

/// Offset of the block body within a framed message
pub const MESSAGE_BODY_OFFSET: usize = 2;

/// Message type byte of messages addressed to shard nodes
pub const MSG_TYPE_NODE: u8 = 0x02;

/// Node instruction byte of a fallback block
pub const NODE_INSTRUCTION_FALLBACK_BLOCK: u8 = 0x09;

/// Frame a fallback block for sending to shard and lookup nodes
pub fn encode_fallback_message(block: &FallbackBlock) -> Vec<u8> {
    let body = block.to_bytes();
    let mut message = Vec::with_capacity(MESSAGE_BODY_OFFSET + body.len());
    message.push(MSG_TYPE_NODE);
    message.push(NODE_INSTRUCTION_FALLBACK_BLOCK);
    message.extend_from_slice(&body);
    message
}

/// Decode the fallback block starting at `offset`. Trailing bytes are an error.
pub fn decode_fallback_block(
    message: &[u8],
    offset: usize,
) -> Result<FallbackBlock, FallbackError> {
    let body = message
        .get(offset..)
        .ok_or(FallbackError::OffsetOutOfRange {
            offset,
            len: message.len(),
        })?;

    let block = FallbackBlock::from_bytes(body)?;

    for bits in [&block.b1, &block.b2] {
        if bits.len() > MAX_BIT_VECTOR_LEN {
            return Err(FallbackError::BitVectorTooLong {
                len: bits.len(),
                max: MAX_BIT_VECTOR_LEN,
            });
        }
    }

    Ok(block)
}
