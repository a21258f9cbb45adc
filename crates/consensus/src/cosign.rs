//! Two-round co-signing of a fallback block
//!
//! Round one signs the header and yields CS1/B1. Round two signs
//! `header || CS1 || B1` and yields CS2/B2, which is what receivers verify.

use crate::bitvec::MAX_BIT_VECTOR_LEN;
use crate::crypto::{aggregate_signatures, BlsKeypair};
use crate::error::CryptoError;
use crate::types::{final_round_message, FallbackBlock, FallbackBlockHeader, Signature};

/// Co-sign `header` with the given (shard index, keypair) signers.
pub fn cosign_fallback_block(
    header: FallbackBlockHeader,
    shard_size: usize,
    round_one: &[(usize, &BlsKeypair)],
    round_two: &[(usize, &BlsKeypair)],
) -> Result<FallbackBlock, CryptoError> {
    if shard_size > MAX_BIT_VECTOR_LEN {
        return Err(CryptoError::ShardTooLarge {
            shard_size,
            max: MAX_BIT_VECTOR_LEN,
        });
    }

    let header_bytes = header.to_bytes();
    let (cs1, b1) = cosign_round(&header_bytes, shard_size, round_one)?;

    let message = final_round_message(&header, &cs1, &b1);
    let (cs2, b2) = cosign_round(&message, shard_size, round_two)?;

    Ok(FallbackBlock {
        header,
        cs1,
        b1,
        cs2,
        b2,
    })
}

fn cosign_round(
    message: &[u8],
    shard_size: usize,
    signers: &[(usize, &BlsKeypair)],
) -> Result<(Signature, Vec<bool>), CryptoError> {
    let mut bitmap = vec![false; shard_size];
    let mut signatures = Vec::with_capacity(signers.len());

    for (index, keypair) in signers {
        let slot = bitmap.get_mut(*index).ok_or(CryptoError::SignerOutOfRange {
            index: *index,
            shard_size,
        })?;
        *slot = true;
        signatures.push(keypair.sign(message));
    }

    Ok((aggregate_signatures(&signatures)?, bitmap))
}
