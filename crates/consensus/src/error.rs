//! Fallback processing errors

use crate::types::{NetworkAddress, ProtocolState, PublicKey, StateRootHash};
use thiserror::Error;

/// Failure classes. Logging severity and diagnosis depend on the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local state not ready yet
    TransientState,
    /// Undecodable input or out-of-range indices
    Malformed,
    /// Well-formed but stale or inconsistent with our view
    Semantic,
    /// Not enough signers or bad signature
    Cryptographic,
    /// Our own view disagrees with the network
    Structural,
}

/// Co-signature verification errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoSignatureError {
    #[error("shard {0} does not exist")]
    UnknownShard(u32),

    #[error("shard {shard_id} size {shard_size} does not match co-sig bitmap size {bitmap_size}")]
    BitmapSizeMismatch {
        shard_id: u32,
        shard_size: usize,
        bitmap_size: usize,
    },

    #[error("cosig was not generated by enough nodes: {signers} signed, {required} required")]
    InsufficientSigners { signers: usize, required: usize },

    #[error("aggregated key generation failed")]
    AggregationFailed,

    #[error("cosig verification failed over {signers} signers")]
    SignatureMismatch { signers: usize },

    #[error("first-round bitmap of {len} entries exceeds {max}")]
    BitVectorTooLong { len: usize, max: usize },
}

impl CoSignatureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownShard(_) | Self::BitVectorTooLong { .. } => ErrorKind::Malformed,
            Self::BitmapSizeMismatch { .. } | Self::AggregationFailed => ErrorKind::Structural,
            Self::InsufficientSigners { .. } | Self::SignatureMismatch { .. } => {
                ErrorKind::Cryptographic
            }
        }
    }
}

/// Reasons a fallback block is not applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FallbackError {
    #[error("not ready for fallback block after {waited_ms}ms (state {state:?})")]
    NotReady { state: ProtocolState, waited_ms: u64 },

    #[error("message offset {offset} beyond message length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("failed to decode fallback block: {0}")]
    Decode(String),

    #[error("bit vector of {len} bits exceeds {max}")]
    BitVectorTooLong { len: usize, max: usize },

    #[error("wrong fallback block epoch: current {current}, fallback {received}")]
    EpochMismatch { current: u64, received: u64 },

    #[error("shard {shard_id} does not exist ({shard_count} shards known)")]
    UnknownShard { shard_id: u32, shard_count: usize },

    #[error("leader consensus id {leader_consensus_id} out of range for shard of {shard_size}")]
    LeaderIndexOutOfRange {
        leader_consensus_id: u32,
        shard_size: usize,
    },

    #[error("leader {pub_key} at {address} not found in shard")]
    LeaderNotInShard {
        pub_key: PublicKey,
        address: NetworkAddress,
    },

    #[error(
        "leader consensus id {leader_consensus_id} names a different member \
         than the leader at index {position}"
    )]
    LeaderIndexMismatch {
        leader_consensus_id: u32,
        position: usize,
    },

    #[error("state root hash mismatch: expected {expected}, received {received}")]
    StateRootMismatch {
        expected: StateRootHash,
        received: StateRootHash,
    },

    #[error(transparent)]
    CoSignature(#[from] CoSignatureError),

    #[error("epoch {epoch} already fell back to leader {committed}, refusing {received}")]
    Equivocation {
        epoch: u64,
        committed: PublicKey,
        received: PublicKey,
    },
}

impl FallbackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady { .. } => ErrorKind::TransientState,
            Self::OffsetOutOfRange { .. }
            | Self::Decode(_)
            | Self::BitVectorTooLong { .. }
            | Self::UnknownShard { .. }
            | Self::LeaderIndexOutOfRange { .. } => ErrorKind::Malformed,
            Self::EpochMismatch { .. }
            | Self::LeaderNotInShard { .. }
            | Self::LeaderIndexMismatch { .. }
            | Self::StateRootMismatch { .. }
            | Self::Equivocation { .. } => ErrorKind::Semantic,
            Self::CoSignature(e) => e.kind(),
        }
    }
}

impl From<borsh::io::Error> for FallbackError {
    fn from(e: borsh::io::Error) -> Self {
        FallbackError::Decode(e.to_string())
    }
}

/// Key generation and signing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("BLS key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signature aggregation failed: {0}")]
    Aggregation(String),

    #[error("signer index {index} out of range for shard of {shard_size}")]
    SignerOutOfRange { index: usize, shard_size: usize },

    #[error("shard of {shard_size} does not fit a bitmap of at most {max} entries")]
    ShardTooLarge { shard_size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            FallbackError::NotReady {
                state: ProtocolState::Pow,
                waited_ms: 10
            }
            .kind(),
            ErrorKind::TransientState
        );
        assert_eq!(
            FallbackError::from(CoSignatureError::AggregationFailed).kind(),
            ErrorKind::Structural
        );
        assert_eq!(
            FallbackError::from(CoSignatureError::InsufficientSigners {
                signers: 2,
                required: 3
            })
            .kind(),
            ErrorKind::Cryptographic
        );
        assert_eq!(
            FallbackError::from(CoSignatureError::BitVectorTooLong {
                len: 70_000,
                max: 65_535
            })
            .kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            FallbackError::EpochMismatch {
                current: 1,
                received: 2
            }
            .kind(),
            ErrorKind::Semantic
        );
    }

    #[test]
    fn test_error_display() {
        let err = FallbackError::from(CoSignatureError::BitmapSizeMismatch {
            shard_id: 3,
            shard_size: 4,
            bitmap_size: 5,
        });
        assert_eq!(
            err.to_string(),
            "shard 3 size 4 does not match co-sig bitmap size 5"
        );
    }
}
