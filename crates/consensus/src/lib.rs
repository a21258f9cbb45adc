//! Shard fallback consensus
//!
//! When the DS committee stalls, a shard elects an interim leader and
//! co-signs a fallback block. This crate verifies such blocks and moves
//! the node's DS committee over to the elected shard:
//! - Co-signature verification against a >2/3 quorum of the shard
//! - DS committee reconstitution with the leader in front
//! - Readiness gate for blocks that arrive before the node expects them
//! - Post-fallback cleanup and the next fallback timeout

pub mod bitvec;
pub mod committee;
pub mod cosign;
pub mod crypto;
pub mod error;
pub mod message;
pub mod processor;
pub mod quorum;
pub mod services;
pub mod shard;
pub mod state;
pub mod timer;
pub mod types;
pub mod verifier;


pub use committee::CommitteeStore;
pub use cosign::cosign_fallback_block;
pub use crypto::{BlsKeypair, BlsMultiSig, MultiSig};
pub use error::{CoSignatureError, CryptoError, ErrorKind, FallbackError};
pub use message::{decode_fallback_block, encode_fallback_message, MESSAGE_BODY_OFFSET};
pub use processor::{FallbackOutcome, FallbackProcessor, FallbackProcessorBuilder};
pub use quorum::required_quorum;
pub use services::{LedgerView, NodeServices, RoundEntry, TransactionBookkeeping};
pub use shard::ShardDirectory;
pub use state::{FallbackSignal, NodeState};
pub use timer::{FallbackTimeout, FallbackTimer};
pub use types::*;
pub use verifier::CoSignatureVerifier;
