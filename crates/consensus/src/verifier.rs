//! Fallback block co-signature verification

use crate::bitvec::MAX_BIT_VECTOR_LEN;
use crate::crypto::MultiSig;
use crate::error::CoSignatureError;
use crate::quorum::{has_quorum, required_quorum};
use crate::shard::ShardDirectory;
use crate::types::{FallbackBlock, Member, PublicKey};
use std::sync::Arc;

/// Verifies the final-round co-signature (CS2) of fallback blocks
#[derive(Clone)]
pub struct CoSignatureVerifier {
    shards: ShardDirectory,
    multisig: Arc<dyn MultiSig>,
}

impl CoSignatureVerifier {
    pub fn new(shards: ShardDirectory, multisig: Arc<dyn MultiSig>) -> Self {
        Self { shards, multisig }
    }

    /// `true` when CS2 is a valid quorum co-signature of the block's shard
    pub fn verify(&self, block: &FallbackBlock) -> bool {
        match self.check(block) {
            Ok(()) => true,
            Err(e) => {
                log_failure(&e);
                false
            }
        }
    }

    /// Like [`verify`](Self::verify) but reports why verification failed
    pub fn check(&self, block: &FallbackBlock) -> Result<(), CoSignatureError> {
        let shard_id = block.header.shard_id;
        let members = self
            .shards
            .shard_members(shard_id)
            .ok_or(CoSignatureError::UnknownShard(shard_id))?;
        self.check_against(block, &members)
    }

    /// Verify against an already resolved shard member list
    pub fn check_against(
        &self,
        block: &FallbackBlock,
        members: &[Member],
    ) -> Result<(), CoSignatureError> {
        let b2 = &block.b2;
        if members.len() != b2.len() {
            return Err(CoSignatureError::BitmapSizeMismatch {
                shard_id: block.header.shard_id,
                shard_size: members.len(),
                bitmap_size: b2.len(),
            });
        }

        if block.b1.len() > MAX_BIT_VECTOR_LEN {
            return Err(CoSignatureError::BitVectorTooLong {
                len: block.b1.len(),
                max: MAX_BIT_VECTOR_LEN,
            });
        }

        let keys: Vec<PublicKey> = members
            .iter()
            .zip(b2)
            .filter(|(_, signed)| **signed)
            .map(|(member, _)| member.public_key)
            .collect();

        if !has_quorum(keys.len(), b2.len()) {
            return Err(CoSignatureError::InsufficientSigners {
                signers: keys.len(),
                required: required_quorum(b2.len()),
            });
        }

        let aggregate = self
            .multisig
            .aggregate_public_keys(&keys)
            .ok_or(CoSignatureError::AggregationFailed)?;

        let message = block.final_round_message();
        if !self.multisig.verify(&message, &block.cs2, &aggregate) {
            tracing::warn!("Cosig verification failed. Pubkeys:");
            for key in &keys {
                tracing::warn!("  {}", key);
            }
            return Err(CoSignatureError::SignatureMismatch {
                signers: keys.len(),
            });
        }

        Ok(())
    }
}

/// Structural problems mean our own view is off, so they log louder
pub(crate) fn log_failure(e: &CoSignatureError) {
    match e.kind() {
        crate::error::ErrorKind::Structural => tracing::error!("Co-signature check failed: {}", e),
        _ => tracing::warn!("Co-signature check failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosign::cosign_fallback_block;
    use crate::crypto::{BlsKeypair, BlsMultiSig};
    use crate::types::{FallbackBlockHeader, NetworkAddress, StateRootHash};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shard(n: u8) -> (Vec<BlsKeypair>, Vec<Member>) {
        let keys: Vec<BlsKeypair> = (1..=n)
            .map(|i| BlsKeypair::from_ikm(&[i; 32]).unwrap())
            .collect();
        let members = keys
            .iter()
            .enumerate()
            .map(|(i, kp)| {
                let addr: SocketAddr = format!("127.0.0.1:{}", 5000 + i).parse().unwrap();
                Member::new(kp.public_key(), NetworkAddress::from(addr))
            })
            .collect();
        (keys, members)
    }

    fn header(leader: &Member) -> FallbackBlockHeader {
        FallbackBlockHeader {
            fallback_epoch_no: 11,
            shard_id: 0,
            leader_consensus_id: 0,
            leader_pub_key: leader.public_key,
            leader_network_info: leader.network_address,
            state_root_hash: StateRootHash([5u8; 32]),
        }
    }

    fn signed_block(keys: &[BlsKeypair], members: &[Member], signers: &[usize]) -> FallbackBlock {
        let signing: Vec<(usize, &BlsKeypair)> = signers.iter().map(|&i| (i, &keys[i])).collect();
        cosign_fallback_block(header(&members[0]), members.len(), &signing, &signing).unwrap()
    }

    /// Counts aggregation calls; accepts any signature
    #[derive(Default)]
    struct CountingMultiSig {
        aggregations: AtomicUsize,
    }

    impl MultiSig for CountingMultiSig {
        fn aggregate_public_keys(&self, keys: &[PublicKey]) -> Option<PublicKey> {
            self.aggregations.fetch_add(1, Ordering::SeqCst);
            keys.first().copied()
        }

        fn verify(
            &self,
            _message: &[u8],
            _signature: &crate::types::Signature,
            _key: &PublicKey,
        ) -> bool {
            true
        }
    }

    #[test]
    fn test_quorum_cosignature_verifies() {
        let (keys, members) = shard(4);
        let block = signed_block(&keys, &members, &[0, 1, 2]);
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), Arc::new(BlsMultiSig));

        assert!(verifier.verify(&block));
    }

    #[test]
    fn test_sub_quorum_fails_even_with_valid_signature() {
        let (keys, members) = shard(4);
        let block = signed_block(&keys, &members, &[0, 1]);
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), Arc::new(BlsMultiSig));

        assert_eq!(
            verifier.check(&block),
            Err(CoSignatureError::InsufficientSigners {
                signers: 2,
                required: 3
            })
        );
    }

    #[test]
    fn test_sub_quorum_fails_for_any_size() {
        let multisig = Arc::new(CountingMultiSig::default());
        for n in 1..=12u8 {
            let (_, members) = shard(n);
            let verifier = CoSignatureVerifier::new(
                ShardDirectory::new(vec![members.clone()]),
                multisig.clone(),
            );
            for k in 0..required_quorum(n as usize) {
                let mut b2 = vec![false; n as usize];
                b2.iter_mut().take(k).for_each(|b| *b = true);
                let block = FallbackBlock {
                    header: header(&members[0]),
                    cs1: Default::default(),
                    b1: b2.clone(),
                    cs2: Default::default(),
                    b2,
                };
                assert!(!verifier.verify(&block), "n={} k={}", n, k);
            }
        }
        assert_eq!(multisig.aggregations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bitmap_size_mismatch_fails_before_aggregation() {
        let (keys, members) = shard(4);
        let mut block = signed_block(&keys, &members, &[0, 1, 2, 3]);
        block.b2.push(true);

        let multisig = Arc::new(CountingMultiSig::default());
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), multisig.clone());

        assert!(matches!(
            verifier.check(&block),
            Err(CoSignatureError::BitmapSizeMismatch {
                shard_size: 4,
                bitmap_size: 5,
                ..
            })
        ));
        assert_eq!(multisig.aggregations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_oversized_b1_rejected_without_panicking() {
        let (_, members) = shard(4);
        let block = FallbackBlock {
            header: header(&members[0]),
            cs1: Default::default(),
            b1: vec![true; 70_000],
            cs2: Default::default(),
            b2: vec![true, true, true, false],
        };

        let multisig = Arc::new(CountingMultiSig::default());
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), multisig.clone());

        assert!(!verifier.verify(&block));
        assert_eq!(
            verifier.check(&block),
            Err(CoSignatureError::BitVectorTooLong {
                len: 70_000,
                max: MAX_BIT_VECTOR_LEN,
            })
        );
        assert_eq!(multisig.aggregations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tampered_b1_breaks_signature() {
        let (keys, members) = shard(4);
        let mut block = signed_block(&keys, &members, &[0, 1, 2]);
        block.b1[3] = true;
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), Arc::new(BlsMultiSig));

        assert_eq!(
            verifier.check(&block),
            Err(CoSignatureError::SignatureMismatch { signers: 3 })
        );
    }

    #[test]
    fn test_claimed_signer_who_did_not_sign() {
        let (keys, members) = shard(4);
        let mut block = signed_block(&keys, &members, &[0, 1, 2]);
        // Claim member 3 signed as well
        block.b2[3] = true;
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), Arc::new(BlsMultiSig));

        assert!(!verifier.verify(&block));
    }

    #[test]
    fn test_unknown_shard() {
        let (keys, members) = shard(4);
        let mut block = signed_block(&keys, &members, &[0, 1, 2]);
        block.header.shard_id = 3;
        let verifier =
            CoSignatureVerifier::new(ShardDirectory::new(vec![members]), Arc::new(BlsMultiSig));

        assert_eq!(verifier.check(&block), Err(CoSignatureError::UnknownShard(3)));
    }
}
