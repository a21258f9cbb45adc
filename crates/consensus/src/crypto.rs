//! BLS multi-signatures (blst, min_pk variant)
//!
//! Public keys live in G1 (48 bytes), signatures in G2 (96 bytes), so
//! aggregating a shard's keys stays cheap.

use crate::error::CryptoError;
use crate::types::{PublicKey, Signature};
use blst::min_pk::{
    AggregatePublicKey, AggregateSignature, PublicKey as BlsPublicKey, SecretKey,
    Signature as BlsSignature,
};
use blst::BLST_ERROR;

/// Domain separation tag for co-signatures
pub const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Key aggregation and aggregate signature verification
pub trait MultiSig: Send + Sync {
    /// Aggregate `keys` into one key. `None` for an empty or invalid set.
    fn aggregate_public_keys(&self, keys: &[PublicKey]) -> Option<PublicKey>;

    /// Verify `signature` over `message` under `key`
    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool;
}

/// [`MultiSig`] backed by blst
#[derive(Debug, Clone, Copy, Default)]
pub struct BlsMultiSig;

impl MultiSig for BlsMultiSig {
    fn aggregate_public_keys(&self, keys: &[PublicKey]) -> Option<PublicKey> {
        if keys.is_empty() {
            return None;
        }

        let parsed = keys
            .iter()
            .map(|key| BlsPublicKey::from_bytes(&key.0).ok())
            .collect::<Option<Vec<_>>>()?;
        let refs: Vec<&BlsPublicKey> = parsed.iter().collect();

        match AggregatePublicKey::aggregate(&refs, true) {
            Ok(aggregate) => Some(PublicKey(aggregate.to_public_key().compress())),
            Err(e) => {
                tracing::debug!("Public key aggregation rejected: {:?}", e);
                None
            }
        }
    }

    fn verify(&self, message: &[u8], signature: &Signature, key: &PublicKey) -> bool {
        let Ok(sig) = BlsSignature::from_bytes(&signature.0) else {
            return false;
        };
        let Ok(pk) = BlsPublicKey::from_bytes(&key.0) else {
            return false;
        };

        matches!(
            sig.verify(true, message, DST, &[], &pk, true),
            BLST_ERROR::BLST_SUCCESS
        )
    }
}

/// A BLS signing key with its public key
#[derive(Clone)]
pub struct BlsKeypair {
    secret: SecretKey,
    public: PublicKey,
}

impl BlsKeypair {
    /// Derive a keypair from 32 bytes of input key material
    pub fn from_ikm(ikm: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::key_gen(ikm, &[])
            .map_err(|e| CryptoError::KeyGeneration(format!("{:?}", e)))?;
        let public = PublicKey(secret.sk_to_pk().compress());
        Ok(Self { secret, public })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.secret.sign(message, DST, &[]).compress())
    }
}

/// Aggregate individual signatures into one co-signature
pub fn aggregate_signatures(signatures: &[Signature]) -> Result<Signature, CryptoError> {
    let parsed = signatures
        .iter()
        .map(|sig| BlsSignature::from_bytes(&sig.0))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CryptoError::Aggregation(format!("{:?}", e)))?;
    let refs: Vec<&BlsSignature> = parsed.iter().collect();

    let aggregate = AggregateSignature::aggregate(&refs, true)
        .map_err(|e| CryptoError::Aggregation(format!("{:?}", e)))?;
    Ok(Signature(aggregate.to_signature().compress()))
}
