//! Quorum sizing for shard co-signatures

/// Minimum signer count for a co-signature over `total_members`:
/// strictly more than two thirds.
pub fn required_quorum(total_members: usize) -> usize {
    (total_members * 2 / 3) + 1
}

/// Whether `signers` out of `total_members` reach quorum
pub fn has_quorum(signers: usize, total_members: usize) -> bool {
    signers >= required_quorum(total_members)
}
