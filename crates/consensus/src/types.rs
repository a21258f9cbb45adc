//! Core types for shard membership and fallback blocks

use crate::bitvec::BitVector;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Compressed BLS12-381 G1 public key length
pub const PUBLIC_KEY_SIZE: usize = 48;

/// Compressed BLS12-381 G2 signature length
pub const SIGNATURE_SIZE: usize = 96;

/// Serialized length of [`FallbackBlockHeader`]
pub const HEADER_SIZE: usize = 8 + 4 + 4 + PUBLIC_KEY_SIZE + NETWORK_ADDRESS_SIZE + 32;

const NETWORK_ADDRESS_SIZE: usize = 16 + 2;

/// A node's BLS public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

/// An aggregate (or single) BLS signature
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Signature(pub [u8; SIGNATURE_SIZE]);

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_SIZE])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = bs58::encode(&self.0).into_string();
        write!(f, "Signature({}..)", &encoded[..encoded.len().min(12)])
    }
}

/// 32-byte account state trie root
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct StateRootHash(pub [u8; 32]);

impl fmt::Display for StateRootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(&self.0).into_string())
    }
}

impl fmt::Debug for StateRootHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateRootHash({})", self)
    }
}

/// Peer network address. IPv4 addresses are stored IPv6-mapped.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct NetworkAddress {
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetworkAddress {
    pub fn to_socket_addr(&self) -> SocketAddr {
        let v6 = Ipv6Addr::from(self.ip);
        match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), self.port),
            None => SocketAddr::new(IpAddr::V6(v6), self.port),
        }
    }
}

impl From<SocketAddr> for NetworkAddress {
    fn from(addr: SocketAddr) -> Self {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
            IpAddr::V6(v6) => v6.octets(),
        };
        Self {
            ip,
            port: addr.port(),
        }
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_socket_addr())
    }
}

impl fmt::Debug for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkAddress({})", self)
    }
}

/// A shard or DS committee member. Identity is the (key, address) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Member {
    pub public_key: PublicKey,
    pub network_address: NetworkAddress,
}

impl Member {
    pub fn new(public_key: PublicKey, network_address: NetworkAddress) -> Self {
        Self {
            public_key,
            network_address,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.public_key, self.network_address)
    }
}

/// Header of a fallback block. Encodes to exactly [`HEADER_SIZE`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FallbackBlockHeader {
    /// Epoch the fallback was triggered in
    pub fallback_epoch_no: u64,
    /// Shard that elected the interim leader
    pub shard_id: u32,
    /// Index of the leader within the shard
    pub leader_consensus_id: u32,
    pub leader_pub_key: PublicKey,
    pub leader_network_info: NetworkAddress,
    /// State root the shard agreed on
    pub state_root_hash: StateRootHash,
}

impl FallbackBlockHeader {
    /// The elected leader as a committee member
    pub fn leader(&self) -> Member {
        Member::new(self.leader_pub_key, self.leader_network_info)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("FallbackBlockHeader serialization should not fail")
    }
}

/// A fallback block: header plus the two co-signature rounds.
///
/// `b1`/`cs1` come from the first round and are folded into the message
/// signed in the second round; `b2`/`cs2` are the final co-signature.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct FallbackBlock {
    pub header: FallbackBlockHeader,
    pub cs1: Signature,
    pub b1: Vec<bool>,
    pub cs2: Signature,
    pub b2: Vec<bool>,
}

impl FallbackBlock {
    /// Message the final-round co-signers signed
    pub fn final_round_message(&self) -> Vec<u8> {
        final_round_message(&self.header, &self.cs1, &self.b1)
    }

    /// Serialize for network transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("FallbackBlock serialization should not fail")
    }

    /// Deserialize from network
    pub fn from_bytes(data: &[u8]) -> Result<Self, borsh::io::Error> {
        borsh::from_slice(data)
    }
}

/// Builds `header || CS1 || bitvector(B1)`.
///
/// CS1 sits at `HEADER_SIZE` and B1 at `HEADER_SIZE + SIGNATURE_SIZE`;
/// co-signers sign exactly these bytes.
pub fn final_round_message(header: &FallbackBlockHeader, cs1: &Signature, b1: &[bool]) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(HEADER_SIZE + SIGNATURE_SIZE + BitVector::encoded_len(b1.len()));
    message.extend_from_slice(&header.to_bytes());
    debug_assert_eq!(message.len(), HEADER_SIZE);
    message.extend_from_slice(&cs1.0);
    BitVector::write_at(&mut message, HEADER_SIZE + SIGNATURE_SIZE, b1);
    message
}

/// Whether this node participates in shard consensus or only observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Shard participant: runs microblock consensus and PoW
    #[default]
    Full,
    /// Lookup / observer node
    Lookup,
}

/// Node protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Pow,
    TxSubmission,
    MicroblockConsensusPrep,
    MicroblockConsensus,
    WaitingFinalBlock,
    WaitingFallbackBlock,
    FallbackConsensusPrep,
    FallbackConsensus,
    Syncing,
}

/// Configuration for fallback block processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// How long an early fallback block waits for the node to reach
    /// `WaitingFallbackBlock`
    pub fallback_extra_time_secs: u64,
    /// Watchdog interval armed after a successful fallback
    pub fallback_interval_waiting_secs: u64,
    /// Require `leader_consensus_id` to index the claimed leader
    pub strict_leader_index: bool,
    /// Reject a second, different leader for an epoch already committed
    pub reject_equivocation: bool,
}

impl FallbackConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.fallback_extra_time_secs)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_secs(self.fallback_interval_waiting_secs)
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            fallback_extra_time_secs: 60,
            fallback_interval_waiting_secs: 300,
            strict_leader_index: true,
            reject_equivocation: true,
        }
    }
}

/// Counters about fallback processing
#[derive(Debug, Clone, Default, Serialize)]
pub struct FallbackStats {
    pub accepted: u64,
    pub rejected: u64,
    pub last_committed_epoch: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FallbackBlockHeader {
        FallbackBlockHeader {
            fallback_epoch_no: 7,
            shard_id: 2,
            leader_consensus_id: 1,
            leader_pub_key: PublicKey([3u8; PUBLIC_KEY_SIZE]),
            leader_network_info: "10.0.0.1:30303".parse::<SocketAddr>().unwrap().into(),
            state_root_hash: StateRootHash([9u8; 32]),
        }
    }

    #[test]
    fn test_header_has_fixed_size() {
        assert_eq!(header().to_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn test_final_round_message_layout() {
        let cs1 = Signature([0xAB; SIGNATURE_SIZE]);
        let message = final_round_message(&header(), &cs1, &[true, false, true]);

        assert_eq!(&message[..HEADER_SIZE], header().to_bytes().as_slice());
        assert_eq!(&message[HEADER_SIZE..HEADER_SIZE + SIGNATURE_SIZE], &cs1.0[..]);
        // 3 bits, big-endian count, then 0b1010_0000
        assert_eq!(&message[HEADER_SIZE + SIGNATURE_SIZE..], &[0x00, 0x03, 0xA0]);
    }

    #[test]
    fn test_network_address_keeps_ipv4() {
        let addr: SocketAddr = "192.168.1.20:4001".parse().unwrap();
        let network_address = NetworkAddress::from(addr);
        assert_eq!(network_address.to_socket_addr(), addr);
        assert_eq!(network_address.to_string(), "192.168.1.20:4001");
    }

    #[test]
    fn test_member_identity_is_key_and_address() {
        let key = PublicKey([1u8; PUBLIC_KEY_SIZE]);
        let a = Member::new(key, "127.0.0.1:1".parse::<SocketAddr>().unwrap().into());
        let b = Member::new(key, "127.0.0.1:2".parse::<SocketAddr>().unwrap().into());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: FallbackConfig =
            serde_json::from_str(r#"{ "fallback_extra_time_secs": 5 }"#).unwrap();
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert!(config.strict_leader_index);
        assert_eq!(config.fallback_interval(), Duration::from_secs(300));
    }
}
