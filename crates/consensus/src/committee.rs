//! DS committee store
//!
//! The node's belief of the DS committee. Every read or write goes through
//! one mutex, so no observer ever sees a partially rebuilt committee.

use crate::types::Member;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Thread-safe handle to the DS committee
#[derive(Clone, Default)]
pub struct CommitteeStore {
    members: Arc<Mutex<VecDeque<Member>>>,
}

impl CommitteeStore {
    /// Create an empty committee
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a committee with the given members, first member leading
    pub fn with_members(members: Vec<Member>) -> Self {
        Self {
            members: Arc::new(Mutex::new(members.into())),
        }
    }

    /// Copy of the current committee, in order
    pub fn snapshot(&self) -> Vec<Member> {
        self.members.lock().iter().cloned().collect()
    }

    /// Current committee leader (front slot)
    pub fn leader(&self) -> Option<Member> {
        self.members.lock().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Replace the committee wholesale (bootstrap / DS block sync)
    pub fn replace(&self, members: Vec<Member>) {
        *self.members.lock() = members.into();
    }

    /// Rebuild the committee from a shard around an elected leader.
    ///
    /// The leader moves to the front; every other member keeps its
    /// relative order. If the leader is not in the shard the committee is
    /// the shard in order.
    pub fn reconstitute(&self, shard: &[Member], leader: &Member) {
        let mut committee = self.members.lock();
        committee.clear();

        for member in shard {
            if member == leader {
                committee.push_front(member.clone());
            } else {
                committee.push_back(member.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NetworkAddress, PublicKey, PUBLIC_KEY_SIZE};
    use std::net::SocketAddr;

    fn member(id: u8) -> Member {
        let addr: SocketAddr = format!("10.0.0.{}:3000", id).parse().unwrap();
        Member::new(PublicKey([id; PUBLIC_KEY_SIZE]), NetworkAddress::from(addr))
    }

    #[test]
    fn test_reconstitute_moves_leader_to_front() {
        let store = CommitteeStore::with_members(vec![member(9)]);
        let shard = vec![member(1), member(2), member(3), member(4)];

        store.reconstitute(&shard, &member(3));

        assert_eq!(
            store.snapshot(),
            vec![member(3), member(1), member(2), member(4)]
        );
        assert_eq!(store.leader(), Some(member(3)));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_reconstitute_is_idempotent() {
        let store = CommitteeStore::new();
        let shard = vec![member(1), member(2), member(3), member(4)];

        store.reconstitute(&shard, &member(4));
        let once = store.snapshot();
        store.reconstitute(&shard, &member(4));

        assert_eq!(store.snapshot(), once);
    }

    #[test]
    fn test_reconstitute_requires_exact_identity() {
        let store = CommitteeStore::new();
        let shard = vec![member(1), member(2), member(3)];
        // Right key, wrong address: no member matches
        let impostor = Member::new(member(2).public_key, member(7).network_address);

        store.reconstitute(&shard, &impostor);

        assert_eq!(store.snapshot(), shard);
    }

    #[test]
    fn test_replace_and_len() {
        let store = CommitteeStore::new();
        assert!(store.is_empty());

        store.replace(vec![member(5), member(6)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.leader(), Some(member(5)));
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_rebuild() {
        let shard: Vec<Member> = (1..=50).map(member).collect();
        let store = CommitteeStore::with_members(shard.clone());

        let writer = {
            let store = store.clone();
            let shard = shard.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    store.reconstitute(&shard, &shard[i % shard.len()]);
                }
            })
        };

        for _ in 0..200 {
            let snapshot = store.snapshot();
            assert_eq!(snapshot.len(), shard.len());
        }
        writer.join().unwrap();
    }
}
