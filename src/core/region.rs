// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;

/// Role of a peer inside its region's raft group. The joint roles only
/// appear while a joint-consensus membership change is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRole {
    Voter,
    Learner,
    IncomingVoter,
    DemotingVoter,
}

impl Default for PeerRole {
    fn default() -> PeerRole {
        PeerRole::Voter
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Peer {
    pub id: u64,
    pub store_id: u64,
    pub role: PeerRole,
}

impl Peer {
    pub fn new(id: u64, store_id: u64) -> Peer {
        Peer {
            id,
            store_id,
            role: PeerRole::Voter,
        }
    }

    pub fn new_learner(id: u64, store_id: u64) -> Peer {
        Peer {
            id,
            store_id,
            role: PeerRole::Learner,
        }
    }

    pub fn is_learner(&self) -> bool {
        self.role == PeerRole::Learner
    }

    pub fn is_voter(&self) -> bool {
        matches!(self.role, PeerRole::Voter | PeerRole::IncomingVoter)
    }

    pub fn is_in_joint_state(&self) -> bool {
        matches!(self.role, PeerRole::IncomingVoter | PeerRole::DemotingVoter)
    }
}

/// The region epoch. `conf_ver` increases on every membership change,
/// `version` on every split or merge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegionEpoch {
    pub conf_ver: u64,
    pub version: u64,
}

impl RegionEpoch {
    pub fn new(conf_ver: u64, version: u64) -> RegionEpoch {
        RegionEpoch { conf_ver, version }
    }

    /// Whether `self` is older than `other` in either dimension.
    pub fn is_stale_than(&self, other: &RegionEpoch) -> bool {
        self.conf_ver < other.conf_ver || self.version < other.version
    }
}

/// Region metadata. An empty start key means the left-unbounded region,
/// an empty end key the right-unbounded one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    pub id: u64,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub epoch: RegionEpoch,
    pub peers: Vec<Peer>,
}

impl Region {
    pub fn new(id: u64, start_key: &[u8], end_key: &[u8]) -> Region {
        Region {
            id,
            start_key: start_key.to_vec(),
            end_key: end_key.to_vec(),
            epoch: RegionEpoch::default(),
            peers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerStats {
    pub peer: Peer,
    pub down_seconds: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReportInterval {
    pub start: u64,
    pub end: u64,
}

impl ReportInterval {
    pub fn new(start: u64, end: u64) -> ReportInterval {
        ReportInterval { start, end }
    }

    pub fn secs(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// A region snapshot as reported by a heartbeat, together with runtime
/// statistics. This is the unit the checkers and schedulers reason about.
#[derive(Clone, Debug, Default)]
pub struct RegionInfo {
    pub region: Region,
    pub leader: Option<Peer>,
    pub down_peers: Vec<PeerStats>,
    pub pending_peers: Vec<Peer>,
    /// Approximate size in size units (MiB).
    pub approximate_size: u64,
    pub approximate_keys: u64,
    pub bytes_written: u64,
    pub keys_written: u64,
    pub bytes_read: u64,
    pub keys_read: u64,
    pub interval: ReportInterval,
}

impl RegionInfo {
    pub fn new(region: Region) -> RegionInfo {
        RegionInfo {
            region,
            ..Default::default()
        }
    }

    pub fn get_id(&self) -> u64 {
        self.region.id
    }

    pub fn get_start_key(&self) -> &[u8] {
        &self.region.start_key
    }

    pub fn get_end_key(&self) -> &[u8] {
        &self.region.end_key
    }

    pub fn get_epoch(&self) -> &RegionEpoch {
        &self.region.epoch
    }

    pub fn get_peers(&self) -> &[Peer] {
        &self.region.peers
    }

    pub fn get_leader(&self) -> Option<&Peer> {
        self.leader.as_ref()
    }

    pub fn leader_store_id(&self) -> u64 {
        self.leader.as_ref().map_or(0, |p| p.store_id)
    }

    pub fn get_peer(&self, peer_id: u64) -> Option<&Peer> {
        self.region.peers.iter().find(|p| p.id == peer_id)
    }

    pub fn get_store_peer(&self, store_id: u64) -> Option<&Peer> {
        self.region.peers.iter().find(|p| p.store_id == store_id)
    }

    pub fn get_store_voter(&self, store_id: u64) -> Option<&Peer> {
        self.region
            .peers
            .iter()
            .find(|p| p.store_id == store_id && p.is_voter())
    }

    pub fn get_store_learner(&self, store_id: u64) -> Option<&Peer> {
        self.region
            .peers
            .iter()
            .find(|p| p.store_id == store_id && p.is_learner())
    }

    pub fn get_store_ids(&self) -> HashSet<u64> {
        self.region.peers.iter().map(|p| p.store_id).collect()
    }

    pub fn get_voters(&self) -> Vec<&Peer> {
        self.region.peers.iter().filter(|p| p.is_voter()).collect()
    }

    pub fn get_learners(&self) -> Vec<&Peer> {
        self.region
            .peers
            .iter()
            .filter(|p| p.is_learner())
            .collect()
    }

    /// Voter peers other than the leader.
    pub fn get_followers(&self) -> Vec<&Peer> {
        let leader_id = self.leader.as_ref().map_or(0, |p| p.id);
        self.region
            .peers
            .iter()
            .filter(|p| p.is_voter() && p.id != leader_id)
            .collect()
    }

    pub fn get_pending_peer(&self, peer_id: u64) -> Option<&Peer> {
        self.pending_peers.iter().find(|p| p.id == peer_id)
    }

    pub fn get_pending_voter(&self, peer_id: u64) -> Option<&Peer> {
        self.pending_peers
            .iter()
            .find(|p| p.id == peer_id && p.is_voter())
    }

    pub fn get_pending_learner(&self, peer_id: u64) -> Option<&Peer> {
        self.pending_peers
            .iter()
            .find(|p| p.id == peer_id && p.is_learner())
    }

    pub fn get_down_peer(&self, peer_id: u64) -> Option<&Peer> {
        self.down_peers
            .iter()
            .find(|s| s.peer.id == peer_id)
            .map(|s| &s.peer)
    }

    pub fn in_joint_state(&self) -> bool {
        self.region.peers.iter().any(|p| p.is_in_joint_state())
    }

    /// A region is healthy when no peer is down or pending.
    pub fn is_healthy(&self) -> bool {
        self.down_peers.is_empty() && self.pending_peers.is_empty()
    }

    pub fn has_pending_peer_on_store(&self, store_id: u64) -> bool {
        self.pending_peers.iter().any(|p| p.store_id == store_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_region() -> RegionInfo {
        let mut region = Region::new(1, b"a", b"z");
        region.peers = vec![
            Peer::new(11, 1),
            Peer::new(12, 2),
            Peer::new_learner(13, 3),
        ];
        let mut info = RegionInfo::new(region);
        info.leader = Some(Peer::new(11, 1));
        info
    }

    #[test]
    fn test_peer_lookup() {
        let info = sample_region();
        assert_eq!(info.get_store_peer(2).unwrap().id, 12);
        assert!(info.get_store_voter(3).is_none());
        assert_eq!(info.get_store_learner(3).unwrap().id, 13);
        assert_eq!(info.get_followers().len(), 1);
        assert_eq!(info.leader_store_id(), 1);
    }

    #[test]
    fn test_joint_state() {
        let mut info = sample_region();
        assert!(!info.in_joint_state());
        info.region.peers[1].role = PeerRole::DemotingVoter;
        assert!(info.in_joint_state());
        // A demoting voter still counts as a voter until the joint state
        // is left.
        assert!(info.region.peers[1].is_in_joint_state());
    }

    #[test]
    fn test_epoch_stale() {
        let a = RegionEpoch::new(2, 3);
        let b = RegionEpoch::new(2, 4);
        assert!(a.is_stale_than(&b));
        assert!(!b.is_stale_than(&a));
        assert!(!a.is_stale_than(&a));
    }
}
