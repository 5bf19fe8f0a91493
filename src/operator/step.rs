// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;

use crate::core::{Peer, PeerRole, Region, RegionInfo};
use crate::error::{Error, Result};
use crate::operator::{
    OpInfluence, PeerChange, SchedulePayload, StoreLimitType, SMALL_REGION_THRESHOLD,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckPolicy {
    Scan,
    Approximate,
    Usekey,
}

impl fmt::Display for CheckPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPolicy::Scan => write!(f, "scan"),
            CheckPolicy::Approximate => write!(f, "approximate"),
            CheckPolicy::Usekey => write!(f, "usekey"),
        }
    }
}

/// Transfers a region's leader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferLeader {
    pub from_store: u64,
    pub to_store: u64,
}

impl TransferLeader {
    fn conf_ver_changed(&self, _region: &RegionInfo) -> bool {
        // Transferring the leader never changes the conf version.
        false
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        region.leader_store_id() == self.to_store
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        let peer = region
            .get_store_peer(self.to_store)
            .ok_or(Error::PeerDoesNotExist(self.to_store, region.get_id()))?;
        if peer.is_learner() {
            return Err(Error::Unsafe("cannot transfer leader to learner".into()));
        }
        Ok(())
    }

    fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        let size = region.approximate_size as i64;
        let from = infl.get_store_influence(self.from_store);
        from.leader_size -= size;
        from.leader_count -= 1;
        let to = infl.get_store_influence(self.to_store);
        to.leader_size += size;
        to.leader_count += 1;
    }
}

impl fmt::Display for TransferLeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transfer leader from store {} to store {}",
            self.from_store, self.to_store
        )
    }
}

/// Adds a voter peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddPeer {
    pub to_store: u64,
    pub peer_id: u64,
}

impl AddPeer {
    fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        region
            .get_store_voter(self.to_store)
            .map_or(false, |p| p.id == self.peer_id)
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.get_store_voter(self.to_store) {
            Some(p) if p.id == self.peer_id => region.get_pending_voter(p.id).is_none(),
            Some(p) => {
                warn!("obtain unexpected peer"; "expect" => %self, "obtain-voter" => p.id);
                false
            }
            None => false,
        }
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        if let Some(peer) = region.get_store_peer(self.to_store) {
            if peer.id != self.peer_id {
                return Err(Error::Unsafe(format!(
                    "peer {} already exists on store {}",
                    peer.id, self.to_store
                )));
            }
        }
        Ok(())
    }

    fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        let size = region.approximate_size as i64;
        let to = infl.get_store_influence(self.to_store);
        to.region_size += size;
        to.region_count += 1;
        to.adjust_step_cost(StoreLimitType::AddPeer, size);
    }
}

impl fmt::Display for AddPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "add peer {} on store {}", self.peer_id, self.to_store)
    }
}

/// Adds a learner peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddLearner {
    pub to_store: u64,
    pub peer_id: u64,
}

impl AddLearner {
    fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        region
            .get_store_peer(self.to_store)
            .map_or(false, |p| p.id == self.peer_id)
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.get_store_learner(self.to_store) {
            Some(p) if p.id == self.peer_id => region.get_pending_learner(p.id).is_none(),
            Some(p) => {
                warn!("obtain unexpected peer"; "expect" => %self, "obtain-learner" => p.id);
                false
            }
            None => false,
        }
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        let peer = match region.get_store_peer(self.to_store) {
            Some(p) => p,
            None => return Ok(()),
        };
        if peer.id != self.peer_id {
            return Err(Error::Unsafe(format!(
                "peer {} already exists on store {}",
                peer.id, self.to_store
            )));
        }
        if !peer.is_learner() {
            return Err(Error::PeerAlreadyIsVoter(peer.id));
        }
        Ok(())
    }

    fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        let size = region.approximate_size as i64;
        let to = infl.get_store_influence(self.to_store);
        to.region_size += size;
        to.region_count += 1;
        to.adjust_step_cost(StoreLimitType::AddPeer, size);
    }
}

impl fmt::Display for AddLearner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "add learner peer {} on store {}",
            self.peer_id, self.to_store
        )
    }
}

/// Promotes a learner to voter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromoteLearner {
    pub to_store: u64,
    pub peer_id: u64,
}

impl PromoteLearner {
    fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        region
            .get_store_voter(self.to_store)
            .map_or(false, |p| p.id == self.peer_id)
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        match region.get_store_voter(self.to_store) {
            Some(p) => {
                if p.id != self.peer_id {
                    warn!("obtain unexpected peer"; "expect" => %self, "obtain-voter" => p.id);
                }
                p.id == self.peer_id
            }
            None => false,
        }
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        region
            .get_store_peer(self.to_store)
            .map(|_| ())
            .ok_or(Error::PeerDoesNotExist(self.to_store, region.get_id()))
    }

    fn influence(&self, _infl: &mut OpInfluence, _region: &RegionInfo) {}
}

impl fmt::Display for PromoteLearner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "promote learner peer {} on store {} to voter",
            self.peer_id, self.to_store
        )
    }
}

/// Demotes a voter to learner; only valid inside a joint change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemoteVoter {
    pub to_store: u64,
    pub peer_id: u64,
}

impl fmt::Display for DemoteVoter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "demote voter peer {} on store {} to learner",
            self.peer_id, self.to_store
        )
    }
}

/// Removes a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemovePeer {
    pub from_store: u64,
    pub is_down_store: bool,
}

impl RemovePeer {
    fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        region.get_store_peer(self.from_store).is_none()
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        region.get_store_peer(self.from_store).is_none()
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        if self.from_store == region.leader_store_id() {
            return Err(Error::CannotRemoveLeader(self.from_store));
        }
        Ok(())
    }

    fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        let size = region.approximate_size as i64;
        let from = infl.get_store_influence(self.from_store);
        from.region_size -= size;
        from.region_count -= 1;
        if self.is_down_store {
            from.adjust_step_cost(StoreLimitType::RemovePeer, SMALL_REGION_THRESHOLD);
        } else {
            from.adjust_step_cost(StoreLimitType::RemovePeer, size);
        }
    }
}

impl fmt::Display for RemovePeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remove peer on store {}", self.from_store)
    }
}

/// Merges `from_region` into `to_region`. Both regions carry the step;
/// only the active one sends the merge command, the passive one just
/// waits to disappear.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeRegion {
    pub from_region: Region,
    pub to_region: Region,
    pub is_passive: bool,
}

impl MergeRegion {
    fn conf_ver_changed(&self, _region: &RegionInfo) -> bool {
        false
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        if self.is_passive {
            region.get_start_key() != self.to_region.start_key.as_slice()
                || region.get_end_key() != self.to_region.end_key.as_slice()
        } else {
            false
        }
    }

    fn check_safety(&self, _region: &RegionInfo) -> Result<()> {
        Ok(())
    }

    fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        if self.is_passive {
            for p in region.get_peers() {
                let o = infl.get_store_influence(p.store_id);
                o.region_count -= 1;
                if region.get_leader().map_or(false, |l| l.id == p.id) {
                    o.leader_count -= 1;
                }
            }
        }
    }
}

impl fmt::Display for MergeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "merge region {} into region {}",
            self.from_region.id, self.to_region.id
        )
    }
}

/// Splits a region, optionally at explicit keys.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitRegion {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub policy: CheckPolicy,
    pub split_keys: Vec<Vec<u8>>,
}

impl SplitRegion {
    fn conf_ver_changed(&self, _region: &RegionInfo) -> bool {
        false
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        region.get_start_key() != self.start_key.as_slice()
            || region.get_end_key() != self.end_key.as_slice()
    }

    fn check_safety(&self, _region: &RegionInfo) -> Result<()> {
        Ok(())
    }

    fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        for p in region.get_peers() {
            let o = infl.get_store_influence(p.store_id);
            o.region_count += 1;
            if region.get_leader().map_or(false, |l| l.id == p.id) {
                o.leader_count += 1;
            }
        }
    }
}

impl fmt::Display for SplitRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "split region with policy {}", self.policy)
    }
}

/// Enters a joint state, fusing promotions and demotions atomically.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangePeerV2Enter {
    pub promote_learners: Vec<PromoteLearner>,
    pub demote_voters: Vec<DemoteVoter>,
}

impl ChangePeerV2Enter {
    fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        self.promote_learners.iter().all(|pl| {
            region
                .get_store_voter(pl.to_store)
                .map_or(false, |p| p.id == pl.peer_id)
        }) && self.demote_voters.iter().all(|dv| {
            region
                .get_peer(dv.peer_id)
                .map_or(false, |p| p.role == PeerRole::DemotingVoter)
        })
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        self.promote_learners.iter().all(|pl| {
            region
                .get_peer(pl.peer_id)
                .map_or(false, |p| p.role == PeerRole::IncomingVoter)
        }) && self.demote_voters.iter().all(|dv| {
            region
                .get_peer(dv.peer_id)
                .map_or(false, |p| p.role == PeerRole::DemotingVoter)
        })
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        if region.in_joint_state() && !self.is_finish(region) {
            return Err(Error::Unsafe(
                "region already in a different joint state".into(),
            ));
        }
        for pl in &self.promote_learners {
            region
                .get_peer(pl.peer_id)
                .ok_or(Error::PeerDoesNotExist(pl.to_store, region.get_id()))?;
        }
        for dv in &self.demote_voters {
            region
                .get_peer(dv.peer_id)
                .ok_or(Error::PeerDoesNotExist(dv.to_store, region.get_id()))?;
        }
        Ok(())
    }
}

impl fmt::Display for ChangePeerV2Enter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "use joint consensus")?;
        for pl in &self.promote_learners {
            write!(f, ", {}", pl)?;
        }
        for dv in &self.demote_voters {
            write!(f, ", {}", dv)?;
        }
        Ok(())
    }
}

/// Leaves a joint state: incoming voters settle as voters, demoting
/// voters as learners.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangePeerV2Leave {
    pub promote_learners: Vec<PromoteLearner>,
    pub demote_voters: Vec<DemoteVoter>,
}

impl ChangePeerV2Leave {
    fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        self.is_finish(region)
    }

    fn is_finish(&self, region: &RegionInfo) -> bool {
        !region.in_joint_state()
            && self.promote_learners.iter().all(|pl| {
                region
                    .get_peer(pl.peer_id)
                    .map_or(false, |p| p.role == PeerRole::Voter)
            })
            && self.demote_voters.iter().all(|dv| {
                region
                    .get_peer(dv.peer_id)
                    .map_or(false, |p| p.is_learner())
            })
    }

    fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        if !region.in_joint_state() && !self.is_finish(region) {
            return Err(Error::Unsafe("region is not in a joint state".into()));
        }
        Ok(())
    }
}

impl fmt::Display for ChangePeerV2Leave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leave joint state")?;
        for pl in &self.promote_learners {
            write!(f, ", promote peer {}", pl.peer_id)?;
        }
        for dv in &self.demote_voters {
            write!(f, ", demote peer {}", dv.peer_id)?;
        }
        Ok(())
    }
}

/// The atomic scheduling steps. The four step operations dispatch on the
/// variant.
#[derive(Clone, Debug, PartialEq)]
pub enum OpStep {
    TransferLeader(TransferLeader),
    AddPeer(AddPeer),
    AddLearner(AddLearner),
    PromoteLearner(PromoteLearner),
    RemovePeer(RemovePeer),
    MergeRegion(MergeRegion),
    SplitRegion(SplitRegion),
    ChangePeerV2Enter(ChangePeerV2Enter),
    ChangePeerV2Leave(ChangePeerV2Leave),
}

impl OpStep {
    /// Whether the latest heartbeat shows this step changed the conf
    /// version.
    pub fn conf_ver_changed(&self, region: &RegionInfo) -> bool {
        match self {
            OpStep::TransferLeader(s) => s.conf_ver_changed(region),
            OpStep::AddPeer(s) => s.conf_ver_changed(region),
            OpStep::AddLearner(s) => s.conf_ver_changed(region),
            OpStep::PromoteLearner(s) => s.conf_ver_changed(region),
            OpStep::RemovePeer(s) => s.conf_ver_changed(region),
            OpStep::MergeRegion(s) => s.conf_ver_changed(region),
            OpStep::SplitRegion(s) => s.conf_ver_changed(region),
            OpStep::ChangePeerV2Enter(s) => s.conf_ver_changed(region),
            OpStep::ChangePeerV2Leave(s) => s.conf_ver_changed(region),
        }
    }

    /// Whether the latest heartbeat shows the step completed.
    pub fn is_finish(&self, region: &RegionInfo) -> bool {
        match self {
            OpStep::TransferLeader(s) => s.is_finish(region),
            OpStep::AddPeer(s) => s.is_finish(region),
            OpStep::AddLearner(s) => s.is_finish(region),
            OpStep::PromoteLearner(s) => s.is_finish(region),
            OpStep::RemovePeer(s) => s.is_finish(region),
            OpStep::MergeRegion(s) => s.is_finish(region),
            OpStep::SplitRegion(s) => s.is_finish(region),
            OpStep::ChangePeerV2Enter(s) => s.is_finish(region),
            OpStep::ChangePeerV2Leave(s) => s.is_finish(region),
        }
    }

    /// Pre-execution guard: whether the step is still applicable to the
    /// region snapshot.
    pub fn check_safety(&self, region: &RegionInfo) -> Result<()> {
        match self {
            OpStep::TransferLeader(s) => s.check_safety(region),
            OpStep::AddPeer(s) => s.check_safety(region),
            OpStep::AddLearner(s) => s.check_safety(region),
            OpStep::PromoteLearner(s) => s.check_safety(region),
            OpStep::RemovePeer(s) => s.check_safety(region),
            OpStep::MergeRegion(s) => s.check_safety(region),
            OpStep::SplitRegion(s) => s.check_safety(region),
            OpStep::ChangePeerV2Enter(s) => s.check_safety(region),
            OpStep::ChangePeerV2Leave(s) => s.check_safety(region),
        }
    }

    /// Applies the step's bookkeeping delta to the influence.
    pub fn influence(&self, infl: &mut OpInfluence, region: &RegionInfo) {
        match self {
            OpStep::TransferLeader(s) => s.influence(infl, region),
            OpStep::AddPeer(s) => s.influence(infl, region),
            OpStep::AddLearner(s) => s.influence(infl, region),
            OpStep::PromoteLearner(s) => s.influence(infl, region),
            OpStep::RemovePeer(s) => s.influence(infl, region),
            OpStep::MergeRegion(s) => s.influence(infl, region),
            OpStep::SplitRegion(s) => s.influence(infl, region),
            OpStep::ChangePeerV2Enter(_) | OpStep::ChangePeerV2Leave(_) => {}
        }
    }

    /// The wire form sent to the region leader, if the step needs one.
    pub fn payload(&self, region: &RegionInfo) -> Option<SchedulePayload> {
        match self {
            OpStep::TransferLeader(s) => Some(SchedulePayload::TransferLeader {
                store_id: s.to_store,
            }),
            OpStep::AddPeer(s) => Some(SchedulePayload::ChangePeer {
                changes: vec![PeerChange::AddVoter(Peer::new(s.peer_id, s.to_store))],
            }),
            OpStep::AddLearner(s) => Some(SchedulePayload::ChangePeer {
                changes: vec![PeerChange::AddLearner(Peer::new_learner(
                    s.peer_id, s.to_store,
                ))],
            }),
            OpStep::PromoteLearner(s) => Some(SchedulePayload::ChangePeer {
                changes: vec![PeerChange::PromoteLearner(Peer::new(s.peer_id, s.to_store))],
            }),
            OpStep::RemovePeer(s) => {
                let peer = region.get_store_peer(s.from_store)?;
                Some(SchedulePayload::ChangePeer {
                    changes: vec![PeerChange::RemovePeer(*peer)],
                })
            }
            OpStep::MergeRegion(s) => {
                if s.is_passive {
                    None
                } else {
                    Some(SchedulePayload::MergeRegion {
                        target: s.to_region.clone(),
                    })
                }
            }
            OpStep::SplitRegion(s) => Some(SchedulePayload::SplitRegion {
                policy: s.policy,
                keys: s.split_keys.clone(),
            }),
            OpStep::ChangePeerV2Enter(s) => Some(SchedulePayload::ChangePeerV2 {
                changes: v2_changes(&s.promote_learners, &s.demote_voters),
                leave: false,
            }),
            OpStep::ChangePeerV2Leave(s) => Some(SchedulePayload::ChangePeerV2 {
                changes: v2_changes(&s.promote_learners, &s.demote_voters),
                leave: true,
            }),
        }
    }
}

fn v2_changes(promotes: &[PromoteLearner], demotes: &[DemoteVoter]) -> Vec<PeerChange> {
    let mut changes = Vec::with_capacity(promotes.len() + demotes.len());
    for pl in promotes {
        changes.push(PeerChange::PromoteLearner(Peer::new(pl.peer_id, pl.to_store)));
    }
    for dv in demotes {
        changes.push(PeerChange::DemoteVoter(Peer::new(dv.peer_id, dv.to_store)));
    }
    changes
}

impl fmt::Display for OpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpStep::TransferLeader(s) => s.fmt(f),
            OpStep::AddPeer(s) => s.fmt(f),
            OpStep::AddLearner(s) => s.fmt(f),
            OpStep::PromoteLearner(s) => s.fmt(f),
            OpStep::RemovePeer(s) => s.fmt(f),
            OpStep::MergeRegion(s) => s.fmt(f),
            OpStep::SplitRegion(s) => s.fmt(f),
            OpStep::ChangePeerV2Enter(s) => s.fmt(f),
            OpStep::ChangePeerV2Leave(s) => s.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, Region, RegionInfo};

    fn region(stores_roles: &[(u64, PeerRole)], leader: u64) -> RegionInfo {
        let mut r = Region::new(1, b"a", b"z");
        for (i, &(store, role)) in stores_roles.iter().enumerate() {
            r.peers.push(Peer {
                id: 10 + i as u64,
                store_id: store,
                role,
            });
        }
        let mut info = RegionInfo::new(r);
        info.leader = info.get_store_peer(leader).cloned();
        info.approximate_size = 96;
        info
    }

    #[test]
    fn test_transfer_leader() {
        let r = region(&[(1, PeerRole::Voter), (2, PeerRole::Voter)], 1);
        let step = TransferLeader {
            from_store: 1,
            to_store: 2,
        };
        assert!(!step.is_finish(&r));
        assert!(step.check_safety(&r).is_ok());
        assert!(!step.conf_ver_changed(&r));

        let done = region(&[(1, PeerRole::Voter), (2, PeerRole::Voter)], 2);
        assert!(step.is_finish(&done));

        let learner_target = region(&[(1, PeerRole::Voter), (2, PeerRole::Learner)], 1);
        assert!(step.check_safety(&learner_target).is_err());
    }

    #[test]
    fn test_add_learner_lifecycle() {
        let step = AddLearner {
            to_store: 3,
            peer_id: 30,
        };
        let before = region(&[(1, PeerRole::Voter), (2, PeerRole::Voter)], 1);
        assert!(!step.is_finish(&before));
        assert!(!step.conf_ver_changed(&before));
        assert!(step.check_safety(&before).is_ok());

        let mut after = region(&[(1, PeerRole::Voter), (2, PeerRole::Voter)], 1);
        after.region.peers.push(Peer {
            id: 30,
            store_id: 3,
            role: PeerRole::Learner,
        });
        assert!(step.is_finish(&after));
        assert!(step.conf_ver_changed(&after));

        // A pending learner is not finished.
        after.pending_peers = vec![*after.get_peer(30).unwrap()];
        assert!(!step.is_finish(&after));
        assert!(step.conf_ver_changed(&after));
    }

    #[test]
    fn test_remove_peer_safety_and_cost() {
        let r = region(&[(1, PeerRole::Voter), (2, PeerRole::Voter)], 1);
        let remove_leader = RemovePeer {
            from_store: 1,
            is_down_store: false,
        };
        assert!(remove_leader.check_safety(&r).is_err());

        let remove_follower = RemovePeer {
            from_store: 2,
            is_down_store: true,
        };
        assert!(remove_follower.check_safety(&r).is_ok());
        let mut infl = OpInfluence::new();
        remove_follower.influence(&mut infl, &r);
        let s2 = infl.store_influence(2).unwrap();
        // Down-store removal debits the flat threshold, not region size.
        assert_eq!(s2.get_step_cost(StoreLimitType::RemovePeer), SMALL_REGION_THRESHOLD);
        assert_eq!(s2.region_size, -96);
    }

    #[test]
    fn test_change_peer_v2_leave() {
        let step = ChangePeerV2Leave {
            promote_learners: vec![PromoteLearner {
                to_store: 3,
                peer_id: 12,
            }],
            demote_voters: vec![DemoteVoter {
                to_store: 2,
                peer_id: 11,
            }],
        };
        let joint = region(
            &[
                (1, PeerRole::Voter),
                (2, PeerRole::DemotingVoter),
                (3, PeerRole::IncomingVoter),
            ],
            1,
        );
        assert!(!step.is_finish(&joint));
        assert!(step.check_safety(&joint).is_ok());

        let left = region(
            &[
                (1, PeerRole::Voter),
                (2, PeerRole::Learner),
                (3, PeerRole::Voter),
            ],
            1,
        );
        assert!(step.is_finish(&left));
        assert!(step.conf_ver_changed(&left));
    }

    #[test]
    fn test_step_display_is_identifying() {
        let steps: Vec<OpStep> = vec![
            OpStep::TransferLeader(TransferLeader {
                from_store: 1,
                to_store: 2,
            }),
            OpStep::AddLearner(AddLearner {
                to_store: 3,
                peer_id: 30,
            }),
            OpStep::PromoteLearner(PromoteLearner {
                to_store: 3,
                peer_id: 30,
            }),
            OpStep::RemovePeer(RemovePeer {
                from_store: 4,
                is_down_store: false,
            }),
        ];
        let mut seen = std::collections::HashSet::new();
        for s in &steps {
            assert!(seen.insert(s.to_string()), "duplicate display: {}", s);
        }
        assert_eq!(
            steps[0].to_string(),
            "transfer leader from store 1 to store 2"
        );
    }

    #[test]
    fn test_merge_region_finish() {
        let from = Region::new(1, b"a", b"b");
        let to = Region::new(2, b"b", b"c");
        let passive = MergeRegion {
            from_region: from.clone(),
            to_region: to.clone(),
            is_passive: true,
        };
        let mut target_info = RegionInfo::new(to.clone());
        target_info.region.peers.push(Peer::new(20, 1));
        target_info.leader = Some(Peer::new(20, 1));
        assert!(!passive.is_finish(&target_info));

        // After the merge the target covers both ranges.
        let mut merged = RegionInfo::new(Region::new(2, b"a", b"c"));
        merged.region.peers.push(Peer::new(20, 1));
        assert!(passive.is_finish(&merged));

        let active = MergeRegion {
            from_region: from,
            to_region: to,
            is_passive: false,
        };
        assert!(!active.is_finish(&merged));
    }
}
