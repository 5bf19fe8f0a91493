// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use crate::cluster::Cluster;
use crate::core::{Peer, RegionInfo};
use crate::error::{Error, Result};
use crate::operator::{
    AddLearner, ChangePeerV2Enter, ChangePeerV2Leave, CheckPolicy, DemoteVoter, MergeRegion,
    OpKind, OpStep, Operator, PromoteLearner, RemovePeer, SplitRegion, TransferLeader,
};

fn new_operator(desc: &str, region: &RegionInfo, kind: OpKind, steps: Vec<OpStep>) -> Operator {
    Operator::new(
        desc,
        region.get_id(),
        *region.get_epoch(),
        kind,
        region.approximate_size,
        steps,
    )
}

/// Whether removals from this store bypass the usual store-limit cost.
fn is_down_store(cluster: &dyn Cluster, store_id: u64) -> bool {
    match cluster.get_store(store_id) {
        Some(s) => s.down_time() >= cluster.get_opts().max_store_down_time.0,
        None => true,
    }
}

/// Creates an operator that adds a peer in the role of `peer`.
pub fn create_add_peer_operator(
    desc: &str,
    _cluster: &dyn Cluster,
    region: &RegionInfo,
    peer: Peer,
    kind: OpKind,
) -> Result<Operator> {
    if let Some(p) = region.get_store_peer(peer.store_id) {
        return Err(Error::Unsafe(format!(
            "peer {} already exists on store {}",
            p.id, peer.store_id
        )));
    }
    let mut steps = vec![OpStep::AddLearner(AddLearner {
        to_store: peer.store_id,
        peer_id: peer.id,
    })];
    if !peer.is_learner() {
        steps.push(OpStep::PromoteLearner(PromoteLearner {
            to_store: peer.store_id,
            peer_id: peer.id,
        }));
    }
    Ok(new_operator(desc, region, kind, steps))
}

pub fn create_promote_learner_operator(
    desc: &str,
    region: &RegionInfo,
    peer: &Peer,
) -> Result<Operator> {
    match region.get_store_learner(peer.store_id) {
        Some(p) if p.id == peer.id => {}
        Some(_) | None => {
            return Err(Error::PeerDoesNotExist(peer.store_id, region.get_id()));
        }
    }
    let steps = vec![OpStep::PromoteLearner(PromoteLearner {
        to_store: peer.store_id,
        peer_id: peer.id,
    })];
    Ok(new_operator(desc, region, OpKind::REPLICA, steps))
}

pub fn create_transfer_leader_operator(
    desc: &str,
    _cluster: &dyn Cluster,
    region: &RegionInfo,
    from_store: u64,
    to_store: u64,
    kind: OpKind,
) -> Result<Operator> {
    let peer = region
        .get_store_peer(to_store)
        .ok_or(Error::PeerDoesNotExist(to_store, region.get_id()))?;
    if peer.is_learner() {
        return Err(Error::Unsafe("cannot transfer leader to learner".into()));
    }
    let steps = vec![OpStep::TransferLeader(TransferLeader {
        from_store,
        to_store,
    })];
    Ok(new_operator(desc, region, kind | OpKind::LEADER, steps))
}

/// Creates an operator that removes the peer on `store_id`, transferring
/// leadership away first when needed.
pub fn create_remove_peer_operator(
    desc: &str,
    cluster: &dyn Cluster,
    kind: OpKind,
    region: &RegionInfo,
    store_id: u64,
) -> Result<Operator> {
    region
        .get_store_peer(store_id)
        .ok_or(Error::PeerDoesNotExist(store_id, region.get_id()))?;
    let mut steps = Vec::new();
    if region.leader_store_id() == store_id {
        let target = region
            .get_followers()
            .into_iter()
            .next()
            .ok_or(Error::CannotRemoveLeader(store_id))?;
        steps.push(OpStep::TransferLeader(TransferLeader {
            from_store: store_id,
            to_store: target.store_id,
        }));
    }
    steps.push(OpStep::RemovePeer(RemovePeer {
        from_store: store_id,
        is_down_store: is_down_store(cluster, store_id),
    }));
    Ok(new_operator(desc, region, kind, steps))
}

/// Creates an operator that moves the peer on `old_store` to `new_peer`'s
/// store. When joint consensus is enabled and a voter moves, promote and
/// demote are fused into an atomic joint switch.
pub fn create_move_peer_operator(
    desc: &str,
    cluster: &dyn Cluster,
    region: &RegionInfo,
    kind: OpKind,
    old_store: u64,
    new_peer: Peer,
) -> Result<Operator> {
    let steps = move_peer_steps(cluster, region, old_store, new_peer, false)?;
    Ok(new_operator(desc, region, kind, steps))
}

/// Like `create_move_peer_operator`, but leadership follows the moved
/// peer to its new store.
pub fn create_move_leader_operator(
    desc: &str,
    cluster: &dyn Cluster,
    region: &RegionInfo,
    kind: OpKind,
    old_store: u64,
    new_peer: Peer,
) -> Result<Operator> {
    if new_peer.is_learner() {
        return Err(Error::Unsafe("cannot transfer leader to learner".into()));
    }
    let steps = move_peer_steps(cluster, region, old_store, new_peer, true)?;
    Ok(new_operator(desc, region, kind | OpKind::LEADER, steps))
}

fn move_peer_steps(
    cluster: &dyn Cluster,
    region: &RegionInfo,
    old_store: u64,
    new_peer: Peer,
    force_transfer: bool,
) -> Result<Vec<OpStep>> {
    let old_peer = *region
        .get_store_peer(old_store)
        .ok_or(Error::PeerDoesNotExist(old_store, region.get_id()))?;
    if region.get_store_peer(new_peer.store_id).is_some() {
        return Err(Error::Unsafe(format!(
            "store {} already has a peer of region {}",
            new_peer.store_id,
            region.get_id()
        )));
    }

    let leader_on_old = region.leader_store_id() == old_store;
    let transfer_needed = force_transfer || leader_on_old;
    let mut steps = vec![OpStep::AddLearner(AddLearner {
        to_store: new_peer.store_id,
        peer_id: new_peer.id,
    })];

    if new_peer.is_learner() {
        if leader_on_old {
            let target = region
                .get_followers()
                .into_iter()
                .next()
                .ok_or(Error::CannotRemoveLeader(old_store))?;
            steps.push(OpStep::TransferLeader(TransferLeader {
                from_store: old_store,
                to_store: target.store_id,
            }));
        }
    } else if cluster.get_opts().enable_joint_consensus && old_peer.is_voter() {
        let promote = PromoteLearner {
            to_store: new_peer.store_id,
            peer_id: new_peer.id,
        };
        let demote = DemoteVoter {
            to_store: old_store,
            peer_id: old_peer.id,
        };
        steps.push(OpStep::ChangePeerV2Enter(ChangePeerV2Enter {
            promote_learners: vec![promote],
            demote_voters: vec![demote],
        }));
        if transfer_needed {
            steps.push(OpStep::TransferLeader(TransferLeader {
                from_store: old_store,
                to_store: new_peer.store_id,
            }));
        }
        steps.push(OpStep::ChangePeerV2Leave(ChangePeerV2Leave {
            promote_learners: vec![promote],
            demote_voters: vec![demote],
        }));
    } else {
        steps.push(OpStep::PromoteLearner(PromoteLearner {
            to_store: new_peer.store_id,
            peer_id: new_peer.id,
        }));
        if transfer_needed {
            steps.push(OpStep::TransferLeader(TransferLeader {
                from_store: old_store,
                to_store: new_peer.store_id,
            }));
        }
    }

    steps.push(OpStep::RemovePeer(RemovePeer {
        from_store: old_store,
        is_down_store: is_down_store(cluster, old_store),
    }));
    Ok(steps)
}

/// Creates the paired merge operators: the source region actively sends
/// the merge command, the target passively waits. Peer placement is
/// aligned onto the target's stores first when it differs.
pub fn create_merge_region_operator(
    desc: &str,
    cluster: &dyn Cluster,
    source: &RegionInfo,
    target: &RegionInfo,
    kind: OpKind,
) -> Result<Vec<Operator>> {
    let source_stores = source.get_store_ids();
    let target_stores = target.get_store_ids();

    let mut to_remove: Vec<u64> = source_stores.difference(&target_stores).copied().collect();
    let mut to_add: Vec<u64> = target_stores.difference(&source_stores).copied().collect();
    to_remove.sort_unstable();
    to_add.sort_unstable();
    if to_remove.len() != to_add.len() {
        return Err(Error::Unsafe(
            "cannot align replica placement for merge".into(),
        ));
    }

    let mut steps = Vec::new();
    let mut aligned = source.clone();
    for (&old_store, &new_store) in to_remove.iter().zip(to_add.iter()) {
        let new_peer = cluster.alloc_peer(new_store, crate::core::PeerRole::Voter);
        steps.extend(move_peer_steps(cluster, &aligned, old_store, new_peer, false)?);
        // Track the placement change so chained moves stay valid.
        aligned.region.peers.retain(|p| p.store_id != old_store);
        aligned.region.peers.push(new_peer);
        if aligned.leader_store_id() == old_store {
            aligned.leader = Some(new_peer);
        }
    }

    steps.push(OpStep::MergeRegion(MergeRegion {
        from_region: source.region.clone(),
        to_region: target.region.clone(),
        is_passive: false,
    }));
    let source_op = new_operator(desc, source, kind | OpKind::MERGE, steps);

    let target_op = new_operator(
        desc,
        target,
        kind | OpKind::MERGE,
        vec![OpStep::MergeRegion(MergeRegion {
            from_region: source.region.clone(),
            to_region: target.region.clone(),
            is_passive: true,
        })],
    );

    Ok(vec![source_op, target_op])
}

pub fn create_split_region_operator(
    desc: &str,
    region: &RegionInfo,
    kind: OpKind,
    policy: CheckPolicy,
    split_keys: Vec<Vec<u8>>,
) -> Result<Operator> {
    let steps = vec![OpStep::SplitRegion(SplitRegion {
        start_key: region.get_start_key().to_vec(),
        end_key: region.get_end_key().to_vec(),
        policy,
        split_keys,
    })];
    Ok(new_operator(desc, region, kind | OpKind::SPLIT, steps))
}

/// Creates the operator that exits a lingering joint state.
pub fn create_leave_joint_state_operator(desc: &str, region: &RegionInfo) -> Result<Operator> {
    let mut promote_learners = Vec::new();
    let mut demote_voters = Vec::new();
    for peer in region.get_peers() {
        match peer.role {
            crate::core::PeerRole::IncomingVoter => promote_learners.push(PromoteLearner {
                to_store: peer.store_id,
                peer_id: peer.id,
            }),
            crate::core::PeerRole::DemotingVoter => demote_voters.push(DemoteVoter {
                to_store: peer.store_id,
                peer_id: peer.id,
            }),
            _ => {}
        }
    }
    if promote_learners.is_empty() && demote_voters.is_empty() {
        return Err(Error::Unsafe("region is not in a joint state".into()));
    }
    let steps = vec![OpStep::ChangePeerV2Leave(ChangePeerV2Leave {
        promote_learners,
        demote_voters,
    })];
    Ok(new_operator(desc, region, OpKind::empty(), steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::ScheduleConfig;
    use crate::core::{PeerRole, Region, StoreInfo};

    fn cluster(joint: bool) -> ClusterState {
        let mut cfg = ScheduleConfig::default();
        cfg.enable_joint_consensus = joint;
        let c = ClusterState::new(cfg);
        for id in 1..=5 {
            c.put_store(StoreInfo::new(id, ""));
        }
        c
    }

    fn region(stores: &[u64], leader: u64) -> RegionInfo {
        let mut r = Region::new(1, b"a", b"z");
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(10 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = info.get_store_peer(leader).cloned();
        info.approximate_size = 64;
        info
    }

    #[test]
    fn test_add_peer_expands_to_learner_then_promote() {
        let c = cluster(false);
        let r = region(&[1, 2], 1);
        let op =
            create_add_peer_operator("make-up", &c, &r, Peer::new(30, 3), OpKind::REPLICA)
                .unwrap();
        assert_eq!(op.steps().len(), 2);
        assert!(matches!(op.steps()[0], OpStep::AddLearner(_)));
        assert!(matches!(op.steps()[1], OpStep::PromoteLearner(_)));
    }

    #[test]
    fn test_move_peer_plain() {
        let c = cluster(false);
        let r = region(&[1, 2, 3], 1);
        let op = create_move_peer_operator(
            "balance-region",
            &c,
            &r,
            OpKind::REGION,
            3,
            Peer::new(40, 4),
        )
        .unwrap();
        let kinds: Vec<&OpStep> = op.steps().iter().collect();
        assert_eq!(kinds.len(), 3);
        assert!(matches!(kinds[0], OpStep::AddLearner(_)));
        assert!(matches!(kinds[1], OpStep::PromoteLearner(_)));
        assert!(matches!(kinds[2], OpStep::RemovePeer(_)));
    }

    #[test]
    fn test_move_peer_joint_fuses_promote_and_demote() {
        let c = cluster(true);
        let r = region(&[1, 2, 3], 3);
        let op = create_move_peer_operator(
            "replace-rule-down-peer",
            &c,
            &r,
            OpKind::REPLICA,
            3,
            Peer::new(40, 4),
        )
        .unwrap();
        assert!(matches!(op.steps()[0], OpStep::AddLearner(_)));
        assert!(matches!(op.steps()[1], OpStep::ChangePeerV2Enter(_)));
        // The leader lived on the removed store, so the leader moves
        // inside the joint state.
        assert!(matches!(op.steps()[2], OpStep::TransferLeader(_)));
        assert!(matches!(op.steps()[3], OpStep::ChangePeerV2Leave(_)));
        assert!(matches!(op.steps()[4], OpStep::RemovePeer(_)));
    }

    #[test]
    fn test_transfer_leader_to_learner_fails() {
        let c = cluster(false);
        let mut r = region(&[1, 2], 1);
        r.region.peers[1].role = PeerRole::Learner;
        assert!(
            create_transfer_leader_operator("t", &c, &r, 1, 2, OpKind::empty()).is_err()
        );
    }

    #[test]
    fn test_remove_leader_transfers_first() {
        let c = cluster(false);
        let r = region(&[1, 2, 3], 1);
        let op =
            create_remove_peer_operator("remove-orphan-peer", &c, OpKind::REPLICA, &r, 1)
                .unwrap();
        assert!(matches!(op.steps()[0], OpStep::TransferLeader(_)));
        assert!(matches!(op.steps()[1], OpStep::RemovePeer(_)));
    }

    #[test]
    fn test_merge_pair() {
        let c = cluster(false);
        let mut source = region(&[1, 2, 3], 1);
        source.region.id = 2;
        source.region.start_key = b"b".to_vec();
        source.region.end_key = b"c".to_vec();
        let mut target = region(&[1, 2, 3], 1);
        target.region.start_key = b"a".to_vec();
        target.region.end_key = b"b".to_vec();

        let ops = create_merge_region_operator("merge-region", &c, &source, &target, OpKind::empty())
            .unwrap();
        assert_eq!(ops.len(), 2);
        assert!(ops[0].kind().contains(OpKind::MERGE));
        assert!(ops[1].kind().contains(OpKind::MERGE));
        assert!(matches!(
            ops[0].steps().last().unwrap(),
            OpStep::MergeRegion(MergeRegion { is_passive: false, .. })
        ));
        assert!(matches!(
            ops[1].steps()[0],
            OpStep::MergeRegion(MergeRegion { is_passive: true, .. })
        ));
    }

    #[test]
    fn test_merge_aligns_placement() {
        let c = cluster(false);
        let mut source = region(&[1, 2, 4], 1);
        source.region.id = 2;
        let target = region(&[1, 2, 3], 1);
        let ops =
            create_merge_region_operator("merge-region", &c, &source, &target, OpKind::empty())
                .unwrap();
        // The source grows move steps for store 4 -> store 3 before the
        // merge itself.
        assert!(ops[0].steps().len() > 1);
        assert!(matches!(ops[0].steps()[0], OpStep::AddLearner(AddLearner { to_store: 3, .. })));
    }

    #[test]
    fn test_leave_joint_state() {
        let mut r = region(&[1, 2, 3], 1);
        r.region.peers[1].role = PeerRole::DemotingVoter;
        r.region.peers[2].role = PeerRole::IncomingVoter;
        let op = create_leave_joint_state_operator("leave-joint-state", &r).unwrap();
        assert!(matches!(op.steps()[0], OpStep::ChangePeerV2Leave(_)));

        let healthy = region(&[1, 2, 3], 1);
        assert!(create_leave_joint_state_operator("leave-joint-state", &healthy).is_err());
    }
}
