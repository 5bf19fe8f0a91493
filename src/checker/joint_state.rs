// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use crate::core::RegionInfo;
use crate::metrics::CHECKER_COUNTER_VEC;
use crate::operator::{create_leave_joint_state_operator, Operator};

/// Drives regions out of joint consensus when the change that entered
/// it is no longer being tracked by an operator.
pub struct JointStateChecker;

impl JointStateChecker {
    pub fn new() -> JointStateChecker {
        JointStateChecker
    }

    pub fn check(&self, region: &RegionInfo) -> Option<Operator> {
        CHECKER_COUNTER_VEC
            .with_label_values(&["joint_state_checker", "check"])
            .inc();
        if !region.in_joint_state() {
            return None;
        }
        CHECKER_COUNTER_VEC
            .with_label_values(&["joint_state_checker", "new-operator"])
            .inc();
        match create_leave_joint_state_operator("leave-joint-state", region) {
            Ok(op) => Some(op),
            Err(e) => {
                debug!("fail to create leave joint state operator"; "err" => %e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Peer, PeerRole, Region};
    use crate::operator::OpStep;

    #[test]
    fn test_leaves_joint_state() {
        let checker = JointStateChecker::new();

        let mut r = Region::new(1, b"", b"");
        r.peers = vec![
            Peer::new(10, 1),
            Peer {
                id: 11,
                store_id: 2,
                role: PeerRole::IncomingVoter,
            },
            Peer {
                id: 12,
                store_id: 3,
                role: PeerRole::DemotingVoter,
            },
        ];
        let mut region = RegionInfo::new(r);
        region.leader = Some(Peer::new(10, 1));

        let op = checker.check(&region).unwrap();
        match &op.steps()[0] {
            OpStep::ChangePeerV2Leave(leave) => {
                assert_eq!(leave.promote_learners.len(), 1);
                assert_eq!(leave.demote_voters.len(), 1);
            }
            other => panic!("unexpected step {}", other),
        }

        // A settled region produces nothing.
        let mut settled = Region::new(2, b"", b"");
        settled.peers = vec![Peer::new(20, 1)];
        assert!(checker.check(&RegionInfo::new(settled)).is_none());
    }
}
