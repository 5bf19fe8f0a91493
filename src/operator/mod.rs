// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! Operators: ordered plans of atomic reconfiguration steps targeting a
//! single region, and the controller that owns them from admission to a
//! terminal state.

mod controller;
mod create_operator;
mod influence;
mod kind;
mod operator;
mod step;
mod store_limit;

pub use self::controller::{HeartbeatStream, NullHeartbeatStream, OperatorController};
pub use self::create_operator::{
    create_add_peer_operator, create_leave_joint_state_operator, create_merge_region_operator,
    create_move_leader_operator, create_move_peer_operator, create_promote_learner_operator,
    create_remove_peer_operator, create_split_region_operator, create_transfer_leader_operator,
};
pub use self::influence::{OpInfluence, StoreInfluence};
pub use self::kind::OpKind;
pub use self::operator::{OpStatus, Operator, OperatorPoll};
pub use self::step::{
    AddLearner, AddPeer, ChangePeerV2Enter, ChangePeerV2Leave, CheckPolicy, DemoteVoter,
    MergeRegion, OpStep, PromoteLearner, RemovePeer, SplitRegion, TransferLeader,
};
pub use self::store_limit::{StoreLimit, StoreLimitType, SMALL_REGION_THRESHOLD};

use crate::core::{Peer, Region};

/// Wire form of a peer change inside a heartbeat response.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerChange {
    AddVoter(Peer),
    AddLearner(Peer),
    PromoteLearner(Peer),
    DemoteVoter(Peer),
    RemovePeer(Peer),
}

/// Wire form of the current step, pushed to the region leader through
/// the heartbeat stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SchedulePayload {
    TransferLeader {
        store_id: u64,
    },
    ChangePeer {
        changes: Vec<PeerChange>,
    },
    /// Joint-consensus entry/exit carries all changes atomically.
    ChangePeerV2 {
        changes: Vec<PeerChange>,
        leave: bool,
    },
    SplitRegion {
        policy: CheckPolicy,
        keys: Vec<Vec<u8>>,
    },
    MergeRegion {
        target: Region,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RegionHeartbeatResponse {
    pub region_id: u64,
    pub payload: SchedulePayload,
}
