// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::error;
use std::result;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        NotBootstrapped {
            display("the cluster is not bootstrapped")
        }
        SchedulerExisted(name: String) {
            display("scheduler {} already exists", name)
        }
        SchedulerNotFound(name: String) {
            display("scheduler {} not found", name)
        }
        StoreNotFound(store_id: u64) {
            display("store {} not found", store_id)
        }
        RegionNotFound(region_id: u64) {
            display("region {} not found", region_id)
        }
        EpochStale(region_id: u64) {
            display("stale epoch for region {}", region_id)
        }
        StoreLimitExceeded(store_id: u64) {
            display("store limit of store {} exceeded", store_id)
        }
        NoStoreToAdd(region_id: u64) {
            display("no store to add peer for region {}", region_id)
        }
        NoStoreToReplace(region_id: u64) {
            display("no store to replace peer for region {}", region_id)
        }
        PeerAlreadyIsVoter(peer_id: u64) {
            display("peer {} already is a voter", peer_id)
        }
        PeerDoesNotExist(store_id: u64, region_id: u64) {
            display("peer on store {} does not exist in region {}", store_id, region_id)
        }
        CannotRemoveLeader(store_id: u64) {
            display("cannot remove leader peer on store {}", store_id)
        }
        StorageLoadFailed(msg: String) {
            display("fail to load from storage: {}", msg)
        }
        Unsafe(msg: String) {
            display("step is no longer safe: {}", msg)
        }
        Other(err: Box<dyn error::Error + Sync + Send>) {
            from()
            cause(err.as_ref())
            display("unknown error {:?}", err)
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            format!("{}", Error::StoreNotFound(4)),
            "store 4 not found"
        );
        assert_eq!(
            format!("{}", Error::SchedulerExisted("balance-leader-scheduler".into())),
            "scheduler balance-leader-scheduler already exists"
        );
    }
}
