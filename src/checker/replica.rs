// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::{Arc, Mutex};

use crate::checker::ReplicaStrategy;
use crate::cluster::Cluster;
use crate::core::{Peer, PeerRole, PriorityLevel, RegionInfo, StoreInfo};
use crate::metrics::CHECKER_COUNTER_VEC;
use crate::operator::{
    create_add_peer_operator, create_move_peer_operator, create_remove_peer_operator, OpKind,
    Operator,
};
use crate::util::cache::FifoCache;

/// The legacy replica checker, used when placement rules are disabled:
/// keeps every region at `max_replicas` healthy peers with the best
/// location spread the configuration allows.
pub struct ReplicaChecker {
    cluster: Arc<dyn Cluster>,
    name: &'static str,
    region_waiting_list: Arc<Mutex<FifoCache>>,
}

impl ReplicaChecker {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        region_waiting_list: Arc<Mutex<FifoCache>>,
    ) -> ReplicaChecker {
        ReplicaChecker {
            cluster,
            name: "replica-checker",
            region_waiting_list,
        }
    }

    pub fn get_type(&self) -> &'static str {
        "replica-checker"
    }

    pub fn check(&self, region: &RegionInfo) -> Option<Operator> {
        CHECKER_COUNTER_VEC
            .with_label_values(&["replica_checker", "check"])
            .inc();
        if let Some(op) = self.check_down_peer(region) {
            return Some(op);
        }
        if let Some(op) = self.check_offline_peer(region) {
            return Some(op);
        }
        if let Some(op) = self.check_make_up_replica(region) {
            return Some(op);
        }
        if let Some(op) = self.check_remove_extra_replica(region) {
            return Some(op);
        }
        self.check_location_replacement(region)
    }

    fn check_down_peer(&self, region: &RegionInfo) -> Option<Operator> {
        let cfg = self.cluster.get_opts();
        if !cfg.enable_remove_down_replica {
            return None;
        }
        for stats in &region.down_peers {
            let peer = stats.peer;
            let store = match self.cluster.get_store(peer.store_id) {
                Some(s) => s,
                None => {
                    warn!("lost the store, maybe you are recovering the cluster";
                        "store-id" => peer.store_id);
                    continue;
                }
            };
            if store.down_time() < cfg.max_store_down_time.0 {
                continue;
            }
            CHECKER_COUNTER_VEC
                .with_label_values(&["replica_checker", "replace-down"])
                .inc();
            return self.fix_peer(region, &peer, "down");
        }
        None
    }

    fn check_offline_peer(&self, region: &RegionInfo) -> Option<Operator> {
        let cfg = self.cluster.get_opts();
        if !cfg.enable_replace_offline_replica {
            return None;
        }
        for peer in region.get_peers() {
            let store = match self.cluster.get_store(peer.store_id) {
                Some(s) => s,
                None => continue,
            };
            if store.is_up() {
                continue;
            }
            CHECKER_COUNTER_VEC
                .with_label_values(&["replica_checker", "replace-offline"])
                .inc();
            return self.fix_peer(region, peer, "offline");
        }
        None
    }

    fn check_make_up_replica(&self, region: &RegionInfo) -> Option<Operator> {
        let cfg = self.cluster.get_opts();
        if !cfg.enable_make_up_replica {
            return None;
        }
        if region.get_peers().len() >= cfg.max_replicas as usize {
            return None;
        }
        CHECKER_COUNTER_VEC
            .with_label_values(&["replica_checker", "make-up-replica"])
            .inc();
        let (store, by_temp_state) = self
            .strategy(region)
            .select_store_to_add(&self.peer_stores(region));
        if store == 0 {
            CHECKER_COUNTER_VEC
                .with_label_values(&["replica_checker", "no-store-add"])
                .inc();
            if by_temp_state {
                self.region_waiting_list.lock().unwrap().put(region.get_id());
            }
            return None;
        }
        let peer = self.cluster.alloc_peer(store, PeerRole::Voter);
        let mut op = match create_add_peer_operator(
            "make-up-replica",
            self.cluster.as_ref(),
            region,
            peer,
            OpKind::REPLICA,
        ) {
            Ok(op) => op,
            Err(e) => {
                debug!("fail to create make-up-replica operator"; "err" => %e);
                return None;
            }
        };
        op.set_priority(PriorityLevel::High);
        Some(op)
    }

    fn check_remove_extra_replica(&self, region: &RegionInfo) -> Option<Operator> {
        let cfg = self.cluster.get_opts();
        if !cfg.enable_remove_extra_replica {
            return None;
        }
        if region.get_voters().len() <= cfg.max_replicas as usize {
            return None;
        }
        CHECKER_COUNTER_VEC
            .with_label_values(&["replica_checker", "remove-extra-replica"])
            .inc();
        let old = self
            .strategy(region)
            .select_store_to_remove(&self.peer_stores(region));
        if old == 0 {
            return None;
        }
        match create_remove_peer_operator(
            "remove-extra-replica",
            self.cluster.as_ref(),
            OpKind::REPLICA,
            region,
            old,
        ) {
            Ok(op) => Some(op),
            Err(e) => {
                debug!("fail to create remove-extra-replica operator"; "err" => %e);
                None
            }
        }
    }

    fn check_location_replacement(&self, region: &RegionInfo) -> Option<Operator> {
        let cfg = self.cluster.get_opts();
        if !cfg.enable_location_replacement || cfg.location_labels.is_empty() {
            return None;
        }
        let strategy = self.strategy(region);
        let stores = self.peer_stores(region);
        let old = strategy.select_store_to_remove(&stores);
        if old == 0 {
            return None;
        }
        let (new, _) = strategy.select_store_to_improve(&stores, old);
        if new == 0 {
            return None;
        }
        CHECKER_COUNTER_VEC
            .with_label_values(&["replica_checker", "move-to-better-location"])
            .inc();
        let new_peer = self.cluster.alloc_peer(new, PeerRole::Voter);
        match create_move_peer_operator(
            "move-to-better-location",
            self.cluster.as_ref(),
            region,
            OpKind::REPLICA,
            old,
            new_peer,
        ) {
            Ok(op) => Some(op),
            Err(e) => {
                debug!("fail to create location replacement operator"; "err" => %e);
                None
            }
        }
    }

    /// Replaces a dead peer, or simply removes it when the region is
    /// over-replicated anyway.
    fn fix_peer(&self, region: &RegionInfo, peer: &Peer, status: &str) -> Option<Operator> {
        let cfg = self.cluster.get_opts();
        if region.get_peers().len() > cfg.max_replicas as usize {
            return match create_remove_peer_operator(
                &format!("remove-extra-{}-replica", status),
                self.cluster.as_ref(),
                OpKind::REPLICA,
                region,
                peer.store_id,
            ) {
                Ok(op) => Some(op),
                Err(e) => {
                    debug!("fail to create remove peer operator"; "err" => %e);
                    None
                }
            };
        }
        let (store, by_temp_state) = self
            .strategy(region)
            .select_store_to_fix(&self.peer_stores(region), peer.store_id);
        if store == 0 {
            CHECKER_COUNTER_VEC
                .with_label_values(&["replica_checker", "no-store-replace"])
                .inc();
            if by_temp_state {
                self.region_waiting_list.lock().unwrap().put(region.get_id());
            }
            return None;
        }
        let new_peer = self.cluster.alloc_peer(store, PeerRole::Voter);
        let mut op = match create_move_peer_operator(
            &format!("replace-{}-replica", status),
            self.cluster.as_ref(),
            region,
            OpKind::REPLICA,
            peer.store_id,
            new_peer,
        ) {
            Ok(op) => op,
            Err(e) => {
                debug!("fail to create replace peer operator"; "err" => %e);
                return None;
            }
        };
        op.set_priority(PriorityLevel::High);
        Some(op)
    }

    fn strategy<'a>(&'a self, region: &'a RegionInfo) -> ReplicaStrategy<'a> {
        let cfg = self.cluster.get_opts();
        ReplicaStrategy {
            checker_name: self.name,
            cluster: self.cluster.as_ref(),
            location_labels: cfg.location_labels,
            isolation_level: cfg.isolation_level,
            region,
            extra_filters: vec![],
        }
    }

    fn peer_stores(&self, region: &RegionInfo) -> Vec<StoreInfo> {
        region
            .get_peers()
            .iter()
            .filter_map(|p| self.cluster.get_store(p.store_id))
            .collect()
    }
}
