// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::{Arc, Mutex};

use crate::cluster::Cluster;
use crate::core::{Peer, RegionInfo, StoreInfo};
use crate::error::{Error, Result};
use crate::filter::{Filter, LabelConstraintFilter, StoreStateFilter};
use crate::metrics::CHECKER_COUNTER_VEC;
use crate::operator::{
    create_add_peer_operator, create_move_peer_operator, create_promote_learner_operator,
    create_remove_peer_operator, create_split_region_operator, create_transfer_leader_operator,
    CheckPolicy, OpKind, Operator,
};
use crate::placement::{match_label_constraints, RegionFit, Rule, RuleFit, RuleRole};
use crate::checker::ReplicaStrategy;
use crate::core::PriorityLevel;
use crate::util::cache::FifoCache;

const DOWN_STATUS: &str = "down";
const OFFLINE_STATUS: &str = "offline";

/// Fixes and improves regions according to placement rules.
pub struct RuleChecker {
    cluster: Arc<dyn Cluster>,
    name: &'static str,
    region_waiting_list: Arc<Mutex<FifoCache>>,
}

impl RuleChecker {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        region_waiting_list: Arc<Mutex<FifoCache>>,
    ) -> RuleChecker {
        RuleChecker {
            cluster,
            name: "rule-checker",
            region_waiting_list,
        }
    }

    pub fn get_type(&self) -> &'static str {
        "rule-checker"
    }

    pub fn check(&self, region: &RegionInfo) -> Option<Operator> {
        let fit = self.cluster.fit_region(region);
        self.check_with_fit(region, &fit)
    }

    pub fn check_with_fit(&self, region: &RegionInfo, fit: &RegionFit) -> Option<Operator> {
        CHECKER_COUNTER_VEC
            .with_label_values(&["rule_checker", "check"])
            .inc();

        if fit.rule_fits.is_empty() {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "fix-range"])
                .inc();
            // Matched by no rule: the region spans a rule boundary.
            return self.fix_range(region);
        }
        match self.fix_orphan_peers(region, fit) {
            Ok(Some(op)) => return Some(op),
            Ok(None) => {}
            Err(e) => {
                debug!("fail to fix orphan peer"; "err" => %e);
            }
        }
        for rf in &fit.rule_fits {
            match self.fix_rule_peer(region, fit, rf) {
                Ok(Some(op)) => return Some(op),
                Ok(None) => {}
                Err(e) => {
                    debug!("fail to fix rule peer";
                        "rule-group" => &rf.rule.group_id,
                        "rule-id" => &rf.rule.id,
                        "err" => %e,
                    );
                }
            }
        }
        None
    }

    fn fix_range(&self, region: &RegionInfo) -> Option<Operator> {
        let keys = self
            .cluster
            .get_rule_manager()
            .get_split_keys(region.get_start_key(), region.get_end_key());
        if keys.is_empty() {
            return None;
        }
        match create_split_region_operator(
            "rule-split-region",
            region,
            OpKind::empty(),
            CheckPolicy::Usekey,
            keys,
        ) {
            Ok(op) => Some(op),
            Err(e) => {
                debug!("create split region operator failed"; "err" => %e);
                None
            }
        }
    }

    fn fix_rule_peer(
        &self,
        region: &RegionInfo,
        fit: &RegionFit,
        rf: &RuleFit,
    ) -> Result<Option<Operator>> {
        // Make up peers.
        if rf.peers.len() < rf.rule.count {
            return self.add_rule_peer(region, rf).map(Some);
        }
        // Fix down/offline peers.
        for peer in &rf.peers {
            if self.is_down_peer(region, peer) {
                CHECKER_COUNTER_VEC
                    .with_label_values(&["rule_checker", "replace-down"])
                    .inc();
                return self.replace_rule_peer(region, rf, peer, DOWN_STATUS).map(Some);
            }
            if self.is_offline_peer(peer) {
                CHECKER_COUNTER_VEC
                    .with_label_values(&["rule_checker", "replace-offline"])
                    .inc();
                return self
                    .replace_rule_peer(region, rf, peer, OFFLINE_STATUS)
                    .map(Some);
            }
        }
        // Fix loosely matched peers.
        for peer in &rf.peers_with_different_role {
            if let Some(op) = self.fix_loose_match_peer(region, fit, rf, peer)? {
                return Ok(Some(op));
            }
        }
        self.fix_better_location(region, rf)
    }

    fn add_rule_peer(&self, region: &RegionInfo, rf: &RuleFit) -> Result<Operator> {
        CHECKER_COUNTER_VEC
            .with_label_values(&["rule_checker", "add-rule-peer"])
            .inc();
        let rule_stores = self.rule_fit_stores(rf);
        let (store, by_temp_state) = self
            .strategy(region, &rf.rule)
            .select_store_to_add(&rule_stores);
        if store == 0 {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "no-store-add"])
                .inc();
            if by_temp_state {
                self.region_waiting_list.lock().unwrap().put(region.get_id());
            }
            return Err(Error::NoStoreToAdd(region.get_id()));
        }
        let peer = self.cluster.alloc_peer(store, rf.rule.role.peer_role());
        let mut op = create_add_peer_operator(
            "add-rule-peer",
            self.cluster.as_ref(),
            region,
            peer,
            OpKind::REPLICA,
        )?;
        op.set_priority(PriorityLevel::High);
        Ok(op)
    }

    fn replace_rule_peer(
        &self,
        region: &RegionInfo,
        rf: &RuleFit,
        peer: &Peer,
        status: &str,
    ) -> Result<Operator> {
        let rule_stores = self.rule_fit_stores(rf);
        let (store, by_temp_state) = self
            .strategy(region, &rf.rule)
            .select_store_to_fix(&rule_stores, peer.store_id);
        if store == 0 {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "no-store-replace"])
                .inc();
            if by_temp_state {
                self.region_waiting_list.lock().unwrap().put(region.get_id());
            }
            return Err(Error::NoStoreToReplace(region.get_id()));
        }
        let new_peer = self.cluster.alloc_peer(store, rf.rule.role.peer_role());
        let mut op = create_move_peer_operator(
            &format!("replace-rule-{}-peer", status),
            self.cluster.as_ref(),
            region,
            OpKind::REPLICA,
            peer.store_id,
            new_peer,
        )?;
        op.set_priority(PriorityLevel::High);
        Ok(op)
    }

    fn fix_loose_match_peer(
        &self,
        region: &RegionInfo,
        fit: &RegionFit,
        rf: &RuleFit,
        peer: &Peer,
    ) -> Result<Option<Operator>> {
        if peer.is_learner() && rf.rule.role != RuleRole::Learner {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "fix-peer-role"])
                .inc();
            return create_promote_learner_operator("fix-peer-role", region, peer).map(Some);
        }
        let leader_id = region.get_leader().map_or(0, |l| l.id);
        if leader_id != peer.id && rf.rule.role == RuleRole::Leader {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "fix-leader-role"])
                .inc();
            if self.allow_leader(fit, peer) {
                return create_transfer_leader_operator(
                    "fix-leader-role",
                    self.cluster.as_ref(),
                    region,
                    region.leader_store_id(),
                    peer.store_id,
                    OpKind::empty(),
                )
                .map(Some);
            }
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "not-allow-leader"])
                .inc();
            return Err(Error::Unsafe("peer cannot be leader".into()));
        }
        if leader_id == peer.id && rf.rule.role == RuleRole::Follower {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "fix-follower-role"])
                .inc();
            for p in region.get_peers() {
                if p.id != peer.id && self.allow_leader(fit, p) {
                    return create_transfer_leader_operator(
                        "fix-follower-role",
                        self.cluster.as_ref(),
                        region,
                        peer.store_id,
                        p.store_id,
                        OpKind::empty(),
                    )
                    .map(Some);
                }
            }
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "no-new-leader"])
                .inc();
            return Err(Error::Unsafe("no new leader".into()));
        }
        Ok(None)
    }

    fn allow_leader(&self, fit: &RegionFit, peer: &Peer) -> bool {
        if peer.is_learner() {
            return false;
        }
        let store = match self.cluster.get_store(peer.store_id) {
            Some(s) => s,
            None => return false,
        };
        let state_filter = StoreStateFilter {
            action_scope: "rule-checker".to_owned(),
            transfer_leader: true,
            move_region: false,
        };
        if !state_filter.target(&self.cluster.get_opts(), &store) {
            return false;
        }
        fit.rule_fits.iter().any(|rf| {
            matches!(rf.rule.role, RuleRole::Leader | RuleRole::Voter)
                && match_label_constraints(&store, &rf.rule.label_constraints)
        })
    }

    fn fix_better_location(
        &self,
        region: &RegionInfo,
        rf: &RuleFit,
    ) -> Result<Option<Operator>> {
        if !self.cluster.get_opts().enable_location_replacement {
            return Ok(None);
        }
        if rf.rule.location_labels.is_empty() || rf.rule.count <= 1 {
            return Ok(None);
        }
        let strategy = self.strategy(region, &rf.rule);
        let rule_stores = self.rule_fit_stores(rf);
        let old_store = strategy.select_store_to_remove(&rule_stores);
        if old_store == 0 {
            return Ok(None);
        }
        let (new_store, _) = strategy.select_store_to_improve(&rule_stores, old_store);
        if new_store == 0 {
            debug!("no replacement store"; "region-id" => region.get_id());
            return Ok(None);
        }
        CHECKER_COUNTER_VEC
            .with_label_values(&["rule_checker", "move-to-better-location"])
            .inc();
        let new_peer = self.cluster.alloc_peer(new_store, rf.rule.role.peer_role());
        create_move_peer_operator(
            "move-to-better-location",
            self.cluster.as_ref(),
            region,
            OpKind::REPLICA,
            old_store,
            new_peer,
        )
        .map(Some)
    }

    fn fix_orphan_peers(
        &self,
        region: &RegionInfo,
        fit: &RegionFit,
    ) -> Result<Option<Operator>> {
        if fit.orphan_peers.is_empty() {
            return Ok(None);
        }
        let is_unhealthy_peer = |id: u64| {
            region.get_pending_peer(id).is_some() || region.get_down_peer(id).is_some()
        };
        // Remove an orphan only when every rule is satisfied (count and
        // role) and none of the picked peers is pending or down.
        let mut has_unhealthy_fit = false;
        'fits: for rf in &fit.rule_fits {
            if !rf.is_satisfied() {
                has_unhealthy_fit = true;
                break;
            }
            for p in &rf.peers {
                if is_unhealthy_peer(p.id) {
                    has_unhealthy_fit = true;
                    break 'fits;
                }
            }
        }
        if !has_unhealthy_fit {
            CHECKER_COUNTER_VEC
                .with_label_values(&["rule_checker", "remove-orphan-peer"])
                .inc();
            return create_remove_peer_operator(
                "remove-orphan-peer",
                self.cluster.as_ref(),
                OpKind::REPLICA,
                region,
                fit.orphan_peers[0].store_id,
            )
            .map(Some);
        }
        // With an unhealthy fit, only shed an orphan that is itself
        // unhealthy, and only when there is more than one.
        if fit.orphan_peers.len() >= 2 {
            for orphan in &fit.orphan_peers {
                if is_unhealthy_peer(orphan.id) {
                    CHECKER_COUNTER_VEC
                        .with_label_values(&["rule_checker", "remove-orphan-peer"])
                        .inc();
                    return create_remove_peer_operator(
                        "remove-orphan-peer",
                        self.cluster.as_ref(),
                        OpKind::REPLICA,
                        region,
                        orphan.store_id,
                    )
                    .map(Some);
                }
            }
        }
        CHECKER_COUNTER_VEC
            .with_label_values(&["rule_checker", "skip-remove-orphan-peer"])
            .inc();
        Ok(None)
    }

    fn is_down_peer(&self, region: &RegionInfo, peer: &Peer) -> bool {
        if region.get_down_peer(peer.id).is_none() {
            return false;
        }
        let store = match self.cluster.get_store(peer.store_id) {
            Some(s) => s,
            None => {
                warn!("lost the store, maybe you are recovering the cluster";
                    "store-id" => peer.store_id);
                return false;
            }
        };
        store.down_time() >= self.cluster.get_opts().max_store_down_time.0
    }

    fn is_offline_peer(&self, peer: &Peer) -> bool {
        match self.cluster.get_store(peer.store_id) {
            Some(s) => !s.is_up(),
            None => {
                warn!("lost the store, maybe you are recovering the cluster";
                    "store-id" => peer.store_id);
                false
            }
        }
    }

    fn strategy<'a>(&'a self, region: &'a RegionInfo, rule: &Rule) -> ReplicaStrategy<'a> {
        ReplicaStrategy {
            checker_name: self.name,
            cluster: self.cluster.as_ref(),
            location_labels: rule.location_labels.clone(),
            isolation_level: rule.isolation_level.clone(),
            region,
            extra_filters: vec![Box::new(LabelConstraintFilter::new(
                self.name,
                rule.label_constraints.clone(),
            ))],
        }
    }

    fn rule_fit_stores(&self, rf: &RuleFit) -> Vec<StoreInfo> {
        rf.peers
            .iter()
            .filter_map(|p| self.cluster.get_store(p.store_id))
            .collect()
    }
}
