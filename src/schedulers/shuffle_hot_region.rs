// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use rand::Rng;

use crate::cluster::Cluster;
use crate::core::{PeerRole, PriorityLevel, StoreInfo};
use crate::error::Result;
use crate::filter::{ExcludedFilter, Filter, StoreStateFilter};
use crate::metrics::SCHEDULER_COUNTER_VEC;
use crate::operator::{create_move_leader_operator, OpKind, Operator, OperatorController};
use crate::schedulers::utils::placement_safe;
use crate::schedulers::{ConfigDecoder, SchedulePlan, Scheduler};
use crate::statistics::FlowKind;

pub const SHUFFLE_HOT_REGION_NAME: &str = "shuffle-hot-region-scheduler";
pub const SHUFFLE_HOT_REGION_TYPE: &str = "shuffle-hot-region";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ShuffleHotRegionSchedulerConfig {
    pub name: String,
    pub limit: u64,
}

impl Default for ShuffleHotRegionSchedulerConfig {
    fn default() -> ShuffleHotRegionSchedulerConfig {
        ShuffleHotRegionSchedulerConfig {
            name: SHUFFLE_HOT_REGION_NAME.to_owned(),
            limit: 1,
        }
    }
}

/// Randomly relocates a hot peer and its leadership to a random legal
/// destination. An admin aid for stress testing hot scheduling.
pub struct ShuffleHotRegionScheduler {
    op_controller: Arc<OperatorController>,
    conf: ShuffleHotRegionSchedulerConfig,
}

impl ShuffleHotRegionScheduler {
    pub fn new(
        op_controller: Arc<OperatorController>,
        decoder: ConfigDecoder<'_>,
    ) -> Result<ShuffleHotRegionScheduler> {
        let conf = match decoder {
            ConfigDecoder::Json(data) if !data.is_empty() => {
                serde_json::from_slice(data).map_err(|e| crate::error::Error::Other(e.into()))?
            }
            ConfigDecoder::Args(args) if !args.is_empty() => {
                let limit = args[0]
                    .parse::<u64>()
                    .map_err(|e| crate::error::Error::Other(Box::new(e)))?;
                ShuffleHotRegionSchedulerConfig {
                    name: SHUFFLE_HOT_REGION_NAME.to_owned(),
                    limit,
                }
            }
            _ => ShuffleHotRegionSchedulerConfig::default(),
        };
        Ok(ShuffleHotRegionScheduler {
            op_controller,
            conf,
        })
    }

    fn random_schedule(&self, cluster: &dyn Cluster, kind: FlowKind) -> Option<Operator> {
        let cfg = cluster.get_opts();
        let min_degree = cfg.hot_region_cache_hits_threshold as i32;
        let stats = cluster.hot_region_stats(kind, min_degree);
        let mut rng = rand::thread_rng();

        for (_, peers) in stats {
            if peers.is_empty() {
                continue;
            }
            let stat = &peers[rng.gen_range(0..peers.len())];
            let src_region = match cluster.get_region(stat.region_id) {
                Some(r) => r,
                None => continue,
            };
            if !src_region.is_healthy() {
                continue;
            }
            let src_store_id = src_region.leader_store_id();
            if src_store_id == 0 {
                continue;
            }

            let state_filter = StoreStateFilter {
                action_scope: SHUFFLE_HOT_REGION_NAME.to_owned(),
                transfer_leader: true,
                move_region: true,
            };
            let excluded = ExcludedFilter::new(
                SHUFFLE_HOT_REGION_NAME,
                src_region.get_store_ids(),
                src_region.get_store_ids(),
            );
            let dest_store_ids: Vec<u64> = cluster
                .get_stores()
                .iter()
                .filter(|s| {
                    state_filter.target(&cfg, s)
                        && excluded.target(&cfg, s)
                        && placement_safe(cluster, &src_region, src_store_id, s.id)
                })
                .map(|s: &StoreInfo| s.id)
                .collect();
            if dest_store_ids.is_empty() {
                return None;
            }
            let dest_store_id = dest_store_ids[rng.gen_range(0..dest_store_ids.len())];

            src_region.get_store_peer(src_store_id)?;
            let dest_peer = cluster.alloc_peer(dest_store_id, PeerRole::Voter);
            match create_move_leader_operator(
                "random-move-hot-leader",
                cluster,
                &src_region,
                OpKind::REGION,
                src_store_id,
                dest_peer,
            ) {
                Ok(mut op) => {
                    op.set_priority(PriorityLevel::Low);
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[SHUFFLE_HOT_REGION_NAME, "new-operator"])
                        .inc();
                    return Some(op);
                }
                Err(e) => {
                    debug!("fail to create move leader operator"; "err" => %e);
                    return None;
                }
            }
        }
        SCHEDULER_COUNTER_VEC
            .with_label_values(&[SHUFFLE_HOT_REGION_NAME, "skip"])
            .inc();
        None
    }
}

impl Scheduler for ShuffleHotRegionScheduler {
    fn get_name(&self) -> &str {
        &self.conf.name
    }

    fn get_type(&self) -> &'static str {
        SHUFFLE_HOT_REGION_TYPE
    }

    fn encode_config(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.conf).map_err(|e| crate::error::Error::Other(e.into()))
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let cfg = cluster.get_opts();
        let hot_allowed =
            self.op_controller.operator_count(OpKind::HOT_REGION) < self.conf.limit;
        let region_allowed =
            self.op_controller.operator_count(OpKind::REGION) < cfg.region_schedule_limit;
        let leader_allowed =
            self.op_controller.operator_count(OpKind::LEADER) < cfg.leader_schedule_limit;
        if !hot_allowed || !region_allowed || !leader_allowed {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[SHUFFLE_HOT_REGION_NAME, "limit"])
                .inc();
        }
        hot_allowed && region_allowed && leader_allowed
    }

    fn schedule(
        &mut self,
        cluster: &dyn Cluster,
        _dry_run: bool,
    ) -> (Vec<Operator>, Vec<SchedulePlan>) {
        SCHEDULER_COUNTER_VEC
            .with_label_values(&[SHUFFLE_HOT_REGION_NAME, "schedule"])
            .inc();
        let kind = if rand::thread_rng().gen_bool(0.5) {
            FlowKind::Write
        } else {
            FlowKind::Read
        };
        match self.random_schedule(cluster, kind) {
            Some(op) => (vec![op], Vec::new()),
            None => (Vec::new(), Vec::new()),
        }
    }
}
