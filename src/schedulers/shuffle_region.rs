// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::cluster::Cluster;
use crate::core::{PeerRole, RegionInfo, StoreInfo};
use crate::error::Result;
use crate::filter::{ExcludedFilter, Filter, StoreStateFilter};
use crate::metrics::SCHEDULER_COUNTER_VEC;
use crate::operator::{create_move_peer_operator, OpKind, Operator, OperatorController};
use crate::schedulers::utils::placement_safe;
use crate::schedulers::{ConfigDecoder, SchedulePlan, Scheduler};

pub const SHUFFLE_REGION_NAME: &str = "shuffle-region-scheduler";
pub const SHUFFLE_REGION_TYPE: &str = "shuffle-region";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ShuffleRegionSchedulerConfig {
    pub roles: Vec<String>,
}

impl Default for ShuffleRegionSchedulerConfig {
    fn default() -> ShuffleRegionSchedulerConfig {
        ShuffleRegionSchedulerConfig {
            roles: vec![
                "leader".to_owned(),
                "follower".to_owned(),
                "learner".to_owned(),
            ],
        }
    }
}

/// Randomly moves peers between stores. An admin aid for exercising the
/// data plane; never used in normal operation.
pub struct ShuffleRegionScheduler {
    op_controller: Arc<OperatorController>,
    conf: ShuffleRegionSchedulerConfig,
}

impl ShuffleRegionScheduler {
    pub fn new(
        op_controller: Arc<OperatorController>,
        decoder: ConfigDecoder<'_>,
    ) -> Result<ShuffleRegionScheduler> {
        let conf = match decoder {
            ConfigDecoder::Json(data) if !data.is_empty() => {
                serde_json::from_slice(data).map_err(|e| crate::error::Error::Other(e.into()))?
            }
            ConfigDecoder::Args(args) if !args.is_empty() => ShuffleRegionSchedulerConfig {
                roles: args.to_vec(),
            },
            _ => ShuffleRegionSchedulerConfig::default(),
        };
        Ok(ShuffleRegionScheduler {
            op_controller,
            conf,
        })
    }

    fn pick_region(&self, cluster: &dyn Cluster, store_id: u64) -> Option<RegionInfo> {
        for role in &self.conf.roles {
            let region = match role.as_str() {
                "leader" => cluster.rand_leader_region(store_id),
                "follower" => cluster.rand_follower_region(store_id),
                "learner" => cluster.rand_learner_region(store_id),
                _ => None,
            };
            if let Some(r) = region {
                if r.is_healthy() {
                    return Some(r);
                }
            }
        }
        None
    }
}

impl Scheduler for ShuffleRegionScheduler {
    fn get_name(&self) -> &str {
        SHUFFLE_REGION_NAME
    }

    fn get_type(&self) -> &'static str {
        SHUFFLE_REGION_TYPE
    }

    fn encode_config(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.conf).map_err(|e| crate::error::Error::Other(e.into()))
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let allowed = self.op_controller.operator_count(OpKind::REGION)
            < cluster.get_opts().region_schedule_limit;
        if !allowed {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[SHUFFLE_REGION_NAME, "limit"])
                .inc();
        }
        allowed
    }

    fn schedule(
        &mut self,
        cluster: &dyn Cluster,
        _dry_run: bool,
    ) -> (Vec<Operator>, Vec<SchedulePlan>) {
        SCHEDULER_COUNTER_VEC
            .with_label_values(&[SHUFFLE_REGION_NAME, "schedule"])
            .inc();
        let cfg = cluster.get_opts();
        let state_filter = StoreStateFilter {
            action_scope: SHUFFLE_REGION_NAME.to_owned(),
            transfer_leader: false,
            move_region: true,
        };

        let mut stores: Vec<StoreInfo> = cluster
            .get_stores()
            .into_iter()
            .filter(|s| state_filter.source(&cfg, s))
            .collect();
        stores.shuffle(&mut rand::thread_rng());

        for source in &stores {
            let region = match self.pick_region(cluster, source.id) {
                Some(r) => r,
                None => continue,
            };
            let excluded = ExcludedFilter::new(
                SHUFFLE_REGION_NAME,
                HashSet::new(),
                region.get_store_ids(),
            );
            let mut targets: Vec<&StoreInfo> = stores
                .iter()
                .filter(|s| {
                    state_filter.target(&cfg, s)
                        && excluded.target(&cfg, s)
                        && placement_safe(cluster, &region, source.id, s.id)
                })
                .collect();
            targets.shuffle(&mut rand::thread_rng());
            let target_id = match targets.first() {
                Some(t) => t.id,
                None => continue,
            };

            let role = if region
                .get_store_peer(source.id)
                .map_or(false, |p| p.is_learner())
            {
                PeerRole::Learner
            } else {
                PeerRole::Voter
            };
            let new_peer = cluster.alloc_peer(target_id, role);
            match create_move_peer_operator(
                "shuffle-region",
                cluster,
                &region,
                OpKind::REGION,
                source.id,
                new_peer,
            ) {
                Ok(op) => {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[SHUFFLE_REGION_NAME, "new-operator"])
                        .inc();
                    return (vec![op], Vec::new());
                }
                Err(e) => {
                    debug!("fail to create shuffle region operator"; "err" => %e);
                }
            }
        }
        SCHEDULER_COUNTER_VEC
            .with_label_values(&[SHUFFLE_REGION_NAME, "no-region"])
            .inc();
        (Vec::new(), Vec::new())
    }
}
