// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use crate::cluster::Cluster;
use crate::core::StoreInfo;
use crate::error::{Error, Result};
use crate::filter::{Filter, StoreStateFilter};
use crate::metrics::SCHEDULER_COUNTER_VEC;
use crate::operator::{create_transfer_leader_operator, OpKind, Operator, OperatorController};
use crate::schedulers::{ConfigDecoder, SchedulePlan, Scheduler};

pub const EVICT_LEADER_NAME: &str = "evict-leader-scheduler";
pub const EVICT_LEADER_TYPE: &str = "evict-leader";

/// The target stores; persisted independently so eviction survives a
/// control-plane restart.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EvictLeaderSchedulerConfig {
    pub store_ids: Vec<u64>,
}

/// Drains all leadership away from the configured stores, e.g. ahead of
/// a rolling restart.
pub struct EvictLeaderScheduler {
    op_controller: Arc<OperatorController>,
    conf: EvictLeaderSchedulerConfig,
}

impl EvictLeaderScheduler {
    pub fn new(
        op_controller: Arc<OperatorController>,
        decoder: ConfigDecoder<'_>,
    ) -> Result<EvictLeaderScheduler> {
        let conf = match decoder {
            ConfigDecoder::Json(data) if !data.is_empty() => {
                serde_json::from_slice(data).map_err(|e| Error::Other(e.into()))?
            }
            ConfigDecoder::Json(_) => EvictLeaderSchedulerConfig::default(),
            ConfigDecoder::Args(args) => {
                let mut store_ids = Vec::with_capacity(args.len());
                for arg in args {
                    store_ids.push(
                        arg.parse::<u64>()
                            .map_err(|e| Error::Other(Box::new(e)))?,
                    );
                }
                EvictLeaderSchedulerConfig { store_ids }
            }
        };
        Ok(EvictLeaderScheduler {
            op_controller,
            conf,
        })
    }

    pub fn config(&self) -> &EvictLeaderSchedulerConfig {
        &self.conf
    }
}

impl Scheduler for EvictLeaderScheduler {
    fn get_name(&self) -> &str {
        EVICT_LEADER_NAME
    }

    fn get_type(&self) -> &'static str {
        EVICT_LEADER_TYPE
    }

    fn encode_config(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.conf).map_err(|e| Error::Other(e.into()))
    }

    fn is_schedule_allowed(&self, cluster: &dyn Cluster) -> bool {
        let allowed = self.op_controller.operator_count(OpKind::LEADER)
            < cluster.get_opts().leader_schedule_limit;
        if !allowed {
            SCHEDULER_COUNTER_VEC
                .with_label_values(&[EVICT_LEADER_NAME, "limit"])
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
            .with_label_values(&[EVICT_LEADER_NAME, "schedule"])
            .inc();
        let cfg = cluster.get_opts();
        let state_filter = StoreStateFilter {
            action_scope: EVICT_LEADER_NAME.to_owned(),
            transfer_leader: true,
            move_region: false,
        };

        let mut ops = Vec::new();
        for &store_id in &self.conf.store_ids {
            let region = match cluster.rand_leader_region(store_id) {
                Some(r) => r,
                None => {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[EVICT_LEADER_NAME, "no-leader"])
                        .inc();
                    continue;
                }
            };
            let mut targets: Vec<StoreInfo> = region
                .get_followers()
                .iter()
                .filter_map(|p| cluster.get_store(p.store_id))
                .filter(|s| state_filter.target(&cfg, s))
                .collect();
            targets.sort_by_key(|s| s.leader_count);
            let target = match targets.first() {
                Some(t) => t.id,
                None => {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[EVICT_LEADER_NAME, "no-target-store"])
                        .inc();
                    continue;
                }
            };
            match create_transfer_leader_operator(
                "evict-leader",
                cluster,
                &region,
                store_id,
                target,
                OpKind::empty(),
            ) {
                Ok(op) => {
                    SCHEDULER_COUNTER_VEC
                        .with_label_values(&[EVICT_LEADER_NAME, "new-operator"])
                        .inc();
                    ops.push(op);
                }
                Err(e) => {
                    debug!("fail to create evict leader operator"; "err" => %e);
                }
            }
        }
        (ops, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::operator::NullHeartbeatStream;

    #[test]
    fn test_config_round_trip() {
        let cluster: Arc<ClusterState> =
            Arc::new(ClusterState::new(crate::config::ScheduleConfig::default()));
        let op_controller = Arc::new(OperatorController::new(
            Arc::clone(&cluster) as Arc<dyn Cluster>,
            Box::new(NullHeartbeatStream),
        ));
        let args = vec!["3".to_owned(), "5".to_owned()];
        let s = EvictLeaderScheduler::new(Arc::clone(&op_controller), ConfigDecoder::Args(&args))
            .unwrap();
        let encoded = s.encode_config().unwrap();
        let decoded =
            EvictLeaderScheduler::new(op_controller, ConfigDecoder::Json(&encoded)).unwrap();
        assert_eq!(s.config(), decoded.config());
        assert_eq!(decoded.config().store_ids, vec![3, 5]);
    }
}
