// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{Builder, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::checker::CheckerController;
use crate::cluster::{Cluster, ClusterState};
use crate::core::RegionInfo;
use crate::error::{Error, Result};
use crate::metrics::{PATROL_REGIONS_HISTOGRAM, SCHEDULER_STATUS_GAUGE_VEC};
use crate::operator::{HeartbeatStream, OperatorController};
use crate::schedulers::{
    create_scheduler, find_scheduler_type_by_name, ConfigDecoder, Scheduler,
};
use crate::statistics::FlowKind;
use crate::storage::Storage;
use crate::util::keyutil;

pub const RUN_SCHEDULER_CHECK_INTERVAL: Duration = Duration::from_secs(3);
pub const PUSH_OPERATOR_TICK_INTERVAL: Duration = Duration::from_millis(500);
/// Regions checked per patrol batch.
pub const PATROL_SCAN_REGION_LIMIT: usize = 128;
const SUSPECT_KEY_RANGE_SCAN_LIMIT: usize = 1024;
const MAX_SCHEDULE_RETRIES: usize = 10;
const MAX_LOAD_CONFIG_RETRIES: usize = 10;
const SUSPECT_REGION_CAPACITY: usize = 4096;

struct ScheduleControllerHandle {
    tp: &'static str,
    stop: Sender<()>,
    pause_until: Arc<AtomicI64>,
    handle: Option<JoinHandle<()>>,
}

/// Key ranges flagged for repair, deduplicated by their encoded key.
#[derive(Default)]
struct SuspectKeyRanges {
    queue: VecDeque<(Vec<u8>, Vec<u8>)>,
    keys: HashSet<String>,
}

impl SuspectKeyRanges {
    fn put(&mut self, start: Vec<u8>, end: Vec<u8>) {
        let key = keyutil::build_key_range_key(&start, &end);
        if self.keys.insert(key) {
            self.queue.push_back((start, end));
        }
    }

    fn pop(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        let (start, end) = self.queue.pop_front()?;
        self.keys
            .remove(&keyutil::build_key_range_key(&start, &end));
        Some((start, end))
    }
}

/// Owns the scheduling loops: the patrol worker walking regions through
/// the checker pipeline, the operator push worker, and one worker per
/// registered scheduler. Stopping the coordinator stops every child.
pub struct Coordinator {
    cluster: Arc<ClusterState>,
    checkers: Arc<CheckerController>,
    op_controller: Arc<OperatorController>,
    storage: Arc<dyn Storage>,
    schedulers: RwLock<HashMap<String, ScheduleControllerHandle>>,
    scheduler_order: Mutex<Vec<String>>,
    suspect_regions: Mutex<VecDeque<u64>>,
    suspect_key_ranges: Mutex<SuspectKeyRanges>,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        cluster: Arc<ClusterState>,
        storage: Arc<dyn Storage>,
        hb_stream: Box<dyn HeartbeatStream>,
    ) -> Arc<Coordinator> {
        let op_controller = Arc::new(OperatorController::new(
            Arc::clone(&cluster) as Arc<dyn Cluster>,
            hb_stream,
        ));
        let checkers = Arc::new(CheckerController::new(
            Arc::clone(&cluster) as Arc<dyn Cluster>,
            Arc::clone(&op_controller),
        ));
        let (stop_tx, stop_rx) = unbounded();
        Arc::new(Coordinator {
            cluster,
            checkers,
            op_controller,
            storage,
            schedulers: RwLock::new(HashMap::new()),
            scheduler_order: Mutex::new(Vec::new()),
            suspect_regions: Mutex::new(VecDeque::new()),
            suspect_key_ranges: Mutex::new(SuspectKeyRanges::default()),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn get_operator_controller(&self) -> Arc<OperatorController> {
        Arc::clone(&self.op_controller)
    }

    pub fn get_checker_controller(&self) -> Arc<CheckerController> {
        Arc::clone(&self.checkers)
    }

    pub fn get_cluster(&self) -> Arc<ClusterState> {
        Arc::clone(&self.cluster)
    }

    /// Heartbeat entry: updates the cluster state and drives the
    /// region's operator. Rejection only surfaces as the boolean.
    pub fn on_region_heartbeat(&self, region: RegionInfo) -> bool {
        match self.cluster.handle_region_heartbeat(region.clone()) {
            Ok(()) => {
                self.op_controller.dispatch(&region);
                true
            }
            Err(e) => {
                debug!("region heartbeat rejected";
                    "region-id" => region.get_id(), "err" => %e);
                false
            }
        }
    }

    pub fn add_suspect_regions(&self, region_ids: &[u64]) {
        let mut suspects = self.suspect_regions.lock().unwrap();
        for &id in region_ids {
            if !suspects.contains(&id) {
                if suspects.len() >= SUSPECT_REGION_CAPACITY {
                    suspects.pop_front();
                }
                suspects.push_back(id);
            }
        }
    }

    pub fn get_suspect_regions(&self) -> Vec<u64> {
        self.suspect_regions.lock().unwrap().iter().copied().collect()
    }

    pub fn remove_suspect_region(&self, region_id: u64) {
        self.suspect_regions.lock().unwrap().retain(|&id| id != region_id);
    }

    pub fn add_suspect_key_range(&self, start: &[u8], end: &[u8]) {
        self.suspect_key_ranges
            .lock()
            .unwrap()
            .put(start.to_vec(), end.to_vec());
    }

    pub fn pop_one_suspect_key_range(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        self.suspect_key_ranges.lock().unwrap().pop()
    }

    /// Blocks until the cluster is prepared, loads persisted scheduler
    /// configuration and spawns the workers. Fatal only when the initial
    /// config load keeps failing.
    pub fn run(self: &Arc<Self>) -> Result<()> {
        info!("coordinator starts to collect cluster information");
        loop {
            if self.cluster.is_prepared() {
                info!("coordinator has finished cluster information preparation");
                break;
            }
            match self.stop_rx.recv_timeout(RUN_SCHEDULER_CHECK_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("coordinator stops running");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        info!("coordinator starts to run schedulers");

        let mut loaded = None;
        for i in 0..MAX_LOAD_CONFIG_RETRIES {
            match self.storage.load_all_scheduler_configs() {
                Ok(r) => {
                    loaded = Some(r);
                    break;
                }
                Err(e) => {
                    error!("cannot load schedulers' config";
                        "retry-times" => i, "err" => %e);
                }
            }
        }
        let (names, configs) = loaded.ok_or_else(|| {
            Error::StorageLoadFailed("cannot load schedulers' config".to_owned())
        })?;

        let mut schedule_cfg = self.cluster.get_opts();

        // Schedulers with an independent persisted configuration.
        for (name, data) in names.iter().zip(configs.iter()) {
            let tp = match find_scheduler_type_by_name(name) {
                Some(tp) => tp,
                None => {
                    error!("the scheduler type not found"; "scheduler-name" => name.as_str());
                    continue;
                }
            };
            let cfg_entry = schedule_cfg.schedulers.iter().find(|c| c.tp == tp);
            let cfg_entry = match cfg_entry {
                Some(c) => c.clone(),
                None => {
                    error!("the scheduler type not found in config";
                        "scheduler-name" => name.as_str());
                    continue;
                }
            };
            if cfg_entry.disable {
                info!("skip create scheduler with independent configuration";
                    "scheduler-name" => name.as_str());
                continue;
            }
            match create_scheduler(
                tp,
                Arc::clone(&self.op_controller),
                ConfigDecoder::Json(data),
            ) {
                Ok(s) => {
                    info!("create scheduler with independent configuration";
                        "scheduler-name" => s.get_name());
                    if let Err(e) = self.add_scheduler(s, Vec::new()) {
                        error!("can not add scheduler with independent configuration";
                            "scheduler-name" => name.as_str(), "err" => %e);
                    }
                }
                Err(e) => {
                    error!("can not create scheduler with independent configuration";
                        "scheduler-name" => name.as_str(), "err" => %e);
                }
            }
        }

        // The ordinary list from the schedule options; invalid entries
        // are pruned and the cleaned list persisted back.
        let mut kept = Vec::with_capacity(schedule_cfg.schedulers.len());
        for entry in schedule_cfg.schedulers.clone() {
            if entry.disable {
                info!("skip create scheduler"; "scheduler-type" => entry.tp.as_str());
                kept.push(entry);
                continue;
            }
            let s = match create_scheduler(
                &entry.tp,
                Arc::clone(&self.op_controller),
                ConfigDecoder::Args(&entry.args),
            ) {
                Ok(s) => s,
                Err(e) => {
                    error!("can not create scheduler";
                        "scheduler-type" => entry.tp.as_str(), "err" => %e);
                    continue;
                }
            };
            info!("create scheduler"; "scheduler-name" => s.get_name());
            match self.add_scheduler(s, entry.args.clone()) {
                Ok(()) | Err(Error::SchedulerExisted(_)) => kept.push(entry),
                Err(e) => {
                    error!("can not add scheduler";
                        "scheduler-type" => entry.tp.as_str(), "err" => %e);
                }
            }
        }
        schedule_cfg.schedulers = kept;
        self.cluster.set_opts(schedule_cfg.clone());
        if let Err(e) = self.storage.save_schedule_options(&schedule_cfg) {
            error!("cannot persist schedule config"; "err" => %e);
        }

        let patrol = {
            let coordinator = Arc::clone(self);
            let stop = self.stop_rx.clone();
            Builder::new()
                .name("patrol-region-worker".to_owned())
                .spawn(move || coordinator.patrol_regions(stop))
                .unwrap()
        };
        let push = {
            let coordinator = Arc::clone(self);
            let stop = self.stop_rx.clone();
            Builder::new()
                .name("push-operator-worker".to_owned())
                .spawn(move || coordinator.drive_push_operator(stop))
                .unwrap()
        };
        self.handles.lock().unwrap().extend(vec![patrol, push]);
        Ok(())
    }

    /// Registers a scheduler and spawns its tick worker.
    pub fn add_scheduler(
        self: &Arc<Self>,
        mut scheduler: Box<dyn Scheduler>,
        args: Vec<String>,
    ) -> Result<()> {
        let name = scheduler.get_name().to_owned();
        let tp = scheduler.get_type();
        {
            let schedulers = self.schedulers.read().unwrap();
            if schedulers.contains_key(&name) {
                return Err(Error::SchedulerExisted(name));
            }
        }
        scheduler.prepare(self.cluster.as_ref())?;
        if let Ok(data) = scheduler.encode_config() {
            if let Err(e) = self.storage.save_scheduler_config(&name, &data) {
                error!("cannot persist scheduler config";
                    "scheduler-name" => name.as_str(), "err" => %e);
            }
        }

        let (stop_tx, stop_rx) = unbounded();
        let pause_until = Arc::new(AtomicI64::new(0));
        let handle = {
            let coordinator = Arc::clone(self);
            let pause = Arc::clone(&pause_until);
            let thread_name = format!("scheduler-{}", tp);
            Builder::new()
                .name(thread_name)
                .spawn(move || coordinator.run_scheduler(scheduler, stop_rx, pause))
                .unwrap()
        };

        let mut schedulers = self.schedulers.write().unwrap();
        schedulers.insert(
            name.clone(),
            ScheduleControllerHandle {
                tp,
                stop: stop_tx,
                pause_until,
                handle: Some(handle),
            },
        );
        self.scheduler_order.lock().unwrap().push(name);

        let mut cfg = self.cluster.get_opts();
        cfg.add_scheduler_cfg(tp, args);
        self.cluster.set_opts(cfg);
        Ok(())
    }

    /// Unregisters a scheduler, stopping its worker and removing its
    /// persisted configuration.
    pub fn remove_scheduler(&self, name: &str) -> Result<()> {
        let mut handle = {
            let mut schedulers = self.schedulers.write().unwrap();
            schedulers
                .remove(name)
                .ok_or_else(|| Error::SchedulerNotFound(name.to_owned()))?
        };
        self.scheduler_order.lock().unwrap().retain(|n| n != name);

        let mut cfg = self.cluster.get_opts();
        cfg.remove_scheduler_cfg(handle.tp);
        self.cluster.set_opts(cfg.clone());
        if let Err(e) = self.storage.save_schedule_options(&cfg) {
            error!("the option can not persist scheduler config"; "err" => %e);
        }
        if let Err(e) = self.storage.remove_scheduler_config(name) {
            error!("can not remove the scheduler config"; "err" => %e);
        }

        drop(handle.stop);
        if let Some(h) = handle.handle.take() {
            let _ = h.join();
        }
        SCHEDULER_STATUS_GAUGE_VEC
            .with_label_values(&[name, "allow"])
            .set(0);
        Ok(())
    }

    pub fn get_scheduler_names(&self) -> Vec<String> {
        self.schedulers.read().unwrap().keys().cloned().collect()
    }

    /// Pauses a scheduler (or all with `"all"`) for `secs` seconds; zero
    /// resumes.
    pub fn pause_or_resume_scheduler(&self, name: &str, secs: i64) -> Result<()> {
        let schedulers = self.schedulers.read().unwrap();
        let targets: Vec<&ScheduleControllerHandle> = if name == "all" {
            schedulers.values().collect()
        } else {
            vec![schedulers
                .get(name)
                .ok_or_else(|| Error::SchedulerNotFound(name.to_owned()))?]
        };
        let now = unix_now_secs();
        for t in targets {
            let until = if secs > 0 { now + secs } else { 0 };
            t.pause_until.store(until, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn is_scheduler_paused(&self, name: &str) -> Result<bool> {
        let schedulers = self.schedulers.read().unwrap();
        let handle = schedulers
            .get(name)
            .ok_or_else(|| Error::SchedulerNotFound(name.to_owned()))?;
        Ok(unix_now_secs() < handle.pause_until.load(Ordering::SeqCst))
    }

    /// Stops everything: schedulers in reverse creation order, then the
    /// patrol and push workers.
    pub fn stop(&self) {
        let order: Vec<String> = {
            let mut order = self.scheduler_order.lock().unwrap();
            order.drain(..).rev().collect()
        };
        for name in order {
            if let Some(mut handle) = self.schedulers.write().unwrap().remove(&name) {
                drop(handle.stop);
                if let Some(h) = handle.handle.take() {
                    let _ = h.join();
                }
            }
        }
        self.stop_tx.lock().unwrap().take();
        for handle in self.handles.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        info!("coordinator is stopped");
    }

    fn patrol_regions(self: Arc<Self>, stop: Receiver<()>) {
        info!("coordinator starts patrol regions");
        let mut start = Instant::now();
        let mut key: Vec<u8> = Vec::new();
        loop {
            let interval = self.cluster.get_opts().patrol_region_interval.0;
            match stop.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("patrol regions has been stopped");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            self.check_priority_regions();
            self.check_suspect_regions();
            self.check_suspect_key_ranges();

            let regions = self.cluster.scan_regions(&key, &[], PATROL_SCAN_REGION_LIMIT);
            if regions.is_empty() {
                // Resets the scan key.
                key.clear();
                continue;
            }
            for region in &regions {
                if self.op_controller.has_operator(region.get_id()) {
                    continue;
                }
                key = region.get_end_key().to_vec();
                let ops = self.checkers.check_region(region);
                if !ops.is_empty() {
                    self.op_controller.add_waiting_operator(ops);
                }
            }
            self.cluster.update_region_label_level_stats(&regions);
            if key.is_empty() {
                // One full round: age out stale hot-cache entries and
                // refresh the cache gauges.
                for kind in [FlowKind::Write, FlowKind::Read] {
                    self.cluster.with_hot_cache(kind, |cache| {
                        cache.maintain();
                        cache.collect_metrics(&kind.to_string());
                    });
                }
                PATROL_REGIONS_HISTOGRAM.observe(start.elapsed().as_secs_f64());
                start = Instant::now();
            }
        }
    }

    fn check_priority_regions(&self) {
        for id in self.checkers.get_priority_regions() {
            let region = match self.cluster.get_region(id) {
                Some(r) => r,
                None => continue,
            };
            if self.op_controller.has_operator(id) {
                continue;
            }
            let ops = self.checkers.check_region(&region);
            if !ops.is_empty() {
                self.op_controller.add_waiting_operator(ops);
            }
        }
    }

    fn check_suspect_regions(&self) {
        for id in self.get_suspect_regions() {
            let region = match self.cluster.get_region(id) {
                // The region could be a recent split; keep waiting.
                None => continue,
                Some(r) => r,
            };
            if self.op_controller.has_operator(id) {
                self.remove_suspect_region(id);
                continue;
            }
            let ops = self.checkers.check_region(&region);
            if !ops.is_empty() {
                self.op_controller.add_waiting_operator(ops);
            }
            self.remove_suspect_region(id);
        }
    }

    /// Pops one suspect key range and marks its covering regions as
    /// suspects; an uncovered remainder is re-enqueued.
    fn check_suspect_key_ranges(&self) {
        let (start, end) = match self.pop_one_suspect_key_range() {
            Some(r) => r,
            None => return,
        };
        let regions = self
            .cluster
            .scan_regions(&start, &end, SUSPECT_KEY_RANGE_SCAN_LIMIT);
        if regions.is_empty() {
            return;
        }
        let region_ids: Vec<u64> = regions.iter().map(|r| r.get_id()).collect();
        let last = &regions[regions.len() - 1];
        if !last.get_end_key().is_empty()
            && (end.is_empty() || last.get_end_key() < end.as_slice())
        {
            self.add_suspect_key_range(last.get_end_key(), &end);
        }
        self.add_suspect_regions(&region_ids);
    }

    fn drive_push_operator(self: Arc<Self>, stop: Receiver<()>) {
        info!("coordinator begins to actively drive push operator");
        loop {
            match stop.recv_timeout(PUSH_OPERATOR_TICK_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("drive push operator has been stopped");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.op_controller.push_operators();
                }
            }
        }
    }

    fn run_scheduler(
        self: Arc<Self>,
        mut scheduler: Box<dyn Scheduler>,
        stop: Receiver<()>,
        pause_until: Arc<AtomicI64>,
    ) {
        let name = scheduler.get_name().to_owned();
        let mut interval = scheduler.get_min_interval();
        loop {
            match stop.recv_timeout(interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("scheduler has been stopped"; "scheduler-name" => name.as_str());
                    scheduler.cleanup(self.cluster.as_ref());
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }

            let paused = unix_now_secs() < pause_until.load(Ordering::SeqCst);
            SCHEDULER_STATUS_GAUGE_VEC
                .with_label_values(&[&name, "allow"])
                .set(if paused { 0 } else { 1 });
            if paused || !scheduler.is_schedule_allowed(self.cluster.as_ref()) {
                continue;
            }

            let mut produced = false;
            for _ in 0..MAX_SCHEDULE_RETRIES {
                let (ops, _) = scheduler.schedule(self.cluster.as_ref(), false);
                if !ops.is_empty() {
                    let added = self.op_controller.add_waiting_operator(ops);
                    debug!("add operator";
                        "added" => added, "scheduler" => name.as_str());
                    produced = true;
                    break;
                }
            }
            interval = if produced {
                scheduler.get_min_interval()
            } else {
                scheduler.get_next_interval(interval)
            };
        }
    }
}

fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScheduleConfig;
    use crate::core::{Peer, Region, RegionEpoch, StoreInfo};
    use crate::operator::NullHeartbeatStream;
    use crate::storage::MemStorage;

    fn region(id: u64, start: &[u8], end: &[u8], stores: &[u64]) -> RegionInfo {
        let mut r = Region::new(id, start, end);
        r.epoch = RegionEpoch::new(1, 1);
        for (i, &s) in stores.iter().enumerate() {
            r.peers.push(Peer::new(id * 100 + i as u64, s));
        }
        let mut info = RegionInfo::new(r);
        info.leader = Some(info.get_peers()[0]);
        info.approximate_size = 10;
        info
    }

    fn coordinator() -> Arc<Coordinator> {
        let cluster = Arc::new(ClusterState::new(ScheduleConfig::default()));
        for id in 1..=3 {
            cluster.put_store(StoreInfo::new(id, ""));
        }
        Coordinator::new(cluster, Arc::new(MemStorage::new()), Box::new(NullHeartbeatStream))
    }

    #[test]
    fn test_suspect_key_range_resolution() {
        let c = coordinator();
        let cluster = c.get_cluster();
        cluster.handle_region_heartbeat(region(1, b"a", b"m", &[1, 2, 3])).unwrap();
        cluster.handle_region_heartbeat(region(2, b"m", b"t", &[1, 2, 3])).unwrap();

        // The suspect range reaches past the known regions; the
        // remainder is re-enqueued.
        c.add_suspect_key_range(b"b", b"z");
        c.check_suspect_key_ranges();
        let mut suspects = c.get_suspect_regions();
        suspects.sort_unstable();
        assert_eq!(suspects, vec![1, 2]);
        assert_eq!(
            c.pop_one_suspect_key_range(),
            Some((b"t".to_vec(), b"z".to_vec()))
        );
    }

    #[test]
    fn test_suspect_region_dedup() {
        let c = coordinator();
        c.add_suspect_regions(&[7, 7, 8]);
        assert_eq!(c.get_suspect_regions(), vec![7, 8]);
        c.remove_suspect_region(7);
        assert_eq!(c.get_suspect_regions(), vec![8]);
    }

    #[test]
    fn test_add_remove_scheduler() {
        let c = coordinator();
        let op_controller = c.get_operator_controller();
        let s = create_scheduler(
            "balance-leader",
            op_controller,
            ConfigDecoder::none(),
        )
        .unwrap();
        c.add_scheduler(s, Vec::new()).unwrap();
        assert_eq!(c.get_scheduler_names(), vec!["balance-leader-scheduler"]);

        let op_controller = c.get_operator_controller();
        let dup = create_scheduler("balance-leader", op_controller, ConfigDecoder::none()).unwrap();
        assert!(matches!(
            c.add_scheduler(dup, Vec::new()),
            Err(Error::SchedulerExisted(_))
        ));

        c.pause_or_resume_scheduler("balance-leader-scheduler", 60).unwrap();
        assert!(c.is_scheduler_paused("balance-leader-scheduler").unwrap());
        c.pause_or_resume_scheduler("balance-leader-scheduler", 0).unwrap();
        assert!(!c.is_scheduler_paused("balance-leader-scheduler").unwrap());

        c.remove_scheduler("balance-leader-scheduler").unwrap();
        assert!(c.get_scheduler_names().is_empty());
        assert!(matches!(
            c.remove_scheduler("balance-leader-scheduler"),
            Err(Error::SchedulerNotFound(_))
        ));
        c.stop();
    }

    #[test]
    fn test_run_spawns_and_stops() {
        let c = coordinator();
        let cluster = c.get_cluster();
        cluster.handle_region_heartbeat(region(1, b"", b"", &[1, 2])).unwrap();
        c.run().unwrap();
        // Default schedulers were registered from the config list.
        let mut names = c.get_scheduler_names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "balance-hot-region-scheduler",
                "balance-leader-scheduler",
                "balance-region-scheduler",
            ]
        );
        c.stop();
    }
}
