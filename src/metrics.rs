// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use prometheus::*;

lazy_static! {
    pub static ref CHECKER_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "pd_checker_event_total",
        "Total number of checker events.",
        &["type", "name"]
    )
    .unwrap();
    pub static ref SCHEDULER_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "pd_scheduler_event_total",
        "Total number of scheduler events.",
        &["type", "name"]
    )
    .unwrap();
    pub static ref SCHEDULER_STATUS_GAUGE_VEC: IntGaugeVec = register_int_gauge_vec!(
        "pd_scheduler_status",
        "Status of the schedulers.",
        &["kind", "type"]
    )
    .unwrap();
    pub static ref OPERATOR_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "pd_schedule_operator_total",
        "Total number of operator events.",
        &["type", "event"]
    )
    .unwrap();
    pub static ref OPERATOR_DURATION_HISTOGRAM_VEC: HistogramVec = register_histogram_vec!(
        "pd_schedule_finish_operator_duration_seconds",
        "Bucketed histogram of operator finish duration.",
        &["type"],
        exponential_buckets(0.01, 2.0, 16).unwrap()
    )
    .unwrap();
    pub static ref OPERATOR_LIMIT_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "pd_schedule_operator_limit_total",
        "Total number of operators rejected by kind limits.",
        &["type", "kind"]
    )
    .unwrap();
    pub static ref STORE_LIMIT_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "pd_schedule_store_limit_total",
        "Total number of operators rejected by store limits.",
        &["store", "limit_type"]
    )
    .unwrap();
    pub static ref HOT_CACHE_GAUGE_VEC: GaugeVec = register_gauge_vec!(
        "pd_hotcache_status",
        "Status of the hot peer cache.",
        &["name", "store", "type"]
    )
    .unwrap();
    pub static ref REGION_HEARTBEAT_INTERVAL_HISTOGRAM: Histogram = register_histogram!(
        "pd_region_heartbeat_interval_seconds",
        "Bucketed histogram of region heartbeat report intervals.",
        exponential_buckets(1.0, 2.0, 12).unwrap()
    )
    .unwrap();
    pub static ref PATROL_REGIONS_HISTOGRAM: Histogram = register_histogram!(
        "pd_patrol_regions_duration_seconds",
        "Bucketed histogram of the duration of a full patrol round.",
        exponential_buckets(0.1, 2.0, 16).unwrap()
    )
    .unwrap();
    pub static ref REGION_LABEL_LEVEL_GAUGE_VEC: IntGaugeVec = register_int_gauge_vec!(
        "pd_regions_label_level",
        "Number of regions by label isolation level.",
        &["type"]
    )
    .unwrap();
}
