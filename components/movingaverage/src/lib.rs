// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! Rolling statistics used to denoise flow rates reported by region
//! heartbeats. `AvgOverTime` smooths a stream of (delta, interval) samples
//! over a fixed time span, `MedianFilter` keeps a short median window, and
//! `TimeMedian` chains the two.

mod avg_over_time;
mod median_filter;
mod time_median;

pub use self::avg_over_time::AvgOverTime;
pub use self::median_filter::MedianFilter;
pub use self::time_median::TimeMedian;
