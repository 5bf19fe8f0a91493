// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

//! The placement and balance scheduling core of the control plane.
//!
//! Region heartbeats flow in through the [`coordinator::Coordinator`],
//! which keeps the [`cluster::ClusterState`] and the hot-peer caches up
//! to date, walks regions through the checker pipeline, ticks the
//! registered schedulers, and drives the resulting operators step by
//! step until the heartbeats show them finished.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate serde_derive;
#[macro_use(
    slog_kv,
    slog_error,
    slog_warn,
    slog_info,
    slog_debug,
    slog_log,
    slog_record,
    slog_b,
    slog_record_static
)]
extern crate slog;
#[macro_use]
extern crate slog_global;

pub mod checker;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod filter;
pub mod labeler;
pub mod metrics;
pub mod operator;
pub mod placement;
pub mod schedulers;
pub mod statistics;
pub mod storage;
pub mod util;

pub use crate::error::{Error, Result};
