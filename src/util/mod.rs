// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

pub mod cache;
pub mod config;
pub mod keyutil;
