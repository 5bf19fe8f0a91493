// Copyright 2022 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::config::ScheduleConfig;
use crate::error::{Error, Result};

/// Persistence for scheduler configuration: one JSON blob per
/// independently-configured scheduler, plus the top-level schedule
/// options. All scheduling truth beyond this is derived from heartbeats.
pub trait Storage: Send + Sync {
    fn save_scheduler_config(&self, name: &str, data: &[u8]) -> Result<()>;
    fn load_scheduler_config(&self, name: &str) -> Result<Option<Vec<u8>>>;
    fn load_all_scheduler_configs(&self) -> Result<(Vec<String>, Vec<Vec<u8>>)>;
    fn remove_scheduler_config(&self, name: &str) -> Result<()>;

    fn save_schedule_options(&self, cfg: &ScheduleConfig) -> Result<()>;
    fn load_schedule_options(&self) -> Result<Option<ScheduleConfig>>;
}

/// In-memory storage, also the test double.
#[derive(Default)]
pub struct MemStorage {
    scheduler_configs: Mutex<BTreeMap<String, Vec<u8>>>,
    options: Mutex<Option<String>>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }
}

impl Storage for MemStorage {
    fn save_scheduler_config(&self, name: &str, data: &[u8]) -> Result<()> {
        self.scheduler_configs
            .lock()
            .unwrap()
            .insert(name.to_owned(), data.to_vec());
        Ok(())
    }

    fn load_scheduler_config(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.scheduler_configs.lock().unwrap().get(name).cloned())
    }

    fn load_all_scheduler_configs(&self) -> Result<(Vec<String>, Vec<Vec<u8>>)> {
        let configs = self.scheduler_configs.lock().unwrap();
        Ok((
            configs.keys().cloned().collect(),
            configs.values().cloned().collect(),
        ))
    }

    fn remove_scheduler_config(&self, name: &str) -> Result<()> {
        self.scheduler_configs.lock().unwrap().remove(name);
        Ok(())
    }

    fn save_schedule_options(&self, cfg: &ScheduleConfig) -> Result<()> {
        let data = serde_json::to_string(cfg)
            .map_err(|e| Error::StorageLoadFailed(e.to_string()))?;
        *self.options.lock().unwrap() = Some(data);
        Ok(())
    }

    fn load_schedule_options(&self) -> Result<Option<ScheduleConfig>> {
        match self.options.lock().unwrap().as_ref() {
            Some(data) => serde_json::from_str(data)
                .map(Some)
                .map_err(|e| Error::StorageLoadFailed(e.to_string())),
            None => Ok(None),
        }
    }
}
