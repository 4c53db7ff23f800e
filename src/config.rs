//! Worker configuration, loaded from a TOML file or built programmatically.
//!
//! The original DPA program fixes its ring depths and poll quota as C
//! preprocessor constants. This crate keeps the same defaults (see
//! [`crate::sizes`]) but exposes them as a loadable [`WorkerConfig`], the way
//! `rrddmma`'s `ctrl::Cluster::load_toml` loads cluster topology from TOML.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sizes;

/// Depth and timing parameters for a worker fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// `LOG_NET_SQ_DEPTH`.
    pub log_net_sq_depth: u32,
    /// `LOG_NET_CQ_DEPTH`.
    pub log_net_cq_depth: u32,
    /// `LOG_WORKER_LOG_SQ_DEPTH`.
    pub log_trig_sq_depth: u32,
    /// `LOG_WORKER_LOG_CQ_DEPTH`.
    pub log_trig_cq_depth: u32,
    /// `LOG_CMDQ_DEPTH`.
    pub log_cmdq_depth: u32,
    /// `LOG_CONCURRENT_COLLS`.
    pub log_concurrent_colls: u32,
    /// `WORKER_POLL_QUOTA_USEC`: microsecond budget a progress hook gets
    /// per thread activation before it must hang up.
    pub poll_quota_usec: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            log_net_sq_depth: sizes::LOG_NET_SQ_DEPTH,
            log_net_cq_depth: sizes::LOG_NET_CQ_DEPTH,
            log_trig_sq_depth: sizes::LOG_WORKER_LOG_SQ_DEPTH,
            log_trig_cq_depth: sizes::LOG_WORKER_LOG_CQ_DEPTH,
            log_cmdq_depth: sizes::LOG_CMDQ_DEPTH,
            log_concurrent_colls: sizes::LOG_CONCURRENT_COLLS,
            poll_quota_usec: 50,
        }
    }
}

/// Error loading a [`WorkerConfig`] from a TOML file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be opened or read.
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file's content is not valid TOML, or a `[ldo]` table is missing.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl WorkerConfig {
    /// Load from a TOML file with a top-level `[ldo]` table. Fields absent
    /// from the file fall back to [`WorkerConfig::default`].
    pub fn load_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut file = std::fs::File::open(path)?;
        let mut toml_str = String::new();
        file.read_to_string(&mut toml_str)?;
        Self::from_toml_str(&toml_str)
    }

    /// Parse from a TOML string with a top-level `[ldo]` table.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(default)]
            ldo: WorkerConfig,
        }
        let wrapper: Wrapper = toml::from_str(toml_str)?;
        Ok(wrapper.ldo)
    }

    /// `L2V(log_cmdq_depth)`.
    pub const fn cmdq_depth(&self) -> u32 {
        sizes::l2v(self.log_cmdq_depth)
    }

    /// `L2V(log_concurrent_colls)`.
    pub const fn concurrent_colls(&self) -> u32 {
        sizes::l2v(self.log_concurrent_colls)
    }

    /// `L2V(log_net_sq_depth)`.
    pub const fn net_sq_depth(&self) -> u32 {
        sizes::l2v(self.log_net_sq_depth)
    }

    /// `L2V(log_net_cq_depth)`.
    pub const fn net_cq_depth(&self) -> u32 {
        sizes::l2v(self.log_net_cq_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_sizes_module() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.cmdq_depth(), sizes::l2v(sizes::LOG_CMDQ_DEPTH));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg = WorkerConfig::from_toml_str("[ldo]\npoll_quota_usec = 200\n").unwrap();
        assert_eq!(cfg.poll_quota_usec, 200);
        assert_eq!(cfg.log_cmdq_depth, sizes::LOG_CMDQ_DEPTH);
    }

    #[test]
    fn missing_table_uses_defaults() {
        let cfg = WorkerConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, WorkerConfig::default());
    }
}
