//! Session settings, read from a TOML file.
//!
//! ```toml
//! cache_capacity = 512      # compiled units kept; omit for unbounded
//! max_operations = 1000000  # per snippet evaluation; omit for unlimited
//! log_filter = "tickcell=debug"
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tickcell_engine::engine::{DynamicCompiler, EngineLimits, UnitCache};
use tracing::debug;

use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub cache_capacity: Option<usize>,
    pub max_operations: Option<u64>,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Settings> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from `path`. A missing file means defaults.
    pub fn load(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(path)?;
        Settings::from_toml_str(&content)
    }

    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            max_operations: self.max_operations,
        }
    }

    /// A compiler with a fresh cache sized by these settings.
    pub fn build_compiler(&self) -> DynamicCompiler {
        DynamicCompiler::new(Arc::new(UnitCache::new(self.cache_capacity)), self.limits())
    }
}
