//! Configuration settings, loadable from RON
//!
//! Every field has a default, so a settings file only needs to name what it
//! changes:
//!
//! ```
//! use humus_core::Settings;
//!
//! let settings = Settings::from_ron("(batch_limit: 16, journal: (recording_enabled: true))").unwrap();
//! assert_eq!(settings.batch_limit, 16);
//! assert_eq!(settings.period_ms, Settings::default().period_ms);
//! assert!(settings.journal.recording_enabled);
//! ```

use crate::{JournalConfig, Millis, Result};
use serde::{Deserialize, Serialize};

/// Tunables for a configuration and the runtime built on it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Most deliveries dispatched per `tick()`
    pub batch_limit: usize,
    /// Default tick period in logical ms
    pub period_ms: Millis,
    /// Seed for the runtime's random service
    pub seed: u64,
    /// Scheduler trace settings
    pub journal: JournalConfig,
}

impl Settings {
    /// Deliveries per tick unless configured otherwise
    pub const DEFAULT_BATCH_LIMIT: usize = 144;

    /// Tick period unless configured otherwise
    pub const DEFAULT_PERIOD_MS: Millis = 60;

    /// Parse settings from RON text
    pub fn from_ron(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    /// Render settings as pretty RON
    pub fn to_ron(&self) -> Result<String> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_limit: Self::DEFAULT_BATCH_LIMIT,
            period_ms: Self::DEFAULT_PERIOD_MS,
            seed: 12345,
            journal: JournalConfig::default(),
        }
    }
}
