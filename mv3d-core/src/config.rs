/// Viewer configuration shared by all hosts
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orbit::OrbitSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ViewerConfig {
    pub orbit: OrbitSettings,
    /// Fail a load that has not resolved after this many milliseconds
    pub load_timeout_ms: Option<u64>,
}

impl ViewerConfig {
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}
