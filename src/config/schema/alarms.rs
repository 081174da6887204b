use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmsConfig {
    /// Periodic resync in daemon mode. Values below 5 are raised to 5.
    pub check_interval_minutes: u32,
}

impl Default for AlarmsConfig {
    fn default() -> Self {
        Self {
            check_interval_minutes: 60,
        }
    }
}
