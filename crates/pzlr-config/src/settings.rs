//! Process-level settings that sit next to the layer configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub log_format: Option<String>,

    /// Upper bound for concurrent block resolutions. `None` means unbounded.
    #[serde(default)]
    pub parallel_jobs: Option<usize>,
}
