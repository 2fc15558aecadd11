use crate::generator::scenario::ScenarioConfig;
use anyhow::Context;
use pingercore::PingerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub pinger: PingerConfig,
    pub scenario: ScenarioConfig,
    /// Cycles to run; 0 runs until stopped.
    pub cycles: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pinger: PingerConfig::default(),
            scenario: ScenarioConfig::default(),
            cycles: 200,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }
}
