use crate::config::yaml::TopologyYaml;
use anyhow::Context;
use std::path::Path;
use topology_engine::network::spec::TopologySpec;

pub mod cli;
pub mod yaml;

pub fn load_definition(path: &Path) -> anyhow::Result<TopologySpec> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read network definition from {}", path.display()))?;
    let yaml: TopologyYaml = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse network definition {}", path.display()))?;
    Ok(yaml.into())
}
