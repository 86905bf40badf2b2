// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Roster YAML Parser
//!
//! Parses agent roster manifests into domain objects. A manifest is only
//! handed to the dispatcher after validation succeeds, so a broken reload can
//! never disturb the currently-installed subscription set.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Translates YAML schema to domain model

use crate::domain::agent::AgentRoster;
use anyhow::{anyhow, Context, Result};
use std::path::Path;

pub struct AgentConfigParser;

impl AgentConfigParser {
    /// Parse an agent roster from a YAML string.
    pub fn parse_yaml(yaml: &str) -> Result<AgentRoster> {
        let roster: AgentRoster =
            serde_yaml::from_str(yaml).context("Failed to parse YAML roster")?;

        roster
            .validate()
            .map_err(|e| anyhow!("Roster validation failed: {}", e))?;

        Ok(roster)
    }

    /// Parse an agent roster from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<AgentRoster> {
        let yaml = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read roster file: {:?}", path.as_ref()))?;

        Self::parse_yaml(&yaml)
    }

    /// Serialize an agent roster to a YAML string.
    pub fn to_yaml(roster: &AgentRoster) -> Result<String> {
        serde_yaml::to_string(roster).context("Failed to serialize roster to YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::TriggerKind;
    use std::io::Write;

    const ROSTER_YAML: &str = r#"
apiVersion: 100monkeys.ai/v1
kind: AgentRoster
metadata:
  name: plant-floor
  version: "1.0.0"
spec:
  agents:
    - id: oee-agent
      trigger: event
      subscribes: ["oee/updated"]
      publishes: ["oee/analyzed"]
      priority: 5
      timeout: 20s
    - id: quality-agent
      trigger: chat
      subscribes: ["qc/alert", "*"]
"#;

    #[test]
    fn test_parse_roster() {
        let roster = AgentConfigParser::parse_yaml(ROSTER_YAML).unwrap();
        assert_eq!(roster.metadata.name, "plant-floor");
        assert_eq!(roster.spec.agents.len(), 2);

        let oee = &roster.spec.agents[0];
        assert_eq!(oee.id.as_str(), "oee-agent");
        assert_eq!(oee.trigger, TriggerKind::Event);
        assert_eq!(oee.priority, 5);
        assert_eq!(oee.timeout, Some(std::time::Duration::from_secs(20)));

        let quality = &roster.spec.agents[1];
        assert_eq!(quality.subscribes, vec!["qc/alert", "*"]);
        assert_eq!(quality.priority, 0);
    }

    #[test]
    fn test_duplicate_ids_fail_parse() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: AgentRoster
metadata:
  name: dup
spec:
  agents:
    - id: oee-agent
      trigger: event
    - id: oee-agent
      trigger: timer
"#;
        let err = AgentConfigParser::parse_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn test_wrong_api_version_fails_parse() {
        let yaml = ROSTER_YAML.replace("100monkeys.ai/v1", "100monkeys.ai/v2");
        assert!(AgentConfigParser::parse_yaml(&yaml).is_err());
    }

    #[test]
    fn test_parse_file_roundtrip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROSTER_YAML.as_bytes()).unwrap();

        let roster = AgentConfigParser::parse_file(file.path()).unwrap();
        let yaml = AgentConfigParser::to_yaml(&roster).unwrap();
        let reparsed = AgentConfigParser::parse_yaml(&yaml).unwrap();
        assert_eq!(reparsed.spec.agents.len(), roster.spec.agents.len());
    }
}
