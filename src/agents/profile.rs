//! Agent profiles and the roster registry.
//!
//! An [`AgentProfile`] is the immutable persona an agent debates as: a
//! unique id, a style tag, and free-text system instructions. Profiles come
//! from a YAML registry or from ad-hoc `"Name:Instructions"` strings, and
//! both forms are parsed eagerly at configuration load so malformed entries
//! are rejected before the debate starts.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Style tag applied to ad-hoc roles.
const ADHOC_STYLE: &str = "adhoc";

fn default_style() -> String {
    "generalist".to_string()
}

/// A configured debate persona. Immutable for the debate's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique identifier within the roster.
    pub id: String,
    /// Style tag for presentation and filtering.
    #[serde(default = "default_style")]
    pub style: String,
    /// Free-text system instructions shaping the persona's argumentation.
    pub system: String,
}

impl AgentProfile {
    /// Create a profile directly.
    pub fn new(
        id: impl Into<String>,
        style: impl Into<String>,
        system: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            style: style.into(),
            system: system.into(),
        }
    }

    /// Parse an ad-hoc role of the form `"Name:Instructions"`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAgentRole`] when the colon is missing
    /// or either side is empty.
    pub fn parse_adhoc(role: &str) -> Result<Self, ConfigError> {
        let (name, system) = role
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidAgentRole(role.to_string()))?;
        let name = name.trim();
        let system = system.trim();
        if name.is_empty() || system.is_empty() {
            return Err(ConfigError::InvalidAgentRole(role.to_string()));
        }
        Ok(Self::new(name, ADHOC_STYLE, system))
    }
}

/// YAML registry file shape: `agents: [{id, system, style?}]`.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    agents: Vec<AgentProfile>,
}

/// Ordered collection of known agent profiles.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    profiles: Vec<AgentProfile>,
}

impl AgentRegistry {
    /// Parse a registry from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateAgent`] when two entries share an id,
    /// or [`ConfigError::RegistryParse`] on malformed YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        let mut seen = HashSet::new();
        for profile in &file.agents {
            if !seen.insert(profile.id.clone()) {
                return Err(ConfigError::DuplicateAgent(profile.id.clone()));
            }
        }
        Ok(Self {
            profiles: file.agents,
        })
    }

    /// Load a registry from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// The registry shipped with the crate, used when no file is given.
    pub fn builtin() -> Self {
        Self::from_yaml(BUILTIN_REGISTRY_YAML)
            .expect("built-in registry must parse")
    }

    /// Look up a profile by id.
    pub fn get(&self, id: &str) -> Option<&AgentProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// All profiles in registry order.
    pub fn profiles(&self) -> &[AgentProfile] {
        &self.profiles
    }

    /// Resolve a roster from selected registry ids plus ad-hoc roles.
    ///
    /// Roster order is selection order: registry picks first, ad-hoc roles
    /// after, exactly as given. Unknown ids, malformed roles, and duplicate
    /// ids across the two sources are all rejected here, before any debate
    /// state exists.
    pub fn select(
        &self,
        ids: &[String],
        adhoc_roles: &[String],
    ) -> Result<Vec<AgentProfile>, ConfigError> {
        let mut roster = Vec::new();
        let mut seen = HashSet::new();

        for id in ids {
            let profile = self
                .get(id)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownAgent(id.clone()))?;
            if !seen.insert(profile.id.clone()) {
                return Err(ConfigError::DuplicateAgent(profile.id.clone()));
            }
            roster.push(profile);
        }

        for role in adhoc_roles {
            let profile = AgentProfile::parse_adhoc(role)?;
            if !seen.insert(profile.id.clone()) {
                return Err(ConfigError::DuplicateAgent(profile.id));
            }
            roster.push(profile);
        }

        Ok(roster)
    }
}

/// Built-in personas, available without any registry file.
const BUILTIN_REGISTRY_YAML: &str = r#"
agents:
  - id: ConservativeArchitect
    style: cautious
    system: |
      You are a conservative software architect. You favor proven designs,
      explicit trade-off analysis, and graceful failure modes. You distrust
      novelty for its own sake. Argue from operational experience: name the
      failure modes, the migration costs, and the constraints a proposal
      must satisfy before you endorse it.
  - id: OptimizingSystems
    style: aggressive
    system: |
      You are a systems performance engineer. You argue from measurements:
      latency budgets, throughput ceilings, memory footprints. You push for
      the design with the best performance envelope and call out hidden
      costs in abstractions. Quantify claims whenever possible and state
      the assumptions behind every number.
  - id: PragmaticShipper
    style: pragmatic
    system: |
      You are a pragmatic tech lead focused on shipping. You weigh every
      proposal against team capacity, deadline risk, and maintenance burden.
      You prefer the smallest design that satisfies the requirements and
      you name explicitly what is being deferred and why that is safe.
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_parses_with_unique_ids() {
        let registry = AgentRegistry::builtin();
        assert!(registry.profiles().len() >= 3);
        assert!(registry.get("ConservativeArchitect").is_some());
        assert!(registry.get("OptimizingSystems").is_some());

        let profile = registry.get("ConservativeArchitect").unwrap();
        assert_eq!(profile.style, "cautious");
        assert!(!profile.system.trim().is_empty());
    }

    #[test]
    fn adhoc_parsing_accepts_name_colon_instructions() {
        let profile = AgentProfile::parse_adhoc("Skeptic: question every assumption").unwrap();
        assert_eq!(profile.id, "Skeptic");
        assert_eq!(profile.style, "adhoc");
        assert_eq!(profile.system, "question every assumption");
    }

    #[test]
    fn adhoc_parsing_rejects_malformed_roles() {
        assert!(matches!(
            AgentProfile::parse_adhoc("NoColonHere"),
            Err(ConfigError::InvalidAgentRole(_))
        ));
        assert!(matches!(
            AgentProfile::parse_adhoc(":missing name"),
            Err(ConfigError::InvalidAgentRole(_))
        ));
        assert!(matches!(
            AgentProfile::parse_adhoc("MissingSystem:   "),
            Err(ConfigError::InvalidAgentRole(_))
        ));
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let yaml = r#"
agents:
  - id: A
    system: one
  - id: A
    system: two
"#;
        assert!(matches!(
            AgentRegistry::from_yaml(yaml),
            Err(ConfigError::DuplicateAgent(id)) if id == "A"
        ));
    }

    #[test]
    fn registry_defaults_style_to_generalist() {
        let yaml = "agents:\n  - id: Plain\n    system: argue plainly\n";
        let registry = AgentRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.get("Plain").unwrap().style, "generalist");
    }

    #[test]
    fn select_builds_roster_in_selection_order() {
        let registry = AgentRegistry::builtin();
        let roster = registry
            .select(
                &[
                    "OptimizingSystems".to_string(),
                    "ConservativeArchitect".to_string(),
                ],
                &["Skeptic:doubt everything".to_string()],
            )
            .unwrap();

        let ids: Vec<&str> = roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            ["OptimizingSystems", "ConservativeArchitect", "Skeptic"]
        );
    }

    #[test]
    fn select_rejects_unknown_and_duplicate_ids() {
        let registry = AgentRegistry::builtin();
        assert!(matches!(
            registry.select(&["Nobody".to_string()], &[]),
            Err(ConfigError::UnknownAgent(id)) if id == "Nobody"
        ));

        assert!(matches!(
            registry.select(
                &["OptimizingSystems".to_string()],
                &["OptimizingSystems:shadow".to_string()]
            ),
            Err(ConfigError::DuplicateAgent(_))
        ));
    }
}
