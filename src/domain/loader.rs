//! Loading a domain description from YAML.
//!
//! ```yaml
//! name: order-support
//! tools:
//!   - name: lookup_order
//!     description: Look up an order by id
//!     parameters:
//!       id: string
//!     mock_responses:
//!       order_123: { status: shipped }
//!       default: { status: unknown }
//! scenarios:
//!   - id: order-status-01
//!     user_message: Where is order_123?
//!     difficulty: easy
//!     expected_tool_calls: [lookup_order]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::environment::SimulationEnvironment;
use crate::error::DomainError;
use crate::validation::ScenarioValidator;

use super::catalog::ScenarioCatalog;
use super::scenario::Scenario;
use super::tool::ToolSpec;

/// Raw domain description as written by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default = "default_domain_name")]
    pub name: String,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

fn default_domain_name() -> String {
    "domain".to_string()
}

/// A loaded, validated domain.
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub environment: SimulationEnvironment,
    pub catalog: ScenarioCatalog,
}

impl DomainConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DomainError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading domain description");
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Validates the description and builds the environment and catalog.
    ///
    /// Any problem here is fatal: duplicate names, scenarios referring to
    /// tools that do not exist, or scenarios failing validation.
    pub fn build(self) -> Result<Domain, DomainError> {
        if self.tools.is_empty() {
            return Err(DomainError::NoTools);
        }
        if self.scenarios.is_empty() {
            return Err(DomainError::NoScenarios);
        }

        let environment = SimulationEnvironment::new(self.tools)?;
        for tool in environment.tools() {
            if tool.mock_responses.is_empty() {
                warn!(tool = %tool.name, "Tool has an empty mock table; every call will fail");
            }
        }

        let validator = ScenarioValidator::for_environment(&environment);
        let mut catalog = ScenarioCatalog::new();
        for scenario in self.scenarios {
            let result = validator.validate(&scenario);
            if let Some(tool) = result.unknown_tool() {
                return Err(DomainError::MissingTool {
                    scenario: scenario.id,
                    tool: tool.to_string(),
                });
            }
            if !result.valid {
                return Err(DomainError::InvalidScenario {
                    scenario: scenario.id,
                    errors: result.error_messages(),
                });
            }
            for warning in &result.warnings {
                warn!(scenario = %scenario.id, "{}", warning);
            }
            catalog.append(scenario)?;
        }

        info!(
            domain = %self.name,
            tools = environment.len(),
            scenarios = catalog.len(),
            "Domain loaded"
        );

        Ok(Domain {
            name: self.name,
            environment,
            catalog,
        })
    }
}

impl Domain {
    /// Reads, parses, and validates a domain file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        DomainConfig::from_file(path)?.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = r#"
name: order-support
tools:
  - name: lookup_order
    description: Look up an order by id
    parameters:
      id: string
    mock_responses:
      order_123: { status: shipped }
      default: { status: unknown }
scenarios:
  - id: order-status-01
    description: Basic lookup
    user_message: Where is order_123?
    difficulty: easy
    expected_tool_calls: [lookup_order]
"#;

    #[test]
    fn test_build_valid_domain() {
        let domain = DomainConfig::from_yaml_str(DOMAIN).unwrap().build().unwrap();
        assert_eq!(domain.name, "order-support");
        assert!(domain.environment.has_tool("lookup_order"));
        assert_eq!(domain.catalog.len(), 1);
    }

    #[test]
    fn test_missing_tool_is_fatal() {
        let yaml = DOMAIN.replace("expected_tool_calls: [lookup_order]", "expected_tool_calls: [refund]");
        let err = DomainConfig::from_yaml_str(&yaml).unwrap().build().unwrap_err();
        assert!(matches!(
            err,
            DomainError::MissingTool { ref scenario, ref tool } if scenario == "order-status-01" && tool == "refund"
        ));
    }

    #[test]
    fn test_duplicate_scenario_is_fatal() {
        let mut config = DomainConfig::from_yaml_str(DOMAIN).unwrap();
        let copy = config.scenarios[0].clone();
        config.scenarios.push(copy);
        assert!(matches!(
            config.build().unwrap_err(),
            DomainError::DuplicateScenario(_)
        ));
    }

    #[test]
    fn test_open_ended_scenario_loads() {
        let yaml = format!(
            "{}  - id: chit-chat\n    user_message: Hello there\n    difficulty: easy\n",
            DOMAIN
        );
        let domain = DomainConfig::from_yaml_str(&yaml).unwrap().build().unwrap();
        assert_eq!(domain.catalog.len(), 2);
        let chit_chat = domain.catalog.get("chit-chat").unwrap();
        assert!(chit_chat.expected_tool_calls.is_empty());
        assert!(chit_chat.success_criteria.is_empty());
    }

    #[test]
    fn test_invalid_scenario_is_fatal() {
        let mut config = DomainConfig::from_yaml_str(DOMAIN).unwrap();
        config.scenarios[0].user_message = String::new();
        assert!(matches!(
            config.build().unwrap_err(),
            DomainError::InvalidScenario { .. }
        ));
    }

    #[test]
    fn test_empty_domain() {
        let config = DomainConfig::from_yaml_str("name: empty").unwrap();
        assert!(matches!(config.build().unwrap_err(), DomainError::NoTools));
    }

    #[test]
    fn test_bad_mock_key_is_yaml_error() {
        let yaml = DOMAIN.replace("order_123: { status: shipped }", "'{broken': { status: shipped }");
        assert!(matches!(
            DomainConfig::from_yaml_str(&yaml).unwrap_err(),
            DomainError::Yaml(_)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domain.yaml");
        std::fs::write(&path, DOMAIN).unwrap();
        let domain = Domain::load(&path).unwrap();
        assert_eq!(domain.catalog.ids().collect::<Vec<_>>(), vec!["order-status-01"]);
    }
}
