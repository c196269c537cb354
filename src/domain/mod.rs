//! Domain model: simulated tools, scenarios, and the scenario catalog.

mod catalog;
mod loader;
mod scenario;
mod tool;

pub use catalog::ScenarioCatalog;
pub use loader::{Domain, DomainConfig};
pub use scenario::{Scenario, ScenarioOrigin, SuccessCriterion};
pub use tool::{ArgumentPattern, MockTable, ParameterSpec, ToolSpec, DEFAULT_MOCK_KEY};
