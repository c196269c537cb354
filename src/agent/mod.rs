//! The agent under training: a tool-call driver around a reasoning backend.
//!
//! ```rust,ignore
//! use agent_forge::agent::{AgentConfig, AgentDriver};
//!
//! let driver = AgentDriver::new(backend, AgentConfig::default());
//! let trajectory = driver.run(&scenario, &environment).await;
//! ```

pub mod driver;
pub mod parser;
pub mod prompts;

pub use driver::{AgentConfig, AgentDriver};
pub use parser::{JsonOutputParser, OutputParser, ParsedCall, ParsedOutput};
