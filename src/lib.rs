//! A think/action/observe/output agent loop.
//!
//! The crate provides:
//! - A language model abstraction (`LanguageModel`) with an OpenAI client and a scripted stub.
//! - A tool interface (`Tool` and `ToolRegistry`) that treats every tool as async `&str -> String`.
//! - An `Agent` that replays the whole conversation to the model each turn, parses exactly one
//!   JSON step per reply, runs requested tools and stops on an `output` step.

mod agent;
pub mod config;
mod error;
mod hooks;
mod llm;
mod memory;
mod message;
mod prompt;
mod retry;
mod step;
pub mod telemetry;
mod tool;
pub mod tools;

pub use agent::{Agent, Transcript};
pub use config::{AgentConfig, AppConfig, UnknownToolPolicy};
pub use error::{Result, StepwiseError};
pub use hooks::{AgentHook, ConsoleHook};
pub use llm::{build_model, LanguageModel, OpenAIClient, ResponseFormat, StubModel};
pub use memory::ConversationHistory;
pub use message::{Message, Role};
pub use prompt::{build_system_prompt, DEFAULT_SYSTEM_PROMPT};
pub use retry::{RetryPolicy, RetryingModel};
pub use step::StepRecord;
pub use tool::{Tool, ToolDescription, ToolRegistry};
pub use tools::basic_toolkit;
