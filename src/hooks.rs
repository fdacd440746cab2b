use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// Callbacks fired by the agent loop. All methods default to no-ops; an error
/// returned from a hook aborts the run.
#[async_trait]
pub trait AgentHook: Send + Sync {
    async fn before_model(&self, _history: &[Message]) -> Result<()> {
        Ok(())
    }

    async fn after_model(&self, _raw_response: &str) -> Result<()> {
        Ok(())
    }

    async fn on_think(&self, _content: &str) -> Result<()> {
        Ok(())
    }

    async fn on_action(&self, _tool: &str, _input: &str) -> Result<()> {
        Ok(())
    }

    /// `output` is the text fed back to the model, successful or not.
    async fn on_observe(&self, _tool: &str, _input: &str, _output: &str) -> Result<()> {
        Ok(())
    }

    async fn on_output(&self, _content: &str) -> Result<()> {
        Ok(())
    }
}

/// Prints steps to stdout as they happen.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleHook;

impl ConsoleHook {
    pub fn render_think(content: &str) -> String {
        format!(" 🧠: {content}")
    }

    pub fn render_observe(tool: &str, input: &str, output: &str) -> String {
        format!(" ⚒️: Tool Call {tool}({input}): {output}")
    }

    pub fn render_output(content: &str) -> String {
        format!(" 🎉: {content}")
    }
}

#[async_trait]
impl AgentHook for ConsoleHook {
    async fn on_think(&self, content: &str) -> Result<()> {
        println!("{}", Self::render_think(content));
        Ok(())
    }

    async fn on_observe(&self, tool: &str, input: &str, output: &str) -> Result<()> {
        println!("{}", Self::render_observe(tool, input, output));
        Ok(())
    }

    async fn on_output(&self, content: &str) -> Result<()> {
        println!("{}", Self::render_output(content));
        Ok(())
    }
}
