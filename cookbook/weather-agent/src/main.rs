//! Runs one query through the agent with the weather and shell tools.
//!
//! Configuration comes from `stepwise.toml` in the working directory when it
//! exists, then from `STEPWISE_*` / `OPENAI_API_KEY` environment variables.
//! The first argument replaces the built-in query.

use std::sync::Arc;

use stepwise::{
    basic_toolkit, build_model, telemetry, Agent, AppConfig, ConsoleHook, RetryingModel,
};
use tokio_util::sync::CancellationToken;

const DEFAULT_QUERY: &str =
    "Create a folder todo app and create a fully working todo app using HTML, CSS and JS.";

#[tokio::main]
async fn main() -> stepwise::Result<()> {
    let config = AppConfig::from_env_or_file("stepwise.toml")?;
    telemetry::init_tracing(&config.logging);

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let model = build_model(&config.model, Vec::new())?;
    let model = Arc::new(RetryingModel::new(model, config.retry.policy()));
    tracing::info!(provider = %config.model.provider, model = %config.model.model, "model ready");

    let cancel = CancellationToken::new();
    let agent = Agent::new(model)
        .with_config(&config.agent)
        .with_tools(basic_toolkit(config.shell.to_shell_config()))
        .with_hook(Arc::new(ConsoleHook))
        .with_cancellation(cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match agent.run(query).await {
        Ok(transcript) => {
            tracing::info!(
                steps = transcript.steps,
                tool_calls = transcript.tool_calls,
                "query answered"
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "query aborted");
            Err(err)
        }
    }
}
