//! Reference tools the agent can call:
//! - `getWeatherInfo`: canned weather report
//! - `executeCommand`: host shell command

pub mod shell;
pub mod weather;

pub use shell::{shell_toolkit, ExecuteCommandTool, ShellConfig, EXECUTE_COMMAND};
pub use weather::{WeatherTool, GET_WEATHER_INFO};

use crate::tool::ToolRegistry;

/// Registry holding both reference tools.
pub fn basic_toolkit(shell: ShellConfig) -> ToolRegistry {
    let mut registry = shell_toolkit(shell);
    registry.register(WeatherTool);
    registry
}
