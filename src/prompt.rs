use crate::tool::ToolDescription;

/// Instructions describing the think/action/observe/output protocol.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful AI assistant who is designed to resolve user query.
You work on START, THINK, ACTION, OBSERVE and OUTPUT mode.

In the START phase, user gives a query to you.
Then, you THINK how to resolve that query.
If there is a need to call a tool, you call an ACTION event with the tool and input parameters.
If there is an ACTION call, wait for the ACTION to complete and then OBSERVE the output of the call.
Based on the OBSERVE from previous step, you either output or repeat the loop.

Rules:
- Always wait for the next step.
- Always output a single step and wait for the next step.
- Only call tool action from Available tools.
- Strictly follow the output format in JSON.
- Never emit an OBSERVE step yourself; it is provided after every ACTION."#;

const PROTOCOL_EXAMPLE: &str = r#"Example:
START: What is weather of Patiala?
THINK: The user is asking for the weather of Patiala.
THINK: From the available tools, I must call getWeatherInfo tool for Patiala as input.
ACTION: call the tool getWeatherInfo(Patiala)
OBSERVE: 32 degree C
THINK: The output of getWeatherInfo for Patiala is 32 Degrees C
OUTPUT: Hey, the weather of Patiala is 32 Degree C which is quite hot

Output Example:
{"role": "user", "content": "What is the weather in Patiala?"}
{"step": "think", "content": "The user is asking for the weather in Patiala"}
{"step": "think", "content": "From the available tools, I must use getWeatherInfo tool for Patiala as input"}
{"step": "action", "tool": "getWeatherInfo", "input": "Patiala"}
{"step": "observe", "content": "32 Degrees C"}   <- sent back to you after the action, never written by you
{"step": "think", "content": "The output of getWeatherInfo for Patiala is 32 Degrees C"}
{"step": "output", "content": "Hey, the weather of Patiala is 32 Degree C which is quite hot"}

OUTPUT Format:
{ "step": "string", "tool": "string", "input": "string", "content": "string" }"#;

/// Append the tool list and the protocol example to `instructions`.
pub fn build_system_prompt(instructions: &str, tools: &[ToolDescription]) -> String {
    let mut prompt = String::new();
    prompt.push_str(instructions.trim_end());
    prompt.push_str("\n\n");
    if tools.is_empty() {
        prompt.push_str("No tools are available.\n\n");
    } else {
        prompt.push_str("Available Tools:\n");
        for tool in tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
        prompt.push('\n');
    }
    prompt.push_str(PROTOCOL_EXAMPLE);
    prompt
}
