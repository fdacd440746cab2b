//! End-to-end behaviour of the agent loop against scripted models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stepwise::tools::{WeatherTool, GET_WEATHER_INFO};
use stepwise::{
    Agent, AgentHook, LanguageModel, Message, ResponseFormat, Result, Role, StepRecord,
    StepwiseError, StubModel, Tool, ToolRegistry,
};
use tokio_util::sync::CancellationToken;

/// Records every hook invocation in order.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    history_lengths: Mutex<Vec<usize>>,
    snapshots: Mutex<Vec<Vec<Message>>>,
}

impl Recorder {
    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentHook for Recorder {
    async fn before_model(&self, history: &[Message]) -> Result<()> {
        self.history_lengths.lock().unwrap().push(history.len());
        self.snapshots.lock().unwrap().push(history.to_vec());
        Ok(())
    }

    async fn on_think(&self, content: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("think:{content}"));
        Ok(())
    }

    async fn on_action(&self, tool: &str, input: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("action:{tool}({input})"));
        Ok(())
    }

    async fn on_observe(&self, _tool: &str, _input: &str, output: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("observe:{output}"));
        Ok(())
    }

    async fn on_output(&self, content: &str) -> Result<()> {
        self.events.lock().unwrap().push(format!("output:{content}"));
        Ok(())
    }
}

/// Counts calls and remembers inputs; wraps the canned weather tool.
struct CountingWeather {
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Tool for CountingWeather {
    fn name(&self) -> &str {
        GET_WEATHER_INFO
    }

    fn description(&self) -> &str {
        "weather"
    }

    async fn call(&self, input: &str) -> Result<String> {
        self.calls.lock().unwrap().push(input.to_string());
        WeatherTool.call(input).await
    }
}

fn scripted(steps: &[&str]) -> Arc<StubModel> {
    StubModel::new(steps.iter().map(|s| s.to_string()).collect())
}

#[tokio::test]
async fn weather_scenario_runs_to_completion() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut tools = ToolRegistry::new();
    tools.register(CountingWeather {
        calls: calls.clone(),
    });
    let recorder = Arc::new(Recorder::default());
    let model = scripted(&[
        r#"{"step":"think","content":"query needs weather"}"#,
        r#"{"step":"action","tool":"getWeatherInfo","input":"Patiala"}"#,
        r#"{"step":"output","content":"It's warm"}"#,
    ]);
    let agent = Agent::new(model.clone())
        .with_tools(tools)
        .with_hook(recorder.clone());

    let transcript = agent.run("What is the weather in Patiala?").await.unwrap();

    assert_eq!(transcript.answer, "It's warm");
    assert_eq!(*calls.lock().unwrap(), vec!["Patiala".to_string()]);
    assert_eq!(
        recorder.events(),
        vec![
            "think:query needs weather".to_string(),
            "action:getWeatherInfo(Patiala)".to_string(),
            "observe:Patiala has 42 degrees C".to_string(),
            "output:It's warm".to_string(),
        ]
    );

    // The observation is in the history the model sees on the final call.
    let requests = model.requests();
    assert_eq!(requests.len(), 3);
    let last_request = requests.last().unwrap();
    assert_eq!(
        last_request.last().unwrap(),
        &Message::assistant(r#"{"step":"observe","content":"Patiala has 42 degrees C"}"#)
    );
    assert_eq!(transcript.history.len(), 6);
    assert_eq!(model.remaining(), 0);
}

#[tokio::test]
async fn output_is_emitted_exactly_once_and_ends_the_run() {
    let recorder = Arc::new(Recorder::default());
    let model = scripted(&[
        r#"{"step":"think","content":"a"}"#,
        r#"{"step":"think","content":"b"}"#,
        r#"{"step":"output","content":"final"}"#,
        r#"{"step":"output","content":"never read"}"#,
    ]);
    let agent = Agent::new(model.clone()).with_hook(recorder.clone());

    let answer = agent.respond("q").await.unwrap();

    assert_eq!(answer, "final");
    let outputs: Vec<String> = recorder
        .events()
        .into_iter()
        .filter(|event| event.starts_with("output:"))
        .collect();
    assert_eq!(outputs, vec!["output:final".to_string()]);
    assert_eq!(model.remaining(), 1);
}

#[tokio::test]
async fn each_action_appends_one_observation_before_the_next_call() {
    let recorder = Arc::new(Recorder::default());
    let mut tools = ToolRegistry::new();
    tools.register(WeatherTool);
    let model = scripted(&[
        r#"{"step":"action","tool":"getWeatherInfo","input":"Delhi"}"#,
        r#"{"step":"action","tool":"getWeatherInfo","input":"Pune"}"#,
        r#"{"step":"output","content":"both hot"}"#,
    ]);
    let agent = Agent::new(model)
        .with_tools(tools)
        .with_hook(recorder.clone());

    let transcript = agent.run("q").await.unwrap();

    // Each action adds the echoed response plus exactly one observation.
    assert_eq!(*recorder.history_lengths.lock().unwrap(), vec![2, 4, 6]);
    let observations: Vec<StepRecord> = transcript
        .history
        .iter()
        .filter_map(|m| StepRecord::parse(&m.content).ok())
        .filter(|step| matches!(step, StepRecord::Observe { .. }))
        .collect();
    assert_eq!(
        observations,
        vec![
            StepRecord::observe("Delhi has 42 degrees C"),
            StepRecord::observe("Pune has 42 degrees C"),
        ]
    );
    assert_eq!(transcript.tool_calls, 2);
}

#[tokio::test]
async fn history_only_grows_and_keeps_its_prefix() {
    let recorder = Arc::new(Recorder::default());
    let mut tools = ToolRegistry::new();
    tools.register_fn("broken", "fails", |_| {
        Err(StepwiseError::Protocol("nope".into()))
    });
    tools.register(WeatherTool);
    let model = scripted(&[
        r#"{"step":"think","content":"start"}"#,
        r#"{"step":"action","tool":"broken","input":"x"}"#,
        r#"{"step":"action","tool":"getWeatherInfo","input":"Goa"}"#,
        r#"{"step":"think","content":"almost"}"#,
        r#"{"step":"output","content":"done"}"#,
    ]);
    let agent = Agent::new(model)
        .with_tools(tools)
        .with_hook(recorder.clone());

    let transcript = agent.run("q").await.unwrap();

    let snapshots = recorder.snapshots.lock().unwrap().clone();
    for pair in snapshots.windows(2) {
        assert!(pair[1].len() >= pair[0].len());
        assert_eq!(&pair[1][..pair[0].len()], pair[0].as_slice());
    }
    let last = snapshots.last().unwrap();
    assert_eq!(&transcript.history.messages()[..last.len()], last.as_slice());
    assert_eq!(transcript.history.messages()[0].role, Role::System);
    assert_eq!(transcript.history.messages()[1], Message::user("q"));
}

#[tokio::test]
async fn unknown_tool_fails_without_invoking_anything() {
    let invoked = Arc::new(AtomicUsize::new(0));
    let counter = invoked.clone();
    let mut tools = ToolRegistry::new();
    tools.register_fn("getWeatherInfo", "weather", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok("hot".into())
    });
    let model = scripted(&[
        r#"{"step":"action","tool":"unknownTool","input":"x"}"#,
        r#"{"step":"output","content":"unreachable"}"#,
    ]);
    let agent = Agent::new(model.clone()).with_tools(tools);

    let result = tokio::time::timeout(Duration::from_secs(5), agent.run("q"))
        .await
        .expect("agent must not hang");

    match result {
        Err(StepwiseError::ToolNotFound(name)) => assert_eq!(name, "unknownTool"),
        other => panic!("expected ToolNotFound, got {other:?}"),
    }
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn non_json_reply_is_a_protocol_violation() {
    let model = scripted(&["Sure! The weather is nice."]);
    let agent = Agent::new(model.clone());

    let result = tokio::time::timeout(Duration::from_secs(5), agent.run("q"))
        .await
        .expect("agent must not hang");

    assert!(matches!(result, Err(StepwiseError::Protocol(_))));
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn unrecognized_step_is_a_protocol_violation() {
    let model = scripted(&[r#"{"step":"ponder","content":"..."}"#]);
    let agent = Agent::new(model);

    match agent.run("q").await {
        Err(StepwiseError::Protocol(message)) => assert!(message.contains("ponder")),
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn step_limit_bounds_a_model_that_never_answers() {
    let model = scripted(&[r#"{"step":"think","content":"..."}"#; 10]);
    let agent = Agent::new(model.clone()).with_max_steps(3);

    assert!(matches!(
        agent.run("q").await,
        Err(StepwiseError::StepLimit(3))
    ));
    assert_eq!(model.requests().len(), 3);
}

#[tokio::test]
async fn transport_failures_are_terminal() {
    let model = scripted(&[]);
    let agent = Agent::new(model);

    assert!(matches!(
        agent.run("q").await,
        Err(StepwiseError::LanguageModel(_))
    ));
}

struct SlowModel;

#[async_trait]
impl LanguageModel for SlowModel {
    async fn complete_chat(&self, _messages: &[Message], _format: ResponseFormat) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(r#"{"step":"output","content":"too late"}"#.into())
    }
}

#[tokio::test]
async fn timeout_aborts_a_stalled_model() {
    let agent = Agent::new(Arc::new(SlowModel)).with_timeout(Duration::from_millis(50));

    assert!(matches!(
        agent.run("q").await,
        Err(StepwiseError::Timeout(limit)) if limit == Duration::from_millis(50)
    ));
}

#[tokio::test]
async fn cancelled_token_stops_before_the_first_call() {
    let token = CancellationToken::new();
    token.cancel();
    let model = scripted(&[r#"{"step":"output","content":"x"}"#]);
    let agent = Agent::new(model.clone()).with_cancellation(token);

    assert!(matches!(agent.run("q").await, Err(StepwiseError::Cancelled)));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn cancellation_interrupts_a_running_tool() {
    let token = CancellationToken::new();
    let mut tools = ToolRegistry::new();
    tools.register_async_fn("sleepy", "sleeps", |_| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("woke".to_string())
    });
    let model = scripted(&[
        r#"{"step":"action","tool":"sleepy","input":""}"#,
        r#"{"step":"output","content":"x"}"#,
    ]);
    let agent = Agent::new(model)
        .with_tools(tools)
        .with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(5), agent.run("q"))
        .await
        .expect("cancellation must interrupt the tool");
    canceller.await.unwrap();

    assert!(matches!(result, Err(StepwiseError::Cancelled)));
}

#[tokio::test]
async fn dynamic_model_can_drive_the_loop() {
    // Upcasts to a trait object the way the binary does.
    let model: Arc<dyn LanguageModel> = scripted(&[r#"{"step":"output","content":"dyn ok"}"#]);
    let agent = Agent::new(model);

    assert_eq!(agent.respond("q").await.unwrap(), "dyn ok");
}
