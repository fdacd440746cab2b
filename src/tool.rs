use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{Result, StepwiseError};

/// A named capability taking one string argument and returning one string.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn call(&self, input: &str) -> Result<String>;
}

/// Name and description pair used when rendering the tool list for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
}

type AsyncToolFn = dyn Fn(String) -> BoxFuture<'static, Result<String>> + Send + Sync;

/// Adapts a plain closure to the [`Tool`] contract.
struct FnTool {
    name: String,
    description: String,
    handler: Arc<AsyncToolFn>,
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, input: &str) -> Result<String> {
        (self.handler)(input.to_string()).await
    }
}

#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register a synchronous function. It is invoked through the same async
    /// path as every other tool.
    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.register(FnTool {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(move |input: String| {
                let handler = handler.clone();
                async move { handler(&input) }.boxed()
            }),
        });
    }

    pub fn register_async_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.register(FnTool {
            name: name.into(),
            description: description.into(),
            handler: Arc::new(move |input: String| handler(input).boxed()),
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        let mut described: Vec<ToolDescription> = self
            .tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect();
        described.sort_by(|a, b| a.name.cmp(&b.name));
        described
    }

    pub async fn invoke(&self, name: &str, input: &str) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| StepwiseError::ToolNotFound(name.to_string()))?;
        tool.call(input).await.map_err(|err| match err {
            StepwiseError::ToolInvocation { .. } => err,
            other => StepwiseError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
