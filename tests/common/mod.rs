//! Scripted in-process `Provider` double for the seed-scenario tests.

use async_trait::async_trait;
use orchestrator_engine::errors::{EngineError, EngineResult};
use orchestrator_engine::provider_registry::Provider;
use orchestrator_shared::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use orchestrator_shared::models::provider::Capability;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One scripted outcome for a single `dispatch` call.
pub enum Script {
    Success(serde_json::Value),
    AppError(i64, String),
    Transport,
}

/// A provider whose responses are a fixed, consumed-in-order script. Once
/// the script is exhausted, every further call succeeds with `{}` — tests
/// that care about an exact call count assert on `calls()` rather than
/// relying on the script running dry.
pub struct ScriptedProvider {
    capabilities: HashSet<Capability>,
    scripts: Mutex<Vec<Script>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(capabilities: HashSet<Capability>, scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            capabilities,
            scripts: Mutex::new(scripts),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn capabilities(&self) -> &HashSet<Capability> {
        &self.capabilities
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> EngineResult<JsonRpcResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut scripts = self.scripts.lock().await;
            if scripts.is_empty() {
                None
            } else {
                Some(scripts.remove(0))
            }
        };
        match next {
            Some(Script::Success(v)) => Ok(JsonRpcResponse::success(request.id, v)),
            Some(Script::AppError(code, message)) => {
                Ok(JsonRpcResponse::error(request.id, code, message, None))
            }
            Some(Script::Transport) => Err(EngineError::ProviderTransportError {
                provider_id: Uuid::nil(),
                reason: "simulated transport failure".to_string(),
            }),
            None => Ok(JsonRpcResponse::success(request.id, serde_json::json!({}))),
        }
    }

    async fn health_probe(&self) -> bool {
        true
    }
}
