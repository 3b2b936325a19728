//! Main request dispatcher: receives JSON-RPC messages, routes to the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::session::HostSession;
use crate::types::*;

use super::validator::validate_request;

pub struct ProtocolHandler {
    session: Arc<Mutex<HostSession>>,
    initialized: AtomicBool,
    shutdown: AtomicBool,
}

fn required_params<T: DeserializeOwned>(params: Option<Value>, what: &str) -> HostResult<T> {
    params
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| HostError::InvalidParams(e.to_string()))?
        .ok_or_else(|| HostError::InvalidParams(format!("{what} params required")))
}

fn to_result<T: serde::Serialize>(value: T) -> HostResult<Value> {
    serde_json::to_value(value).map_err(|e| HostError::InternalError(e.to_string()))
}

impl ProtocolHandler {
    pub fn new(session: Arc<Mutex<HostSession>>) -> Self {
        Self {
            session,
            initialized: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    /// True once a `shutdown` request has been answered.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif);
                None
            }
            _ => {
                tracing::warn!("Received unexpected message type from host");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        if let Err(e) = validate_request(&request) {
            return serde_json::to_value(e.to_json_rpc_error(request.id)).unwrap_or_default();
        }

        let id = request.id.clone();
        match self.dispatch_request(request).await {
            Ok(value) => serde_json::to_value(JsonRpcResponse::new(id, value)).unwrap_or_default(),
            Err(e) => {
                tracing::debug!("Request {id} failed: {e}");
                serde_json::to_value(e.to_json_rpc_error(id)).unwrap_or_default()
            }
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> HostResult<Value> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "ping" => Ok(Value::Object(serde_json::Map::new())),
            "shutdown" => self.handle_shutdown(),

            "assets/sync" => self.handle_assets_sync().await,
            "assets/load" => self.handle_assets_load().await,
            "bundle/hijack" => self.handle_bundle_hijack(request.params),
            "patches/script" => self.handle_patches_script().await,

            _ => Err(HostError::MethodNotFound(request.method)),
        }
    }

    fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" => tracing::info!("Host handshake complete"),
            "$/cancelRequest" => tracing::info!("Received cancellation notification"),
            _ => tracing::debug!("Unknown notification: {}", notification.method),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> HostResult<Value> {
        let params: InitializeParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| HostError::InvalidParams(e.to_string()))?
            .unwrap_or_default();

        match &params.client_info {
            Some(client) => {
                tracing::info!("Initialized with host: {} v{}", client.name, client.version)
            }
            None => tracing::info!("Initialized with anonymous host"),
        }
        self.initialized.store(true, Ordering::SeqCst);

        to_result(InitializeResult::default_result())
    }

    fn handle_shutdown(&self) -> HostResult<Value> {
        tracing::info!("Shutdown requested");
        self.shutdown.store(true, Ordering::SeqCst);
        Ok(Value::Object(serde_json::Map::new()))
    }

    async fn handle_assets_sync(&self) -> HostResult<Value> {
        let mut session = self.session.lock().await;
        let report = session.resync().await?;
        to_result(report)
    }

    async fn handle_assets_load(&self) -> HostResult<Value> {
        let session = self.session.lock().await;
        to_result(session.load())
    }

    fn handle_bundle_hijack(&self, params: Option<Value>) -> HostResult<Value> {
        let params: HijackParams = required_params(params, "Hijack")?;
        let text = modloader::hijack(&params.text)?;
        to_result(HijackResult { text })
    }

    async fn handle_patches_script(&self) -> HostResult<Value> {
        let session = self.session.lock().await;
        to_result(session.patch_script())
    }
}
