use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dcs_protocol::HttpEndpointRegistration;
use serde_json::Value;
use tokio::sync::{watch, RwLock};

use crate::code_channel::CodePipeline;
use crate::config::Config;
use crate::fanout::Fanout;
use crate::intercept::InterceptRegistry;
use crate::model::model_channel;
use crate::model_lock::ModelLock;

/// Registry of endpoint registrations, keyed by the owning connection id so
/// a disconnect can remove them atomically. Reads are lock-free relative to
/// writers in spirit (an `RwLock` rather than a true copy-on-write
/// structure, since the workspace has no need for a custom concurrent map
/// beyond what `tokio::sync::RwLock` already gives it).
pub type EndpointRegistry = Arc<RwLock<HashMap<u32, HttpEndpointRegistration>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub access_level: String,
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    Stopped,
    Started,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRecord {
    pub status: PluginStatus,
    pub data: HashMap<String, Value>,
}

/// Shared daemon state, cloned into every connection task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<dyn CodePipeline>,
    pub model_lock: Arc<ModelLock>,
    pub fanout: Arc<Fanout>,
    pub interceptors: Arc<InterceptRegistry>,
    pub endpoints: EndpointRegistry,
    pub model_tx: watch::Sender<Value>,
    pub model_rx: watch::Receiver<Value>,
    pub sessions: Arc<RwLock<HashMap<u32, UserSession>>>,
    pub plugins: Arc<RwLock<HashMap<String, PluginRecord>>>,
    pub updating: Arc<std::sync::atomic::AtomicBool>,
    next_connection_id: Arc<AtomicU32>,
    next_session_id: Arc<AtomicU32>,
}

impl AppState {
    pub fn new(config: Config, pipeline: Arc<dyn CodePipeline>, initial_model: Value) -> Self {
        let (model_tx, model_rx) = model_channel(initial_model);
        Self {
            config: Arc::new(config),
            pipeline,
            model_lock: Arc::new(ModelLock::new()),
            fanout: Arc::new(Fanout::new()),
            interceptors: Arc::new(InterceptRegistry::new()),
            endpoints: Arc::new(RwLock::new(HashMap::new())),
            model_tx,
            model_rx,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            plugins: Arc::new(RwLock::new(HashMap::new())),
            updating: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            next_connection_id: Arc::new(AtomicU32::new(1)),
            next_session_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn next_connection_id(&self) -> u32 {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_session_id(&self) -> u32 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn current_model(&self) -> Value {
        self.model_rx.borrow().clone()
    }

    /// Replace the current object-model snapshot and fan the new state out
    /// to every subscriber.
    pub async fn publish_model(&self, new_model: Value) {
        let _ = self.model_tx.send(new_model.clone());
        self.fanout.publish(new_model).await;
    }

    pub async fn register_endpoint(
        &self,
        connection_id: u32,
        registration: HttpEndpointRegistration,
    ) -> Result<(), EndpointError> {
        if registration.has_reserved_namespace() {
            return Err(EndpointError::NamespaceReserved);
        }
        let mut endpoints = self.endpoints.write().await;
        if endpoints.values().any(|existing| existing == &registration) {
            return Err(EndpointError::AlreadyRegistered);
        }
        endpoints.insert(connection_id, registration);
        Ok(())
    }

    pub async fn unregister_endpoint(&self, connection_id: u32) {
        self.endpoints.write().await.remove(&connection_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("namespace is reserved")]
    NamespaceReserved,
    #[error("an endpoint with this method/namespace/path is already registered")]
    AlreadyRegistered,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_channel::LoopbackPipeline;
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(Config::default(), Arc::new(LoopbackPipeline), json!({}))
    }

    #[test]
    fn connection_ids_are_distinct_and_increasing() {
        let state = test_state();
        let a = state.next_connection_id();
        let b = state.next_connection_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn publishing_a_model_update_is_visible_to_current_model() {
        let state = test_state();
        state.publish_model(json!({"state": {"status": "printing"}})).await;
        assert_eq!(state.current_model(), json!({"state": {"status": "printing"}}));
    }

    #[tokio::test]
    async fn reserved_namespace_is_rejected() {
        let state = test_state();
        let registration = HttpEndpointRegistration {
            http_method: "GET".into(),
            namespace: "machine".into(),
            path: "status".into(),
            is_upload: false,
        };
        let err = state.register_endpoint(1, registration).await.unwrap_err();
        assert_eq!(err, EndpointError::NamespaceReserved);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let state = test_state();
        let registration = HttpEndpointRegistration {
            http_method: "GET".into(),
            namespace: "myplugin".into(),
            path: "status".into(),
            is_upload: false,
        };
        state.register_endpoint(1, registration.clone()).await.unwrap();
        let err = state.register_endpoint(2, registration).await.unwrap_err();
        assert_eq!(err, EndpointError::AlreadyRegistered);
    }

    #[tokio::test]
    async fn unregistering_frees_the_namespace_for_reuse() {
        let state = test_state();
        let registration = HttpEndpointRegistration {
            http_method: "GET".into(),
            namespace: "myplugin".into(),
            path: "status".into(),
            is_upload: false,
        };
        state.register_endpoint(1, registration.clone()).await.unwrap();
        state.unregister_endpoint(1).await;
        state.register_endpoint(2, registration).await.unwrap();
    }
}
