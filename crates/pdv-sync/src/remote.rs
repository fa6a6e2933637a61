//! # Remote Client Boundary
//!
//! What the sync pass needs from the central API, and nothing more.
//! Every call returns the parsed JSON body (`Value::Null` for an empty one)
//! or a categorized [`ApiError`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiResult;

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get(&self, endpoint: &str) -> ApiResult<Value>;

    async fn post(&self, endpoint: &str, payload: &Value) -> ApiResult<Value>;

    async fn put(&self, endpoint: &str, payload: &Value) -> ApiResult<Value>;

    async fn delete(&self, endpoint: &str) -> ApiResult<Value>;

    /// `true` when the API answers its health endpoint.
    async fn health_check(&self) -> bool {
        self.get("/health").await.is_ok()
    }
}

// =============================================================================
// In-memory remote for sync tests
// =============================================================================

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Debug, Clone, PartialEq)]
    pub struct Call {
        pub method: &'static str,
        pub endpoint: String,
        pub payload: Option<Value>,
    }

    #[derive(Debug, Default)]
    pub struct MockState {
        pub calls: Vec<Call>,
        /// Scripted answers per "METHOD endpoint", consumed in order.
        pub scripted: HashMap<String, VecDeque<ApiResult<Value>>>,
        next_id: i64,
    }

    /// Answers POSTs with `{"id": n}`, GETs with an empty list and
    /// everything else with `{}` unless a reply was scripted for that call.
    #[derive(Debug, Clone, Default)]
    pub struct MockRemote {
        state: Arc<Mutex<MockState>>,
    }

    impl MockRemote {
        pub fn new() -> Self {
            let remote = Self::default();
            remote.state().next_id = 1000;
            remote
        }

        pub fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub fn script(&self, method: &str, endpoint: &str, reply: ApiResult<Value>) {
            self.state()
                .scripted
                .entry(format!("{method} {endpoint}"))
                .or_default()
                .push_back(reply);
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state().calls.clone()
        }

        pub fn calls_to(&self, method: &str) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| c.method == method)
                .collect()
        }

        fn answer(
            &self,
            method: &'static str,
            endpoint: &str,
            payload: Option<&Value>,
        ) -> ApiResult<Value> {
            let mut state = self.state();
            state.calls.push(Call {
                method,
                endpoint: endpoint.to_string(),
                payload: payload.cloned(),
            });
            let key = format!("{method} {endpoint}");
            if let Some(reply) = state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
                return reply;
            }
            match method {
                "POST" => {
                    state.next_id += 1;
                    Ok(serde_json::json!({ "id": state.next_id }))
                }
                "GET" => Ok(serde_json::json!([])),
                _ => Ok(serde_json::json!({})),
            }
        }
    }

    #[async_trait]
    impl RemoteClient for MockRemote {
        async fn get(&self, endpoint: &str) -> ApiResult<Value> {
            self.answer("GET", endpoint, None)
        }

        async fn post(&self, endpoint: &str, payload: &Value) -> ApiResult<Value> {
            self.answer("POST", endpoint, Some(payload))
        }

        async fn put(&self, endpoint: &str, payload: &Value) -> ApiResult<Value> {
            self.answer("PUT", endpoint, Some(payload))
        }

        async fn delete(&self, endpoint: &str) -> ApiResult<Value> {
            self.answer("DELETE", endpoint, None)
        }
    }
}
