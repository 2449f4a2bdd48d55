//! In-process fakes for host capabilities.
//!
//! Enabled with the `testing` feature so downstream crates can use them from
//! their own test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{BridgeError, Result};
use crate::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::storage::SecureStore;

type Scripted = std::result::Result<HttpResponse, String>;

struct Route {
    method: HttpMethod,
    url: String,
    responses: VecDeque<Scripted>,
}

/// `HttpClient` that answers from a script and records every request.
///
/// Responses for a route are consumed in order; the last one keeps being
/// served. Requests without a route get a `404`.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, method: HttpMethod, url: &str, response: Scripted) {
        let mut routes = lock(&self.routes);
        match routes.iter_mut().find(|r| r.method == method && r.url == url) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                method,
                url: url.to_string(),
                responses: VecDeque::from([response]),
            }),
        }
    }

    /// Queue a response for `method url` (query string excluded).
    pub fn on(&self, method: HttpMethod, url: &str, response: HttpResponse) -> &Self {
        self.push(method, url, Ok(response));
        self
    }

    pub fn on_json(
        &self,
        method: HttpMethod,
        url: &str,
        status: u16,
        body: serde_json::Value,
    ) -> &Self {
        self.on(method, url, HttpResponse::new(status, body.to_string()))
    }

    /// Queue a transport failure (no response at all).
    pub fn fail(&self, method: HttpMethod, url: &str, message: &str) -> &Self {
        self.push(method, url, Err(message.to_string()));
        self
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }

    pub fn total(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn clear_requests(&self) {
        lock(&self.requests).clear();
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        lock(&self.requests).push(request.clone());

        let scripted = {
            let mut routes = lock(&self.routes);
            routes
                .iter_mut()
                .find(|r| r.method == request.method && r.url == request.url)
                .and_then(|route| {
                    if route.responses.len() > 1 {
                        route.responses.pop_front()
                    } else {
                        route.responses.front().cloned()
                    }
                })
        };

        match scripted {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(BridgeError::OperationFailed(message)),
            None => Ok(HttpResponse::new(404, "no route")),
        }
    }
}

/// `SecureStore` backed by a map.
#[derive(Default)]
pub struct MemorySecureStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySecureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_are_consumed_in_order() {
        let client = ScriptedHttpClient::new();
        client
            .on(HttpMethod::Get, "https://api/videos.json", HttpResponse::new(500, ""))
            .on(HttpMethod::Get, "https://api/videos.json", HttpResponse::new(200, "{}"));

        let request = HttpRequest::new(HttpMethod::Get, "https://api/videos.json");
        assert_eq!(client.execute(request.clone()).await.unwrap().status, 500);
        assert_eq!(client.execute(request.clone()).await.unwrap().status, 200);
        assert_eq!(client.execute(request).await.unwrap().status, 200);
        assert_eq!(client.count(HttpMethod::Get, "https://api/videos.json"), 3);
    }

    #[tokio::test]
    async fn test_unrouted_and_failing_requests() {
        let client = ScriptedHttpClient::new();
        client.fail(HttpMethod::Post, "https://auth/token", "connection refused");

        let missing = client
            .execute(HttpRequest::new(HttpMethod::Get, "https://nowhere"))
            .await
            .unwrap();
        assert_eq!(missing.status, 404);

        let failed = client
            .execute(HttpRequest::new(HttpMethod::Post, "https://auth/token"))
            .await;
        assert!(matches!(failed, Err(BridgeError::OperationFailed(_))));
        assert_eq!(client.total(), 2);
    }

    #[tokio::test]
    async fn test_memory_secure_store() {
        let store = MemorySecureStore::new();
        store.set_secret("k", b"v").await.unwrap();
        assert!(store.has_secret("k").await.unwrap());
        store.delete_secret("k").await.unwrap();
        assert_eq!(store.get_secret("k").await.unwrap(), None);
    }
}
