//! Shared fixtures for mealwise-api integration tests
//!
//! Builds the real router over an in-memory database, with scripted
//! language model and page fetcher doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use mealwise_api::error::ExtractionError;
use mealwise_api::services::llm::{
    CompletionRequest, CompletionResponse, LanguageModel, LlmError, ToolCall,
};
use mealwise_api::services::{FetchedPage, PageFetcher};
use mealwise_api::AppState;
use mealwise_common::config::TomlConfig;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

/// Replays queued replies; an empty queue fails like an unreachable model
pub struct ScriptedModel {
    replies: Mutex<VecDeque<CompletionResponse>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<CompletionResponse>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Network("no scripted reply left".to_string()))
    }
}

pub fn text_reply(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
    }
}

pub fn tool_reply(name: &str, arguments: Value) -> CompletionResponse {
    CompletionResponse {
        content: None,
        tool_calls: vec![ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments,
        }],
    }
}

/// Serves canned HTML by URL; anything else fails to fetch
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ExtractionError> {
        match self.pages.get(url) {
            Some(html) => Ok(FetchedPage {
                final_url: url.to_string(),
                html: html.clone(),
            }),
            None => Err(ExtractionError::FetchFailed(format!("HTTP 404 from {}", url))),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn new(model: Arc<dyn LanguageModel>, fetcher: StaticFetcher) -> Self {
        let pool = mealwise_common::db::init_memory_database()
            .await
            .expect("Failed to create in-memory database");
        let state = AppState::new(pool.clone(), TomlConfig::default(), model, Arc::new(fetcher));
        Self {
            router: mealwise_api::build_router(state),
            pool,
        }
    }

    /// App whose language model is never configured
    pub async fn without_model() -> Self {
        Self::new(Arc::new(mealwise_api::services::DisabledModel), StaticFetcher::default()).await
    }

    /// Send a request; returns status and raw body
    pub async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Bytes) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes)
    }

    /// Send a request; returns status and JSON body (`Null` when empty)
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                panic!("non-JSON body: {}", String::from_utf8_lossy(&bytes))
            })
        };
        (status, json)
    }

    /// Register a user and return their bearer token
    pub async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": "correct horse battery",
                    "display_name": "Test Cook"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_recipe(&self, token: &str, title: &str, tags: &[&str]) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/api/recipes",
                Some(token),
                Some(json!({
                    "title": title,
                    "servings": 4,
                    "ingredients": [
                        {"name": "onion", "quantity": 1, "unit": "piece"},
                        {"name": "olive oil", "quantity": 2, "unit": "tbsp"}
                    ],
                    "instructions": ["Chop", "Cook"],
                    "tags": tags
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create recipe failed: {}", body);
        body
    }
}

/// Parse an SSE body into `(event name, JSON data)` pairs
pub fn parse_sse(body: &[u8]) -> Vec<(String, Value)> {
    let text = String::from_utf8_lossy(body);
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = None;
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = serde_json::from_str(payload.trim()).ok();
                }
            }
            Some((event?, data?))
        })
        .collect()
}
