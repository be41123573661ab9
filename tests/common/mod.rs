//! In-process stand-in for the Pinecone and OpenAI HTTP APIs.
//!
//! One axum server on an ephemeral port serves the Pinecone control plane
//! (`/indexes`), a single index's data plane (`/vectors/upsert`, `/query`)
//! and the OpenAI endpoints (`/embeddings`, `/chat/completions`). The index
//! host it reports is the server's own `http://` address.

#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Reply used by the chat endpoint when the prompt carried no context.
pub const NO_CONTEXT_REPLY: &str = "I could not find that in your documents.";

#[derive(Default)]
pub struct MockState {
    pub base_url: String,
    /// Length of every returned embedding.
    pub dims: usize,
    pub indexes: HashMap<String, Value>,
    /// Describe calls left before a freshly created index reports ready.
    pub pending_ready: HashMap<String, usize>,
    pub vectors: Vec<Value>,
    pub create_calls: usize,
    pub upsert_calls: usize,
    pub embedding_inputs: Vec<String>,
    pub chat_requests: Vec<Value>,
}

#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub async fn start(dims: usize) -> Self {
        let state = Arc::new(Mutex::new(MockState {
            dims,
            ..Default::default()
        }));
        let app = Router::new()
            .route("/indexes", get(list_indexes).post(create_index))
            .route("/indexes/{name}", get(describe_index))
            .route("/vectors/upsert", post(upsert))
            .route("/query", post(query))
            .route("/embeddings", post(embeddings))
            .route("/chat/completions", post(chat))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        state.lock().unwrap().base_url = format!("http://{}", addr);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn upsert_calls(&self) -> usize {
        self.state.lock().unwrap().upsert_calls
    }

    pub fn vectors(&self) -> Vec<Value> {
        self.state.lock().unwrap().vectors.clone()
    }

    pub fn chat_requests(&self) -> Vec<Value> {
        self.state.lock().unwrap().chat_requests.clone()
    }

    /// Config file contents pointing every endpoint at this server.
    pub fn config_toml(&self, root: &std::path::Path) -> String {
        format!(
            r#"[ingest]
root = "{root}"

[openai]
base_url = "{url}"
max_retries = 0

[embedding]
dims = {dims}

[pinecone]
index = "handbook"
controller_url = "{url}"
ready_timeout_secs = 10
"#,
            root = root.display().to_string().replace('\\', "/"),
            url = self.url(),
            dims = self.state.lock().unwrap().dims,
        )
    }
}

type Shared = State<Arc<Mutex<MockState>>>;

async fn list_indexes(State(state): Shared) -> Json<Value> {
    let state = state.lock().unwrap();
    let indexes: Vec<Value> = state.indexes.values().cloned().collect();
    Json(json!({ "indexes": indexes }))
}

async fn create_index(State(state): Shared, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    if state.indexes.contains_key(&name) {
        return (StatusCode::CONFLICT, Json(json!({"error": {"code": "ALREADY_EXISTS"}})))
            .into_response();
    }
    state.create_calls += 1;
    let desc = json!({
        "name": name,
        "dimension": body["dimension"],
        "metric": body["metric"],
        "host": state.base_url,
        "spec": body["spec"],
        "status": {"ready": false, "state": "Initializing"}
    });
    state.indexes.insert(name.clone(), desc.clone());
    state.pending_ready.insert(name, 1);
    (StatusCode::CREATED, Json(desc)).into_response()
}

async fn describe_index(State(state): Shared, Path(name): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    let Some(desc) = state.indexes.get(&name).cloned() else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": {"code": "NOT_FOUND"}})))
            .into_response();
    };
    let remaining = state.pending_ready.get(&name).copied().unwrap_or(0);
    if remaining > 0 {
        state.pending_ready.insert(name, remaining - 1);
        return Json(desc).into_response();
    }
    let mut ready = desc;
    ready["status"] = json!({"ready": true, "state": "Ready"});
    state.indexes.insert(name, ready.clone());
    Json(ready).into_response()
}

async fn upsert(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.upsert_calls += 1;
    let vectors = body["vectors"].as_array().cloned().unwrap_or_default();
    let count = vectors.len();
    state.vectors.extend(vectors);
    Json(json!({ "upsertedCount": count }))
}

/// Returns stored vectors in insertion order; ranking is the real service's job.
async fn query(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    let state = state.lock().unwrap();
    let top_k = body["topK"].as_u64().unwrap_or(10) as usize;
    let matches: Vec<Value> = state
        .vectors
        .iter()
        .take(top_k)
        .enumerate()
        .map(|(i, v)| {
            json!({
                "id": v["id"],
                "score": 1.0 - (i as f64) * 0.1,
                "metadata": v["metadata"],
            })
        })
        .collect();
    Json(json!({ "matches": matches, "namespace": body["namespace"] }))
}

async fn embeddings(State(state): Shared, Json(body): Json<Value>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    let inputs: Vec<String> = body["input"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let dims = state.dims;
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let mut v = vec![0.0f32; dims];
            v[0] = text.chars().count() as f32;
            json!({"object": "embedding", "index": i, "embedding": v})
        })
        .collect();
    state.embedding_inputs.extend(inputs);
    Json(json!({"object": "list", "data": data, "model": body["model"]}))
}

async fn chat(State(state): Shared, Json(body): Json<Value>) -> Response {
    state.lock().unwrap().chat_requests.push(body.clone());

    let messages = body["messages"].as_array().cloned().unwrap_or_default();
    let system = messages
        .first()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();
    let question = messages
        .last()
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default();
    let reply = if system.contains("no matching documents") {
        NO_CONTEXT_REPLY.to_string()
    } else {
        format!("You asked: {}", question)
    };

    if body["stream"].as_bool() != Some(true) {
        return Json(json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": reply}}]
        }))
        .into_response();
    }

    let mut sse = String::new();
    sse.push_str("data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n");
    for word in reply.split_inclusive(' ') {
        let event = json!({"choices": [{"index": 0, "delta": {"content": word}}]});
        sse.push_str(&format!("data: {}\n\n", event));
    }
    sse.push_str("data: [DONE]\n\n");
    ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response()
}
