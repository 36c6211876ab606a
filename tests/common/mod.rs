#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, Router};
use http::{Request, StatusCode};
use resilience_lab::error::{Error, Result};
use resilience_lab::upstream::{Upstream, UpstreamResponse};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tower::ServiceExt;

pub const SCRIPTED_URL: &str = "http://scripted/data";

/// One scripted upstream answer
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Status(u16),
    Refused,
}

/// Upstream that plays back a fixed sequence of answers, then repeats
/// `fallback` forever
pub struct ScriptedUpstream {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
}

impl ScriptedUpstream {
    pub fn new(script: impl IntoIterator<Item = Step>, fallback: Step) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(step: Step) -> Self {
        Self::new([], step)
    }

    /// Number of calls that reached the upstream
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    fn url(&self) -> &str {
        SCRIPTED_URL
    }

    async fn send(&self) -> Result<UpstreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);

        match step {
            Step::Status(status) if status >= 400 => Ok(UpstreamResponse {
                status,
                payload: json!({"error": "Internal Server Error (simulated)"}),
            }),
            Step::Status(status) => Ok(UpstreamResponse {
                status,
                payload: json!({"message": "Hello from Backend!"}),
            }),
            Step::Refused => Err(Error::Network("connection refused".to_string())),
        }
    }
}

/// Send a GET through the router and decode the JSON body
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}
