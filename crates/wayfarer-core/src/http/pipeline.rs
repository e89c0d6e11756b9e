//! Ordered request/response stages around a transport
//!
//! Each [`Stage`] sees the request on the way in and the outcome on the way
//! out, and decides whether to call [`Next::run`] at all. The first stage in
//! the list is the outermost.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::http::request::{ApiRequest, Failure, Outcome};
use crate::http::transport::Transport;

/// One pipeline step `(request, next) -> outcome`
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Outcome;
}

/// Remainder of the pipeline after the current stage
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    transport: &'a dyn Transport,
    base: &'a str,
}

impl Next<'_> {
    pub async fn run(self, request: ApiRequest) -> Outcome {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                trace!(stage = stage.name(), path = %request.path, "Entering stage");
                let next = Next {
                    stages: rest,
                    transport: self.transport,
                    base: self.base,
                };
                stage.handle(request, next).await
            }
            None => {
                let base = request.base.as_deref().unwrap_or(self.base);
                match self.transport.send(base, &request).await {
                    Ok(reply) if reply.is_success() => Ok(reply),
                    Ok(reply) => Err(Failure::Status(reply)),
                    Err(failure) => Err(Failure::Network(failure)),
                }
            }
        }
    }
}

/// Stages plus the transport they wrap
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    transport: Arc<dyn Transport>,
    base: String,
}

impl Pipeline {
    /// Pipeline with no stages against a default base address
    pub fn new(transport: Arc<dyn Transport>, base: impl Into<String>) -> Self {
        Self {
            stages: Vec::new(),
            transport,
            base: base.into(),
        }
    }

    /// Append a stage inside the ones already present
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn send(&self, request: ApiRequest) -> Outcome {
        Next {
            stages: &self.stages,
            transport: self.transport.as_ref(),
            base: &self.base,
        }
        .run(request)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::{Body, NetworkFailure, Reply};
    use crate::http::ApiRequest;
    use reqwest::header::HeaderMap;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records the base it was called with and answers a fixed status
    struct EchoTransport {
        status: u16,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn send(&self, base: &str, request: &ApiRequest) -> Result<Reply, NetworkFailure> {
            self.seen.lock().unwrap().push(format!("{}{}", base, request.path));
            Ok(Reply::new(self.status, HeaderMap::new(), Body::Json(json!({"ok": true}))))
        }
    }

    struct Tag(&'static str, Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Stage for Tag {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Outcome {
            self.1.lock().unwrap().push(format!("in:{}", self.0));
            let outcome = next.run(request).await;
            self.1.lock().unwrap().push(format!("out:{}", self.0));
            outcome
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Stage for ShortCircuit {
        fn name(&self) -> &'static str {
            "short"
        }

        async fn handle(&self, _request: ApiRequest, _next: Next<'_>) -> Outcome {
            Ok(Reply::json(json!({"success": true, "data": []})))
        }
    }

    fn echo(status: u16) -> Arc<EchoTransport> {
        Arc::new(EchoTransport {
            status,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_stage_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(echo(200), "http://primary.test")
            .with_stage(Arc::new(Tag("a", log.clone())))
            .with_stage(Arc::new(Tag("b", log.clone())));

        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
        pipeline.send(ApiRequest::get("/posts")).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["in:a", "in:b", "out:b", "out:a"]);
    }

    #[tokio::test]
    async fn test_non_success_becomes_status_failure() {
        let pipeline = Pipeline::new(echo(503), "http://primary.test");
        match pipeline.send(ApiRequest::get("/posts")).await {
            Err(Failure::Status(reply)) => assert_eq!(reply.status, 503),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_base_overrides_default() {
        let transport = echo(200);
        let pipeline = Pipeline::new(transport.clone(), "http://primary.test");
        pipeline
            .send(ApiRequest::get("/posts").with_base("http://direct.test:8080"))
            .await
            .unwrap();
        assert_eq!(
            *transport.seen.lock().unwrap(),
            vec!["http://direct.test:8080/posts"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_transport() {
        let transport = echo(200);
        let pipeline = Pipeline::new(transport.clone(), "http://primary.test")
            .with_stage(Arc::new(ShortCircuit));
        pipeline.send(ApiRequest::get("/cart")).await.unwrap();
        assert!(transport.seen.lock().unwrap().is_empty());
    }
}
