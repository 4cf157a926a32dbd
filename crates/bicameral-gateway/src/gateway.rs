//! Gateway - transport-agnostic entry point
//!
//! Every bound transport (HTTP routes, the live socket) goes through these
//! methods: validate, check the caller's capabilities, take an admission
//! slot, then hand the request to the pipeline coordinator.

use crate::admission::Admission;
use crate::auth::ResolvedAuth;
use crate::registry::AdapterRegistry;
use crate::tasks::TaskQueue;
use bicameral_core::spine::epoch_label;
use bicameral_core::{
    verdict_parts, AdapterBinding, BicameralConfig, ConnectBody, ConnectionRequest, DirectBody,
    Error, GatewayConfig, PulseCycle, QueuedTask, RequestMode, Result, SpeakBody, SystemStatusSnapshot,
    TaskBody, TemporalSpine, ThinkBody,
};
use bicameral_llm::ReasoningEngine;
use bicameral_pipeline::{
    PipelineCoordinator, PipelineOutcome, StatusBoard, SuppliedVerdicts, DIRECT_SYSTEM_KEY,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;

/// Context key naming the submitting platform.
pub const PLATFORM_CONTEXT_KEY: &str = "platform";

/// Platform recorded for callers that do not name one.
pub const ANONYMOUS_PLATFORM: &str = "http";

#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub epoch_label: String,
}

pub struct Gateway {
    config: GatewayConfig,
    coordinator: Arc<PipelineCoordinator>,
    registry: AdapterRegistry,
    admission: Admission,
    tasks: TaskQueue,
    auth: ResolvedAuth,
    started_at: Instant,
}

impl Gateway {
    /// Build the spine, status board and pipeline around `engine`.
    pub fn new(config: &BicameralConfig, engine: Arc<dyn ReasoningEngine>) -> Self {
        let spine = Arc::new(TemporalSpine::new(config.spine.drift_tolerance()));
        let status = Arc::new(StatusBoard::new(spine.clone(), config.gateway.max_in_flight));
        let coordinator = PipelineCoordinator::from_config(config, engine, spine, status);
        Self::with_coordinator(config.gateway.clone(), Arc::new(coordinator))
    }

    pub fn with_coordinator(config: GatewayConfig, coordinator: Arc<PipelineCoordinator>) -> Self {
        Self {
            registry: AdapterRegistry::new(coordinator.spine().clone()),
            admission: Admission::from_config(&config),
            tasks: TaskQueue::new(coordinator.spine().clone(), config.task_capacity),
            auth: ResolvedAuth::from_config(&config.auth, None),
            started_at: Instant::now(),
            coordinator,
            config,
        }
    }

    pub fn with_auth(mut self, auth: ResolvedAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn auth(&self) -> &ResolvedAuth {
        &self.auth
    }

    pub fn coordinator(&self) -> &Arc<PipelineCoordinator> {
        &self.coordinator
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    /// Full pipeline.
    ///
    /// `context.source = "SYSTEM"` is taken at face value: any caller that
    /// passed bearer auth may claim it and receive the consent gate's SYSTEM
    /// override. SYSTEM trust is exactly bearer-token trust.
    pub async fn think(&self, body: ThinkBody) -> Result<PipelineOutcome> {
        body.validate()?;
        let platform = platform_of(&body.context);
        let mut request = ConnectionRequest::new(new_request_id(), platform, body.message)
            .with_priority(body.priority);
        request.context = body.context;
        self.submit(request, None).await
    }

    /// Direct reasoning, bypassing hemispheres and harmonizer.
    pub async fn direct(&self, body: DirectBody) -> Result<PipelineOutcome> {
        body.validate()?;
        let platform = platform_of(&body.context);
        let mut request = ConnectionRequest::new(new_request_id(), platform, body.prompt)
            .with_mode(RequestMode::DirectReasoning);
        request.context = body.context;
        if let Some(system) = body.system.filter(|s| !s.trim().is_empty()) {
            request.context.insert(DIRECT_SYSTEM_KEY.to_string(), system);
        }
        self.submit(request, None).await
    }

    /// Harmonizer and articulation over caller-supplied verdicts.
    pub async fn speak(&self, body: SpeakBody) -> Result<PipelineOutcome> {
        let supplied = SuppliedVerdicts {
            left: verdict_parts(&body.left_verdict),
            right: verdict_parts(&body.right_verdict),
            distilled_override: body.distilled_override(),
        };
        if supplied.left.is_none() && supplied.right.is_none() {
            return Err(Error::InvalidRequest(
                "at least one of left_verdict or right_verdict is required".into(),
            ));
        }

        let payload = body
            .distilled
            .get("query")
            .and_then(|q| q.as_str())
            .unwrap_or_default();
        let mut request = ConnectionRequest::new(new_request_id(), ANONYMOUS_PLATFORM, payload);
        if let Some(intent) = body.distilled.get("intent").and_then(|i| i.as_str()) {
            request = request.with_context("intent", intent);
        }
        self.submit(request, Some(supplied)).await
    }

    async fn submit(
        &self,
        request: ConnectionRequest,
        supplied: Option<SuppliedVerdicts>,
    ) -> Result<PipelineOutcome> {
        self.registry.check_send(&request.platform)?;
        let _permit = self.admission.admit().await?;
        match supplied {
            Some(supplied) => self.coordinator.run_articulation_test(request, supplied).await,
            None => self.coordinator.run(request).await,
        }
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub async fn queue_task(&self, body: TaskBody) -> Result<QueuedTask> {
        body.validate()?;
        self.tasks.queue(body.task_data, body.priority).await
    }

    pub async fn next_task(&self) -> Option<QueuedTask> {
        self.tasks.next().await
    }

    pub async fn complete_task(&self, task_id: &str) -> Result<QueuedTask> {
        self.tasks.done(task_id).await
    }

    // ------------------------------------------------------------------
    // Adapters
    // ------------------------------------------------------------------

    pub fn connect(&self, body: &ConnectBody) -> Result<AdapterBinding> {
        let binding = self.registry.register(body)?;
        self.coordinator.status().set_registered_adapters(self.registry.len());
        Ok(binding)
    }

    pub fn disconnect(&self, platform: &str) -> Result<AdapterBinding> {
        let binding = self.registry.deregister(platform)?;
        self.coordinator.status().set_registered_adapters(self.registry.len());
        Ok(binding)
    }

    pub fn adapters(&self) -> Vec<AdapterBinding> {
        self.registry.list()
    }

    // ------------------------------------------------------------------
    // Time and status
    // ------------------------------------------------------------------

    pub fn pulse(&self) -> PulseCycle {
        self.coordinator.spine().pulse()
    }

    pub fn status(&self) -> SystemStatusSnapshot {
        self.coordinator.status().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SystemStatusSnapshot> {
        self.coordinator.status().subscribe()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs: self.started_at.elapsed().as_secs(),
            epoch_label: epoch_label(self.coordinator.spine().latest()),
        }
    }

    pub fn log_startup(&self) {
        info!("Bicameral Gateway v{} starting", env!("CARGO_PKG_VERSION"));
        info!("  Auth mode: {:?}", self.auth.mode);
        info!(
            "  Admission: {} in flight, {} queued",
            self.config.max_in_flight, self.config.queue_depth
        );
    }
}

fn platform_of(context: &std::collections::BTreeMap<String, String>) -> String {
    context
        .get(PLATFORM_CONTEXT_KEY)
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ANONYMOUS_PLATFORM.to_string())
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
