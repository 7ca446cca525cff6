use crate::action::{Action, ActionContext, Resolver};
use anyhow::{bail, Context};
use async_trait::async_trait;
use faultline_common::types::DiagnosisResult;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared view of what the recovery actions have done so far: services we
/// created, targets currently isolated. `verify` reads it to confirm that
/// an effect (or its reversal) took.
#[derive(Default)]
pub struct RuntimeStore {
    inner: Mutex<RuntimeInner>,
}

#[derive(Default)]
struct RuntimeInner {
    isolated: HashMap<String, bool>,
    running: HashMap<String, bool>,
    services: HashMap<String, String>,
}

impl RuntimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_isolated(&self, target_id: &str, isolated: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.isolated.insert(target_id.to_string(), isolated);
    }

    pub fn is_isolated(&self, target_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.isolated.get(target_id).copied().unwrap_or(false)
    }

    pub fn set_running(&self, target_id: &str, running: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.running.insert(target_id.to_string(), running);
    }

    pub fn is_running(&self, target_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.running.get(target_id).copied().unwrap_or(false)
    }

    pub fn set_service_id(&self, target_id: &str, service_id: &str) {
        if service_id.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner
            .services
            .insert(target_id.to_string(), service_id.to_string());
    }

    pub fn service_id(&self, target_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.services.get(target_id).cloned()
    }

    pub fn clear_service_id(&self, target_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.services.remove(target_id);
    }
}

/// Launch parameters for one replacement service, selected by fault code or
/// by an event id on the trigger path.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicePreset {
    pub name: String,
    pub image_ref: String,
    #[serde(default)]
    pub node_names: Vec<String>,
    #[serde(default)]
    pub factor: Option<i64>,
    #[serde(default)]
    pub policy: Option<String>,
}

/// Orchestrator response envelope; `status` 0 and 200 both mean success.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedService {
    #[serde(default)]
    id: String,
}

fn envelope_ok(status: i64) -> bool {
    status == 0 || status == 200
}

/// Creates a replacement service through the orchestrator REST API.
/// `resolve` destroys the service this action created (or the one named in
/// the event metadata).
pub struct LaunchServiceAction {
    store: Arc<RuntimeStore>,
    base_url: String,
    client: reqwest::Client,
    presets: HashMap<String, ServicePreset>,
}

impl LaunchServiceAction {
    pub fn new(
        store: Arc<RuntimeStore>,
        base_url: impl Into<String>,
        presets: HashMap<String, ServicePreset>,
    ) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
            presets,
        }
    }

    /// Preset lookup: trigger-path events first, then basic events, then
    /// the fault code.
    fn select_preset(&self, event: &DiagnosisResult) -> Option<&ServicePreset> {
        event
            .trigger_path
            .iter()
            .chain(&event.basic_events)
            .find_map(|id| self.presets.get(id))
            .or_else(|| self.presets.get(&event.fault_code))
    }

    async fn call_service_command(&self, command: &str, ids: &[String]) -> anyhow::Result<()> {
        if ids.is_empty() {
            bail!("empty service ids");
        }
        let url = format!("{}/api/v1/service/{}/ids", self.base_url, command);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .with_context(|| format!("service {command} request failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("service {command} http status={status}");
        }
        let envelope: ApiEnvelope<serde_json::Value> = response.json().await?;
        if !envelope_ok(envelope.status) {
            bail!(
                "service {command} api error status={} msg={}",
                envelope.status,
                envelope.message
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Action for LaunchServiceAction {
    fn name(&self) -> &str {
        "launch_service"
    }

    async fn execute(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()> {
        let target_id = event.target_id();
        if target_id.is_empty() {
            bail!("empty target id");
        }
        let Some(preset) = self.select_preset(event) else {
            bail!("no service preset for fault code {}", event.fault_code);
        };
        if preset.name.is_empty() {
            bail!("preset has no service name");
        }
        if preset.image_ref.is_empty() {
            bail!("preset has no image ref");
        }

        let mut body = serde_json::json!({
            "name": preset.name,
            "image": { "ref": preset.image_ref, "action": "run" },
            "node": { "names": preset.node_names },
        });
        if let Some(factor) = preset.factor {
            body["factor"] = serde_json::json!(factor);
        }
        if let Some(policy) = &preset.policy {
            body["policy"] = serde_json::json!(policy);
        }

        let url = format!("{}/api/v1/service", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("create service request failed")?;
        let status = response.status();
        if !status.is_success() {
            bail!("create service http status={status}");
        }
        let envelope: ApiEnvelope<CreatedService> = response.json().await?;
        if !envelope_ok(envelope.status) {
            bail!(
                "create service api error status={} msg={}",
                envelope.status,
                envelope.message
            );
        }
        if let Some(created) = envelope.data {
            self.store.set_service_id(target_id, &created.id);
        }

        if ctx.is_cancelled() {
            bail!("cancelled");
        }
        self.store.set_running(target_id, true);
        Ok(())
    }

    async fn verify(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()> {
        if ctx.is_cancelled() {
            bail!("cancelled");
        }
        let target_id = event.target_id();
        if event.is_resolved() {
            if self.store.service_id(target_id).is_some() {
                bail!("service for {target_id} still registered after resolve");
            }
            return Ok(());
        }
        if !self.store.is_running(target_id) {
            bail!("replacement service not running for {target_id}");
        }
        Ok(())
    }

    fn as_resolver(&self) -> Option<&dyn Resolver> {
        Some(self)
    }
}

#[async_trait]
impl Resolver for LaunchServiceAction {
    async fn resolve(&self, _ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()> {
        let target_id = event.target_id();
        let service_id = self
            .store
            .service_id(target_id)
            .or_else(|| event.meta_str("serviceId").map(str::to_string))
            .context("missing serviceId for destroy")?;

        self.call_service_command("destroy", &[service_id]).await?;
        self.store.clear_service_id(target_id);
        self.store.set_running(target_id, false);
        Ok(())
    }
}

/// Isolates a misbehaving service by stopping its instances through the
/// orchestrator, and restores them on resolve. The runtime store tracks the
/// breaker flag for verification.
pub struct TrafficBreakerAction {
    store: Arc<RuntimeStore>,
    base_url: String,
    client: reqwest::Client,
}

impl TrafficBreakerAction {
    pub fn new(store: Arc<RuntimeStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn service_id(&self, event: &DiagnosisResult) -> anyhow::Result<String> {
        event
            .meta_str("serviceId")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .with_context(|| format!("empty serviceId for target {}", event.target_id()))
    }

    async fn flip(&self, command: &str, service_id: String) -> anyhow::Result<()> {
        let url = format!("{}/api/v1/service/{}/ids", self.base_url, command);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "ids": [service_id] }))
            .send()
            .await
            .with_context(|| format!("service {command} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("service {command} http status={status}");
        }
        let envelope: ApiEnvelope<serde_json::Value> = response.json().await?;
        if !envelope_ok(envelope.status) {
            bail!(
                "service {command} api error status={} msg={}",
                envelope.status,
                envelope.message
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Action for TrafficBreakerAction {
    fn name(&self) -> &str {
        "traffic_breaker"
    }

    async fn execute(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()> {
        let target_id = event.target_id();
        if target_id.is_empty() {
            bail!("empty target id");
        }
        let service_id = self.service_id(event)?;
        self.flip("stop", service_id).await?;
        if ctx.is_cancelled() {
            bail!("cancelled");
        }
        self.store.set_isolated(target_id, true);
        Ok(())
    }

    async fn verify(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()> {
        if ctx.is_cancelled() {
            bail!("cancelled");
        }
        let target_id = event.target_id();
        let isolated = self.store.is_isolated(target_id);
        if event.is_resolved() {
            if isolated {
                bail!("breaker still engaged for {target_id} after resolve");
            }
            return Ok(());
        }
        if !isolated {
            bail!("breaker not engaged for {target_id}");
        }
        Ok(())
    }

    fn as_resolver(&self) -> Option<&dyn Resolver> {
        Some(self)
    }
}

#[async_trait]
impl Resolver for TrafficBreakerAction {
    async fn resolve(&self, _ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()> {
        let target_id = event.target_id();
        if target_id.is_empty() {
            bail!("empty target id");
        }
        let service_id = self.service_id(event)?;
        self.flip("start", service_id).await?;
        self.store.set_isolated(target_id, false);
        Ok(())
    }
}
