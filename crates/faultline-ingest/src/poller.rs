use crate::dispatcher::Dispatcher;
use chrono::Utc;
use faultline_common::metrics::{
    ContainerMetrics, CpuUsage, MetricSnapshot, NodeMetrics, NodeNetInfo, ServiceMetrics,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const PAGE_SIZE: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Poll: http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Poll: api error status={status}: {message}")]
    Api { status: i64, message: String },

    #[error("Poll: empty data in api response")]
    EmptyData,
}

/// Orchestrator response envelope shared by every list endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    list: Vec<T>,
    #[serde(default)]
    total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeDto {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    memory_total: i64,
    #[serde(default)]
    memory_free: i64,
    #[serde(default)]
    disk_total: f64,
    #[serde(default)]
    disk_free: f64,
    #[serde(default)]
    cpu_usage: f64,
    #[serde(default)]
    process_count: i64,
    #[serde(default)]
    container_total: i64,
    #[serde(default)]
    container_running: i64,
    #[serde(default)]
    net: Vec<NodeNetDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeNetDto {
    #[serde(default)]
    network_name: String,
    #[serde(default)]
    up_net: f64,
    #[serde(default)]
    down_net: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContainerDto {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    uptime: i64,
    #[serde(default)]
    deploy_status: String,
    #[serde(default)]
    failed_message: Option<String>,
    #[serde(default)]
    restart_count: i64,
    #[serde(default)]
    deploy_num: i64,
    #[serde(default)]
    cpu_usage: CpuDto,
    #[serde(default)]
    memory_limit: i64,
    #[serde(default)]
    memory_usage: i64,
    #[serde(default)]
    size_usage: i64,
    #[serde(default)]
    size_limit: i64,
    #[serde(default)]
    service_id: String,
    #[serde(default)]
    service_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct CpuDto {
    #[serde(default)]
    total: f64,
    #[serde(default)]
    cores: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceDto {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    healthy: bool,
    #[serde(default)]
    factor: i64,
    #[serde(default)]
    policy: String,
    #[serde(default)]
    instance_online: i64,
    #[serde(default)]
    instance_active: i64,
    #[serde(default)]
    business_check_success: i64,
    #[serde(default)]
    business_check_fail: i64,
}

/// Thin client for the orchestrator's paginated list endpoints.
pub struct OrchestratorClient {
    base_url: String,
    client: reqwest::Client,
}

impl OrchestratorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        page_num: usize,
    ) -> Result<Page<T>, PollError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("pageNum", page_num.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let envelope: Envelope<Page<T>> = response.json().await?;
        if !matches!(envelope.status, 0 | 200) {
            return Err(PollError::Api {
                status: envelope.status,
                message: envelope.message,
            });
        }
        envelope.data.ok_or(PollError::EmptyData)
    }

    async fn fetch_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, PollError> {
        let mut items = Vec::new();
        let mut page_num = 1;
        loop {
            let page: Page<T> = self.fetch_page(path, page_num).await?;
            let fetched = page.list.len();
            items.extend(page.list);
            if fetched == 0 || items.len() >= page.total {
                return Ok(items);
            }
            page_num += 1;
        }
    }

    pub async fn list_nodes(&self) -> Result<Vec<MetricSnapshot>, PollError> {
        let now = Utc::now().timestamp();
        let nodes: Vec<NodeDto> = self.fetch_all("/api/v1/node").await?;
        Ok(nodes
            .into_iter()
            .map(|n| {
                MetricSnapshot::Node(NodeMetrics {
                    id: n.id,
                    status: n.status,
                    memory_total: n.memory_total,
                    memory_free: n.memory_free,
                    disk_total: n.disk_total,
                    disk_free: n.disk_free,
                    cpu_usage: CpuUsage {
                        total: n.cpu_usage,
                        cores: Vec::new(),
                    },
                    process_count: n.process_count,
                    container_total: n.container_total,
                    container_running: n.container_running,
                    net: n
                        .net
                        .into_iter()
                        .map(|i| NodeNetInfo {
                            network_name: i.network_name,
                            up_net: i.up_net,
                            down_net: i.down_net,
                        })
                        .collect(),
                    timestamp: now,
                })
            })
            .collect())
    }

    pub async fn list_containers(&self) -> Result<Vec<MetricSnapshot>, PollError> {
        let now = Utc::now().timestamp();
        let containers: Vec<ContainerDto> = self.fetch_all("/api/v1/container/node").await?;
        Ok(containers
            .into_iter()
            .map(|c| {
                MetricSnapshot::Container(ContainerMetrics {
                    id: c.id,
                    status: c.status,
                    uptime_secs: c.uptime,
                    deploy_status: c.deploy_status,
                    failed_message: c.failed_message,
                    restart_count: c.restart_count,
                    deploy_num: c.deploy_num,
                    cpu_usage: CpuUsage {
                        total: c.cpu_usage.total,
                        cores: c.cpu_usage.cores,
                    },
                    memory_limit: c.memory_limit,
                    memory_usage: c.memory_usage,
                    size_usage: c.size_usage,
                    size_limit: c.size_limit,
                    service_id: c.service_id,
                    service_name: c.service_name,
                    timestamp: now,
                })
            })
            .collect())
    }

    pub async fn list_services(&self) -> Result<Vec<MetricSnapshot>, PollError> {
        let now = Utc::now().timestamp();
        let services: Vec<ServiceDto> = self.fetch_all("/api/v1/service").await?;
        Ok(services
            .into_iter()
            .map(|s| {
                MetricSnapshot::Service(ServiceMetrics {
                    id: s.id,
                    status: s.status,
                    healthy: s.healthy,
                    factor: s.factor,
                    policy: s.policy,
                    instance_online: s.instance_online,
                    instance_active: s.instance_active,
                    check_success: s.business_check_success,
                    check_fail: s.business_check_fail,
                    timestamp: now,
                })
            })
            .collect())
    }
}

/// Periodic poll loop over the orchestrator API.
pub struct Poller {
    client: OrchestratorClient,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl Poller {
    pub fn new(client: OrchestratorClient, dispatcher: Arc<Dispatcher>, interval: Duration) -> Self {
        Self {
            client,
            dispatcher,
            interval,
        }
    }

    /// One full poll cycle: nodes, containers, services.
    pub async fn poll_once(&self) -> Result<(), PollError> {
        let nodes = self.client.list_nodes().await?;
        let containers = self.client.list_containers().await?;
        let services = self.client.list_services().await?;

        tracing::debug!(
            nodes = nodes.len(),
            containers = containers.len(),
            services = services.len(),
            "Poll cycle complete"
        );

        self.dispatcher.dispatch_all(nodes);
        self.dispatcher.dispatch_all(containers);
        self.dispatcher.dispatch_all(services);
        Ok(())
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tick.tick() => {
                        if let Err(e) = self.poll_once().await {
                            tracing::warn!(error = %e, "Poll cycle failed");
                        }
                    }
                }
            }
        })
    }
}
