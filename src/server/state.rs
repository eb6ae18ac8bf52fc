use crate::server::cluster::{ClusterApi, ClusterStreamAccessor, KubeClusterApi};
use crate::server::settings::{ClusterSettings, Settings};
use crate::server::tags::{
    BoxTagService, PendingErrorLayer, PendingErrors, TagBridge, TagServiceStack, TracingLayer,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared state of the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cluster: Arc<dyn ClusterApi>,
}

/// Create a Kubernetes client from an explicit kubeconfig or the inferred environment
async fn init_kube_client(settings: &ClusterSettings) -> Result<kube::Client> {
    // Install default CryptoProvider for rustls (required for kube-rs HTTPS connections)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let config = match &settings.kubeconfig {
        Some(path) => {
            let kubeconfig = kube::config::Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig from {}", path))?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &kube::config::KubeConfigOptions::default(),
            )
            .await?
        }
        None => kube::Config::infer().await?, // In-cluster or ~/.kube/config
    };
    Ok(kube::Client::try_from(config)?)
}

impl AppState {
    pub async fn new_for_server(settings: &Settings) -> Result<Self> {
        let client = init_kube_client(&settings.cluster).await?;
        tracing::info!(
            "Using cluster API {}/{}",
            settings.cluster.api_group,
            settings.cluster.api_version
        );
        let cluster = KubeClusterApi::new(
            client,
            &settings.cluster.api_group,
            &settings.cluster.api_version,
        );
        Ok(Self::new(settings.clone(), Arc::new(cluster)))
    }

    pub fn new(settings: Settings, cluster: Arc<dyn ClusterApi>) -> Self {
        Self {
            settings: Arc::new(settings),
            cluster,
        }
    }

    /// Empty pending error store for a single request
    pub fn pending_errors(&self) -> Arc<PendingErrors> {
        Arc::new(PendingErrors::new(
            self.settings.pending_errors.ttl(),
            self.settings.pending_errors.max_capacity,
        ))
    }

    /// Tag service of the repository `namespace/name`, wrapped in the interceptors.
    /// `pending` is consulted before every operation and must not outlive the request.
    pub fn tag_service(
        &self,
        namespace: &str,
        name: &str,
        pending: Arc<PendingErrors>,
    ) -> BoxTagService {
        let repository = format!("{}/{}", namespace, name);
        let streams = Arc::new(ClusterStreamAccessor::new(
            self.cluster.clone(),
            namespace,
            name,
        ));
        let bridge = TagBridge::new(
            &repository,
            streams,
            self.cluster.clone(),
            self.settings.registry.tag_bridge_options(),
        );
        TagServiceStack::new()
            .layer(PendingErrorLayer::new(pending))
            .layer(TracingLayer)
            .build(&repository, bridge)
    }
}
