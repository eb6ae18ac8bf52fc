use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::core::{ApiResource, GroupVersionKind};
use kube::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ClusterApi, ClusterError};
use crate::server::image::{Digest, Image, StreamMapping, TrackedStream};

/// Cluster API backed by a kube client, addressing the image resources dynamically
pub struct KubeClusterApi {
    client: Client,
    streams: ApiResource,
    images: ApiResource,
    stream_mappings: ApiResource,
    stream_tags: ApiResource,
}

impl KubeClusterApi {
    pub fn new(client: Client, group: &str, version: &str) -> Self {
        let resource = |kind: &str, plural: &str| {
            ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
        };
        Self {
            client,
            streams: resource("ImageStream", "imagestreams"),
            images: resource("Image", "images"),
            stream_mappings: resource("ImageStreamMapping", "imagestreammappings"),
            stream_tags: resource("ImageStreamTag", "imagestreamtags"),
        }
    }

    fn namespaced(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

/// Re-read a dynamic object as one of the typed image resources
fn decode<T: DeserializeOwned>(kind: &'static str, obj: DynamicObject) -> Result<T, ClusterError> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|source| ClusterError::Decode { kind, source })
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TrackedStream, ClusterError> {
        let obj = self.namespaced(namespace, &self.streams).get(name).await?;
        decode("ImageStream", obj)
    }

    async fn get_image(&self, digest: &Digest) -> Result<Image, ClusterError> {
        // Images are cluster-scoped
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.images);
        let obj = api.get(digest.as_str()).await?;
        decode("Image", obj)
    }

    async fn create_stream_mapping(&self, mapping: &StreamMapping) -> Result<(), ClusterError> {
        let namespace = mapping.metadata.namespace.as_deref().unwrap_or_default();
        let stream = mapping.stream();
        let image = serde_json::to_value(&mapping.image).map_err(|source| ClusterError::Decode {
            kind: "Image",
            source,
        })?;

        let obj = DynamicObject::new(stream, &self.stream_mappings)
            .within(namespace)
            .data(serde_json::json!({ "image": image, "tag": mapping.tag }));

        debug!(namespace, stream, tag = %mapping.tag, "Creating image stream mapping");
        // The server answers with a Status, not the mapping
        self.namespaced(namespace, &self.stream_mappings)
            .create(&PostParams::default(), &obj)
            .await?;
        Ok(())
    }

    async fn delete_stream_tag(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        debug!(namespace, name, "Deleting image stream tag");
        self.namespaced(namespace, &self.stream_tags)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
