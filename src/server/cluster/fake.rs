//! In-memory cluster used by unit tests

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use super::{ClusterApi, ClusterError, StreamAccessor};
use crate::server::image::models::{
    join_stream_tag, NamedTagEventList, TagEvent, TagImportPolicy, TagReference,
    MANAGED_BY_REGISTRY_ANNOTATION,
};
use crate::server::image::{Digest, Image, StreamMapping, TrackedStream};

/// A valid sha256 digest made of a repeated byte
pub fn digest(n: u8) -> String {
    format!("sha256:{}", format!("{:02x}", n).repeat(32))
}

pub fn image(digest: &str, managed: bool) -> Image {
    let mut image = Image::default();
    image.metadata.name = Some(digest.to_string());
    image.metadata.resource_version = Some("42".to_string());
    if managed {
        image.metadata.annotations = Some(BTreeMap::from([(
            MANAGED_BY_REGISTRY_ANNOTATION.to_string(),
            "true".to_string(),
        )]));
    }
    image
}

/// Stream builder for tests
pub struct StreamBuilder {
    stream: TrackedStream,
}

impl StreamBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        let mut stream = TrackedStream::default();
        stream.metadata.namespace = Some(namespace.to_string());
        stream.metadata.name = Some(name.to_string());
        Self { stream }
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.stream
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Add a history entry; events are `(reference, image digest)`, newest first
    pub fn history(mut self, tag: &str, events: &[(&str, &str)]) -> Self {
        self.stream.status.tags.push(NamedTagEventList {
            tag: tag.to_string(),
            items: events
                .iter()
                .map(|(reference, image)| TagEvent {
                    docker_image_reference: reference.to_string(),
                    image: image.to_string(),
                    generation: 1,
                })
                .collect(),
        });
        self
    }

    pub fn policy(mut self, tag: &str, insecure: bool) -> Self {
        self.stream.spec.tags.push(TagReference {
            name: tag.to_string(),
            import_policy: TagImportPolicy {
                insecure,
            },
        });
        self
    }

    pub fn build(self) -> TrackedStream {
        self.stream
    }
}

#[derive(Default)]
pub struct FakeCluster {
    streams: Mutex<HashMap<(String, String), TrackedStream>>,
    images: Mutex<HashMap<String, Image>>,
    /// Current mapping of every `<stream>:<tag>`
    mappings: Mutex<HashMap<(String, String), StreamMapping>>,
    create_failures: Mutex<VecDeque<ClusterError>>,
    delete_failures: Mutex<VecDeque<ClusterError>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream(self, stream: TrackedStream) -> Self {
        self.add_stream(stream);
        self
    }

    pub fn add_stream(&self, stream: TrackedStream) {
        self.streams.lock().unwrap().insert(
            (stream.namespace().to_string(), stream.name().to_string()),
            stream,
        );
    }

    pub fn with_image(self, image: Image) -> Self {
        self.images
            .lock()
            .unwrap()
            .insert(image.digest().to_string(), image);
        self
    }

    pub fn fail_next_create(&self, err: ClusterError) {
        self.create_failures.lock().unwrap().push_back(err);
    }

    pub fn fail_next_delete(&self, err: ClusterError) {
        self.delete_failures.lock().unwrap().push_back(err);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Mapping behind the composite `<stream>:<tag>` name
    pub fn mapping(&self, namespace: &str, stream_tag: &str) -> Option<StreamMapping> {
        self.mappings
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), stream_tag.to_string()))
            .cloned()
    }

    pub fn insert_mapping(&self, mapping: StreamMapping) {
        let key = (
            mapping.metadata.namespace.clone().unwrap_or_default(),
            join_stream_tag(mapping.stream(), &mapping.tag),
        );
        self.mappings.lock().unwrap().insert(key, mapping);
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
    }
}

fn not_found(kind: &str, name: &str) -> ClusterError {
    ClusterError::status(404, "NotFound", format!("{} {:?} not found", kind, name))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_stream(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TrackedStream, ClusterError> {
        self.record("get_stream");
        self.streams
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("imagestreams", name))
    }

    async fn get_image(&self, digest: &Digest) -> Result<Image, ClusterError> {
        self.record("get_image");
        self.images
            .lock()
            .unwrap()
            .get(digest.as_str())
            .cloned()
            .ok_or_else(|| not_found("images", digest.as_str()))
    }

    async fn create_stream_mapping(&self, mapping: &StreamMapping) -> Result<(), ClusterError> {
        self.record("create_stream_mapping");
        if let Some(err) = self.create_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.insert_mapping(mapping.clone());
        Ok(())
    }

    async fn delete_stream_tag(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.record("delete_stream_tag");
        if let Some(err) = self.delete_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.mappings
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("imagestreamtags", name))
    }
}

/// Stream accessor that always fails, for repositories whose backing stream is gone
pub struct BrokenStreams;

#[async_trait]
impl StreamAccessor for BrokenStreams {
    async fn stream(&self) -> Result<TrackedStream, ClusterError> {
        Err(ClusterError::status(503, "ServiceUnavailable", "etcd unavailable"))
    }
}
