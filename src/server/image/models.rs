use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::reference::DEFAULT_IMAGE_TAG;

/// Stream annotation; `"true"` makes every tag of the stream insecure
pub const INSECURE_REPOSITORY_ANNOTATION: &str = "openshift.io/image.insecureRepository";

/// Image annotation set on images that entered through the registry's own push/import path
pub const MANAGED_BY_REGISTRY_ANNOTATION: &str = "openshift.io/image.managed";

/// Cluster resource recording a repository's tag history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedStream {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: StreamSpec,
    #[serde(default)]
    pub status: StreamStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    /// Per-tag policy, keyed by `name`
    #[serde(default)]
    pub tags: Vec<TagReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagReference {
    pub name: String,
    #[serde(default)]
    pub import_policy: TagImportPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagImportPolicy {
    /// Can only add insecurity: an unset field and an explicit `false` read the same,
    /// so it never relaxes the stream annotation
    #[serde(default)]
    pub insecure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_image_repository: String,
    /// Tag history in declaration order
    #[serde(default)]
    pub tags: Vec<NamedTagEventList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedTagEventList {
    pub tag: String,
    /// Newest first
    #[serde(default)]
    pub items: Vec<TagEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEvent {
    /// Pull spec the image was resolved from
    pub docker_image_reference: String,
    /// Image digest
    pub image: String,
    #[serde(default)]
    pub generation: i64,
}

impl TrackedStream {
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }

    /// Stream-wide transport-security default
    pub fn insecure_by_default(&self) -> bool {
        self.annotation(INSECURE_REPOSITORY_ANNOTATION) == Some("true")
    }

    pub fn tag_history(&self) -> &[NamedTagEventList] {
        &self.status.tags
    }

    pub fn tag_policy(&self, tag: &str) -> Option<&TagReference> {
        self.spec.tags.iter().find(|t| t.name == tag)
    }

    /// Most recent event for `tag`; the empty tag means `latest`
    pub fn latest_tagged_event(&self, tag: &str) -> Option<&TagEvent> {
        let tag = if tag.is_empty() { DEFAULT_IMAGE_TAG } else { tag };
        self.status
            .tags
            .iter()
            .find(|history| history.tag == tag)
            .and_then(|history| history.items.first())
    }
}

/// Image metadata as stored in the cluster, keyed by digest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_image_reference: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signatures: Vec<ImageSignature>,
    /// Remaining fields (`dockerImageMetadata`, `dockerImageLayers`, the raw
    /// manifest, ...), carried through unchanged when the image is re-posted
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSignature {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default)]
    pub signature_type: String,
    /// Base64-encoded signature blob
    #[serde(default)]
    pub content: String,
}

impl Image {
    pub fn digest(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }
}

/// Request to point `tag` of the stream named in `metadata` at `image`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamMapping {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub image: Image,
    pub tag: String,
}

impl StreamMapping {
    pub fn new(namespace: &str, stream: &str, tag: &str, image: Image) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: Some(namespace.to_string()),
                name: Some(stream.to_string()),
                ..Default::default()
            },
            image,
            tag: tag.to_string(),
        }
    }

    pub fn stream(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

/// Name of the composite `<stream>:<tag>` resource
pub fn join_stream_tag(stream: &str, tag: &str) -> String {
    let tag = if tag.is_empty() { DEFAULT_IMAGE_TAG } else { tag };
    format!("{}:{}", stream, tag)
}
