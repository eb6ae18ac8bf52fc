use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::server::image::{ImageReference, TrackedStream};

/// Identity of an upstream repository, independent of tag or digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryKey {
    pub registry: String,
    pub namespace: String,
    pub name: String,
}

impl RepositoryKey {
    pub fn host(&self) -> &str {
        &self.registry
    }
}

impl From<&ImageReference> for RepositoryKey {
    fn from(reference: &ImageReference) -> Self {
        Self {
            registry: reference.registry.clone(),
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        }
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.registry.is_empty() {
            write!(f, "{}/", self.registry)?;
        }
        if !self.namespace.is_empty() {
            write!(f, "{}/", self.namespace)?;
        }
        f.write_str(&self.name)
    }
}

/// Where and how to pull through an upstream repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullthroughSpec {
    /// Reference the repository was first seen with, defaulted to `:latest` if untagged
    pub reference: ImageReference,
    /// Whether the registry must be reached over plain transport
    pub insecure: bool,
}

/// Upstream repositories to search when pulling through content of `stream`.
///
/// `primary` selects the current image of every tag; otherwise the previous
/// image is used and tags with a single event are skipped. References on
/// `local_registry` and references that do not parse are ignored.
///
/// Every repository on a registry host that was reached insecurely by any tag
/// is insecure. The returned list holds the secure repositories followed by
/// the insecure ones, each group sorted.
pub fn identify_candidate_repositories(
    stream: &TrackedStream,
    local_registry: &str,
    primary: bool,
) -> (Vec<String>, HashMap<RepositoryKey, PullthroughSpec>) {
    let insecure_by_default = stream.insecure_by_default();

    let mut insecure_hosts: HashSet<String> = HashSet::new();
    let mut search: HashMap<RepositoryKey, PullthroughSpec> = HashMap::new();

    for history in stream.tag_history() {
        let event = if primary {
            history.items.first()
        } else {
            history.items.get(1)
        };
        let Some(event) = event else {
            continue;
        };

        let reference = match ImageReference::parse(&event.docker_image_reference) {
            Ok(reference) => reference,
            Err(e) => {
                tracing::debug!(
                    stream = %stream.name(),
                    tag = %history.tag,
                    error = %e,
                    "Ignoring unparsable tag event reference"
                );
                continue;
            }
        };
        if !local_registry.is_empty() && reference.registry == local_registry {
            tracing::debug!(
                stream = %stream.name(),
                repository = %reference.as_repository().exact(),
                "Skipping reference on the local registry"
            );
            continue;
        }

        let reference = reference.docker_client_defaults();
        let key = RepositoryKey::from(&reference);

        let insecure = insecure_by_default
            || stream
                .tag_policy(&history.tag)
                .is_some_and(|policy| policy.import_policy.insecure);
        if insecure {
            insecure_hosts.insert(key.registry.clone());
        }

        search
            .entry(key)
            .or_insert(PullthroughSpec { reference, insecure });
    }

    let mut secure = Vec::new();
    let mut insecure = Vec::new();
    for (key, spec) in search.iter_mut() {
        if insecure_hosts.contains(key.host()) {
            spec.insecure = true;
        }
        if spec.insecure {
            insecure.push(key.to_string());
        } else {
            secure.push(key.to_string());
        }
    }
    secure.sort();
    insecure.sort();
    secure.extend(insecure);

    (secure, search)
}
