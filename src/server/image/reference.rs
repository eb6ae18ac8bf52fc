use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Registry host assumed when a reference names no registry
pub const DOCKER_DEFAULT_REGISTRY: &str = "docker.io";
/// Host name of the Docker Hub v1 index
pub const DOCKER_DEFAULT_V1_REGISTRY: &str = "index.docker.io";
/// Host name of the Docker Hub v2 registry
pub const DOCKER_DEFAULT_V2_REGISTRY: &str = "registry-1.docker.io";
/// Namespace of single-segment names on Docker Hub
pub const DOCKER_DEFAULT_NAMESPACE: &str = "library";
/// Tag assumed when a reference carries neither tag nor digest
pub const DEFAULT_IMAGE_TAG: &str = "latest";

lazy_static! {
    static ref PATH_COMPONENT: Regex =
        Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").unwrap();
    static ref TAG: Regex = Regex::new(r"^[\w][\w.-]{0,127}$").unwrap();
    static ref DIGEST_ALGORITHM: Regex =
        Regex::new(r"^[a-z0-9]+(?:[+._-][a-z0-9]+)*$").unwrap();
    static ref REGISTRY_HOST: Regex = Regex::new(
        r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?$"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceError {
    #[error("image reference cannot be empty")]
    Empty,
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidFormat {
        reference: String,
        reason: &'static str,
    },
    #[error("invalid tag {0:?}")]
    InvalidTag(String),
    #[error("invalid digest {0:?}")]
    InvalidDigest(String),
}

/// Content digest in `algorithm:hex` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(String);

impl Digest {
    pub fn parse(s: &str) -> Result<Self, ReferenceError> {
        let invalid = || ReferenceError::InvalidDigest(s.to_string());

        let (algorithm, encoded) = s.split_once(':').ok_or_else(invalid)?;
        if !DIGEST_ALGORITHM.is_match(algorithm) {
            return Err(invalid());
        }

        let is_lower_hex = encoded
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if encoded.is_empty() || !is_lower_hex {
            return Err(invalid());
        }

        // Only registered algorithms have a known encoded length
        let expected_len = match algorithm {
            "sha256" => Some(64),
            "sha384" => Some(96),
            "sha512" => Some(128),
            _ => None,
        };
        if expected_len.is_some_and(|len| encoded.len() != len) {
            return Err(invalid());
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Returns true for any of the host names Docker Hub is reachable under
pub fn is_docker_hub(registry: &str) -> bool {
    matches!(
        registry,
        DOCKER_DEFAULT_REGISTRY | DOCKER_DEFAULT_V1_REGISTRY | DOCKER_DEFAULT_V2_REGISTRY
    )
}

/// Parsed image reference
///
/// Fields that were not present in the parsed string are left empty; use
/// [`ImageReference::docker_client_defaults`] to fill them the way a
/// container client would.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageReference {
    pub registry: String,
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub digest: String,
}

impl ImageReference {
    /// Parse a pull spec such as `nginx`, `quay.io/org/app:v1` or
    /// `localhost:5000/app@sha256:...`
    pub fn parse(spec: &str) -> Result<Self, ReferenceError> {
        if spec.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let invalid = |reason| ReferenceError::InvalidFormat {
            reference: spec.to_string(),
            reason,
        };

        let mut reference = ImageReference::default();

        let remainder = match spec.split_once('@') {
            Some((before, digest)) => {
                reference.digest = Digest::parse(digest)?.0;
                before
            }
            None => spec,
        };

        // A colon followed by a slash belongs to a registry port, not a tag
        let path = match remainder.rsplit_once(':') {
            Some((before, tag)) if !tag.contains('/') => {
                if !TAG.is_match(tag) {
                    return Err(ReferenceError::InvalidTag(tag.to_string()));
                }
                reference.tag = tag.to_string();
                before
            }
            _ => remainder,
        };

        let mut segments: Vec<&str> = path.split('/').collect();
        if segments.len() > 1 && looks_like_registry(segments[0]) {
            let host = segments.remove(0);
            if !REGISTRY_HOST.is_match(host) {
                return Err(invalid("invalid registry host"));
            }
            reference.registry = host.to_string();
        }

        if segments.iter().any(|s| !PATH_COMPONENT.is_match(s)) {
            return Err(invalid("invalid repository path component"));
        }

        match segments.as_slice() {
            [] => return Err(invalid("missing repository name")),
            [name] => reference.name = name.to_string(),
            [namespace, rest @ ..] => {
                reference.namespace = namespace.to_string();
                reference.name = rest.join("/");
            }
        }

        Ok(reference)
    }

    /// Fill in the registry, namespace and tag a container client would assume
    pub fn docker_client_defaults(mut self) -> Self {
        if self.registry.is_empty() {
            self.registry = DOCKER_DEFAULT_REGISTRY.to_string();
        }
        if self.namespace.is_empty() && is_docker_hub(&self.registry) {
            self.namespace = DOCKER_DEFAULT_NAMESPACE.to_string();
        }
        if self.tag.is_empty() && self.digest.is_empty() {
            self.tag = DEFAULT_IMAGE_TAG.to_string();
        }
        self
    }

    /// The reference without tag or digest
    pub fn as_repository(&self) -> Self {
        Self {
            tag: String::new(),
            digest: String::new(),
            ..self.clone()
        }
    }

    /// Name with its tag or digest suffix
    pub fn name_string(&self) -> String {
        if self.name.is_empty() {
            return String::new();
        }
        if !self.tag.is_empty() {
            format!("{}:{}", self.name, self.tag)
        } else if !self.digest.is_empty() {
            format!("{}@{}", self.name, self.digest)
        } else {
            self.name.clone()
        }
    }

    /// Render only the fields that are set, without applying any defaults
    pub fn exact(&self) -> String {
        let name = self.name_string();
        if name.is_empty() {
            return name;
        }
        let mut s = String::new();
        if !self.registry.is_empty() {
            s.push_str(&self.registry);
            s.push('/');
        }
        if !self.namespace.is_empty() {
            s.push_str(&self.namespace);
            s.push('/');
        }
        s.push_str(&name);
        s
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() && is_docker_hub(&self.registry) {
            let mut r = self.clone();
            r.namespace = DOCKER_DEFAULT_NAMESPACE.to_string();
            return f.write_str(&r.exact());
        }
        f.write_str(&self.exact())
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn looks_like_registry(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "sha256:4b78c2e8d8b8a9b4ec9a1d3d1a2e5b1c8f3a9d6e7c2b1a0f9e8d7c6b5a4f3e2d";

    #[test]
    fn test_parse_bare_name() {
        let r = ImageReference::parse("nginx").unwrap();
        assert_eq!(r.registry, "");
        assert_eq!(r.namespace, "");
        assert_eq!(r.name, "nginx");
        assert_eq!(r.tag, "");
    }

    #[test]
    fn test_parse_registry_with_port_and_tag() {
        let r = ImageReference::parse("localhost:5000/team/app:v1.2").unwrap();
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.namespace, "team");
        assert_eq!(r.name, "app");
        assert_eq!(r.tag, "v1.2");
    }

    #[test]
    fn test_parse_port_without_tag() {
        let r = ImageReference::parse("registry.local:5000/app").unwrap();
        assert_eq!(r.registry, "registry.local:5000");
        assert_eq!(r.name, "app");
        assert_eq!(r.tag, "");
    }

    #[test]
    fn test_parse_digest() {
        let r = ImageReference::parse(&format!("quay.io/org/app@{}", SHA)).unwrap();
        assert_eq!(r.registry, "quay.io");
        assert_eq!(r.digest, SHA);
        assert_eq!(r.exact(), format!("quay.io/org/app@{}", SHA));
    }

    #[test]
    fn test_parse_first_segment_without_dot_is_namespace() {
        let r = ImageReference::parse("team/app").unwrap();
        assert_eq!(r.registry, "");
        assert_eq!(r.namespace, "team");
        assert_eq!(r.name, "app");
    }

    #[test]
    fn test_parse_deep_path_keeps_rest_in_name() {
        let r = ImageReference::parse("a.b/one/two/three").unwrap();
        assert_eq!(r.namespace, "one");
        assert_eq!(r.name, "two/three");
        assert_eq!(r.exact(), "a.b/one/two/three");
    }

    #[test]
    fn test_parse_rejects_invalid_input() {
        assert_eq!(ImageReference::parse(""), Err(ReferenceError::Empty));
        assert!(ImageReference::parse("a.b/App").is_err());
        assert!(ImageReference::parse("a.b//app").is_err());
        assert!(ImageReference::parse("a.b/app@sha256:short").is_err());
        assert!(ImageReference::parse("a.b/app:-bad").is_err());
    }

    #[test]
    fn test_docker_client_defaults() {
        let r = ImageReference::parse("nginx")
            .unwrap()
            .docker_client_defaults();
        assert_eq!(r.exact(), "docker.io/library/nginx:latest");

        let r = ImageReference::parse("a.b/app")
            .unwrap()
            .docker_client_defaults();
        assert_eq!(r.exact(), "a.b/app:latest");

        let r = ImageReference::parse(&format!("a.b/app@{}", SHA))
            .unwrap()
            .docker_client_defaults();
        assert_eq!(r.tag, "");
    }

    #[test]
    fn test_as_repository_drops_tag_and_digest() {
        let r = ImageReference::parse(&format!("a.b/ns/app:1@{}", SHA)).unwrap();
        assert_eq!(r.as_repository().exact(), "a.b/ns/app");
    }

    #[test]
    fn test_display_applies_library_namespace_on_docker_hub() {
        let r = ImageReference::parse("docker.io/nginx:1").unwrap();
        assert_eq!(r.to_string(), "docker.io/library/nginx:1");
        assert_eq!(r.exact(), "docker.io/nginx:1");
    }

    #[test]
    fn test_digest_parse() {
        let d = Digest::parse(SHA).unwrap();
        assert_eq!(d.as_str(), SHA);
        assert!(Digest::parse("sha256:ABC").is_err());
        assert!(Digest::parse("sha256:abc").is_err());
        assert!(Digest::parse(&format!("sha512:{}", "a".repeat(64))).is_err());
        assert!(Digest::parse("nocolon").is_err());
    }

    #[test]
    fn test_digest_parse_accepts_unregistered_algorithms() {
        assert!(Digest::parse("md5:d41d8cd98f00b204e9800998ecf8427e").is_ok());
        assert!(Digest::parse("multihash+base58:0a1b").is_ok());
        assert!(Digest::parse("sha3_256.v2:00ff").is_ok());

        assert!(Digest::parse("SHA256:00ff").is_err());
        assert!(Digest::parse("+sha:00ff").is_err());
        assert!(Digest::parse("sha--256:00ff").is_err());
        assert!(Digest::parse("md5:").is_err());
    }
}
