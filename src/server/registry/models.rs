use serde::{Deserialize, Serialize};

/// Response of `GET /v2/{namespace}/{name}/tags/list`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TagListResponse {
    /// Repository name, `namespace/name`
    pub name: String,
    pub tags: Vec<String>,
}
