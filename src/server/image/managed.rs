use super::models::{Image, MANAGED_BY_REGISTRY_ANNOTATION};

/// Whether the image entered through this registry's own push or import path,
/// as opposed to being a pull-through copy of an external image
pub fn is_image_managed(image: &Image) -> bool {
    image
        .annotations()
        .and_then(|a| a.get(MANAGED_BY_REGISTRY_ANNOTATION))
        .is_some_and(|v| v == "true")
}
