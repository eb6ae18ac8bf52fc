pub mod candidates;

pub use candidates::{identify_candidate_repositories, PullthroughSpec, RepositoryKey};
