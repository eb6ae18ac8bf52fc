pub mod backend;
pub mod candidates;
