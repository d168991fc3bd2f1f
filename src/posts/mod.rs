pub mod domain;
pub mod repository;

pub use domain::{normalize_skill, prepare_post};
pub use repository::PostRepository;
