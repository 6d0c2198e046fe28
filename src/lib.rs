pub mod crawlers;
pub mod db;
pub mod domain;
pub mod embedder;
pub mod models;
pub mod processing;
pub mod repository;
pub mod schema;

/// Cosine similarity at or above which a semantic match is auto-approved.
pub const SIMILARITY_THRESHOLD: f32 = 0.8;

/// Lower bound of the medium band; matches below it are flagged low-confidence.
pub const REVIEW_THRESHOLD: f32 = 0.6;
