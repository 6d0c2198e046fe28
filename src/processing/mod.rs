use serde::{Deserialize, Serialize};

use crate::processing::pipeline::MigrationRequest;

pub mod embedding;
pub mod exact;
pub mod filter;
pub mod matching;
pub mod migration;
pub mod pipeline;

#[derive(Deserialize, Serialize, Debug)]
pub enum ZMQMessage {
    Migration(MigrationRequest),
    Review(MappingReview),
}

/// Reviewer decision on a stored mapping; `new_url` redirects it elsewhere.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MappingReview {
    pub mapping_id: i32,
    #[serde(default)]
    pub new_url: Option<String>,
}
