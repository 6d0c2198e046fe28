use crate::domain::page::SiteSide;
use crate::domain::session::SessionId;

/// One page's vector and metadata, as handed to the vector store.
#[derive(Clone, Copy, Debug)]
pub struct NewEmbedding<'a> {
    pub session_id: &'a SessionId,
    pub side: SiteSide,
    pub url: &'a str,
    pub vector: &'a [f32],
    pub extracted_text: &'a str,
    pub title: &'a str,
}

/// A nearest-neighbour hit, best first.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub url: String,
    /// Cosine similarity to the query vector.
    pub similarity: f32,
}
