use crate::db::{DbConnection, DbPool};
use crate::domain::embedding::{Candidate, NewEmbedding};
use crate::domain::mapping::{Mapping, StoredMapping};
use crate::domain::page::SiteSide;
use crate::domain::session::{MigrationSession, SessionId, SessionStatus};
use crate::processing::embedding::VectorIndex;
use crate::repository::errors::{RepositoryError, RepositoryResult};

pub mod embedding;
pub mod errors;
pub mod mapping;
pub mod session;

/// Diesel-backed implementation of every repository trait.
#[derive(Clone)]
pub struct DieselRepository {
    pool: DbPool,
}

impl DieselRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> RepositoryResult<DbConnection> {
        Ok(self.pool.get()?)
    }
}

pub trait SessionReader {
    fn get_session(&self, session_id: &SessionId) -> RepositoryResult<MigrationSession>;
}

pub trait SessionWriter {
    /// Registers the session as pending; an existing session is left as is.
    fn create_session(&self, session_id: &SessionId) -> RepositoryResult<usize>;
    fn set_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> RepositoryResult<usize>;
}

pub trait EmbeddingReader {
    fn get_embedding(
        &self,
        session_id: &SessionId,
        side: SiteSide,
        url: &str,
    ) -> RepositoryResult<Option<Vec<f32>>>;

    /// Every `(url, vector)` stored for `side`, in insertion order.
    fn load_side(
        &self,
        session_id: &SessionId,
        side: SiteSide,
    ) -> RepositoryResult<Vec<(String, Vec<f32>)>>;

    /// Up to `k` vectors of `side` closest to `query`, best first, keeping
    /// only those with a cosine similarity of at least `min_score`.
    ///
    /// Builds a fresh index per call; use [`VectorIndex`] directly when
    /// querying the same side repeatedly.
    fn nearest(
        &self,
        session_id: &SessionId,
        side: SiteSide,
        query: &[f32],
        k: usize,
        min_score: f32,
    ) -> RepositoryResult<Vec<Candidate>> {
        let rows = self.load_side(session_id, side)?;
        VectorIndex::build(rows)
            .and_then(|index| index.search(query, k, min_score))
            .map_err(|e| RepositoryError::Index(e.to_string()))
    }
}

pub trait EmbeddingWriter {
    /// Stores a page vector, replacing any previous one for the same
    /// session, side and URL.
    fn insert_embedding(&self, embedding: &NewEmbedding<'_>) -> RepositoryResult<usize>;
}

pub trait MappingReader {
    fn list_mappings(
        &self,
        session_id: &SessionId,
        needs_review: Option<bool>,
    ) -> RepositoryResult<Vec<StoredMapping>>;
}

pub trait MappingWriter {
    /// Replaces every stored mapping of the session with `mappings`.
    fn create_mappings(
        &self,
        session_id: &SessionId,
        mappings: &[Mapping],
    ) -> RepositoryResult<usize>;

    /// Marks a mapping as reviewed, optionally pointing it at another URL.
    fn review_mapping(&self, mapping_id: i32, new_url: Option<&str>) -> RepositoryResult<usize>;
}
