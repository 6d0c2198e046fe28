use bytemuck::{cast_slice, pod_collect_to_vec};
use chrono::Utc;
use diesel::prelude::*;

use crate::domain::embedding::NewEmbedding;
use crate::domain::page::SiteSide;
use crate::domain::session::SessionId;
use crate::models::embedding::NewPageEmbedding;
use crate::repository::errors::RepositoryResult;
use crate::repository::{DieselRepository, EmbeddingReader, EmbeddingWriter};

impl EmbeddingReader for DieselRepository {
    fn get_embedding(
        &self,
        session_id: &SessionId,
        side: SiteSide,
        url: &str,
    ) -> RepositoryResult<Option<Vec<f32>>> {
        use crate::schema::page_embeddings;

        let mut conn = self.conn()?;

        let blob = page_embeddings::table
            .filter(page_embeddings::session_id.eq(session_id.as_str()))
            .filter(page_embeddings::site_type.eq(side.as_str()))
            .filter(page_embeddings::url.eq(url))
            .select(page_embeddings::embedding)
            .first::<Vec<u8>>(&mut conn)
            .optional()?;

        Ok(blob.map(|blob| pod_collect_to_vec::<u8, f32>(&blob)))
    }

    fn load_side(
        &self,
        session_id: &SessionId,
        side: SiteSide,
    ) -> RepositoryResult<Vec<(String, Vec<f32>)>> {
        use crate::schema::page_embeddings;

        let mut conn = self.conn()?;

        let rows = page_embeddings::table
            .filter(page_embeddings::session_id.eq(session_id.as_str()))
            .filter(page_embeddings::site_type.eq(side.as_str()))
            .order(page_embeddings::id.asc())
            .select((page_embeddings::url, page_embeddings::embedding))
            .load::<(String, Vec<u8>)>(&mut conn)?;

        Ok(rows
            .into_iter()
            .map(|(url, blob)| (url, pod_collect_to_vec::<u8, f32>(&blob)))
            .collect())
    }
}

impl EmbeddingWriter for DieselRepository {
    fn insert_embedding(&self, embedding: &NewEmbedding<'_>) -> RepositoryResult<usize> {
        use crate::schema::page_embeddings;

        let mut conn = self.conn()?;

        let affected = diesel::replace_into(page_embeddings::table)
            .values(&NewPageEmbedding {
                session_id: embedding.session_id.as_str(),
                site_type: embedding.side.as_str(),
                url: embedding.url,
                embedding: cast_slice(embedding.vector).to_vec(),
                extracted_text: embedding.extracted_text,
                title: embedding.title,
                created_at: Utc::now().naive_utc(),
            })
            .execute(&mut conn)?;

        Ok(affected)
    }
}
