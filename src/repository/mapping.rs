use chrono::Utc;
use diesel::prelude::*;

use crate::domain::mapping::{Mapping, StoredMapping};
use crate::domain::session::SessionId;
use crate::models::mapping::{NewUrlMapping, UrlMapping};
use crate::repository::errors::{RepositoryError, RepositoryResult};
use crate::repository::{DieselRepository, MappingReader, MappingWriter};

impl MappingReader for DieselRepository {
    fn list_mappings(
        &self,
        session_id: &SessionId,
        needs_review: Option<bool>,
    ) -> RepositoryResult<Vec<StoredMapping>> {
        use crate::schema::url_mappings;

        let mut conn = self.conn()?;

        let mut query = url_mappings::table
            .filter(url_mappings::session_id.eq(session_id.as_str()))
            .select(UrlMapping::as_select())
            .into_boxed();
        if let Some(needs_review) = needs_review {
            query = query.filter(url_mappings::needs_review.eq(needs_review));
        }

        let rows = query
            .order(url_mappings::id.asc())
            .load::<UrlMapping>(&mut conn)?;

        rows.into_iter()
            .map(StoredMapping::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RepositoryError::ValidationError)
    }
}

impl MappingWriter for DieselRepository {
    fn create_mappings(
        &self,
        session_id: &SessionId,
        mappings: &[Mapping],
    ) -> RepositoryResult<usize> {
        use crate::schema::url_mappings;

        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        let inserted = conn.transaction(|conn| {
            let replaced = diesel::delete(
                url_mappings::table.filter(url_mappings::session_id.eq(session_id.as_str())),
            )
            .execute(conn)?;
            if replaced > 0 {
                log::debug!("Replacing {replaced} stored mappings of session {session_id}");
            }

            let mut inserted_rows = 0;
            for mapping in mappings {
                inserted_rows += diesel::insert_into(url_mappings::table)
                    .values(&NewUrlMapping::new(session_id, mapping, now))
                    .execute(conn)?;
            }
            Ok::<usize, RepositoryError>(inserted_rows)
        })?;

        Ok(inserted)
    }

    fn review_mapping(&self, mapping_id: i32, new_url: Option<&str>) -> RepositoryResult<usize> {
        use crate::schema::url_mappings;

        let mut conn = self.conn()?;
        let target = url_mappings::table.filter(url_mappings::id.eq(mapping_id));
        let now = Utc::now().naive_utc();

        let affected = match new_url {
            Some(new_url) => diesel::update(target)
                .set((
                    url_mappings::new_url.eq(new_url),
                    url_mappings::needs_review.eq(false),
                    url_mappings::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
            None => diesel::update(target)
                .set((
                    url_mappings::needs_review.eq(false),
                    url_mappings::updated_at.eq(now),
                ))
                .execute(&mut conn)?,
        };

        if affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(affected)
    }
}
