use chrono::Utc;
use diesel::prelude::*;

use crate::domain::session::{MigrationSession, SessionId, SessionStatus};
use crate::models::session::{
    MigrationSession as DbMigrationSession, NewMigrationSession,
};
use crate::repository::errors::{RepositoryError, RepositoryResult};
use crate::repository::{DieselRepository, SessionReader, SessionWriter};

impl SessionReader for DieselRepository {
    fn get_session(&self, session_id: &SessionId) -> RepositoryResult<MigrationSession> {
        use crate::schema::migration_sessions;

        let mut conn = self.conn()?;

        let row = migration_sessions::table
            .filter(migration_sessions::id.eq(session_id.as_str()))
            .select(DbMigrationSession::as_select())
            .first(&mut conn)
            .optional()?
            .ok_or(RepositoryError::NotFound)?;

        MigrationSession::try_from(row).map_err(RepositoryError::ValidationError)
    }
}

impl SessionWriter for DieselRepository {
    fn create_session(&self, session_id: &SessionId) -> RepositoryResult<usize> {
        use crate::schema::migration_sessions;

        let mut conn = self.conn()?;
        let now = Utc::now().naive_utc();

        let inserted = diesel::insert_or_ignore_into(migration_sessions::table)
            .values(&NewMigrationSession {
                id: session_id.as_str(),
                status: SessionStatus::Pending.as_str(),
                created_at: now,
                updated_at: now,
            })
            .execute(&mut conn)?;

        Ok(inserted)
    }

    fn set_session_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> RepositoryResult<usize> {
        use crate::schema::migration_sessions;

        let mut conn = self.conn()?;

        let affected = diesel::update(
            migration_sessions::table.filter(migration_sessions::id.eq(session_id.as_str())),
        )
        .set((
            migration_sessions::status.eq(status.as_str()),
            migration_sessions::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

        Ok(affected)
    }
}
