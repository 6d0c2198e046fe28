use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::domain::session::{MigrationSession as DomainSession, SessionId};
use crate::schema::migration_sessions;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = migration_sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MigrationSession {
    pub id: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = migration_sessions)]
pub struct NewMigrationSession<'a> {
    pub id: &'a str,
    pub status: &'a str,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<MigrationSession> for DomainSession {
    type Error = String;

    fn try_from(row: MigrationSession) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            id: SessionId::from(row.id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
