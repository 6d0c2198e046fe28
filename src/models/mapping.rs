use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::domain::mapping::{Mapping, StoredMapping, WarningKind};
use crate::domain::session::SessionId;
use crate::schema::url_mappings;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = url_mappings)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UrlMapping {
    pub id: i32,
    pub session_id: String,
    pub old_url: Option<String>,
    pub new_url: Option<String>,
    pub confidence_score: f32,
    pub match_type: String,
    pub needs_review: bool,
    pub warnings: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = url_mappings)]
pub struct NewUrlMapping<'a> {
    pub session_id: &'a str,
    pub old_url: Option<&'a str>,
    pub new_url: Option<&'a str>,
    pub confidence_score: f32,
    pub match_type: &'a str,
    pub needs_review: bool,
    pub warnings: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl<'a> NewUrlMapping<'a> {
    pub fn new(session_id: &'a SessionId, mapping: &'a Mapping, now: NaiveDateTime) -> Self {
        Self {
            session_id: session_id.as_str(),
            old_url: mapping.source_url.as_deref(),
            new_url: mapping.target_url.as_deref(),
            confidence_score: mapping.confidence,
            match_type: mapping.match_type.as_str(),
            needs_review: mapping.needs_review,
            warnings: mapping.warning_labels().join(","),
            created_at: now,
            updated_at: now,
        }
    }
}

impl TryFrom<UrlMapping> for StoredMapping {
    type Error = String;

    fn try_from(row: UrlMapping) -> Result<Self, Self::Error> {
        let warnings = row
            .warnings
            .split(',')
            .filter(|label| !label.is_empty())
            .map(str::parse::<WarningKind>)
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(Self {
            id: row.id,
            session_id: SessionId::from(row.session_id),
            mapping: Mapping {
                source_url: row.old_url,
                target_url: row.new_url,
                confidence: row.confidence_score,
                match_type: row.match_type.parse()?,
                needs_review: row.needs_review,
                warnings,
            },
            updated_at: row.updated_at,
        })
    }
}
