use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::page_embeddings;

#[derive(Insertable)]
#[diesel(table_name = page_embeddings)]
pub struct NewPageEmbedding<'a> {
    pub session_id: &'a str,
    pub site_type: &'a str,
    pub url: &'a str,
    pub embedding: Vec<u8>,
    pub extracted_text: &'a str,
    pub title: &'a str,
    pub created_at: NaiveDateTime,
}
