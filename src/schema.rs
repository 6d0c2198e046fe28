// Diesel table definitions mirroring `SCHEMA_SQL`.

diesel::table! {
    migration_sessions (id) {
        id -> Text,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    page_embeddings (id) {
        id -> Integer,
        session_id -> Text,
        site_type -> Text,
        url -> Text,
        embedding -> Binary,
        extracted_text -> Text,
        title -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    url_mappings (id) {
        id -> Integer,
        session_id -> Text,
        old_url -> Nullable<Text>,
        new_url -> Nullable<Text>,
        confidence_score -> Float,
        match_type -> Text,
        needs_review -> Bool,
        warnings -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(page_embeddings -> migration_sessions (session_id));
diesel::joinable!(url_mappings -> migration_sessions (session_id));

diesel::allow_tables_to_appear_in_same_query!(migration_sessions, page_embeddings, url_mappings);

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS migration_sessions (
    id TEXT PRIMARY KEY NOT NULL,
    status TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS page_embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    session_id TEXT NOT NULL REFERENCES migration_sessions (id) ON DELETE CASCADE,
    site_type TEXT NOT NULL,
    url TEXT NOT NULL,
    embedding BLOB NOT NULL,
    extracted_text TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    UNIQUE (session_id, site_type, url)
);

CREATE INDEX IF NOT EXISTS idx_page_embeddings_session
    ON page_embeddings (session_id, site_type);

CREATE TABLE IF NOT EXISTS url_mappings (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    session_id TEXT NOT NULL REFERENCES migration_sessions (id) ON DELETE CASCADE,
    old_url TEXT,
    new_url TEXT,
    confidence_score REAL NOT NULL,
    match_type TEXT NOT NULL,
    needs_review BOOLEAN NOT NULL,
    warnings TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_url_mappings_session
    ON url_mappings (session_id);
";
