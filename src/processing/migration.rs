use crate::crawlers::PageFetcher;
use crate::embedder::Embedder;
use crate::processing::MappingReview;
use crate::processing::pipeline::{MigrationRequest, Pipeline};
use crate::repository::{EmbeddingReader, EmbeddingWriter, MappingWriter, SessionWriter};

/// Runs the whole pipeline for one migration request and logs the outcome.
pub async fn process_migration_message<F, E, R>(
    msg: MigrationRequest,
    pipeline: &Pipeline<F, E, R>,
) where
    F: PageFetcher,
    E: Embedder,
    R: SessionWriter + EmbeddingReader + EmbeddingWriter + MappingWriter + Sync,
{
    log::info!(
        "Received migration: session={:?} old_urls={} new_urls={}",
        msg.session_id,
        msg.old_urls.len(),
        msg.new_urls.len()
    );

    match pipeline.run(msg).await {
        Ok(report) => {
            let review = report
                .mappings
                .iter()
                .filter(|mapping| mapping.needs_review)
                .count();
            log::info!(
                "Finished migration {}: {} mappings, {} need review",
                report.session_id,
                report.mappings.len(),
                review
            );
        }
        Err(e) => log::error!("Migration failed: {e}"),
    }
}

/// Applies a reviewer decision to a stored mapping.
pub async fn process_review_message<R>(msg: MappingReview, repo: &R)
where
    R: MappingWriter,
{
    log::info!("Received review: {msg:?}");

    match repo.review_mapping(msg.mapping_id, msg.new_url.as_deref()) {
        Ok(_) => log::info!("Mapping {} reviewed", msg.mapping_id),
        Err(e) => log::error!("Error reviewing mapping {}: {e}", msg.mapping_id),
    }
}
