//! Stage orchestration: filter, fetch, exact reducers, embedding, matching.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crawlers::{FetchFailure, PageFetcher, fetch_sites};
use crate::domain::mapping::{Mapping, MatchType};
use crate::domain::page::{Page, SiteSide};
use crate::domain::session::{SessionId, SessionStatus};
use crate::embedder::Embedder;
use crate::models::config::{ConfigError, PipelineConfig};
use crate::processing::embedding::{EmbeddingFailure, embed_pages};
use crate::processing::exact::{ExactMatchOutcome, reduce_exact_content, reduce_exact_paths};
use crate::processing::filter::UrlFilter;
use crate::processing::matching::match_pages;
use crate::repository::errors::RepositoryError;
use crate::repository::{EmbeddingReader, EmbeddingWriter, MappingWriter, SessionWriter};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One migration to map: both URL inventories plus optional crawl statuses.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MigrationRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub old_urls: Vec<String>,
    pub new_urls: Vec<String>,
    /// Status codes observed when the inventories were crawled.
    #[serde(default)]
    pub status_codes: HashMap<String, u16>,
}

/// Per-stage counters reported alongside the mappings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    pub old_rejected: usize,
    pub new_rejected: usize,
    pub fetch_failures: usize,
    pub exact_url_matches: usize,
    pub exact_content_matches: usize,
    pub embedding_failures: usize,
    pub semantic_matches: usize,
    pub orphaned: usize,
    pub new_only: usize,
}

#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub session_id: SessionId,
    pub mappings: Vec<Mapping>,
    pub diagnostics: Diagnostics,
    /// URLs that could not be retrieved; they have no mapping.
    pub fetch_failures: Vec<FetchFailure>,
    /// Pages that could not be embedded; they are reported as orphan or
    /// new-only mappings.
    pub embedding_failures: Vec<EmbeddingFailure>,
}

impl PipelineReport {
    /// Mappings that pair an old page with a new one.
    pub fn matched(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter().filter(|mapping| mapping.is_pair())
    }
}

/// Working sets and results handed from one stage to the next.
struct PipelineState {
    old: Vec<Page>,
    new: Vec<Page>,
    mappings: Vec<Mapping>,
    diagnostics: Diagnostics,
    fetch_failures: Vec<FetchFailure>,
    embedding_failures: Vec<EmbeddingFailure>,
}

impl PipelineState {
    fn absorb(&mut self, outcome: ExactMatchOutcome) -> usize {
        self.old = outcome.old;
        self.new = outcome.new;
        let found = outcome.mappings.len();
        self.mappings.extend(outcome.mappings);
        found
    }
}

pub struct Pipeline<F, E, R> {
    config: PipelineConfig,
    filter: UrlFilter,
    fetcher: F,
    embedder: E,
    repo: R,
}

impl<F, E, R> Pipeline<F, E, R>
where
    F: PageFetcher,
    E: Embedder,
    R: SessionWriter + EmbeddingReader + EmbeddingWriter + MappingWriter + Sync,
{
    /// Validates `config` and compiles the URL filter. Every fatal
    /// configuration problem is reported here, before any stage runs.
    pub fn new(config: PipelineConfig, fetcher: F, embedder: E, repo: R) -> Result<Self, ConfigError> {
        config.validate()?;
        let filter = UrlFilter::new(&config.filter)?;
        Ok(Self {
            config,
            filter,
            fetcher,
            embedder,
            repo,
        })
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Runs every stage for `request` and persists the resulting mappings.
    ///
    /// A fresh session is created when the request carries none. The session
    /// ends up `completed`, or `failed` when a stage returns an error.
    pub async fn run(&self, request: MigrationRequest) -> Result<PipelineReport, PipelineError> {
        let session_id = request.session_id.clone().unwrap_or_else(SessionId::generate);
        self.repo.create_session(&session_id)?;
        self.repo
            .set_session_status(&session_id, SessionStatus::Processing)?;

        match self.execute(&session_id, request).await {
            Ok(report) => {
                self.repo
                    .set_session_status(&session_id, SessionStatus::Completed)?;
                Ok(report)
            }
            Err(err) => {
                if let Err(status_err) = self
                    .repo
                    .set_session_status(&session_id, SessionStatus::Failed)
                {
                    log::error!("Failed to mark session {session_id} as failed: {status_err}");
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        session_id: &SessionId,
        request: MigrationRequest,
    ) -> Result<PipelineReport, PipelineError> {
        log::info!(
            "session={session_id} old_urls={} new_urls={}",
            request.old_urls.len(),
            request.new_urls.len()
        );

        let mut state = self.fetch(request).await;

        if self.config.match_exact_paths {
            let old = std::mem::take(&mut state.old);
            let new = std::mem::take(&mut state.new);
            state.diagnostics.exact_url_matches = state.absorb(reduce_exact_paths(old, new));
        }

        let old = std::mem::take(&mut state.old);
        let new = std::mem::take(&mut state.new);
        state.diagnostics.exact_content_matches = state.absorb(reduce_exact_content(old, new));
        log::info!(
            "session={session_id} exact_url={} exact_content={} remaining_old={} remaining_new={}",
            state.diagnostics.exact_url_matches,
            state.diagnostics.exact_content_matches,
            state.old.len(),
            state.new.len()
        );

        self.embed(session_id, &mut state).await;

        let matched = match_pages(
            &self.repo,
            session_id,
            &state.old,
            &state.new,
            &self.config.matching,
        );
        state.mappings.extend(matched);

        let diagnostics = &mut state.diagnostics;
        diagnostics.semantic_matches = state
            .mappings
            .iter()
            .filter(|m| m.is_pair() && m.match_type == MatchType::Semantic)
            .count();
        diagnostics.orphaned = state.mappings.iter().filter(|m| m.is_orphaned()).count();
        diagnostics.new_only = state.mappings.iter().filter(|m| m.is_new_only()).count();

        self.repo.create_mappings(session_id, &state.mappings)?;

        log::info!("session={session_id} completed: {:?}", state.diagnostics);

        Ok(PipelineReport {
            session_id: session_id.clone(),
            mappings: state.mappings,
            diagnostics: state.diagnostics,
            fetch_failures: state.fetch_failures,
            embedding_failures: state.embedding_failures,
        })
    }

    async fn fetch(&self, request: MigrationRequest) -> PipelineState {
        let old = self.filter.filter(&request.old_urls, &request.status_codes);
        let new = self.filter.filter(&request.new_urls, &request.status_codes);
        log::info!(
            "Filtered URLs: old_kept={} old_rejected={} new_kept={} new_rejected={}",
            old.kept.len(),
            old.rejected.len(),
            new.kept.len(),
            new.rejected.len()
        );

        let (old_pages, new_pages) = fetch_sites(&self.fetcher, &old.kept, &new.kept).await;
        let mut fetch_failures = old_pages.failures;
        fetch_failures.extend(new_pages.failures);
        log::info!(
            "Fetched pages: old={} new={} failures={}",
            old_pages.pages.len(),
            new_pages.pages.len(),
            fetch_failures.len()
        );

        PipelineState {
            old: old_pages.pages,
            new: new_pages.pages,
            mappings: Vec::new(),
            diagnostics: Diagnostics {
                old_rejected: old.rejected.len(),
                new_rejected: new.rejected.len(),
                fetch_failures: fetch_failures.len(),
                ..Diagnostics::default()
            },
            fetch_failures,
            embedding_failures: Vec::new(),
        }
    }

    /// Embeds both working sets. Pages that could not be embedded leave the
    /// working sets as orphan or new-only mappings.
    async fn embed(&self, session_id: &SessionId, state: &mut PipelineState) {
        let config = &self.config.embedding;
        let old_failed =
            embed_pages(&state.old, SiteSide::Old, session_id, &self.embedder, &self.repo, config)
                .await;
        let new_failed =
            embed_pages(&state.new, SiteSide::New, session_id, &self.embedder, &self.repo, config)
                .await;

        state.diagnostics.embedding_failures = old_failed.len() + new_failed.len();

        let old_urls: HashSet<String> = old_failed.iter().map(|f| f.url.clone()).collect();
        let new_urls: HashSet<String> = new_failed.iter().map(|f| f.url.clone()).collect();
        state.embedding_failures.extend(old_failed);
        state.embedding_failures.extend(new_failed);

        state.old.retain(|page| {
            let keep = !old_urls.contains(page.url());
            if !keep {
                state.mappings.push(Mapping::orphaned(page.url(), Default::default()));
            }
            keep
        });
        state.new.retain(|page| {
            let keep = !new_urls.contains(page.url());
            if !keep {
                state.mappings.push(Mapping::new_only(page.url()));
            }
            keep
        });
    }
}
