use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::embedding::Candidate;
use crate::domain::mapping::{Mapping, WarningKind};
use crate::domain::page::{Page, SiteSide};
use crate::domain::session::SessionId;
use crate::models::config::MatchingConfig;
use crate::processing::embedding::VectorIndex;
use crate::repository::EmbeddingReader;

/// Pairs every remaining old page with its most similar unclaimed new page.
///
/// Old pages are visited in order and each new page is claimed at most once.
/// Old pages without an eligible candidate come back as orphans and new
/// pages nobody claimed come back as new-only mappings, so every page of
/// both inputs appears in exactly one mapping.
///
/// The stored vectors of each side are loaded once and the new side is
/// indexed once for the whole pass.
pub fn match_pages<R>(
    repo: &R,
    session_id: &SessionId,
    old: &[Page],
    new: &[Page],
    config: &MatchingConfig,
) -> Vec<Mapping>
where
    R: EmbeddingReader + ?Sized,
{
    let old_vectors = load_old_vectors(repo, session_id);
    let index = build_new_index(repo, session_id);
    log::debug!(
        "session={session_id} old_vectors={} indexed_new={}",
        old_vectors.len(),
        index.len()
    );

    let targets: HashSet<&str> = new.iter().map(Page::url).collect();
    let mut claimed: HashSet<String> = HashSet::new();
    let mut mappings = Vec::with_capacity(old.len() + new.len());

    for page in old {
        let candidates = candidates_for(&index, &old_vectors, page, config);
        let mut warnings = BTreeSet::new();
        let mut eligible: Vec<&Candidate> = Vec::with_capacity(2);

        for candidate in &candidates {
            if !targets.contains(candidate.url.as_str()) {
                warnings.insert(WarningKind::InvalidTarget);
                continue;
            }
            if claimed.contains(&candidate.url) {
                warnings.insert(WarningKind::DuplicateTarget);
                continue;
            }
            eligible.push(candidate);
            if eligible.len() == 2 {
                break;
            }
        }

        match eligible.first() {
            Some(best) => {
                if let Some(next) = eligible.get(1)
                    && best.similarity - next.similarity < config.near_tie_margin
                {
                    warnings.insert(WarningKind::NearTie);
                }
                claimed.insert(best.url.clone());
                mappings.push(Mapping::semantic(
                    page.url(),
                    &best.url,
                    best.similarity,
                    warnings,
                ));
            }
            None => mappings.push(Mapping::orphaned(page.url(), warnings)),
        }
    }

    mappings.extend(
        new.iter()
            .filter(|page| !claimed.contains(page.url()))
            .map(|page| Mapping::new_only(page.url())),
    );

    mappings
}

fn load_old_vectors<R>(repo: &R, session_id: &SessionId) -> HashMap<String, Vec<f32>>
where
    R: EmbeddingReader + ?Sized,
{
    match repo.load_side(session_id, SiteSide::Old) {
        Ok(rows) => rows.into_iter().collect(),
        Err(err) => {
            log::error!("Failed to load old vectors of session {session_id}: {err}");
            HashMap::new()
        }
    }
}

fn build_new_index<R>(repo: &R, session_id: &SessionId) -> VectorIndex
where
    R: EmbeddingReader + ?Sized,
{
    let rows = match repo.load_side(session_id, SiteSide::New) {
        Ok(rows) => rows,
        Err(err) => {
            log::error!("Failed to load new vectors of session {session_id}: {err}");
            return VectorIndex::default();
        }
    };

    VectorIndex::build(rows).unwrap_or_else(|err| {
        log::error!("Failed to index new vectors of session {session_id}: {err}");
        VectorIndex::default()
    })
}

fn candidates_for(
    index: &VectorIndex,
    old_vectors: &HashMap<String, Vec<f32>>,
    page: &Page,
    config: &MatchingConfig,
) -> Vec<Candidate> {
    let Some(vector) = old_vectors.get(page.url()) else {
        log::warn!("No stored vector for {}", page.url());
        return Vec::new();
    };

    match index.search(vector, config.candidate_count, config.min_score) {
        Ok(candidates) => candidates,
        Err(err) => {
            log::error!("Similarity search failed for {}: {err}", page.url());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::mapping::MatchType;
    use crate::repository::errors::RepositoryResult;

    /// Vectors held in memory; counts how often each side is loaded.
    #[derive(Default)]
    struct FakeStore {
        old: Vec<(String, Vec<f32>)>,
        new: Vec<(String, Vec<f32>)>,
        loads: Mutex<HashMap<SiteSide, usize>>,
    }

    impl FakeStore {
        fn old(mut self, url: &str, vector: &[f32]) -> Self {
            self.old.push((url.to_string(), vector.to_vec()));
            self
        }

        fn new(mut self, url: &str, vector: &[f32]) -> Self {
            self.new.push((url.to_string(), vector.to_vec()));
            self
        }

        fn loads(&self, side: SiteSide) -> usize {
            self.loads.lock().unwrap().get(&side).copied().unwrap_or(0)
        }
    }

    impl EmbeddingReader for FakeStore {
        fn get_embedding(
            &self,
            _session_id: &SessionId,
            _side: SiteSide,
            url: &str,
        ) -> RepositoryResult<Option<Vec<f32>>> {
            Ok(self
                .old
                .iter()
                .find(|(stored, _)| stored == url)
                .map(|(_, vector)| vector.clone()))
        }

        fn load_side(
            &self,
            _session_id: &SessionId,
            side: SiteSide,
        ) -> RepositoryResult<Vec<(String, Vec<f32>)>> {
            *self.loads.lock().unwrap().entry(side).or_default() += 1;
            Ok(match side {
                SiteSide::Old => self.old.clone(),
                SiteSide::New => self.new.clone(),
            })
        }
    }

    fn pages(side: SiteSide, urls: &[&str]) -> Vec<Page> {
        urls.iter()
            .map(|url| Page::new(side, *url, "<body>content</body>"))
            .collect()
    }

    fn run(store: &FakeStore, old: &[&str], new: &[&str]) -> Vec<Mapping> {
        match_pages(
            store,
            &SessionId::from("s"),
            &pages(SiteSide::Old, old),
            &pages(SiteSide::New, new),
            &MatchingConfig::default(),
        )
    }

    fn find<'a>(mappings: &'a [Mapping], source: &str) -> &'a Mapping {
        mappings
            .iter()
            .find(|m| m.source_url.as_deref() == Some(source))
            .expect("mapping for source")
    }

    #[test]
    fn best_candidate_wins_and_review_follows_band() {
        let store = FakeStore::default()
            .old("o/a", &[1.0, 0.0, 0.0])
            .old("o/b", &[0.0, 1.0, 1.0])
            .new("n/a", &[1.0, 0.05, 0.0])
            .new("n/b", &[0.0, 1.0, 0.0]);

        let mappings = run(&store, &["o/a", "o/b"], &["n/a", "n/b"]);

        assert_eq!(mappings.len(), 2);
        let a = find(&mappings, "o/a");
        assert_eq!(a.target_url.as_deref(), Some("n/a"));
        assert_eq!(a.match_type, MatchType::Semantic);
        assert!(!a.needs_review);
        let b = find(&mappings, "o/b");
        assert_eq!(b.target_url.as_deref(), Some("n/b"));
        assert!(b.needs_review);
        assert!(b.warnings.is_empty());
    }

    #[test]
    fn claimed_target_falls_back_to_next_candidate() {
        let store = FakeStore::default()
            .old("o/1", &[1.0, 0.0])
            .old("o/2", &[1.0, 0.1])
            .new("n/1", &[1.0, 0.0])
            .new("n/2", &[1.0, 0.6]);

        let mappings = run(&store, &["o/1", "o/2"], &["n/1", "n/2"]);

        let second = find(&mappings, "o/2");
        assert_eq!(second.target_url.as_deref(), Some("n/2"));
        assert!(second.warnings.contains(&WarningKind::DuplicateTarget));

        let targets: Vec<_> = mappings.iter().filter_map(|m| m.target_url.clone()).collect();
        let unique: HashSet<_> = targets.iter().collect();
        assert_eq!(targets.len(), unique.len());
    }

    #[test]
    fn exhausted_candidates_leave_an_orphan_and_a_new_only_page() {
        let store = FakeStore::default()
            .old("o/1", &[1.0, 0.0])
            .old("o/2", &[1.0, 0.0])
            .new("n/1", &[1.0, 0.0])
            .new("n/far", &[0.0, 1.0]);

        let mappings = run(&store, &["o/1", "o/2"], &["n/1", "n/far"]);

        let orphan = find(&mappings, "o/2");
        assert!(orphan.is_orphaned());
        assert!(orphan.needs_review);
        assert!(orphan.warnings.contains(&WarningKind::DuplicateTarget));
        assert!(
            mappings
                .iter()
                .any(|m| m.is_new_only() && m.target_url.as_deref() == Some("n/far"))
        );
        assert_eq!(mappings.len(), 3);
    }

    #[test]
    fn stale_store_rows_are_invalid_targets() {
        let store = FakeStore::default()
            .old("o/1", &[1.0, 0.0])
            .new("n/gone", &[1.0, 0.0])
            .new("n/1", &[1.0, 0.2]);

        let mappings = run(&store, &["o/1"], &["n/1"]);

        let mapping = find(&mappings, "o/1");
        assert_eq!(mapping.target_url.as_deref(), Some("n/1"));
        assert!(mapping.warnings.contains(&WarningKind::InvalidTarget));
    }

    #[test]
    fn close_runner_up_is_a_near_tie() {
        let store = FakeStore::default()
            .old("o/1", &[1.0, 0.0])
            .new("n/1", &[1.0, 0.0])
            .new("n/2", &[1.0, 0.1]);

        let mappings = run(&store, &["o/1"], &["n/1", "n/2"]);

        let mapping = find(&mappings, "o/1");
        assert_eq!(mapping.target_url.as_deref(), Some("n/1"));
        assert!(mapping.warnings.contains(&WarningKind::NearTie));
        assert!(!mapping.needs_review);
    }

    #[test]
    fn missing_vector_is_an_orphan() {
        let store = FakeStore::default().new("n/1", &[1.0, 0.0]);

        let mappings = run(&store, &["o/unknown"], &["n/1"]);

        assert!(find(&mappings, "o/unknown").is_orphaned());
        assert!(mappings[1].is_new_only());
    }

    #[test]
    fn each_side_is_loaded_once_per_pass() {
        let mut store = FakeStore::default();
        let mut old = Vec::new();
        let mut new = Vec::new();
        for i in 0..20 {
            let mut vector = vec![0.0; 20];
            vector[i] = 1.0;
            let (o, n) = (format!("o/{i}"), format!("n/{i}"));
            store = store.old(&o, &vector).new(&n, &vector);
            old.push(o);
            new.push(n);
        }
        let old: Vec<&str> = old.iter().map(String::as_str).collect();
        let new: Vec<&str> = new.iter().map(String::as_str).collect();

        let mappings = run(&store, &old, &new);

        assert_eq!(store.loads(SiteSide::Old), 1);
        assert_eq!(store.loads(SiteSide::New), 1);
        assert_eq!(mappings.len(), 20);
        for i in 0..20 {
            let mapping = find(&mappings, &format!("o/{i}"));
            assert_eq!(mapping.target_url, Some(format!("n/{i}")));
        }
    }
}
