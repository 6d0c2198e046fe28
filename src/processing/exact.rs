use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use crate::domain::mapping::{MatchType, Mapping};
use crate::domain::page::Page;
use crate::processing::filter::path_key;

/// Pages left unmatched by a reducer, plus the mappings it produced.
#[derive(Debug, Default)]
pub struct ExactMatchOutcome {
    pub old: Vec<Page>,
    pub new: Vec<Page>,
    pub mappings: Vec<Mapping>,
}

/// Pairs pages whose content fingerprints are equal.
///
/// Pages without any extracted text are left alone, they would otherwise
/// all collide on the fingerprint of the empty string.
pub fn reduce_exact_content(old: Vec<Page>, new: Vec<Page>) -> ExactMatchOutcome {
    reduce_by_key(old, new, MatchType::ExactContent, |page| {
        (!page.extracted_text().is_empty()).then(|| page.content_fingerprint())
    })
}

/// Pairs pages that kept the same path and query across the migration.
pub fn reduce_exact_paths(old: Vec<Page>, new: Vec<Page>) -> ExactMatchOutcome {
    reduce_by_key(old, new, MatchType::ExactUrl, |page| {
        Some(path_key(page.url()))
    })
}

/// Single-pass hash join between the two sides.
///
/// The new side is indexed by key, keeping original order per key. Each old
/// page, in order, takes the first still unmatched new page with the same
/// key, so ties resolve first-in-order and the losers stay unmatched.
fn reduce_by_key<K, F>(
    old: Vec<Page>,
    new: Vec<Page>,
    match_type: MatchType,
    key: F,
) -> ExactMatchOutcome
where
    K: Hash + Eq,
    F: Fn(&Page) -> Option<K>,
{
    let mut index: HashMap<K, VecDeque<usize>> = HashMap::new();
    for (position, page) in new.iter().enumerate() {
        if let Some(key) = key(page) {
            index.entry(key).or_default().push_back(position);
        }
    }

    let mut new_matched = vec![false; new.len()];
    let mut mappings = Vec::new();
    let mut remaining_old = Vec::with_capacity(old.len());

    for page in old {
        let candidate = key(&page)
            .and_then(|key| index.get_mut(&key))
            .and_then(VecDeque::pop_front);
        match candidate {
            Some(position) => {
                new_matched[position] = true;
                mappings.push(Mapping::exact(page.url(), new[position].url(), match_type));
            }
            None => remaining_old.push(page),
        }
    }

    let remaining_new = new
        .into_iter()
        .zip(new_matched)
        .filter_map(|(page, matched)| (!matched).then_some(page))
        .collect();

    ExactMatchOutcome {
        old: remaining_old,
        new: remaining_new,
        mappings,
    }
}
