use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;
use crate::{REVIEW_THRESHOLD, SIMILARITY_THRESHOLD};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactUrl,
    ExactContent,
    Semantic,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::ExactUrl => "exact_url",
            MatchType::ExactContent => "exact_content",
            MatchType::Semantic => "semantic",
        }
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "exact_url" => Ok(MatchType::ExactUrl),
            "exact_content" => Ok(MatchType::ExactContent),
            "semantic" => Ok(MatchType::Semantic),
            other => Err(format!("unknown match type: {other}")),
        }
    }
}

/// Annotation attached to a mapping that a reviewer should look at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    NearTie,
    DuplicateTarget,
    InvalidTarget,
    LowConfidence,
}

impl WarningKind {
    pub fn label(&self) -> &'static str {
        match self {
            WarningKind::NearTie => "near-tie",
            WarningKind::DuplicateTarget => "duplicate-target",
            WarningKind::InvalidTarget => "invalid-target",
            WarningKind::LowConfidence => "low-confidence",
        }
    }
}

impl FromStr for WarningKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "near-tie" => Ok(WarningKind::NearTie),
            "duplicate-target" => Ok(WarningKind::DuplicateTarget),
            "invalid-target" => Ok(WarningKind::InvalidTarget),
            "low-confidence" => Ok(WarningKind::LowConfidence),
            other => Err(format!("unknown warning: {other}")),
        }
    }
}

/// Similarity band driving auto-approval versus manual review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_score(score: f32) -> Self {
        if score >= SIMILARITY_THRESHOLD {
            ConfidenceBand::High
        } else if score >= REVIEW_THRESHOLD {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    pub fn needs_review(&self) -> bool {
        !matches!(self, ConfidenceBand::High)
    }
}

/// A redirect rule from an old URL to a new URL.
///
/// `target_url == None` marks an orphaned old page and `source_url == None` a
/// page that only exists on the new site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub source_url: Option<String>,
    pub target_url: Option<String>,
    pub confidence: f32,
    pub match_type: MatchType,
    pub needs_review: bool,
    pub warnings: BTreeSet<WarningKind>,
}

impl Mapping {
    /// Pair found by an exact reducer; confidence is always 1.0.
    pub fn exact(source_url: &str, target_url: &str, match_type: MatchType) -> Self {
        Self {
            source_url: Some(source_url.to_string()),
            target_url: Some(target_url.to_string()),
            confidence: 1.0,
            match_type,
            needs_review: false,
            warnings: BTreeSet::new(),
        }
    }

    /// Pair found by similarity search. Review status follows the score band.
    pub fn semantic(
        source_url: &str,
        target_url: &str,
        score: f32,
        mut warnings: BTreeSet<WarningKind>,
    ) -> Self {
        let confidence = score.clamp(0.0, 1.0);
        let band = ConfidenceBand::from_score(confidence);
        if band == ConfidenceBand::Low {
            warnings.insert(WarningKind::LowConfidence);
        }
        Self {
            source_url: Some(source_url.to_string()),
            target_url: Some(target_url.to_string()),
            confidence,
            match_type: MatchType::Semantic,
            needs_review: band.needs_review(),
            warnings,
        }
    }

    pub fn orphaned(source_url: &str, warnings: BTreeSet<WarningKind>) -> Self {
        Self {
            source_url: Some(source_url.to_string()),
            target_url: None,
            confidence: 0.0,
            match_type: MatchType::Semantic,
            needs_review: true,
            warnings,
        }
    }

    pub fn new_only(target_url: &str) -> Self {
        Self {
            source_url: None,
            target_url: Some(target_url.to_string()),
            confidence: 0.0,
            match_type: MatchType::Semantic,
            needs_review: true,
            warnings: BTreeSet::new(),
        }
    }

    /// Whether both ends are present.
    pub fn is_pair(&self) -> bool {
        self.source_url.is_some() && self.target_url.is_some()
    }

    pub fn is_orphaned(&self) -> bool {
        self.source_url.is_some() && self.target_url.is_none()
    }

    pub fn is_new_only(&self) -> bool {
        self.source_url.is_none() && self.target_url.is_some()
    }

    pub fn band(&self) -> ConfidenceBand {
        ConfidenceBand::from_score(self.confidence)
    }

    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }

    pub fn warning_labels(&self) -> Vec<&'static str> {
        self.warnings.iter().map(WarningKind::label).collect()
    }
}

/// A mapping as persisted for a session, with its row id for review.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredMapping {
    pub id: i32,
    pub session_id: SessionId,
    pub mapping: Mapping,
    pub updated_at: chrono::NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(ConfidenceBand::from_score(0.95), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_score(0.8), ConfidenceBand::High);
        assert_eq!(ConfidenceBand::from_score(0.79), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_score(0.6), ConfidenceBand::Medium);
        assert_eq!(ConfidenceBand::from_score(0.59), ConfidenceBand::Low);
    }

    #[test]
    fn semantic_review_depends_only_on_score() {
        for step in 0..=100 {
            let score = step as f32 / 100.0;
            let mapping = Mapping::semantic("a", "b", score, BTreeSet::new());
            if score >= 0.8 {
                assert!(!mapping.needs_review, "score {score}");
                assert!(mapping.warnings.is_empty());
            } else if score >= 0.6 {
                assert!(mapping.needs_review, "score {score}");
                assert!(mapping.warnings.is_empty());
            } else {
                assert!(mapping.needs_review, "score {score}");
                assert!(mapping.warnings.contains(&WarningKind::LowConfidence));
            }
        }
    }

    #[test]
    fn high_confidence_keeps_annotations_without_review() {
        let warnings = BTreeSet::from([WarningKind::NearTie]);
        let mapping = Mapping::semantic("a", "b", 0.91, warnings);

        assert!(!mapping.needs_review);
        assert_eq!(mapping.warning_labels(), vec!["near-tie"]);
        assert_eq!(mapping.confidence_percent(), 91);
    }

    #[test]
    fn labels_round_trip_through_from_str() {
        for kind in [
            WarningKind::NearTie,
            WarningKind::DuplicateTarget,
            WarningKind::InvalidTarget,
            WarningKind::LowConfidence,
        ] {
            assert_eq!(kind.label().parse::<WarningKind>(), Ok(kind));
        }
        assert_eq!("exact_content".parse::<MatchType>(), Ok(MatchType::ExactContent));
        assert!("manual".parse::<MatchType>().is_err());
    }
}
