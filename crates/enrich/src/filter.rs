//! Quality filtering for Coverage and Exclusion candidates.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use domain::EntityType;

use crate::candidate::EntityCandidate;

/// Minimum confidence for coverage/exclusion acceptance.
pub const MIN_CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Minimum length for a coverage/exclusion name after stripping a leading
/// article.
pub const MIN_NAME_LENGTH: usize = 5;

static GENERIC_TERMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the policy",
        "policy",
        "this policy",
        "the insured",
        "insured",
        "coverage",
        "exclusion",
        "endorsement",
        "schedule",
        "declarations",
        "form",
        "section",
        "paragraph",
        "item",
        "part",
        "provision",
    ]
    .into_iter()
    .collect()
});

static SECTION_REFERENCE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^SECTION\s+[IVX\d]+",
        r"(?i)^PART\s+[A-Z\d]+",
        r"(?i)^PARAGRAPH\s+[A-Z\d\.]+",
        r"^\d+\.\s+[A-Z]",
        r"^[A-Z]\.\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("section reference pattern"))
    .collect()
});

static LEADING_ARTICLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(the|a|an)\s+").expect("article pattern"));

/// Per-document filter statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub total_filtered: usize,
    pub low_confidence: usize,
    pub generic_names: usize,
    pub section_references: usize,
    pub short_names: usize,
}

/// Drop low-quality Coverage/Exclusion candidates. Other entity types pass
/// through untouched.
pub fn filter_low_quality(candidates: Vec<EntityCandidate>) -> (Vec<EntityCandidate>, FilterStats) {
    let mut stats = FilterStats::default();
    let mut kept = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        if !matches!(
            candidate.entity_type,
            EntityType::Coverage | EntityType::Exclusion
        ) {
            kept.push(candidate);
            continue;
        }

        let Some(name) = candidate.display_name() else {
            kept.push(candidate);
            continue;
        };

        if candidate.confidence < MIN_CONFIDENCE_THRESHOLD {
            stats.low_confidence += 1;
            stats.total_filtered += 1;
            debug!(name, confidence = candidate.confidence, "filtered low-confidence entity");
            continue;
        }

        let name_lower = name.to_lowercase();
        let name_trimmed = name_lower.trim();
        if GENERIC_TERMS.contains(name_trimmed) {
            stats.generic_names += 1;
            stats.total_filtered += 1;
            debug!(name, "filtered generic entity name");
            continue;
        }

        if SECTION_REFERENCE_PATTERNS.iter().any(|p| p.is_match(&name)) {
            stats.section_references += 1;
            stats.total_filtered += 1;
            debug!(name, "filtered section reference");
            continue;
        }

        let clean_name = LEADING_ARTICLE.replace(name_trimmed, "");
        if clean_name.trim().len() < MIN_NAME_LENGTH {
            stats.short_names += 1;
            stats.total_filtered += 1;
            debug!(name, "filtered short entity name");
            continue;
        }

        kept.push(candidate);
    }

    (kept, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(name: &str, confidence: f64) -> EntityCandidate {
        let mut c = EntityCandidate::new(EntityType::Coverage, name);
        c.confidence = confidence;
        c
    }

    #[test]
    fn keeps_specific_high_confidence_coverage() {
        let (kept, stats) = filter_low_quality(vec![coverage("General Liability", 0.95)]);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.total_filtered, 0);
    }

    #[test]
    fn drops_generic_coverage_name() {
        let (kept, stats) = filter_low_quality(vec![
            coverage("General Liability", 0.95),
            coverage("Coverage", 0.95),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.generic_names, 1);
        assert_eq!(stats.total_filtered, 1);
    }

    #[test]
    fn drops_low_confidence() {
        let (kept, stats) = filter_low_quality(vec![coverage("Equipment Breakdown", 0.5)]);
        assert!(kept.is_empty());
        assert_eq!(stats.low_confidence, 1);
    }

    #[test]
    fn drops_section_references() {
        for name in ["SECTION IV", "PART A", "PARAGRAPH B.2", "1. A sub item", "A.1"] {
            let (kept, stats) = filter_low_quality(vec![coverage(name, 0.95)]);
            assert!(kept.is_empty(), "{name} should be filtered");
            assert_eq!(stats.section_references, 1, "{name}");
        }
    }

    #[test]
    fn drops_short_names_after_article_strip() {
        let (kept, stats) = filter_low_quality(vec![coverage("the fire", 0.95)]);
        assert!(kept.is_empty());
        assert_eq!(stats.short_names, 1);
    }

    #[test]
    fn other_types_bypass_filtering() {
        let mut policy = EntityCandidate::new(EntityType::Policy, "PO");
        policy.confidence = 0.1;
        let (kept, stats) = filter_low_quality(vec![policy]);
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.total_filtered, 0);
    }
}
