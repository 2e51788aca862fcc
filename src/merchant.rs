// 🏪 Merchant Matching - Learned merchant mappings + fuzzy lookup
//
// When a user renames a scanned merchant or fixes its category, the
// correction is stored as a mapping. Later scans of "SUPERMERCADO LIDER #12"
// or "Lider Expres" resolve to the same mapping through fuzzy matching.

use crate::db::Transaction;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum fuzzy score accepted as a match (0 = identical, 1 = unrelated)
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Similarity granted when one normalized name contains the other
const CONTAINMENT_SIMILARITY: f64 = 0.85;

/// Shortest name allowed to win through containment alone
const MIN_CONTAINMENT_LEN: usize = 4;

// ============================================================================
// MERCHANT MAPPING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantMapping {
    pub id: String,

    /// Merchant name as it was first scanned
    pub original_merchant: String,

    /// Lookup key (see `normalize_merchant_name`)
    pub normalized_merchant: String,

    /// Display name the user chose
    pub target_merchant: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_category: Option<String>,

    #[serde(default)]
    pub usage_count: i64,
}

impl MerchantMapping {
    pub fn new(original_merchant: &str, target_merchant: &str, target_category: Option<&str>) -> Self {
        MerchantMapping {
            id: uuid::Uuid::new_v4().to_string(),
            original_merchant: original_merchant.to_string(),
            normalized_merchant: normalize_merchant_name(original_merchant),
            target_merchant: target_merchant.to_string(),
            target_category: target_category.map(str::to_string),
            usage_count: 0,
        }
    }
}

/// Lowercase, drop punctuation and store codes, collapse whitespace
///
/// Example: "SUPERMERCADO  LIDER #123" → "supermercado lider"
pub fn normalize_merchant_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty() && !word.chars().all(|c| c.is_ascii_digit()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fuzzy distance between two normalized names (0 = identical, 1 = unrelated)
pub fn fuzzy_score(query: &str, candidate: &str) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 1.0;
    }
    if query == candidate {
        return 0.0;
    }

    let mut similarity = strsim::normalized_levenshtein(query, candidate);

    let (shorter, longer) = if query.chars().count() <= candidate.chars().count() {
        (query, candidate)
    } else {
        (candidate, query)
    };
    if shorter.chars().count() >= MIN_CONTAINMENT_LEN && longer.contains(shorter) {
        similarity = similarity.max(CONTAINMENT_SIMILARITY);
    }

    1.0 - similarity
}

// ============================================================================
// MATCHER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MerchantMatch<'a> {
    pub mapping: &'a MerchantMapping,

    /// Fuzzy distance of the winning mapping
    pub score: f64,

    /// `1 - score`
    pub confidence: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MerchantMatcher {
    mappings: Vec<MerchantMapping>,
}

impl MerchantMatcher {
    pub fn new(mappings: Vec<MerchantMapping>) -> Self {
        MerchantMatcher { mappings }
    }

    pub fn mappings(&self) -> &[MerchantMapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Best mapping whose score is within `threshold`
    ///
    /// Ties go to the mapping used most often.
    pub fn find_match(&self, merchant: &str, threshold: f64) -> Option<MerchantMatch<'_>> {
        let query = normalize_merchant_name(merchant);
        if query.is_empty() {
            return None;
        }

        let best = self
            .mappings
            .iter()
            .map(|mapping| (mapping, fuzzy_score(&query, &mapping.normalized_merchant)))
            .filter(|(_, score)| *score <= threshold)
            .min_by(|(a, score_a), (b, score_b)| {
                score_a
                    .total_cmp(score_b)
                    .then_with(|| b.usage_count.cmp(&a.usage_count))
            })?;

        debug!(merchant, target = %best.0.target_merchant, score = best.1, "merchant matched");

        Some(MerchantMatch {
            mapping: best.0,
            score: best.1,
            confidence: 1.0 - best.1,
        })
    }

    /// `find_match` with `DEFAULT_THRESHOLD`
    pub fn find_best(&self, merchant: &str) -> Option<MerchantMatch<'_>> {
        self.find_match(merchant, DEFAULT_THRESHOLD)
    }

    /// Apply the matching mapping to a transaction
    ///
    /// Sets the alias to the target merchant and, when the mapping has one,
    /// the category. Returns the id of the applied mapping.
    pub fn apply(&self, tx: &mut Transaction) -> Option<String> {
        let found = self.find_best(&tx.merchant)?;

        tx.alias = Some(found.mapping.target_merchant.clone());
        if let Some(category) = &found.mapping.target_category {
            tx.category = category.clone();
        }

        Some(found.mapping.id.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> MerchantMatcher {
        let mut lider = MerchantMapping::new("SUPERMERCADO LIDER", "Lider", Some("Supermarket"));
        lider.usage_count = 4;

        MerchantMatcher::new(vec![
            lider,
            MerchantMapping::new("STARBUCKS COFFEE", "Starbucks", Some("Cafe")),
            MerchantMapping::new("COPEC", "Copec", None),
        ])
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_merchant_name("SUPERMERCADO  LIDER #123"), "supermercado lider");
        assert_eq!(normalize_merchant_name("Starbucks*Coffee"), "starbucks coffee");
        assert_eq!(normalize_merchant_name("  "), "");
        assert_eq!(normalize_merchant_name("Jumbo Costanera-Center 04"), "jumbo costanera center");
    }

    #[test]
    fn test_fuzzy_score_bounds() {
        assert_eq!(fuzzy_score("lider", "lider"), 0.0);
        assert_eq!(fuzzy_score("", "lider"), 1.0);
        assert!(fuzzy_score("lider", "amazon") > DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_exact_after_normalization() {
        let matcher = matcher();
        let found = matcher.find_best("Supermercado Lider #45").unwrap();

        assert_eq!(found.mapping.target_merchant, "Lider");
        assert_eq!(found.score, 0.0);
        assert_eq!(found.confidence, 1.0);
    }

    #[test]
    fn test_typo_and_containment() {
        let matcher = matcher();

        assert_eq!(matcher.find_best("Supermercado Lidr").unwrap().mapping.target_merchant, "Lider");
        assert_eq!(matcher.find_best("Starbucks").unwrap().mapping.target_merchant, "Starbucks");
    }

    #[test]
    fn test_no_match_beyond_threshold() {
        let matcher = matcher();

        assert!(matcher.find_best("Farmacias Ahumada").is_none());
        assert!(matcher.find_best("###").is_none());
        assert!(matcher.find_match("Starbucks", 0.0).is_none());
    }

    #[test]
    fn test_short_names_do_not_match_by_containment() {
        let matcher = MerchantMatcher::new(vec![MerchantMapping::new("Copec Autopista Central", "Copec", None)]);
        assert!(matcher.find_best("Pec").is_none());
    }

    #[test]
    fn test_containment_length_counts_chars() {
        // "ñuñ" is 3 chars but 5 bytes
        assert!(fuzzy_score("ñuñ", "ñuñoa centro") > DEFAULT_THRESHOLD);
        assert!(fuzzy_score("ñuño", "ñuñoa centro") <= DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_apply_sets_alias_and_category() {
        let matcher = matcher();
        let mut tx = Transaction {
            id: Some("t1".to_string()),
            date: "2026-03-01".to_string(),
            merchant: "SUPERMERCADO LIDER 0912".to_string(),
            category: "Other".to_string(),
            total: 15990,
            ..Default::default()
        };

        let applied = matcher.apply(&mut tx);

        assert!(applied.is_some());
        assert_eq!(tx.display_name(), "Lider");
        assert_eq!(tx.category, "Supermarket");
        assert_eq!(tx.merchant, "SUPERMERCADO LIDER 0912", "scanned name stays untouched");
    }

    #[test]
    fn test_apply_without_category_keeps_category() {
        let matcher = matcher();
        let mut tx = Transaction {
            merchant: "COPEC".to_string(),
            category: "Fuel".to_string(),
            ..Default::default()
        };

        matcher.apply(&mut tx).unwrap();
        assert_eq!(tx.category, "Fuel");
        assert_eq!(tx.alias.as_deref(), Some("Copec"));
    }
}
