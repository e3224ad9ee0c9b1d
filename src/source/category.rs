//! Category keys and per-category fetch statistics

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// Subject type codes understood by the collection API
pub const SUBJECT_TYPE_CODES: [u8; 5] = [1, 2, 3, 4, 6];

/// Collection state codes understood by the collection API
pub const COLLECTION_TYPE_CODES: [u8; 5] = [1, 2, 3, 4, 5];

/// One independently paginated slice of a user's collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CategoryKey {
    pub subject_type: u8,
    pub collection_type: u8,
}

impl CategoryKey {
    pub fn new(subject_type: u8, collection_type: u8) -> Self {
        Self {
            subject_type,
            collection_type,
        }
    }

    /// Cartesian product of the given codes, subject type outermost
    pub fn enumerate(subject_types: &[u8], collection_types: &[u8]) -> Vec<Self> {
        subject_types
            .iter()
            .flat_map(|&st| collection_types.iter().map(move |&ct| Self::new(st, ct)))
            .collect()
    }

    pub fn subject_label(&self) -> Cow<'static, str> {
        subject_type_label(self.subject_type)
    }

    pub fn collection_label(&self) -> Cow<'static, str> {
        collection_type_label(self.collection_type)
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.subject_label(), self.collection_label())
    }
}

/// Human-readable name of a subject type code
pub fn subject_type_label(code: u8) -> Cow<'static, str> {
    match code {
        1 => Cow::Borrowed("书籍"),
        2 => Cow::Borrowed("动画"),
        3 => Cow::Borrowed("音乐"),
        4 => Cow::Borrowed("游戏"),
        6 => Cow::Borrowed("三次元"),
        other => Cow::Owned(format!("Type{}", other)),
    }
}

/// Human-readable name of a collection type code
pub fn collection_type_label(code: u8) -> Cow<'static, str> {
    match code {
        1 => Cow::Borrowed("想看"),
        2 => Cow::Borrowed("看过"),
        3 => Cow::Borrowed("在看"),
        4 => Cow::Borrowed("搁置"),
        5 => Cow::Borrowed("抛弃"),
        other => Cow::Owned(format!("Type{}", other)),
    }
}

/// Fetch statistics for one category
///
/// `expected_total` is set once by the total resolver; the remaining counters
/// are filled in by the fetcher and returned alongside the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub category: CategoryKey,
    pub expected_total: u64,
    pub fetched_items: u64,
    pub pages_fetched: u32,
    /// Pages given up on after their retry budget ran out
    pub pages_failed: u32,
    /// HTTP 429 cooldowns taken
    pub rate_limit_waits: u32,
    /// Failed pages in a row when the fetch ended
    pub consecutive_failures: u32,
    /// Fetch stopped early on the consecutive-failure threshold
    pub aborted: bool,
    /// The total check failed, so `expected_total` of 0 is not a real count
    pub total_unresolved: bool,
}

impl CategoryStats {
    pub fn new(category: CategoryKey, expected_total: u64) -> Self {
        Self {
            category,
            expected_total,
            fetched_items: 0,
            pages_fetched: 0,
            pages_failed: 0,
            rate_limit_waits: 0,
            consecutive_failures: 0,
            aborted: false,
            total_unresolved: false,
        }
    }

    /// Stats of a category whose total check failed
    pub fn unresolved(category: CategoryKey) -> Self {
        Self {
            total_unresolved: true,
            ..Self::new(category, 0)
        }
    }

    /// Fetched over expected, in percent (0 for empty categories)
    pub fn completion_percent(&self) -> f64 {
        if self.expected_total == 0 {
            return 0.0;
        }
        self.fetched_items as f64 / self.expected_total as f64 * 100.0
    }

    /// True when every expected item arrived and nothing was skipped
    pub fn is_complete(&self) -> bool {
        !self.total_unresolved
            && !self.aborted
            && self.pages_failed == 0
            && self.fetched_items >= self.expected_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_orders_subject_type_first() {
        let keys = CategoryKey::enumerate(&[1, 2], &[1, 2, 3]);
        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], CategoryKey::new(1, 1));
        assert_eq!(keys[2], CategoryKey::new(1, 3));
        assert_eq!(keys[3], CategoryKey::new(2, 1));
    }

    #[test]
    fn test_labels() {
        assert_eq!(CategoryKey::new(2, 2).to_string(), "动画 - 看过");
        assert_eq!(subject_type_label(9), "Type9");
        assert_eq!(collection_type_label(7), "Type7");
    }

    #[test]
    fn test_completion_percent() {
        let mut stats = CategoryStats::new(CategoryKey::new(1, 1), 200);
        assert_eq!(stats.completion_percent(), 0.0);
        assert!(!stats.is_complete());

        stats.fetched_items = 150;
        assert!((stats.completion_percent() - 75.0).abs() < f64::EPSILON);

        stats.fetched_items = 200;
        assert!(stats.is_complete());

        stats.aborted = true;
        assert!(!stats.is_complete());
    }

    #[test]
    fn test_empty_category_is_complete() {
        let stats = CategoryStats::new(CategoryKey::new(3, 5), 0);
        assert_eq!(stats.completion_percent(), 0.0);
        assert!(stats.is_complete());
    }

    #[test]
    fn test_unresolved_category_is_incomplete() {
        let stats = CategoryStats::unresolved(CategoryKey::new(2, 2));
        assert_eq!(stats.expected_total, 0);
        assert!(stats.total_unresolved);
        assert!(!stats.is_complete());
    }
}
