// 🐄 Canonical buckets - the fixed (sex, age bracket) model
//
// Every data release maps its own column names onto these buckets.
// Age brackets are ordered youngest → oldest by declaration order.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SEX
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub const ALL: [Sex; 2] = [Sex::Female, Sex::Male];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Female => "female",
            Sex::Male => "male",
        }
    }
}

// ============================================================================
// AGE BRACKET
// ============================================================================

/// Canonical age bracket. `Ord` follows the catalog order, not the label text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeBracket {
    #[serde(rename = "months_0_3")]
    Months0To3,
    #[serde(rename = "months_4_8")]
    Months4To8,
    #[serde(rename = "months_9_12")]
    Months9To12,
    #[serde(rename = "months_13_24")]
    Months13To24,
    #[serde(rename = "months_25_36")]
    Months25To36,
    #[serde(rename = "over_36_months")]
    Over36Months,
}

impl AgeBracket {
    /// Youngest → oldest
    pub const ORDERED: [AgeBracket; 6] = [
        AgeBracket::Months0To3,
        AgeBracket::Months4To8,
        AgeBracket::Months9To12,
        AgeBracket::Months13To24,
        AgeBracket::Months25To36,
        AgeBracket::Over36Months,
    ];

    /// Display label used by charts and tables
    pub fn label(&self) -> &'static str {
        match self {
            AgeBracket::Months0To3 => "0-3 months",
            AgeBracket::Months4To8 => "4-8 months",
            AgeBracket::Months9To12 => "9-12 months",
            AgeBracket::Months13To24 => "13-24 months",
            AgeBracket::Months25To36 => "25-36 months",
            AgeBracket::Over36Months => "> 36 months",
        }
    }

    /// Position in the canonical ordering (0 = youngest)
    pub fn rank(&self) -> usize {
        *self as usize
    }
}

// ============================================================================
// BUCKET
// ============================================================================

/// A canonical population category.
///
/// Field order matters: the derived `Ord` sorts by age bracket first and sex
/// second, which is the row order of the pyramid table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bucket {
    pub age: AgeBracket,
    pub sex: Sex,
}

impl Bucket {
    pub const COUNT: usize = AgeBracket::ORDERED.len() * Sex::ALL.len();

    pub fn new(sex: Sex, age: AgeBracket) -> Self {
        Bucket { age, sex }
    }

    /// All canonical buckets in canonical order
    pub fn all() -> impl Iterator<Item = Bucket> {
        AgeBracket::ORDERED
            .into_iter()
            .flat_map(|age| Sex::ALL.into_iter().map(move |sex| Bucket { age, sex }))
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sex.as_str(), self.age.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_order_is_not_lexical() {
        // "13-24 months" < "4-8 months" as text, but not as brackets
        assert!(AgeBracket::Months4To8 < AgeBracket::Months13To24);
        assert!(AgeBracket::Months13To24.label() < AgeBracket::Months4To8.label());
    }

    #[test]
    fn test_all_buckets_in_canonical_order() {
        let buckets: Vec<Bucket> = Bucket::all().collect();
        assert_eq!(buckets.len(), Bucket::COUNT);
        assert_eq!(buckets[0], Bucket::new(Sex::Female, AgeBracket::Months0To3));
        assert_eq!(buckets[1], Bucket::new(Sex::Male, AgeBracket::Months0To3));
        assert_eq!(buckets[11], Bucket::new(Sex::Male, AgeBracket::Over36Months));

        let mut sorted = buckets.clone();
        sorted.sort();
        assert_eq!(sorted, buckets);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Bucket::new(Sex::Male, AgeBracket::Over36Months)).unwrap();
        assert_eq!(json, r#"{"age":"over_36_months","sex":"male"}"#);
    }
}
