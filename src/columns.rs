//! Gradebook column discovery.
//!
//! Assessment columns are only known at runtime. A label qualifies for a
//! category when it names the category (case-insensitive) and carries a tier
//! token: one or two digits, an optional `.N` version and an optional letter
//! suffix, e.g. `1.0: Pre-Assessment`, `2.0A Milestone`, `Summative 3.0`.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::error::{Result, WelcomeError};
use crate::models::{AssessmentColumn, Category, ColumnIndex};

static TIER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})(?:\.\d+)?[A-Za-z]?\b").expect("valid tier regex"));

static PRE_ASSESSMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)pre[-\s]?assessment").expect("valid pre-assessment regex"));

static MILESTONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)milestone").expect("valid milestone regex"));

static SUMMATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)summative").expect("valid summative regex"));

/// Leading tier number of a label: `"3.0: Milestone"` is tier 3.
pub fn tier_of(label: &str) -> Option<u32> {
    TIER_TOKEN
        .captures(label)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Every category a label matches. Categories are tested independently, so a
/// label naming two of them lands in both groups.
pub fn categories_of(label: &str) -> Vec<Category> {
    if tier_of(label).is_none() {
        return Vec::new();
    }

    [
        (Category::PreAssessment, &*PRE_ASSESSMENT),
        (Category::Milestone, &*MILESTONE),
        (Category::Summative, &*SUMMATIVE),
    ]
    .into_iter()
    .filter(|(_, pattern)| pattern.is_match(label))
    .map(|(category, _)| category)
    .collect()
}

/// Groups gradebook columns by category without failing on an empty result.
pub fn index_columns<S: AsRef<str>>(columns: &[S]) -> ColumnIndex {
    let mut index = ColumnIndex::default();

    for (position, label) in columns.iter().enumerate() {
        let label = label.as_ref();
        let Some(tier) = tier_of(label) else {
            continue;
        };

        for category in categories_of(label) {
            let column = AssessmentColumn {
                name: label.to_string(),
                position,
                tier,
            };
            match category {
                Category::PreAssessment => index.pre.push(column),
                Category::Milestone => index.milestone.push(column),
                Category::Summative => index.summative.push(column),
            }
        }
    }

    index
}

/// Builds the assessment index. A gradebook without pre-assessment columns
/// cannot drive tier computation, so it is rejected.
pub fn classify<S: AsRef<str>>(columns: &[S]) -> Result<ColumnIndex> {
    let index = index_columns(columns);

    info!(
        pre = index.pre.len(),
        milestone = index.milestone.len(),
        summative = index.summative.len(),
        "assessment columns discovered"
    );

    if index.pre.is_empty() {
        return Err(WelcomeError::NoAssignmentColumnsFound);
    }

    Ok(index)
}
