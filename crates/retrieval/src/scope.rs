//! Scope lattice: the filters that emulate OR-over-wildcard.
//!
//! Collections only support exact-match conjunction, so a case scoped to
//! `(state, sector)` is answered by querying every combination where some
//! dimensions are replaced by `ALL`. Variants are ordered most specific
//! first: fewer wildcards first, and among variants with the same number of
//! wildcards the later dimension is wildcarded first.

use policygate_core::policy::fields;
use policygate_core::{MetadataFilter, PolicyStatus, WILDCARD};

/// One filter of the lattice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeVariant {
    /// 0 is the most specific variant.
    pub rank: usize,
    pub state: String,
    pub sector: String,
    pub filter: MetadataFilter,
}

/// Filter restricted to active chunks only, with no scope conditions.
pub fn active_only() -> MetadataFilter {
    MetadataFilter::new().with(fields::STATUS, PolicyStatus::Active.as_str())
}

/// Every wildcard combination of `(state, sector)`, most specific first.
///
/// A case value that already is `ALL` yields duplicate filters; those are
/// collapsed so each distinct filter is queried once.
pub fn scope_lattice(state: &str, sector: &str) -> Vec<ScopeVariant> {
    let dimensions = [(fields::STATE, state.trim()), (fields::SECTOR, sector.trim())];
    let n = dimensions.len();

    // Bit i set means dimension i is wildcarded.
    let mut masks: Vec<u32> = (0..1u32 << n).collect();
    masks.sort_by_key(|m| (m.count_ones(), std::cmp::Reverse(*m)));

    let mut variants: Vec<ScopeVariant> = Vec::with_capacity(masks.len());
    for mask in masks {
        let values: Vec<&str> = dimensions
            .iter()
            .enumerate()
            .map(|(i, (_, value))| if mask & (1 << i) != 0 { WILDCARD } else { *value })
            .collect();

        let filter = dimensions
            .iter()
            .zip(&values)
            .fold(active_only(), |f, ((field, _), value)| f.with(*field, *value));

        if variants.iter().any(|v| v.filter == filter) {
            continue;
        }
        variants.push(ScopeVariant {
            rank: variants.len(),
            state: values[0].to_string(),
            sector: values[1].to_string(),
            filter,
        });
    }
    variants
}
