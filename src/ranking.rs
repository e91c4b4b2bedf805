//! Per-business rating aggregation and the ranking rules built on it.
//!
//! Averages are compared exactly (`sum / count` via cross-multiplication) and
//! only rounded for presentation, half-up to one decimal.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use uuid::Uuid;

use crate::models::{Business, Review};

/// Request-scoped rating figures for one business
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingSummary {
    pub business_id: Uuid,
    pub sum: i64,
    pub count: i64,
}

impl RatingSummary {
    pub const fn empty(business_id: Uuid) -> Self {
        Self {
            business_id,
            sum: 0,
            count: 0,
        }
    }

    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum as f64 / self.count as f64
    }

    /// Average rounded half-up to one decimal place.
    pub fn rounded_average(&self) -> f64 {
        if self.count <= 0 || self.sum <= 0 {
            return 0.0;
        }
        // round(10 * sum / count) in integers, so 4.75 becomes 4.8 without float drift
        let tenths = (20 * self.sum + self.count) / (2 * self.count);
        tenths as f64 / 10.0
    }

    fn cmp_average(&self, other: &Self) -> Ordering {
        let lhs = self.sum * other.count.max(1);
        let rhs = other.sum * self.count.max(1);
        lhs.cmp(&rhs)
    }
}

/// Groups reviews by business, keeping only businesses in `business_ids`.
///
/// Businesses without reviews are absent from the map; use [`summary_for`]
/// to read them as zero.
pub fn aggregate(business_ids: &HashSet<Uuid>, reviews: &[Review]) -> HashMap<Uuid, RatingSummary> {
    let mut summaries: HashMap<Uuid, RatingSummary> = HashMap::new();
    for review in reviews {
        if !business_ids.contains(&review.business_id) {
            continue;
        }
        let entry = summaries
            .entry(review.business_id)
            .or_insert_with(|| RatingSummary::empty(review.business_id));
        entry.sum += i64::from(review.rating);
        entry.count += 1;
    }
    summaries
}

pub fn summary_for(summaries: &HashMap<Uuid, RatingSummary>, business_id: Uuid) -> RatingSummary {
    summaries
        .get(&business_id)
        .copied()
        .unwrap_or_else(|| RatingSummary::empty(business_id))
}

/// Descending average, then descending review count.
pub fn compare_by_rating(a: &RatingSummary, b: &RatingSummary) -> Ordering {
    b.cmp_average(a).then_with(|| b.count.cmp(&a.count))
}

/// How listings are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Rating,
    Reviews,
    Recent,
}

impl SortMode {
    /// Unknown or missing keys fall back to rating order.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("reviews") => Self::Reviews,
            Some("recent") => Self::Recent,
            _ => Self::Rating,
        }
    }
}

/// Stable in-place sort of businesses under the given mode.
pub fn sort_businesses(
    businesses: &mut [Business],
    summaries: &HashMap<Uuid, RatingSummary>,
    mode: SortMode,
) {
    match mode {
        SortMode::Rating => businesses.sort_by(|a, b| {
            compare_by_rating(&summary_for(summaries, a.id), &summary_for(summaries, b.id))
        }),
        SortMode::Reviews => businesses.sort_by(|a, b| {
            summary_for(summaries, b.id)
                .count
                .cmp(&summary_for(summaries, a.id).count)
        }),
        SortMode::Recent => businesses.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

/// Businesses with at least `min_reviews` reviews, ranked, truncated to `limit`.
pub fn best_of(
    businesses: Vec<Business>,
    summaries: &HashMap<Uuid, RatingSummary>,
    min_reviews: i64,
    limit: usize,
) -> Vec<Business> {
    let mut eligible: Vec<Business> = businesses
        .into_iter()
        .filter(|b| summary_for(summaries, b.id).count >= min_reviews)
        .collect();
    sort_businesses(&mut eligible, summaries, SortMode::Rating);
    eligible.truncate(limit);
    eligible
}
