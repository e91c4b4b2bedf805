//! Explore listing: candidate-set filtering, ranking, paging and card projection.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::Store;
use crate::models::{Business, BusinessCard, ExploreResponse, Pagination};
use crate::ranking::{aggregate, sort_businesses, summary_for, RatingSummary, SortMode};

/// Offset paging with both values floored to 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Missing values take the defaults; values that are not numbers coerce to 1.
    pub fn from_raw(
        page: Option<&str>,
        limit: Option<&str>,
        default_limit: i64,
        max_limit: i64,
    ) -> Self {
        let page = coerce_positive(page, 1);
        let limit = coerce_positive(limit, default_limit).min(max_limit.max(1));
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn paginate(&self, total_count: i64) -> Pagination {
        let limit = self.limit.max(1);
        let total_pages = (total_count + limit - 1) / limit;
        Pagination {
            current_page: self.page,
            total_pages,
            total_count,
            has_next: self.page < total_pages,
            has_prev: self.page > 1,
        }
    }

    /// Items in `[offset, offset + limit)`.
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

/// Missing or blank input takes `default`; anything unparsable becomes 1.
pub fn coerce_positive(raw: Option<&str>, default: i64) -> i64 {
    match raw.map(str::trim) {
        None | Some("") => default.max(1),
        Some(value) => value.parse::<i64>().unwrap_or(1).max(1),
    }
}

/// Parsed explore query
#[derive(Debug, Clone)]
pub struct ExploreParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub sort: SortMode,
    pub page: PageRequest,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Narrows the candidate set: free-text union first, then each filter intersected.
///
/// Returns as soon as the set is empty, skipping the remaining lookups.
async fn candidate_ids(
    store: &dyn Store,
    params: &ExploreParams,
) -> Result<HashSet<Uuid>, sqlx::Error> {
    let mut candidates: HashSet<Uuid> = match non_blank(params.search.as_deref()) {
        Some(query) => {
            let mut ids: HashSet<Uuid> = store.search_business_ids(query).await?.into_iter().collect();
            ids.extend(store.business_ids_matching_category(query).await?);
            ids.extend(store.business_ids_matching_subcategory(query).await?);
            ids
        }
        None => store.active_business_ids().await?.into_iter().collect(),
    };

    if candidates.is_empty() {
        return Ok(candidates);
    }

    if let Some(category) = non_blank(params.category.as_deref()) {
        // An id that does not parse cannot name any category.
        let members: HashSet<Uuid> = match Uuid::parse_str(category) {
            Ok(category_id) => store
                .business_ids_in_category(category_id)
                .await?
                .into_iter()
                .collect(),
            Err(_) => HashSet::new(),
        };
        candidates.retain(|id| members.contains(id));
        if candidates.is_empty() {
            return Ok(candidates);
        }
    }

    if let Some(subcategory) = non_blank(params.subcategory.as_deref()) {
        let members: HashSet<Uuid> = store
            .business_ids_in_subcategory(subcategory)
            .await?
            .into_iter()
            .collect();
        candidates.retain(|id| members.contains(id));
    }

    Ok(candidates)
}

pub async fn explore(
    store: &dyn Store,
    config: &AppConfig,
    params: ExploreParams,
) -> Result<ExploreResponse, sqlx::Error> {
    let candidates = candidate_ids(store, &params).await?;
    if candidates.is_empty() {
        return Ok(ExploreResponse {
            businesses: Vec::new(),
            pagination: params.page.paginate(0),
        });
    }

    let ids: Vec<Uuid> = candidates.iter().copied().collect();
    let mut businesses = store.businesses_by_ids(&ids).await?;
    let reviews = store.reviews_for_businesses(&ids).await?;
    let summaries = aggregate(&candidates, &reviews);

    sort_businesses(&mut businesses, &summaries, params.sort);

    let total_count = i64::try_from(businesses.len()).unwrap_or(i64::MAX);
    let pagination = params.page.paginate(total_count);
    let page = params.page.slice(businesses);

    let businesses = decorate(store, config, page, &summaries).await?;
    log::debug!(
        "explore matched {total_count} businesses, returning {}",
        businesses.len()
    );

    Ok(ExploreResponse {
        businesses,
        pagination,
    })
}

/// Projects businesses into cards with their primary image and first category.
pub async fn decorate(
    store: &dyn Store,
    config: &AppConfig,
    businesses: Vec<Business>,
    summaries: &HashMap<Uuid, RatingSummary>,
) -> Result<Vec<BusinessCard>, sqlx::Error> {
    if businesses.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = businesses.iter().map(|b| b.id).collect();

    let mut images: HashMap<Uuid, String> = HashMap::new();
    for image in store.images_for_businesses(&ids).await? {
        images.entry(image.business_id).or_insert(image.url);
    }

    let mut categories: HashMap<Uuid, String> = HashMap::new();
    for link in store.category_links(&ids).await? {
        categories.entry(link.business_id).or_insert(link.category_name);
    }

    let cards = businesses
        .into_iter()
        .map(|business| {
            let summary = summary_for(summaries, business.id);
            BusinessCard {
                image_url: images
                    .remove(&business.id)
                    .unwrap_or_else(|| config.placeholder_image_url.clone()),
                category: categories
                    .remove(&business.id)
                    .unwrap_or_else(|| config.uncategorized_label.clone()),
                id: business.id,
                name: business.name,
                location: business.location,
                address: business.address,
                description: business.description,
                rating: summary.rounded_average(),
                review_count: summary.count,
            }
        })
        .collect();

    Ok(cards)
}
