use std::collections::HashSet;

use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::Store;
use crate::explore::{decorate, PageRequest};
use crate::models::{BusinessCard, LandingResponse};
use crate::ranking::{aggregate, best_of};

/// Landing feed: featured businesses, the newest reviews and the category list.
pub async fn landing(
    store: &dyn Store,
    config: &AppConfig,
    page: PageRequest,
) -> Result<LandingResponse, sqlx::Error> {
    let businesses = store.active_businesses().await?;
    let ids: Vec<Uuid> = businesses.iter().map(|b| b.id).collect();
    let id_set: HashSet<Uuid> = ids.iter().copied().collect();
    let reviews = store.reviews_for_businesses(&ids).await?;
    let summaries = aggregate(&id_set, &reviews);

    let featured = best_of(
        businesses,
        &summaries,
        config.featured_min_reviews,
        config.featured_limit,
    );
    let featured_services = decorate(store, config, featured, &summaries).await?;

    let total_reviews = store.count_public_reviews().await?;
    let recent_reviews = store.recent_reviews(page.limit, page.offset()).await?;
    let categories = store.list_categories().await?;

    Ok(LandingResponse {
        featured_services,
        recent_reviews,
        pagination: page.paginate(total_reviews),
        categories,
    })
}

/// Top members of a category that reached `min_reviews` reviews.
pub async fn best_in_category(
    store: &dyn Store,
    config: &AppConfig,
    category_id: Uuid,
    min_reviews: i64,
    limit: usize,
) -> Result<Vec<BusinessCard>, sqlx::Error> {
    let members = store.business_ids_in_category(category_id).await?;
    if members.is_empty() {
        return Ok(Vec::new());
    }

    let businesses = store.businesses_by_ids(&members).await?;
    let id_set: HashSet<Uuid> = businesses.iter().map(|b| b.id).collect();
    let reviews = store.reviews_for_businesses(&members).await?;
    let summaries = aggregate(&id_set, &reviews);

    let best = best_of(businesses, &summaries, min_reviews, limit);
    decorate(store, config, best, &summaries).await
}
