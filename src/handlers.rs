use std::collections::HashMap;

use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthorizationContext, Capability};
use crate::config::AppConfig;
use crate::database::Store;
use crate::error::AppError;
use crate::explore::{self, coerce_positive, ExploreParams, PageRequest};
use crate::landing;
use crate::models::{
    ApiResponse, BusinessDetail, CategoryWithSubcategories, CreateBusinessRequest,
    CreateCategoryRequest, CreateReviewRequest, ReviewPage, UpdateBusinessRequest,
};
use crate::ranking::{aggregate, summary_for, SortMode};

type AppResult = Result<HttpResponse, AppError>;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Health
        .service(health_check)
        // Listings
        .service(explore_businesses)
        .service(landing_feed)
        // Catalogue
        .service(list_categories)
        .service(create_category)
        .service(create_subcategory)
        .service(best_in_category)
        // Businesses
        .service(create_business)
        .service(get_business)
        .service(update_business)
        // Reviews
        .service(list_business_reviews)
        .service(create_review)
        .service(delete_review)
        // Moderation
        .service(ban_business)
        .service(unban_business)
        .service(moderation_stats);
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "review-marketplace-service",
        "timestamp": chrono::Utc::now()
    }))
}

// ============================================================================
// LISTINGS
// ============================================================================

/// Paging values arrive as raw strings so that junk input is coerced, not rejected.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExploreQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[get("/explore")]
pub async fn explore_businesses(
    store: web::Data<dyn Store>,
    config: web::Data<AppConfig>,
    query: web::Query<ExploreQuery>,
) -> AppResult {
    let query = query.into_inner();
    let params = ExploreParams {
        sort: SortMode::parse(query.sort.as_deref()),
        page: PageRequest::from_raw(
            query.page.as_deref(),
            query.limit.as_deref(),
            config.explore_default_limit,
            config.max_page_size,
        ),
        search: query.search,
        category: query.category,
        subcategory: query.subcategory,
    };

    let response = explore::explore(store.get_ref(), &config, params).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("/landing")]
pub async fn landing_feed(
    store: web::Data<dyn Store>,
    config: web::Data<AppConfig>,
    query: web::Query<PageQuery>,
) -> AppResult {
    let page = PageRequest::from_raw(
        query.page.as_deref(),
        query.limit.as_deref(),
        config.landing_default_limit,
        config.max_page_size,
    );

    let response = landing::landing(store.get_ref(), &config, page).await?;
    Ok(HttpResponse::Ok().json(response))
}

// ============================================================================
// CATEGORIES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestQuery {
    pub min_reviews: Option<String>,
    pub limit: Option<String>,
}

#[get("/categories")]
pub async fn list_categories(store: web::Data<dyn Store>) -> AppResult {
    let categories = store.list_categories().await?;
    let mut grouped: HashMap<Uuid, Vec<_>> = HashMap::new();
    for subcategory in store.list_subcategories().await? {
        grouped
            .entry(subcategory.category_id)
            .or_default()
            .push(subcategory);
    }

    let categories: Vec<CategoryWithSubcategories> = categories
        .into_iter()
        .map(|category| CategoryWithSubcategories {
            subcategories: grouped.remove(&category.id).unwrap_or_default(),
            category,
        })
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(categories)))
}

#[post("/categories")]
pub async fn create_category(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    payload: web::Json<CreateCategoryRequest>,
) -> AppResult {
    ctx.require(Capability::Moderate)?;

    let body = payload.into_inner();
    body.validate()?;

    let category = store.create_category(body.into_category()).await?;
    log::info!("Category '{}' created", category.name);
    Ok(HttpResponse::Created().json(ApiResponse::success(category)))
}

#[post("/categories/{category_id}/subcategories")]
pub async fn create_subcategory(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    category_id: web::Path<Uuid>,
    payload: web::Json<CreateCategoryRequest>,
) -> AppResult {
    ctx.require(Capability::Moderate)?;

    let category_id = category_id.into_inner();
    let body = payload.into_inner();
    body.validate()?;

    if store.get_category(category_id).await?.is_none() {
        return Err(AppError::NotFound("Category"));
    }

    let subcategory = store
        .create_subcategory(body.into_subcategory(category_id))
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(subcategory)))
}

#[get("/categories/{category_id}/best")]
pub async fn best_in_category(
    store: web::Data<dyn Store>,
    config: web::Data<AppConfig>,
    category_id: web::Path<Uuid>,
    query: web::Query<BestQuery>,
) -> AppResult {
    let category_id = category_id.into_inner();
    if store.get_category(category_id).await?.is_none() {
        return Err(AppError::NotFound("Category"));
    }

    let min_reviews = coerce_positive(query.min_reviews.as_deref(), config.featured_min_reviews);
    let default_limit = i64::try_from(config.featured_limit).unwrap_or(i64::MAX);
    let limit = coerce_positive(query.limit.as_deref(), default_limit)
        .min(config.max_page_size.max(1));
    let limit = usize::try_from(limit).unwrap_or(1);

    let cards =
        landing::best_in_category(store.get_ref(), &config, category_id, min_reviews, limit)
            .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(cards)))
}

// ============================================================================
// BUSINESSES
// ============================================================================

#[post("/businesses")]
pub async fn create_business(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    payload: web::Json<CreateBusinessRequest>,
) -> AppResult {
    ctx.require(Capability::CreateBusiness)?;

    let body = payload.into_inner();
    body.validate()?;

    let business = store
        .create_business(body.into_new_business(ctx.user_id()))
        .await?;
    log::info!("Business {} created by {:?}", business.id, ctx.user_id());
    Ok(HttpResponse::Created().json(ApiResponse::success(business)))
}

#[get("/businesses/{business_id}")]
pub async fn get_business(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    business_id: web::Path<Uuid>,
) -> AppResult {
    let business_id = business_id.into_inner();
    let business = match store.get_business(business_id).await? {
        Some(business) if !business.is_banned || ctx.is_admin() => business,
        _ => return Err(AppError::NotFound("Business")),
    };

    let ids = [business_id];
    let reviews = store.reviews_for_businesses(&ids).await?;
    let summaries = aggregate(&ids.into_iter().collect(), &reviews);
    let summary = summary_for(&summaries, business_id);

    let images = store
        .images_for_businesses(&ids)
        .await?
        .into_iter()
        .map(|image| image.url)
        .collect();
    let categories = store
        .category_links(&ids)
        .await?
        .into_iter()
        .map(|link| link.category_name)
        .collect();
    let subcategories = store
        .subcategory_links(&ids)
        .await?
        .into_iter()
        .map(|link| link.subcategory_name)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(BusinessDetail {
        business,
        rating: summary.rounded_average(),
        review_count: summary.count,
        images,
        categories,
        subcategories,
    })))
}

#[put("/businesses/{business_id}")]
pub async fn update_business(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    business_id: web::Path<Uuid>,
    payload: web::Json<UpdateBusinessRequest>,
) -> AppResult {
    let business_id = business_id.into_inner();
    ctx.require(Capability::ManageBusiness(business_id))?;

    let body = payload.into_inner();
    body.validate()?;

    let mut existing = store
        .get_business(business_id)
        .await?
        .ok_or(AppError::NotFound("Business"))?;
    body.apply_to_existing(&mut existing);

    let updated = store.update_business(existing).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(updated)))
}

// ============================================================================
// REVIEWS
// ============================================================================

#[get("/businesses/{business_id}/reviews")]
pub async fn list_business_reviews(
    store: web::Data<dyn Store>,
    config: web::Data<AppConfig>,
    business_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> AppResult {
    let business_id = business_id.into_inner();
    match store.get_business(business_id).await? {
        Some(business) if !business.is_banned => {}
        _ => return Err(AppError::NotFound("Business")),
    }

    let page = PageRequest::from_raw(
        query.page.as_deref(),
        query.limit.as_deref(),
        config.explore_default_limit,
        config.max_page_size,
    );
    let total = store.count_reviews_for_business(business_id).await?;
    let reviews = store
        .reviews_for_business(business_id, page.limit, page.offset())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(ReviewPage {
        reviews,
        pagination: page.paginate(total),
    })))
}

#[post("/businesses/{business_id}/reviews")]
pub async fn create_review(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    business_id: web::Path<Uuid>,
    payload: web::Json<CreateReviewRequest>,
) -> AppResult {
    ctx.require(Capability::WriteReview)?;
    let reviewer_id = ctx.user_id().ok_or(AppError::Unauthorized)?;

    let business_id = business_id.into_inner();
    let body = payload.into_inner();
    body.validate()?;

    let business = match store.get_business(business_id).await? {
        Some(business) if !business.is_banned => business,
        _ => return Err(AppError::NotFound("Business")),
    };
    // Ownership comes from the row, whatever role the owner holds.
    if business.owner_id == Some(reviewer_id) {
        return Err(AppError::Forbidden);
    }

    let review = store
        .create_review(body.into_review(business_id, reviewer_id))
        .await?;
    Ok(HttpResponse::Created().json(ApiResponse::success(review)))
}

#[delete("/reviews/{review_id}")]
pub async fn delete_review(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    review_id: web::Path<Uuid>,
) -> AppResult {
    let review_id = review_id.into_inner();
    let review = store
        .get_review(review_id)
        .await?
        .ok_or(AppError::NotFound("Review"))?;
    ctx.require(Capability::ManageReview(review.reviewer_id))?;

    match store.delete_review(review_id).await {
        Ok(()) => {
            log::info!("Review {review_id} deleted by {:?}", ctx.user_id());
            Ok(HttpResponse::NoContent().finish())
        }
        Err(sqlx::Error::RowNotFound) => Err(AppError::NotFound("Review")),
        Err(err) => Err(err.into()),
    }
}

// ============================================================================
// MODERATION
// ============================================================================

async fn set_banned(
    ctx: &AuthorizationContext,
    store: &dyn Store,
    business_id: Uuid,
    banned: bool,
) -> AppResult {
    ctx.require(Capability::Moderate)?;

    let business = store
        .set_business_banned(business_id, banned)
        .await?
        .ok_or(AppError::NotFound("Business"))?;
    log::info!(
        "Business {business_id} {} by {:?}",
        if banned { "banned" } else { "unbanned" },
        ctx.user_id()
    );
    Ok(HttpResponse::Ok().json(ApiResponse::success(business)))
}

#[post("/admin/businesses/{business_id}/ban")]
pub async fn ban_business(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    business_id: web::Path<Uuid>,
) -> AppResult {
    set_banned(&ctx, store.get_ref(), business_id.into_inner(), true).await
}

#[post("/admin/businesses/{business_id}/unban")]
pub async fn unban_business(
    ctx: AuthorizationContext,
    store: web::Data<dyn Store>,
    business_id: web::Path<Uuid>,
) -> AppResult {
    set_banned(&ctx, store.get_ref(), business_id.into_inner(), false).await
}

#[get("/admin/stats")]
pub async fn moderation_stats(ctx: AuthorizationContext, store: web::Data<dyn Store>) -> AppResult {
    ctx.require(Capability::Moderate)?;
    let stats = store.moderation_stats().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}
