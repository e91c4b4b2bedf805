use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Business, BusinessImage, Category, CategoryLink, ModerationStats, NewBusiness, Profile,
    Review, ReviewFeedItem, Subcategory, SubcategoryLink,
};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::Database;

/// Data access used by the handlers and the listing pipelines.
///
/// Every read that feeds a public listing leaves banned businesses out.
/// Listing reads return businesses newest first so that stable ranking
/// falls back to recency.
#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // PROFILES
    // ========================================================================

    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, sqlx::Error>;

    async fn owned_business_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>;

    // ========================================================================
    // BUSINESSES
    // ========================================================================

    async fn active_businesses(&self) -> Result<Vec<Business>, sqlx::Error>;

    async fn active_business_ids(&self) -> Result<Vec<Uuid>, sqlx::Error>;

    async fn businesses_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Business>, sqlx::Error>;

    /// Fetches a business regardless of its ban flag.
    async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>, sqlx::Error>;

    /// Case-insensitive substring match on name, location and address.
    async fn search_business_ids(&self, query: &str) -> Result<Vec<Uuid>, sqlx::Error>;

    /// Businesses linked to any category whose name contains `query`.
    async fn business_ids_matching_category(&self, query: &str)
        -> Result<Vec<Uuid>, sqlx::Error>;

    /// Businesses linked to any subcategory whose name contains `query`.
    async fn business_ids_matching_subcategory(
        &self,
        query: &str,
    ) -> Result<Vec<Uuid>, sqlx::Error>;

    async fn business_ids_in_category(&self, category_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error>;

    /// Members of the subcategory with exactly this name, ignoring case.
    async fn business_ids_in_subcategory(&self, name: &str) -> Result<Vec<Uuid>, sqlx::Error>;

    async fn create_business(&self, business: NewBusiness) -> Result<Business, sqlx::Error>;

    async fn update_business(&self, business: Business) -> Result<Business, sqlx::Error>;

    async fn set_business_banned(
        &self,
        business_id: Uuid,
        banned: bool,
    ) -> Result<Option<Business>, sqlx::Error>;

    // ========================================================================
    // IMAGES & TAXONOMY
    // ========================================================================

    /// Images ordered primary first, then oldest first, per business.
    async fn images_for_businesses(&self, ids: &[Uuid]) -> Result<Vec<BusinessImage>, sqlx::Error>;

    /// Category links ordered by association age, per business.
    async fn category_links(&self, ids: &[Uuid]) -> Result<Vec<CategoryLink>, sqlx::Error>;

    async fn subcategory_links(&self, ids: &[Uuid]) -> Result<Vec<SubcategoryLink>, sqlx::Error>;

    async fn list_categories(&self) -> Result<Vec<Category>, sqlx::Error>;

    async fn list_subcategories(&self) -> Result<Vec<Subcategory>, sqlx::Error>;

    async fn get_category(&self, category_id: Uuid) -> Result<Option<Category>, sqlx::Error>;

    async fn create_category(&self, category: Category) -> Result<Category, sqlx::Error>;

    async fn create_subcategory(&self, subcategory: Subcategory)
        -> Result<Subcategory, sqlx::Error>;

    // ========================================================================
    // REVIEWS
    // ========================================================================

    async fn reviews_for_businesses(&self, ids: &[Uuid]) -> Result<Vec<Review>, sqlx::Error>;

    async fn reviews_for_business(
        &self,
        business_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewFeedItem>, sqlx::Error>;

    async fn count_reviews_for_business(&self, business_id: Uuid) -> Result<i64, sqlx::Error>;

    /// Newest-first reviews of businesses that are not banned.
    async fn recent_reviews(&self, limit: i64, offset: i64)
        -> Result<Vec<ReviewFeedItem>, sqlx::Error>;

    async fn count_public_reviews(&self) -> Result<i64, sqlx::Error>;

    async fn create_review(&self, review: Review) -> Result<Review, sqlx::Error>;

    async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>, sqlx::Error>;

    /// Fails with `RowNotFound` when nothing was deleted.
    async fn delete_review(&self, review_id: Uuid) -> Result<(), sqlx::Error>;

    async fn moderation_stats(&self) -> Result<ModerationStats, sqlx::Error>;
}
