use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ENUMS
// ============================================================================

/// Role stored on a profile row (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    BusinessOwner,
    Admin,
}

// ============================================================================
// PROFILES
// ============================================================================

/// Profile row owned by the identity provider, mirrored for role lookups
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// BUSINESSES
// ============================================================================

/// Directory listing that can receive reviews
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper for creating new business
#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub category_ids: Vec<Uuid>,
    pub subcategory_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusinessImage {
    pub id: Uuid,
    pub business_id: Uuid,
    pub url: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// CATEGORIES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Business-to-category association joined with the category name
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryLink {
    pub business_id: Uuid,
    pub category_id: Uuid,
    pub category_name: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubcategoryLink {
    pub business_id: Uuid,
    pub subcategory_id: Uuid,
    pub subcategory_name: String,
}

// ============================================================================
// REVIEWS
// ============================================================================

/// A rating plus optional comment left by one user against one business
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub business_id: Uuid,
    pub reviewer_id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Review joined with the names shown in feeds
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFeedItem {
    pub id: Uuid,
    pub business_id: Uuid,
    pub business_name: String,
    pub reviewer_id: Uuid,
    pub reviewer_name: Option<String>,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregated counters for the moderation dashboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModerationStats {
    pub business_count: i64,
    pub banned_business_count: i64,
    pub review_count: i64,
    pub category_count: i64,
}

// ============================================================================
// REQUEST/RESPONSE DTOs
// ============================================================================

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// Offset pagination block shared by every paged listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Business row as rendered by listing cards
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessCard {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub rating: f64,
    pub review_count: i64,
    pub image_url: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExploreResponse {
    pub businesses: Vec<BusinessCard>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingResponse {
    pub featured_services: Vec<BusinessCard>,
    pub recent_reviews: Vec<ReviewFeedItem>,
    pub pagination: Pagination,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPage {
    pub reviews: Vec<ReviewFeedItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithSubcategories {
    #[serde(flatten)]
    pub category: Category,
    pub subcategories: Vec<Subcategory>,
}

/// Full business page payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDetail {
    #[serde(flatten)]
    pub business: Business,
    pub rating: f64,
    pub review_count: i64,
    pub images: Vec<String>,
    pub categories: Vec<String>,
    pub subcategories: Vec<String>,
}

/// Payload sent by owners to list a new business
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusinessRequest {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(length(max = 120))]
    pub location: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
    #[serde(default)]
    pub subcategory_ids: Vec<Uuid>,
}

impl CreateBusinessRequest {
    pub fn into_new_business(self, owner_id: Option<Uuid>) -> NewBusiness {
        NewBusiness {
            id: Uuid::new_v4(),
            owner_id,
            name: self.name.trim().to_string(),
            location: self.location,
            address: self.address,
            description: self.description,
            category_ids: self.category_ids,
            subcategory_ids: self.subcategory_ids,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBusinessRequest {
    #[validate(length(min = 2, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 120))]
    pub location: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
}

impl UpdateBusinessRequest {
    pub fn apply_to_existing(self, existing: &mut Business) {
        if let Some(name) = self.name {
            existing.name = name.trim().to_string();
        }
        if self.location.is_some() {
            existing.location = self.location;
        }
        if self.address.is_some() {
            existing.address = self.address;
        }
        if self.description.is_some() {
            existing.description = self.description;
        }
        existing.updated_at = Utc::now();
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i16,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

impl CreateReviewRequest {
    pub fn into_review(self, business_id: Uuid, reviewer_id: Uuid) -> Review {
        Review {
            id: Uuid::new_v4(),
            business_id,
            reviewer_id,
            rating: self.rating,
            comment: self
                .comment
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 2, max = 60))]
    pub name: String,
}

impl CreateCategoryRequest {
    pub fn into_category(self) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn into_subcategory(self, category_id: Uuid) -> Subcategory {
        Subcategory {
            id: Uuid::new_v4(),
            category_id,
            name: self.name.trim().to_string(),
            created_at: Utc::now(),
        }
    }
}
