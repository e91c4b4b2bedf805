//! In-process `Store` used by the handler and pipeline tests.

use std::{
    borrow::Cow,
    collections::HashSet,
    error::Error as StdError,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;
use uuid::Uuid;

use super::Store;
use crate::models::{
    Business, BusinessImage, Category, CategoryLink, ModerationStats, NewBusiness, Profile,
    Review, ReviewFeedItem, Subcategory, SubcategoryLink, UserRole,
};

/// Mirrors the SQLSTATE errors Postgres raises for the schema's FK and UNIQUE constraints.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ConstraintViolation {
    code: &'static str,
    message: String,
}

impl ConstraintViolation {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn into_sqlx(self) -> sqlx::Error {
        sqlx::Error::Database(Box::new(self))
    }

    fn foreign_key(message: impl Into<String>) -> sqlx::Error {
        Self::new("23503", message).into_sqlx()
    }

    fn unique(message: impl Into<String>) -> sqlx::Error {
        Self::new("23505", message).into_sqlx()
    }
}

impl DatabaseError for ConstraintViolation {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.code))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self.code {
            "23503" => ErrorKind::ForeignKeyViolation,
            "23505" => ErrorKind::UniqueViolation,
            _ => ErrorKind::Other,
        }
    }
}

#[derive(Default)]
struct State {
    profiles: Vec<Profile>,
    businesses: Vec<Business>,
    images: Vec<BusinessImage>,
    categories: Vec<Category>,
    subcategories: Vec<Subcategory>,
    // (business, category, linked at)
    category_links: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    subcategory_links: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    reviews: Vec<Review>,
    calls: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails as if the pool timed out.
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Number of trait calls served so far.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Result<MutexGuard<'_, State>, sqlx::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut state = self.lock();
        state.calls += 1;
        Ok(state)
    }

    pub fn add_profile(&self, username: &str, role: UserRole) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().profiles.push(Profile {
            id,
            username: username.to_string(),
            role,
            created_at: Utc::now(),
        });
        id
    }

    /// Adds a business created `age_days` ago.
    pub fn add_business(&self, name: &str, age_days: i64) -> Uuid {
        let id = Uuid::new_v4();
        let created = Utc::now() - Duration::days(age_days);
        self.lock().businesses.push(Business {
            id,
            owner_id: None,
            name: name.to_string(),
            location: None,
            address: None,
            description: None,
            is_banned: false,
            created_at: created,
            updated_at: created,
        });
        id
    }

    pub fn edit_business(&self, business_id: Uuid, edit: impl FnOnce(&mut Business)) {
        if let Some(business) = self
            .lock()
            .businesses
            .iter_mut()
            .find(|b| b.id == business_id)
        {
            edit(business);
        }
    }

    pub fn add_category(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().categories.push(Category {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    pub fn add_subcategory(&self, category_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.lock().subcategories.push(Subcategory {
            id,
            category_id,
            name: name.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    pub fn link_category(&self, business_id: Uuid, category_id: Uuid) {
        self.lock()
            .category_links
            .push((business_id, category_id, Utc::now()));
    }

    pub fn link_subcategory(&self, business_id: Uuid, subcategory_id: Uuid) {
        self.lock()
            .subcategory_links
            .push((business_id, subcategory_id, Utc::now()));
    }

    pub fn add_image(&self, business_id: Uuid, url: &str, is_primary: bool) {
        self.lock().images.push(BusinessImage {
            id: Uuid::new_v4(),
            business_id,
            url: url.to_string(),
            is_primary,
            created_at: Utc::now(),
        });
    }

    /// Adds one review per rating, each a minute older than the previous.
    pub fn add_reviews(&self, business_id: Uuid, reviewer_id: Uuid, ratings: &[i16]) {
        let mut state = self.lock();
        let base = Utc::now();
        for (i, &rating) in ratings.iter().enumerate() {
            state.reviews.push(Review {
                id: Uuid::new_v4(),
                business_id,
                reviewer_id,
                rating,
                comment: None,
                created_at: base - Duration::minutes(i as i64),
            });
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn newest_first(businesses: &mut [Business]) {
    businesses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(0))
        .take(usize::try_from(limit).unwrap_or(0))
        .collect()
}

impl State {
    fn is_banned(&self, business_id: Uuid) -> bool {
        self.businesses
            .iter()
            .any(|b| b.id == business_id && b.is_banned)
    }

    fn feed(&self, reviews: Vec<&Review>) -> Vec<ReviewFeedItem> {
        let mut items: Vec<ReviewFeedItem> = reviews
            .into_iter()
            .filter_map(|r| {
                let business = self.businesses.iter().find(|b| b.id == r.business_id)?;
                let reviewer = self.profiles.iter().find(|p| p.id == r.reviewer_id);
                Some(ReviewFeedItem {
                    id: r.id,
                    business_id: r.business_id,
                    business_name: business.name.clone(),
                    reviewer_id: r.reviewer_id,
                    reviewer_name: reviewer.map(|p| p.username.clone()),
                    rating: r.rating,
                    comment: r.comment.clone(),
                    created_at: r.created_at,
                })
            })
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        items
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state.profiles.iter().find(|p| p.id == user_id).cloned())
    }

    async fn owned_business_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state
            .businesses
            .iter()
            .filter(|b| b.owner_id == Some(user_id))
            .map(|b| b.id)
            .collect())
    }

    async fn active_businesses(&self) -> Result<Vec<Business>, sqlx::Error> {
        let state = self.enter()?;
        let mut businesses: Vec<Business> = state
            .businesses
            .iter()
            .filter(|b| !b.is_banned)
            .cloned()
            .collect();
        newest_first(&mut businesses);
        Ok(businesses)
    }

    async fn active_business_ids(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        Ok(self
            .active_businesses()
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect())
    }

    async fn businesses_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Business>, sqlx::Error> {
        let state = self.enter()?;
        let mut businesses: Vec<Business> = state
            .businesses
            .iter()
            .filter(|b| !b.is_banned && ids.contains(&b.id))
            .cloned()
            .collect();
        newest_first(&mut businesses);
        Ok(businesses)
    }

    async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state.businesses.iter().find(|b| b.id == business_id).cloned())
    }

    async fn search_business_ids(&self, query: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state
            .businesses
            .iter()
            .filter(|b| !b.is_banned)
            .filter(|b| {
                contains_ci(&b.name, query)
                    || b.location.as_deref().is_some_and(|l| contains_ci(l, query))
                    || b.address.as_deref().is_some_and(|a| contains_ci(a, query))
            })
            .map(|b| b.id)
            .collect())
    }

    async fn business_ids_matching_category(
        &self,
        query: &str,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.enter()?;
        let matching: HashSet<Uuid> = state
            .categories
            .iter()
            .filter(|c| contains_ci(&c.name, query))
            .map(|c| c.id)
            .collect();
        Ok(state
            .category_links
            .iter()
            .filter(|(_, category_id, _)| matching.contains(category_id))
            .map(|(business_id, _, _)| *business_id)
            .collect())
    }

    async fn business_ids_matching_subcategory(
        &self,
        query: &str,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.enter()?;
        let matching: HashSet<Uuid> = state
            .subcategories
            .iter()
            .filter(|s| contains_ci(&s.name, query))
            .map(|s| s.id)
            .collect();
        Ok(state
            .subcategory_links
            .iter()
            .filter(|(_, subcategory_id, _)| matching.contains(subcategory_id))
            .map(|(business_id, _, _)| *business_id)
            .collect())
    }

    async fn business_ids_in_category(&self, category_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state
            .category_links
            .iter()
            .filter(|(_, linked, _)| *linked == category_id)
            .map(|(business_id, _, _)| *business_id)
            .collect())
    }

    async fn business_ids_in_subcategory(&self, name: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        let state = self.enter()?;
        let wanted = name.trim().to_lowercase();
        let matching: HashSet<Uuid> = state
            .subcategories
            .iter()
            .filter(|s| s.name.to_lowercase() == wanted)
            .map(|s| s.id)
            .collect();
        Ok(state
            .subcategory_links
            .iter()
            .filter(|(_, subcategory_id, _)| matching.contains(subcategory_id))
            .map(|(business_id, _, _)| *business_id)
            .collect())
    }

    async fn create_business(&self, business: NewBusiness) -> Result<Business, sqlx::Error> {
        let mut state = self.enter()?;
        let record = Business {
            id: business.id,
            owner_id: business.owner_id,
            name: business.name,
            location: business.location,
            address: business.address,
            description: business.description,
            is_banned: false,
            created_at: business.created_at,
            updated_at: business.created_at,
        };
        // Checked up front so a rejected insert leaves no partial links behind.
        if let Some(missing) = business
            .category_ids
            .iter()
            .find(|id| !state.categories.iter().any(|c| c.id == **id))
        {
            return Err(ConstraintViolation::foreign_key(format!(
                "category {missing} is not present in table \"categories\""
            )));
        }
        if let Some(missing) = business
            .subcategory_ids
            .iter()
            .find(|id| !state.subcategories.iter().any(|s| s.id == **id))
        {
            return Err(ConstraintViolation::foreign_key(format!(
                "subcategory {missing} is not present in table \"subcategories\""
            )));
        }
        for category_id in business.category_ids {
            state
                .category_links
                .push((record.id, category_id, business.created_at));
        }
        for subcategory_id in business.subcategory_ids {
            state
                .subcategory_links
                .push((record.id, subcategory_id, business.created_at));
        }
        state.businesses.push(record.clone());
        Ok(record)
    }

    async fn update_business(&self, business: Business) -> Result<Business, sqlx::Error> {
        let mut state = self.enter()?;
        let existing = state
            .businesses
            .iter_mut()
            .find(|b| b.id == business.id)
            .ok_or(sqlx::Error::RowNotFound)?;
        existing.name = business.name;
        existing.location = business.location;
        existing.address = business.address;
        existing.description = business.description;
        existing.updated_at = business.updated_at;
        Ok(existing.clone())
    }

    async fn set_business_banned(
        &self,
        business_id: Uuid,
        banned: bool,
    ) -> Result<Option<Business>, sqlx::Error> {
        let mut state = self.enter()?;
        Ok(state
            .businesses
            .iter_mut()
            .find(|b| b.id == business_id)
            .map(|b| {
                b.is_banned = banned;
                b.updated_at = Utc::now();
                b.clone()
            }))
    }

    async fn images_for_businesses(&self, ids: &[Uuid]) -> Result<Vec<BusinessImage>, sqlx::Error> {
        let state = self.enter()?;
        let mut images: Vec<BusinessImage> = state
            .images
            .iter()
            .filter(|i| ids.contains(&i.business_id))
            .cloned()
            .collect();
        images.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(images)
    }

    async fn category_links(&self, ids: &[Uuid]) -> Result<Vec<CategoryLink>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state
            .category_links
            .iter()
            .filter(|(business_id, _, _)| ids.contains(business_id))
            .filter_map(|(business_id, category_id, _)| {
                let category = state.categories.iter().find(|c| c.id == *category_id)?;
                Some(CategoryLink {
                    business_id: *business_id,
                    category_id: *category_id,
                    category_name: category.name.clone(),
                })
            })
            .collect())
    }

    async fn subcategory_links(&self, ids: &[Uuid]) -> Result<Vec<SubcategoryLink>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state
            .subcategory_links
            .iter()
            .filter(|(business_id, _, _)| ids.contains(business_id))
            .filter_map(|(business_id, subcategory_id, _)| {
                let subcategory = state
                    .subcategories
                    .iter()
                    .find(|s| s.id == *subcategory_id)?;
                Some(SubcategoryLink {
                    business_id: *business_id,
                    subcategory_id: *subcategory_id,
                    subcategory_name: subcategory.name.clone(),
                })
            })
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        let state = self.enter()?;
        let mut categories = state.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn list_subcategories(&self) -> Result<Vec<Subcategory>, sqlx::Error> {
        let state = self.enter()?;
        let mut subcategories = state.subcategories.clone();
        subcategories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(subcategories)
    }

    async fn get_category(&self, category_id: Uuid) -> Result<Option<Category>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state.categories.iter().find(|c| c.id == category_id).cloned())
    }

    async fn create_category(&self, category: Category) -> Result<Category, sqlx::Error> {
        let mut state = self.enter()?;
        if state.categories.iter().any(|c| c.name == category.name) {
            return Err(ConstraintViolation::unique(format!(
                "category name '{}' already exists",
                category.name
            )));
        }
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn create_subcategory(
        &self,
        subcategory: Subcategory,
    ) -> Result<Subcategory, sqlx::Error> {
        let mut state = self.enter()?;
        if !state.categories.iter().any(|c| c.id == subcategory.category_id) {
            return Err(ConstraintViolation::foreign_key(format!(
                "category {} is not present in table \"categories\"",
                subcategory.category_id
            )));
        }
        if state
            .subcategories
            .iter()
            .any(|s| s.category_id == subcategory.category_id && s.name == subcategory.name)
        {
            return Err(ConstraintViolation::unique(format!(
                "subcategory '{}' already exists in this category",
                subcategory.name
            )));
        }
        state.subcategories.push(subcategory.clone());
        Ok(subcategory)
    }

    async fn reviews_for_businesses(&self, ids: &[Uuid]) -> Result<Vec<Review>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state
            .reviews
            .iter()
            .filter(|r| ids.contains(&r.business_id))
            .cloned()
            .collect())
    }

    async fn reviews_for_business(
        &self,
        business_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewFeedItem>, sqlx::Error> {
        let state = self.enter()?;
        let reviews = state
            .reviews
            .iter()
            .filter(|r| r.business_id == business_id)
            .collect();
        Ok(page(state.feed(reviews), limit, offset))
    }

    async fn count_reviews_for_business(&self, business_id: Uuid) -> Result<i64, sqlx::Error> {
        let state = self.enter()?;
        let count = state
            .reviews
            .iter()
            .filter(|r| r.business_id == business_id)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn recent_reviews(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewFeedItem>, sqlx::Error> {
        let state = self.enter()?;
        let reviews = state
            .reviews
            .iter()
            .filter(|r| !state.is_banned(r.business_id))
            .collect();
        Ok(page(state.feed(reviews), limit, offset))
    }

    async fn count_public_reviews(&self) -> Result<i64, sqlx::Error> {
        let state = self.enter()?;
        let count = state
            .reviews
            .iter()
            .filter(|r| !state.is_banned(r.business_id))
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn create_review(&self, review: Review) -> Result<Review, sqlx::Error> {
        let mut state = self.enter()?;
        state.reviews.push(review.clone());
        Ok(review)
    }

    async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>, sqlx::Error> {
        let state = self.enter()?;
        Ok(state.reviews.iter().find(|r| r.id == review_id).cloned())
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<(), sqlx::Error> {
        let mut state = self.enter()?;
        let before = state.reviews.len();
        state.reviews.retain(|r| r.id != review_id);
        if state.reviews.len() == before {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    async fn moderation_stats(&self) -> Result<ModerationStats, sqlx::Error> {
        let state = self.enter()?;
        let count = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        Ok(ModerationStats {
            business_count: count(state.businesses.len()),
            banned_business_count: count(state.businesses.iter().filter(|b| b.is_banned).count()),
            review_count: count(state.reviews.len()),
            category_count: count(state.categories.len()),
        })
    }
}
