use std::{borrow::Cow, time::Duration};

use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, Executor, PgPool,
};
use uuid::Uuid;

use super::Store;
use crate::config::AppConfig;
use crate::models::{
    Business, BusinessImage, Category, CategoryLink, ModerationStats, NewBusiness, Profile,
    Review, ReviewFeedItem, Subcategory, SubcategoryLink,
};

const BUSINESS_COLUMNS: &str = r#"
    id, owner_id, name, location, address, description, is_banned, created_at, updated_at
"#;

const FEED_SELECT: &str = r#"
    SELECT
        r.id,
        r.business_id,
        b.name AS business_name,
        r.reviewer_id,
        p.username AS reviewer_name,
        r.rating,
        r.comment,
        r.created_at
    FROM reviews r
    JOIN businesses b ON b.id = r.business_id
    LEFT JOIN profiles p ON p.id = r.reviewer_id
"#;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &AppConfig) -> Result<Self, sqlx::Error> {
        let database_url = config.database_url.as_str();
        let pool = match pool_options(config).connect(database_url).await {
            Ok(pool) => pool,
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("3D000")) => {
                log::info!("Database missing, attempting to create it");
                create_database_if_missing(database_url).await?;
                pool_options(config).connect(database_url).await?
            }
            Err(err) => return Err(err),
        };

        // Run embedded migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn fetch_business_ids(&self, sql: &str, bind: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
    }
}

fn pool_options(config: &AppConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(600)))
        .test_before_acquire(true)
}

/// Wraps a user query for `ILIKE`, escaping its wildcards.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl Store for Database {
    async fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, username, role, created_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn owned_business_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM businesses WHERE owner_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }

    async fn active_businesses(&self) -> Result<Vec<Business>, sqlx::Error> {
        let sql = format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE is_banned = FALSE ORDER BY created_at DESC, id"
        );
        sqlx::query_as::<_, Business>(&sql).fetch_all(&self.pool).await
    }

    async fn active_business_ids(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM businesses WHERE is_banned = FALSE ORDER BY created_at DESC, id",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn businesses_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Business>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {BUSINESS_COLUMNS}
            FROM businesses
            WHERE id = ANY($1) AND is_banned = FALSE
            ORDER BY created_at DESC, id
            "#
        );
        sqlx::query_as::<_, Business>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
    }

    async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>, sqlx::Error> {
        let sql = format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = $1");
        sqlx::query_as::<_, Business>(&sql)
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn search_business_ids(&self, query: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        self.fetch_business_ids(
            r#"
            SELECT id
            FROM businesses
            WHERE is_banned = FALSE
              AND (name ILIKE $1 OR location ILIKE $1 OR address ILIKE $1)
            "#,
            &like_pattern(query),
        )
        .await
    }

    async fn business_ids_matching_category(
        &self,
        query: &str,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        self.fetch_business_ids(
            r#"
            SELECT DISTINCT bc.business_id
            FROM business_categories bc
            JOIN categories c ON c.id = bc.category_id
            WHERE c.name ILIKE $1
            "#,
            &like_pattern(query),
        )
        .await
    }

    async fn business_ids_matching_subcategory(
        &self,
        query: &str,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        self.fetch_business_ids(
            r#"
            SELECT DISTINCT bs.business_id
            FROM business_subcategories bs
            JOIN subcategories s ON s.id = bs.subcategory_id
            WHERE s.name ILIKE $1
            "#,
            &like_pattern(query),
        )
        .await
    }

    async fn business_ids_in_category(&self, category_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT business_id FROM business_categories WHERE category_id = $1",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn business_ids_in_subcategory(&self, name: &str) -> Result<Vec<Uuid>, sqlx::Error> {
        self.fetch_business_ids(
            r#"
            SELECT DISTINCT bs.business_id
            FROM business_subcategories bs
            JOIN subcategories s ON s.id = bs.subcategory_id
            WHERE lower(s.name) = lower($1)
            "#,
            name.trim(),
        )
        .await
    }

    async fn create_business(&self, business: NewBusiness) -> Result<Business, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let NewBusiness {
            id,
            owner_id,
            name,
            location,
            address,
            description,
            category_ids,
            subcategory_ids,
            created_at,
        } = business;

        let sql = format!(
            r#"
            INSERT INTO businesses (
                id, owner_id, name, location, address, description, is_banned, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7, $7)
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Business>(&sql)
            .bind(id)
            .bind(owner_id)
            .bind(name)
            .bind(location)
            .bind(address)
            .bind(description)
            .bind(created_at)
            .fetch_one(&mut *tx)
            .await?;

        for category_id in category_ids {
            sqlx::query(
                r#"
                INSERT INTO business_categories (business_id, category_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await?;
        }

        for subcategory_id in subcategory_ids {
            sqlx::query(
                r#"
                INSERT INTO business_subcategories (business_id, subcategory_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(subcategory_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(record)
    }

    async fn update_business(&self, business: Business) -> Result<Business, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE businesses
            SET name = $2, location = $3, address = $4, description = $5, updated_at = $6
            WHERE id = $1
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Business>(&sql)
            .bind(business.id)
            .bind(business.name)
            .bind(business.location)
            .bind(business.address)
            .bind(business.description)
            .bind(business.updated_at)
            .fetch_one(&self.pool)
            .await
    }

    async fn set_business_banned(
        &self,
        business_id: Uuid,
        banned: bool,
    ) -> Result<Option<Business>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE businesses
            SET is_banned = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Business>(&sql)
            .bind(business_id)
            .bind(banned)
            .fetch_optional(&self.pool)
            .await
    }

    async fn images_for_businesses(&self, ids: &[Uuid]) -> Result<Vec<BusinessImage>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, BusinessImage>(
            r#"
            SELECT id, business_id, url, is_primary, created_at
            FROM business_images
            WHERE business_id = ANY($1)
            ORDER BY business_id, is_primary DESC, created_at ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn category_links(&self, ids: &[Uuid]) -> Result<Vec<CategoryLink>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, CategoryLink>(
            r#"
            SELECT bc.business_id, c.id AS category_id, c.name AS category_name
            FROM business_categories bc
            JOIN categories c ON c.id = bc.category_id
            WHERE bc.business_id = ANY($1)
            ORDER BY bc.business_id, bc.created_at ASC, c.name ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn subcategory_links(&self, ids: &[Uuid]) -> Result<Vec<SubcategoryLink>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, SubcategoryLink>(
            r#"
            SELECT bs.business_id, s.id AS subcategory_id, s.name AS subcategory_name
            FROM business_subcategories bs
            JOIN subcategories s ON s.id = bs.subcategory_id
            WHERE bs.business_id = ANY($1)
            ORDER BY bs.business_id, bs.created_at ASC, s.name ASC
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    async fn list_subcategories(&self) -> Result<Vec<Subcategory>, sqlx::Error> {
        sqlx::query_as::<_, Subcategory>(
            "SELECT id, category_id, name, created_at FROM subcategories ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn get_category(&self, category_id: Uuid) -> Result<Option<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories WHERE id = $1")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn create_category(&self, category: Category) -> Result<Category, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, name, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, name, created_at
            "#,
        )
        .bind(category.id)
        .bind(category.name)
        .bind(category.created_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn create_subcategory(
        &self,
        subcategory: Subcategory,
    ) -> Result<Subcategory, sqlx::Error> {
        sqlx::query_as::<_, Subcategory>(
            r#"
            INSERT INTO subcategories (id, category_id, name, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, category_id, name, created_at
            "#,
        )
        .bind(subcategory.id)
        .bind(subcategory.category_id)
        .bind(subcategory.name)
        .bind(subcategory.created_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn reviews_for_businesses(&self, ids: &[Uuid]) -> Result<Vec<Review>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Review>(
            r#"
            SELECT id, business_id, reviewer_id, rating, comment, created_at
            FROM reviews
            WHERE business_id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
    }

    async fn reviews_for_business(
        &self,
        business_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewFeedItem>, sqlx::Error> {
        let sql = format!(
            "{FEED_SELECT} WHERE r.business_id = $1 ORDER BY r.created_at DESC, r.id LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, ReviewFeedItem>(&sql)
            .bind(business_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    async fn count_reviews_for_business(&self, business_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reviews WHERE business_id = $1")
            .bind(business_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn recent_reviews(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReviewFeedItem>, sqlx::Error> {
        let sql = format!(
            "{FEED_SELECT} WHERE b.is_banned = FALSE ORDER BY r.created_at DESC, r.id LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, ReviewFeedItem>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
    }

    async fn count_public_reviews(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM reviews r
            JOIN businesses b ON b.id = r.business_id
            WHERE b.is_banned = FALSE
            "#,
        )
        .fetch_one(&self.pool)
        .await
    }

    async fn create_review(&self, review: Review) -> Result<Review, sqlx::Error> {
        sqlx::query_as::<_, Review>(
            r#"
            INSERT INTO reviews (id, business_id, reviewer_id, rating, comment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, business_id, reviewer_id, rating, comment, created_at
            "#,
        )
        .bind(review.id)
        .bind(review.business_id)
        .bind(review.reviewer_id)
        .bind(review.rating)
        .bind(review.comment)
        .bind(review.created_at)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>, sqlx::Error> {
        sqlx::query_as::<_, Review>(
            r#"
            SELECT id, business_id, reviewer_id, rating, comment, created_at
            FROM reviews
            WHERE id = $1
            "#,
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    async fn moderation_stats(&self) -> Result<ModerationStats, sqlx::Error> {
        let (business_count, banned_business_count, review_count, category_count) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM businesses),
                    (SELECT COUNT(*) FROM businesses WHERE is_banned = TRUE),
                    (SELECT COUNT(*) FROM reviews),
                    (SELECT COUNT(*) FROM categories)
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(ModerationStats {
            business_count,
            banned_business_count,
            review_count,
            category_count,
        })
    }
}

async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = database_url.parse()?;
    let database_name = options
        .get_database()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "postgres".to_string());

    // Already pointed at the maintenance database.
    if database_name.eq_ignore_ascii_case("postgres") {
        return Ok(());
    }

    let maintenance_options = options.clone().database("postgres");
    let mut connection = sqlx::postgres::PgConnection::connect_with(&maintenance_options).await?;

    let escaped_name = database_name.replace('"', "\"\"");
    let create_stmt = format!("CREATE DATABASE \"{}\"", escaped_name);

    match connection.execute(create_stmt.as_str()).await {
        Ok(_) => {
            log::info!("Created database '{}'", database_name);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("42P04")) => {
            log::info!("Database '{}' already exists", database_name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}
