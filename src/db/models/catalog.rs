//! Menu categories and products.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    /// Stored file name of the uploaded icon
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Category {
    pub async fn create<'e, E>(
        db: E,
        name: &str,
        slug: &str,
        icon: Option<&str>,
    ) -> Result<Category, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now();

        sqlx::query_as(
            r#"
            INSERT INTO categories (id, name, slug, icon, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(name)
        .bind(slug)
        .bind(icon)
        .bind(&now)
        .bind(&now)
        .fetch_one(db)
        .await
    }

    pub async fn get_by_slug<'e, E>(db: E, slug: &str) -> Result<Option<Category>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM categories WHERE slug = ?")
            .bind(slug)
            .fetch_optional(db)
            .await
    }

    pub async fn list_active<'e, E>(db: E) -> Result<Vec<Category>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM categories WHERE is_active = 1 ORDER BY name ASC")
            .fetch_all(db)
            .await
    }

    pub async fn product_count<'e, E>(db: E, id: &str) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE category_id = ?")
            .bind(id)
            .fetch_one(db)
            .await?;
        Ok(count)
    }

    pub async fn delete<'e, E>(db: E, id: &str) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl Product {
    pub async fn create<'e, E>(
        db: E,
        category_id: &str,
        name: &str,
        slug: &str,
    ) -> Result<Product, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let now = crate::db::now();

        sqlx::query_as(
            r#"
            INSERT INTO products (id, category_id, name, slug, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(category_id)
        .bind(name)
        .bind(slug)
        .bind(&now)
        .bind(&now)
        .fetch_one(db)
        .await
    }

    pub async fn get_by_slug<'e, E>(db: E, slug: &str) -> Result<Option<Product>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as("SELECT * FROM products WHERE slug = ?")
            .bind(slug)
            .fetch_optional(db)
            .await
    }

    pub async fn list_active_in_category<'e, E>(
        db: E,
        category_id: &str,
    ) -> Result<Vec<Product>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as(
            "SELECT * FROM products WHERE category_id = ? AND is_active = 1 ORDER BY name ASC",
        )
        .bind(category_id)
        .fetch_all(db)
        .await
    }

    pub async fn set_active<'e, E>(db: E, id: &str, is_active: bool) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("UPDATE products SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(crate::db::now())
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    #[tokio::test]
    async fn test_category_slug_is_unique() {
        let pool = init_in_memory().await.unwrap();
        Category::create(&pool, "Hot Drinks", "hot-drinks", None)
            .await
            .unwrap();
        let dup = Category::create(&pool, "Hot drinks", "hot-drinks", None).await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_category_with_products_cannot_be_deleted() {
        let pool = init_in_memory().await.unwrap();
        let category = Category::create(&pool, "Cakes", "cakes", Some("cakes.png"))
            .await
            .unwrap();
        Product::create(&pool, &category.id, "Cheesecake", "cheesecake")
            .await
            .unwrap();

        assert_eq!(Category::product_count(&pool, &category.id).await.unwrap(), 1);
        assert!(Category::delete(&pool, &category.id).await.is_err());
    }

    #[tokio::test]
    async fn test_inactive_products_hidden_from_listing() {
        let pool = init_in_memory().await.unwrap();
        let category = Category::create(&pool, "Coffee", "coffee", None)
            .await
            .unwrap();
        let latte = Product::create(&pool, &category.id, "Latte", "latte")
            .await
            .unwrap();
        Product::create(&pool, &category.id, "Espresso", "espresso")
            .await
            .unwrap();
        Product::set_active(&pool, &latte.id, false).await.unwrap();

        let listed = Product::list_active_in_category(&pool, &category.id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "espresso");
    }
}
