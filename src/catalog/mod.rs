//! Menu catalog and price history.
//!
//! A product's current price is never stored. It is derived on every read
//! from the append-only `prices` ledger: the newest row that is still active.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::config::CatalogConfig;
use crate::db::{Category, DbPool, Price, Product};

const MAX_NAME_LEN: usize = 60;
const MAX_SLUG_LEN: usize = 60;

lazy_static! {
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();

    /// DECIMAL(10,2): eight integer digits at most
    static ref MAX_AMOUNT: Decimal = Decimal::new(100_000_000, 0);
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("slug '{0}' is already taken")]
    SlugTaken(String),

    #[error("category '{0}' still has products")]
    InUse(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CatalogError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        CatalogError::Invalid {
            field,
            message: message.into(),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Derive a URL slug: lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Field rules for catalog entries, built from `CatalogConfig`.
#[derive(Debug, Clone)]
pub struct CatalogRules {
    pub icon_max_bytes: u64,
    pub allowed_icon_extensions: Vec<String>,
}

impl Default for CatalogRules {
    fn default() -> Self {
        Self::from(&CatalogConfig::default())
    }
}

impl From<&CatalogConfig> for CatalogRules {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            icon_max_bytes: config.icon_max_size_mb * 1024 * 1024,
            allowed_icon_extensions: config
                .allowed_icon_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
        }
    }
}

impl CatalogRules {
    pub fn validate_name(&self, name: &str) -> Result<(), CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::invalid("name", "Name is required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CatalogError::invalid(
                "name",
                format!("Name is too long (max {} characters)", MAX_NAME_LEN),
            ));
        }
        Ok(())
    }

    pub fn validate_slug(&self, slug: &str) -> Result<(), CatalogError> {
        if slug.is_empty() {
            return Err(CatalogError::invalid("slug", "Slug is required"));
        }
        if slug.len() > MAX_SLUG_LEN {
            return Err(CatalogError::invalid(
                "slug",
                format!("Slug is too long (max {} characters)", MAX_SLUG_LEN),
            ));
        }
        if !SLUG_REGEX.is_match(slug) {
            return Err(CatalogError::invalid(
                "slug",
                "Slug may only contain lowercase letters, digits and single dashes",
            ));
        }
        Ok(())
    }

    /// Check an uploaded icon by file name and size.
    pub fn validate_icon(&self, file_name: &str, size_bytes: u64) -> Result<(), CatalogError> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        if !self.allowed_icon_extensions.contains(&extension) {
            return Err(CatalogError::invalid(
                "icon",
                format!(
                    "Unsupported icon type (allowed: {})",
                    self.allowed_icon_extensions.join(", ")
                ),
            ));
        }
        if size_bytes > self.icon_max_bytes {
            return Err(CatalogError::invalid(
                "icon",
                format!(
                    "Icon is too large (max {} MB)",
                    self.icon_max_bytes / (1024 * 1024)
                ),
            ));
        }
        Ok(())
    }

    /// Amounts fit DECIMAL(10,2) and are never negative.
    pub fn validate_amount(&self, amount: Decimal) -> Result<(), CatalogError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(CatalogError::invalid("amount", "Amount cannot be negative"));
        }
        if amount.normalize().scale() > 2 {
            return Err(CatalogError::invalid(
                "amount",
                "Amount may have at most 2 decimal places",
            ));
        }
        if amount >= *MAX_AMOUNT {
            return Err(CatalogError::invalid(
                "amount",
                "Amount may have at most 8 integer digits",
            ));
        }
        Ok(())
    }

    fn resolve_slug(&self, name: &str, slug: Option<&str>) -> Result<String, CatalogError> {
        let slug = match slug {
            Some(s) => s.trim().to_string(),
            None => slugify(name),
        };
        self.validate_slug(&slug)?;
        Ok(slug)
    }
}

/// Icon reference for a new category. The file itself is stored elsewhere.
#[derive(Debug, Clone)]
pub struct IconUpload {
    pub file_name: String,
    pub size_bytes: u64,
}

/// The price ledger for all products.
#[derive(Clone)]
pub struct PriceHistory {
    db: DbPool,
    rules: CatalogRules,
}

impl PriceHistory {
    pub fn new(db: DbPool, rules: CatalogRules) -> Self {
        Self { db, rules }
    }

    /// Append a new active price point. Older rows stay active.
    pub async fn record_price(&self, product_id: &str, amount: Decimal) -> Result<Price, CatalogError> {
        self.rules.validate_amount(amount)?;
        let mut amount = amount;
        amount.rescale(2);
        Ok(Price::insert(&self.db, product_id, amount).await?)
    }

    /// Amount of the newest active price, if any
    pub async fn current_price(&self, product_id: &str) -> Result<Option<Decimal>, CatalogError> {
        Ok(Price::latest_active(&self.db, product_id)
            .await?
            .map(|price| price.amount))
    }

    /// Append a row only when the amount differs from the current price.
    /// Returns the new row, or None when nothing changed.
    pub async fn set_price_if_changed(
        &self,
        product_id: &str,
        amount: Decimal,
    ) -> Result<Option<Price>, CatalogError> {
        self.rules.validate_amount(amount)?;
        let mut amount = amount;
        amount.rescale(2);

        let mut tx = self.db.begin().await?;
        let current = Price::latest_active(&mut *tx, product_id).await?;
        if current.as_ref().map(|p| p.amount) == Some(amount) {
            tx.commit().await?;
            return Ok(None);
        }
        let price = Price::insert(&mut *tx, product_id, amount).await?;
        tx.commit().await?;

        info!(
            product_id = %product_id,
            amount = %price.amount,
            "Price changed"
        );
        Ok(Some(price))
    }

    pub async fn history(&self, product_id: &str) -> Result<Vec<Price>, CatalogError> {
        Ok(Price::list_for_product(&self.db, product_id).await?)
    }

    /// Toggle the only mutable column of a price row.
    pub async fn set_active(&self, price_id: &str, is_active: bool) -> Result<Price, CatalogError> {
        Price::set_active(&self.db, price_id, is_active)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("price {}", price_id)))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuProduct {
    pub name: String,
    pub slug: String,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuCategory {
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub products: Vec<MenuProduct>,
}

/// Category and product management plus the public menu view.
#[derive(Clone)]
pub struct Catalog {
    db: DbPool,
    rules: CatalogRules,
    prices: PriceHistory,
}

impl Catalog {
    pub fn new(db: DbPool, rules: CatalogRules) -> Self {
        let prices = PriceHistory::new(db.clone(), rules.clone());
        Self { db, rules, prices }
    }

    pub fn prices(&self) -> &PriceHistory {
        &self.prices
    }

    pub async fn create_category(
        &self,
        name: &str,
        slug: Option<&str>,
        icon: Option<&IconUpload>,
    ) -> Result<Category, CatalogError> {
        self.rules.validate_name(name)?;
        let slug = self.rules.resolve_slug(name, slug)?;
        if let Some(icon) = icon {
            self.rules.validate_icon(&icon.file_name, icon.size_bytes)?;
        }

        Category::create(
            &self.db,
            name.trim(),
            &slug,
            icon.map(|i| i.file_name.as_str()),
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CatalogError::SlugTaken(slug.clone())
            } else {
                CatalogError::Database(e)
            }
        })
    }

    pub async fn create_product(
        &self,
        category_slug: &str,
        name: &str,
        slug: Option<&str>,
    ) -> Result<Product, CatalogError> {
        self.rules.validate_name(name)?;
        let slug = self.rules.resolve_slug(name, slug)?;
        let category = Category::get_by_slug(&self.db, category_slug)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("category {}", category_slug)))?;

        Product::create(&self.db, &category.id, name.trim(), &slug)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    CatalogError::SlugTaken(slug.clone())
                } else {
                    CatalogError::Database(e)
                }
            })
    }

    pub async fn product(&self, slug: &str) -> Result<Product, CatalogError> {
        Product::get_by_slug(&self.db, slug)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("product {}", slug)))
    }

    /// Products restrict category deletion.
    pub async fn delete_category(&self, slug: &str) -> Result<(), CatalogError> {
        let category = Category::get_by_slug(&self.db, slug)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("category {}", slug)))?;

        let mut tx = self.db.begin().await?;
        if Category::product_count(&mut *tx, &category.id).await? > 0 {
            return Err(CatalogError::InUse(slug.to_string()));
        }
        Category::delete(&mut *tx, &category.id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn menu_entry(&self, category: Category) -> Result<MenuCategory, CatalogError> {
        let products = Product::list_active_in_category(&self.db, &category.id).await?;
        let mut entries = Vec::with_capacity(products.len());
        for product in products {
            let price = self.prices.current_price(&product.id).await?;
            entries.push(MenuProduct {
                name: product.name,
                slug: product.slug,
                price,
            });
        }
        Ok(MenuCategory {
            name: category.name,
            slug: category.slug,
            icon: category.icon,
            products: entries,
        })
    }

    /// Active categories with their active products and current prices
    pub async fn menu(&self) -> Result<Vec<MenuCategory>, CatalogError> {
        let categories = Category::list_active(&self.db).await?;
        let mut menu = Vec::with_capacity(categories.len());
        for category in categories {
            menu.push(self.menu_entry(category).await?);
        }
        Ok(menu)
    }

    pub async fn menu_category(&self, slug: &str) -> Result<MenuCategory, CatalogError> {
        match Category::get_by_slug(&self.db, slug).await? {
            Some(category) if category.is_active => self.menu_entry(category).await,
            _ => Err(CatalogError::NotFound(format!("category {}", slug))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn catalog_with_product() -> (Catalog, Product) {
        let pool = init_in_memory().await.unwrap();
        let catalog = Catalog::new(pool, CatalogRules::default());
        catalog.create_category("Coffee", None, None).await.unwrap();
        let product = catalog
            .create_product("coffee", "Flat White", None)
            .await
            .unwrap();
        (catalog, product)
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hot Drinks"), "hot-drinks");
        assert_eq!(slugify("  Café -- Latte!  "), "caf-latte");
        assert_eq!(slugify("Tea (Iced)"), "tea-iced");
    }

    #[test]
    fn test_validate_slug() {
        let rules = CatalogRules::default();
        assert!(rules.validate_slug("flat-white").is_ok());
        assert!(rules.validate_slug("").is_err());
        assert!(rules.validate_slug("Flat-White").is_err());
        assert!(rules.validate_slug("flat--white").is_err());
        assert!(rules.validate_slug("-flat").is_err());
        assert!(rules.validate_slug(&"a".repeat(61)).is_err());
    }

    #[test]
    fn test_validate_icon() {
        let rules = CatalogRules::default();
        assert!(rules.validate_icon("coffee.png", 2048).is_ok());
        assert!(rules.validate_icon("coffee.JPG", 2048).is_ok());
        assert!(rules.validate_icon("coffee.gif", 2048).is_err());
        assert!(rules.validate_icon("coffee", 2048).is_err());
        assert!(rules.validate_icon("coffee.png", 2 * 1024 * 1024).is_err());
    }

    #[test]
    fn test_validate_amount() {
        let rules = CatalogRules::default();
        assert!(rules.validate_amount(dec("0")).is_ok());
        assert!(rules.validate_amount(dec("12.50")).is_ok());
        assert!(rules.validate_amount(dec("12.500")).is_ok());
        assert!(rules.validate_amount(dec("99999999.99")).is_ok());
        assert!(rules.validate_amount(dec("100000000")).is_err());
        assert!(rules.validate_amount(dec("-1")).is_err());
        assert!(rules.validate_amount(dec("1.005")).is_err());
    }

    #[tokio::test]
    async fn test_current_price_is_newest_active_row() {
        let (catalog, product) = catalog_with_product().await;
        let prices = catalog.prices();

        assert_eq!(prices.current_price(&product.id).await.unwrap(), None);

        prices.record_price(&product.id, dec("10.00")).await.unwrap();
        let second = prices.record_price(&product.id, dec("12.00")).await.unwrap();
        assert_eq!(
            prices.current_price(&product.id).await.unwrap(),
            Some(dec("12.00"))
        );

        prices.set_active(&second.id, false).await.unwrap();
        assert_eq!(
            prices.current_price(&product.id).await.unwrap(),
            Some(dec("10.00"))
        );
    }

    #[tokio::test]
    async fn test_record_price_keeps_older_rows_active() {
        let (catalog, product) = catalog_with_product().await;
        let prices = catalog.prices();

        prices.record_price(&product.id, dec("3.50")).await.unwrap();
        prices.record_price(&product.id, dec("4.00")).await.unwrap();

        let history = prices.history(&product.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|p| p.is_active));
        assert_eq!(history[0].amount, dec("4.00"));
    }

    #[tokio::test]
    async fn test_set_price_if_changed_is_idempotent() {
        let (catalog, product) = catalog_with_product().await;
        let prices = catalog.prices();

        let first = prices
            .set_price_if_changed(&product.id, dec("5.00"))
            .await
            .unwrap();
        assert!(first.is_some());

        for _ in 0..3 {
            let current = prices.current_price(&product.id).await.unwrap().unwrap();
            let again = prices
                .set_price_if_changed(&product.id, current)
                .await
                .unwrap();
            assert!(again.is_none());
        }
        // Same value written with a different scale is still unchanged
        assert!(prices
            .set_price_if_changed(&product.id, dec("5"))
            .await
            .unwrap()
            .is_none());

        assert!(prices
            .set_price_if_changed(&product.id, dec("5.25"))
            .await
            .unwrap()
            .is_some());
        assert_eq!(prices.history(&product.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_active_unknown_price() {
        let (catalog, _) = catalog_with_product().await;
        let err = catalog.prices().set_active("missing", false).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_category_in_use() {
        let (catalog, _) = catalog_with_product().await;
        let err = catalog.delete_category("coffee").await.unwrap_err();
        assert!(matches!(err, CatalogError::InUse(_)));

        catalog.create_category("Seasonal", None, None).await.unwrap();
        catalog.delete_category("seasonal").await.unwrap();
        assert!(matches!(
            catalog.menu_category("seasonal").await.unwrap_err(),
            CatalogError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_slug_reported() {
        let (catalog, _) = catalog_with_product().await;
        let err = catalog
            .create_product("coffee", "Flat white", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::SlugTaken(slug) if slug == "flat-white"));
    }

    #[tokio::test]
    async fn test_menu_shows_current_prices() {
        let (catalog, product) = catalog_with_product().await;
        catalog
            .create_product("coffee", "Cold Brew", None)
            .await
            .unwrap();
        catalog
            .prices()
            .record_price(&product.id, dec("4.20"))
            .await
            .unwrap();

        let menu = catalog.menu().await.unwrap();
        assert_eq!(menu.len(), 1);
        let coffee = &menu[0];
        assert_eq!(coffee.products.len(), 2);

        let cold_brew = coffee.products.iter().find(|p| p.slug == "cold-brew").unwrap();
        assert_eq!(cold_brew.price, None);
        let flat_white = coffee.products.iter().find(|p| p.slug == "flat-white").unwrap();
        assert_eq!(flat_white.price, Some(dec("4.20")));
    }
}
