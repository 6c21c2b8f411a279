//! Storefront resources and the queries that select them.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub brand_id: u64,
    /// Decimal price as the backend formats it, e.g. "19.90".
    pub price: String,
    pub in_stock: bool,
}

impl CacheEntity for Product {
    fn cache_prefix() -> &'static str {
        "catalog"
    }

    fn validate(&self) -> Result<()> {
        if self.id == 0 {
            return Err(Error::ValidationError("product id must be non-zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Brand {
    pub id: u64,
    pub name: String,
    pub slug: String,
    /// Number of published products carrying the brand.
    pub count: u32,
}

impl CacheEntity for Brand {
    fn cache_prefix() -> &'static str {
        "brand"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTerm {
    pub id: u64,
    pub attribute_id: u64,
    pub name: String,
    pub slug: String,
}

impl CacheEntity for AttributeTerm {
    fn cache_prefix() -> &'static str {
        "attribute"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub excerpt: String,
    /// RFC 3339 publication date.
    pub published_at: String,
}

impl CacheEntity for BlogPost {
    fn cache_prefix() -> &'static str {
        "blog"
    }

    fn validate(&self) -> Result<()> {
        if self.slug.is_empty() {
            return Err(Error::ValidationError(format!("blog post {} has no slug", self.id)));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// One page of a brand's products.
///
/// `filters` maps an attribute slug to the selected term slugs. The order of
/// the selected terms carries no meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandProductsQuery {
    #[serde(skip)]
    pub brand_id: u64,
    pub page: u32,
    pub per_page: u32,
    pub orderby: String,
    pub order: SortOrder,
    pub filters: BTreeMap<String, Vec<String>>,
}

impl BrandProductsQuery {
    pub fn new(brand_id: u64) -> Self {
        BrandProductsQuery {
            brand_id,
            page: 1,
            per_page: 24,
            orderby: "date".to_string(),
            order: SortOrder::default(),
            filters: BTreeMap::new(),
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn order_by(mut self, orderby: impl Into<String>, order: SortOrder) -> Self {
        self.orderby = orderby.into();
        self.order = order;
        self
    }

    /// Select more terms of `attribute`.
    pub fn filter<I, T>(mut self, attribute: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.filters
            .entry(attribute.into())
            .or_default()
            .extend(terms.into_iter().map(Into::into));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogQuery {
    pub page: u32,
    pub per_page: u32,
}

impl Default for BlogQuery {
    fn default() -> Self {
        BlogQuery {
            page: 1,
            per_page: 10,
        }
    }
}
