//! Product listing: query-string filters and ordering.
//!
//! All supplied filters are combined with AND. Empty values count as absent,
//! unknown parameters are ignored, and a recognised parameter with an
//! unparsable value is a 400 naming that parameter.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, SimpleExpr},
    ColumnTrait, DatabaseConnection, EntityTrait, Order, QueryFilter, QueryOrder, Select,
};
use serde::Deserialize;
use tracing::{debug, instrument};
use utoipa::IntoParams;

use super::Query;
use crate::entities::product::{self, Entity as Product};
use crate::errors::{FieldErrors, ServiceError};

const LIKE_ESCAPE: char = '\\';

/// Query-string parameters accepted by `GET /products/`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListParams {
    /// Case-insensitive substring of the product name
    pub name: Option<String>,
    /// Inclusive lower price bound
    pub min_price: Option<String>,
    /// Inclusive upper price bound
    pub max_price: Option<String>,
    /// Category id
    pub category: Option<String>,
    /// `true`: in stock, `false`: out of stock
    pub available: Option<String>,
    /// Featured flag
    pub is_featured: Option<String>,
    /// One of name, price, stock_quantity, created_at; prefix `-` for descending
    pub ordering: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProductSortField {
    Name,
    Price,
    StockQuantity,
    CreatedAt,
}

impl ProductSortField {
    fn column(self) -> product::Column {
        match self {
            Self::Name => product::Column::Name,
            Self::Price => product::Column::Price,
            Self::StockQuantity => product::Column::StockQuantity,
            Self::CreatedAt => product::Column::CreatedAt,
        }
    }
}

impl FromStr for ProductSortField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "price" => Ok(Self::Price),
            "stock_quantity" => Ok(Self::StockQuantity),
            "created_at" => Ok(Self::CreatedAt),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProductOrdering {
    pub field: ProductSortField,
    pub descending: bool,
}

impl Default for ProductOrdering {
    fn default() -> Self {
        Self {
            field: ProductSortField::Name,
            descending: false,
        }
    }
}

impl ProductOrdering {
    /// Parses `price` or `-price`. Anything unrecognised falls back to the
    /// default (name ascending).
    pub fn parse(raw: &str) -> ProductOrdering {
        let raw = raw.trim();
        let (descending, name) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        name.parse()
            .map(|field| ProductOrdering { field, descending })
            .unwrap_or_default()
    }
}

/// Parsed, validated listing request
#[derive(Clone, Debug, PartialEq)]
pub struct ListProductsQuery {
    pub name: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub category: Option<i32>,
    pub available: Option<bool>,
    pub is_featured: Option<bool>,
    pub ordering: ProductOrdering,
}

impl Default for ListProductsQuery {
    fn default() -> Self {
        Self {
            name: None,
            min_price: None,
            max_price: None,
            category: None,
            available: None,
            is_featured: None,
            ordering: ProductOrdering::default(),
        }
    }
}

fn present<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Both sides are folded by the database so stored and searched text go
/// through the same `LOWER`.
fn name_contains(needle: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(needle));
    Expr::cust_with_values(
        r#"LOWER("name") LIKE LOWER(?) ESCAPE '\'"#,
        [pattern],
    )
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

impl ListProductsQuery {
    /// Build from raw query-string pairs, collecting every malformed value.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ServiceError> {
        let mut errors = FieldErrors::new();
        let mut reject = |field: &str, message: &str| {
            errors
                .entry(field.to_string())
                .or_default()
                .push(message.to_string());
        };

        let mut decimal = |field: &str| -> Option<Decimal> {
            let raw = present(params, field)?;
            match Decimal::from_str(raw) {
                Ok(value) => Some(value),
                Err(_) => {
                    reject(field, "Enter a number.");
                    None
                }
            }
        };
        let min_price = decimal("min_price");
        let max_price = decimal("max_price");

        let category = present(params, "category").and_then(|raw| match raw.parse::<i32>() {
            Ok(value) => Some(value),
            Err(_) => {
                reject("category", "Enter a whole number.");
                None
            }
        });

        let mut boolean = |field: &str| -> Option<bool> {
            let raw = present(params, field)?;
            let parsed = parse_bool(raw);
            if parsed.is_none() {
                reject(field, "Enter true or false.");
            }
            parsed
        };
        let available = boolean("available");
        let is_featured = boolean("is_featured");

        if !errors.is_empty() {
            return Err(ServiceError::InvalidFields(errors));
        }

        Ok(Self {
            name: present(params, "name").map(str::to_string),
            min_price,
            max_price,
            category,
            available,
            is_featured,
            ordering: present(params, "ordering")
                .map(ProductOrdering::parse)
                .unwrap_or_default(),
        })
    }

    /// Apply filters and ordering to a product select.
    pub fn apply(&self, mut select: Select<Product>) -> Select<Product> {
        if let Some(name) = &self.name {
            select = select.filter(name_contains(name));
        }
        if let Some(min_price) = self.min_price {
            select = select.filter(product::Column::Price.gte(min_price));
        }
        if let Some(max_price) = self.max_price {
            select = select.filter(product::Column::Price.lte(max_price));
        }
        if let Some(category) = self.category {
            select = select.filter(product::Column::CategoryId.eq(category));
        }
        match self.available {
            Some(true) => select = select.filter(product::Column::StockQuantity.gt(0)),
            Some(false) => select = select.filter(product::Column::StockQuantity.eq(0)),
            None => {}
        }
        if let Some(is_featured) = self.is_featured {
            select = select.filter(product::Column::IsFeatured.eq(is_featured));
        }

        let order = if self.ordering.descending {
            Order::Desc
        } else {
            Order::Asc
        };
        select
            .order_by(self.ordering.field.column(), order)
            .order_by_asc(product::Column::Id)
    }
}

#[async_trait]
impl Query for ListProductsQuery {
    type Result = Vec<product::Model>;

    #[instrument(skip(self, db))]
    async fn execute(&self, db: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        debug!(query = ?self, "Executing ListProductsQuery");
        self.apply(Product::find())
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}
