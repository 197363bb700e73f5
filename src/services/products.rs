use crate::{
    entities::{category::Entity as Category, product, Product, ProductModel},
    errors::ServiceError,
    queries::{ListProductsQuery, Query},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const DUPLICATE_NAME: &str = "product with this name already exists.";

/// Input for creating a product
#[derive(Debug, Clone)]
pub struct CreateProductInput {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub image_url: Option<String>,
    pub is_featured: bool,
    pub category_id: Option<i32>,
}

/// Input for updating a product. Outer `None` leaves a field untouched;
/// `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default)]
pub struct UpdateProductInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub image_url: Option<Option<String>>,
    pub is_featured: Option<bool>,
    pub category_id: Option<Option<i32>>,
}

/// Product store operations, including the stock-decrementing purchase
#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &ListProductsQuery) -> Result<Vec<ProductModel>, ServiceError> {
        query.execute(&self.db).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: CreateProductInput) -> Result<ProductModel, ServiceError> {
        self.ensure_unique_name(&input.name, None).await?;
        if let Some(category_id) = input.category_id {
            self.ensure_category_exists(category_id).await?;
        }

        let now = Utc::now();
        let product = product::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            stock_quantity: Set(input.stock_quantity),
            image_url: Set(input.image_url),
            is_featured: Set(input.is_featured),
            category_id: Set(input.category_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::unique_violation(e, "name", DUPLICATE_NAME))?;

        info!(product_id = product.id, "Created product");
        Ok(product)
    }

    /// Applies the supplied fields. Stock set here is not checked against
    /// purchases; this is the restock path.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: i32,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let existing = self.get(id).await?;

        if let Some(ref name) = input.name {
            self.ensure_unique_name(name, Some(id)).await?;
        }
        if let Some(Some(category_id)) = input.category_id {
            self.ensure_category_exists(category_id).await?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(stock_quantity) = input.stock_quantity {
            active.stock_quantity = Set(stock_quantity);
        }
        if let Some(image_url) = input.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(is_featured) = input.is_featured {
            active.is_featured = Set(is_featured);
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        active.updated_at = Set(Utc::now());

        let product = active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::unique_violation(e, "name", DUPLICATE_NAME))?;

        info!(product_id = id, "Updated product");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        info!(product_id = id, "Deleted product");
        Ok(())
    }

    /// Decrements stock by `quantity` in one conditional UPDATE, so concurrent
    /// purchases can never oversell. `quantity` must already be positive.
    #[instrument(skip(self))]
    pub async fn purchase(&self, id: i32, quantity: i64) -> Result<ProductModel, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                QUANTITY_NOT_POSITIVE.to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let result = Product::update_many()
            .col_expr(
                product::Column::StockQuantity,
                Expr::col(product::Column::StockQuantity).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(id))
            .filter(product::Column::StockQuantity.gte(quantity))
            .exec(&txn)
            .await?;

        let current = Product::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            warn!(
                product_id = id,
                requested = quantity,
                available = current.stock_quantity,
                "Purchase rejected: insufficient stock"
            );
            return Err(insufficient_stock(current.stock_quantity));
        }

        txn.commit().await?;
        info!(
            product_id = id,
            quantity,
            remaining = current.stock_quantity,
            "Purchased product"
        );
        Ok(current)
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        exclude_id: Option<i32>,
    ) -> Result<(), ServiceError> {
        let mut query = Product::find().filter(product::Column::Name.eq(name));
        if let Some(id) = exclude_id {
            query = query.filter(product::Column::Id.ne(id));
        }

        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::field("name", DUPLICATE_NAME));
        }

        Ok(())
    }

    async fn ensure_category_exists(&self, category_id: i32) -> Result<(), ServiceError> {
        if Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::field(
                "category",
                format!("Invalid pk \"{}\" - object does not exist.", category_id),
            ));
        }
        Ok(())
    }
}

pub const QUANTITY_REQUIRED: &str = "Quantity is required.";
pub const QUANTITY_NOT_INTEGER: &str = "Quantity must be an integer.";
pub const QUANTITY_NOT_POSITIVE: &str = "Quantity must be a positive integer.";

pub fn insufficient_stock(available: i32) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "Not enough stock. Only {} available.",
        available
    ))
}

/// Reads `quantity` from a purchase body: a JSON integer or a string holding one.
pub fn purchase_quantity(body: &serde_json::Value) -> Result<i64, ServiceError> {
    use serde_json::Value;

    let quantity = match body.get("quantity") {
        None | Some(Value::Null) => {
            return Err(ServiceError::ValidationError(QUANTITY_REQUIRED.to_string()))
        }
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| ServiceError::ValidationError(QUANTITY_NOT_INTEGER.to_string()))?;

    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            QUANTITY_NOT_POSITIVE.to_string(),
        ));
    }
    Ok(quantity)
}
