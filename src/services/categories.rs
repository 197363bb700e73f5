use crate::{
    entities::{category, product, Category, CategoryModel, Product},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};

pub const DUPLICATE_NAME: &str = "category with this name already exists.";

/// Input for creating a category
#[derive(Debug, Clone)]
pub struct CreateCategoryInput {
    pub name: String,
    pub description: Option<String>,
}

/// Input for updating a category. `description: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

/// Category store operations
#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All categories by name
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::Name)
            .order_by_asc(category::Column::Id)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: i32) -> Result<CategoryModel, ServiceError> {
        Category::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: CreateCategoryInput) -> Result<CategoryModel, ServiceError> {
        self.ensure_unique_name(&input.name, None).await?;

        let now = Utc::now();
        let category = category::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| ServiceError::unique_violation(e, "name", DUPLICATE_NAME))?;

        info!(category_id = category.id, "Created category");
        Ok(category)
    }

    #[instrument(skip(self))]
    pub async fn update(
        &self,
        id: i32,
        input: UpdateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        if let Some(ref name) = input.name {
            self.ensure_unique_name(name, Some(id)).await?;
        }

        let existing = self.get(id).await?;
        let mut active: category::ActiveModel = existing.into();

        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(description);
        }
        active.updated_at = Set(Utc::now());

        let category = active
            .update(&*self.db)
            .await
            .map_err(|e| ServiceError::unique_violation(e, "name", DUPLICATE_NAME))?;

        info!(category_id = id, "Updated category");
        Ok(category)
    }

    /// Deletes the category; products pointing at it are detached, not removed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let detached = Product::update_many()
            .col_expr(product::Column::CategoryId, Expr::value(Option::<i32>::None))
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::CategoryId.eq(id))
            .exec(&txn)
            .await?;

        let result = Category::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::NotFound(format!("Category {} not found", id)));
        }

        txn.commit().await?;
        info!(
            category_id = id,
            detached_products = detached.rows_affected,
            "Deleted category"
        );
        Ok(())
    }

    async fn ensure_unique_name(
        &self,
        name: &str,
        exclude_id: Option<i32>,
    ) -> Result<(), ServiceError> {
        let mut query = Category::find().filter(category::Column::Name.eq(name));
        if let Some(id) = exclude_id {
            query = query.filter(category::Column::Id.ne(id));
        }

        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::field("name", DUPLICATE_NAME));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::migrated_pool;

    async fn service() -> (CategoryService, Arc<DatabaseConnection>) {
        let conn = Arc::new(migrated_pool().await);
        (CategoryService::new(conn.clone()), conn)
    }

    fn input(name: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn duplicate_name_is_a_field_error() {
        let (svc, _) = service().await;
        svc.create(input("Books")).await.unwrap();

        match svc.create(input("Books")).await.unwrap_err() {
            ServiceError::InvalidFields(fields) => {
                assert_eq!(fields["name"], vec![DUPLICATE_NAME.to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_may_keep_its_own_name() {
        let (svc, _) = service().await;
        let created = svc.create(input("Books")).await.unwrap();

        let updated = svc
            .update(
                created.id,
                UpdateCategoryInput {
                    name: Some("Books".into()),
                    description: Some(Some("Paper".into())),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.description.as_deref(), Some("Paper"));
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
    }

    #[tokio::test]
    async fn delete_detaches_products() {
        let (svc, conn) = service().await;
        let books = svc.create(input("Books")).await.unwrap();
        let now = Utc::now();
        let novel = product::ActiveModel {
            name: Set("Novel".into()),
            price: Set(rust_decimal::Decimal::new(1000, 2)),
            stock_quantity: Set(1),
            is_featured: Set(false),
            category_id: Set(Some(books.id)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*conn)
        .await
        .unwrap();

        svc.delete(books.id).await.unwrap();

        let reloaded = Product::find_by_id(novel.id)
            .one(&*conn)
            .await
            .unwrap()
            .expect("product survives category deletion");
        assert_eq!(reloaded.category_id, None);
        assert!(matches!(
            svc.get(books.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_unknown_is_not_found() {
        let (svc, _) = service().await;
        assert!(matches!(
            svc.delete(42).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
