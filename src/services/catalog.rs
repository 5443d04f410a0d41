use crate::{
    db::{stale_write_error, DbPool},
    entities::{food, order_line, MAX_MONEY},
    errors::ServiceError,
    services::{contains, contains_ignore_case, page_window, search_term},
    PaginatedResponse,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Alias, Expr, Func},
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseBackend, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::{Validate, ValidationError};

/// How `search_paged` compares the search term with names and categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchCaseMode {
    Sensitive,
    #[default]
    Insensitive,
}

impl SearchCaseMode {
    pub fn from_flag(case_sensitive: bool) -> Self {
        if case_sensitive {
            SearchCaseMode::Sensitive
        } else {
            SearchCaseMode::Insensitive
        }
    }
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        let mut err = ValidationError::new("price_negative");
        err.message = Some("Price cannot be negative".into());
        return Err(err);
    }
    if *price > MAX_MONEY {
        let mut err = ValidationError::new("price_range");
        err.message = Some(format!("Price cannot exceed {}", MAX_MONEY).into());
        return Err(err);
    }
    if price.normalize().scale() > 2 {
        let mut err = ValidationError::new("price_precision");
        err.message = Some("Price can have at most 2 decimal places".into());
        return Err(err);
    }
    Ok(())
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Fields accepted when creating or replacing a food item.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FoodInput {
    #[validate(
        length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"),
        custom = "validate_not_blank"
    )]
    pub name: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(length(max = 200, message = "Category cannot exceed 200 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 500, message = "Image URL cannot exceed 500 characters"))]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

/// Catalog of food items.
#[derive(Debug, Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    search_mode: SearchCaseMode,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, search_mode: SearchCaseMode) -> Self {
        Self { db, search_mode }
    }

    pub fn search_mode(&self) -> SearchCaseMode {
        self.search_mode
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_food(&self, input: FoodInput) -> Result<food::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let model = food::ActiveModel {
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            price: Set(input.price.round_dp(2)),
            category: Set(input.category),
            image_url: Set(input.image_url),
            is_available: Set(input.is_available),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create food item");
            ServiceError::DatabaseError(e)
        })?;

        info!(food_id = model.id, "Food item created");
        Ok(model)
    }

    pub async fn get_food(&self, id: i32) -> Result<food::Model, ServiceError> {
        food::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Food {} not found", id)))
    }

    /// Every food item, ordered by id.
    pub async fn list_all(&self) -> Result<Vec<food::Model>, ServiceError> {
        Ok(food::Entity::find()
            .order_by_asc(food::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn exists(&self, id: i32) -> Result<bool, ServiceError> {
        Ok(food::Entity::find_by_id(id).one(&*self.db).await?.is_some())
    }

    pub async fn count_foods(&self) -> Result<u64, ServiceError> {
        Ok(food::Entity::find().count(&*self.db).await?)
    }

    /// Replaces the editable fields of a food item. Existing order lines keep
    /// the price they captured.
    #[instrument(skip(self, input), fields(food_id = id))]
    pub async fn update_food(&self, id: i32, input: FoodInput) -> Result<food::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db;

        let existing = self.get_food(id).await?;
        let mut active: food::ActiveModel = existing.into();
        active.name = Set(input.name.trim().to_string());
        active.description = Set(input.description);
        active.price = Set(input.price.round_dp(2));
        active.category = Set(input.category);
        active.image_url = Set(input.image_url);
        active.is_available = Set(input.is_available);

        match active.update(db).await {
            Ok(model) => {
                info!(food_id = id, "Food item updated");
                Ok(model)
            }
            Err(DbErr::RecordNotUpdated) => {
                let still_exists = self.exists(id).await?;
                Err(stale_write_error("Food", id, still_exists))
            }
            Err(e) => Err(ServiceError::DatabaseError(e)),
        }
    }

    /// Deletes a food item that no order line references.
    #[instrument(skip(self), fields(food_id = id))]
    pub async fn delete_food(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db;
        self.get_food(id).await?;

        let references = order_line::Entity::find()
            .filter(order_line::Column::FoodId.eq(id))
            .count(db)
            .await?;
        if references > 0 {
            warn!(food_id = id, references, "Refusing to delete referenced food item");
            return Err(ServiceError::Conflict(format!(
                "Food {} is referenced by {} order line(s)",
                id, references
            )));
        }

        let result = food::Entity::delete_by_id(id).exec(db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Food {} not found", id)));
        }

        info!(food_id = id, "Food item deleted");
        Ok(())
    }

    /// One page of food items ordered by id. A non-blank `term` must occur in
    /// the name or the category.
    #[instrument(skip(self))]
    pub async fn search_paged(
        &self,
        term: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<PaginatedResponse<food::Model>, ServiceError> {
        let db = &*self.db;
        let (page, page_size) = page_window(page, page_size);

        let mut query = food::Entity::find();
        if let Some(term) = search_term(term) {
            query = query.filter(self.term_condition(db.get_database_backend(), term));
        }

        let paginator = query
            .order_by_asc(food::Column::Id)
            .paginate(db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok(PaginatedResponse::new(items, total, page, page_size))
    }

    fn term_condition(&self, backend: DatabaseBackend, term: &str) -> Condition {
        match (self.search_mode, backend) {
            (SearchCaseMode::Insensitive, _) => Condition::any()
                .add(contains_ignore_case(food::Column::Name, term))
                .add(contains_ignore_case(food::Column::Category, term)),
            // SQLite's LIKE ignores ASCII case, instr() does not.
            (SearchCaseMode::Sensitive, DatabaseBackend::Sqlite) => {
                let instr = |column: food::Column| {
                    Expr::expr(
                        Func::cust(Alias::new("instr"))
                            .arg(Expr::col(column))
                            .arg(Expr::val(term)),
                    )
                    .gt(0)
                };
                Condition::any()
                    .add(instr(food::Column::Name))
                    .add(instr(food::Column::Category))
            }
            (SearchCaseMode::Sensitive, _) => Condition::any()
                .add(contains(food::Column::Name, term))
                .add(contains(food::Column::Category, term)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(price: Decimal) -> FoodInput {
        FoodInput {
            name: "Margherita".into(),
            description: None,
            price,
            category: Some("Pizza".into()),
            image_url: None,
            is_available: true,
        }
    }

    #[test]
    fn accepts_two_decimal_prices() {
        assert!(input(dec!(12.50)).validate().is_ok());
        assert!(input(dec!(0)).validate().is_ok());
        assert!(input(dec!(7.100)).validate().is_ok());
    }

    #[test]
    fn rejects_negative_and_overly_precise_prices() {
        let errors = input(dec!(-1.00)).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));

        let errors = input(dec!(1.005)).validate().unwrap_err();
        assert!(errors.field_errors().contains_key("price"));
    }

    #[test]
    fn rejects_blank_and_long_names() {
        let mut blank = input(dec!(1));
        blank.name = "   ".into();
        assert!(blank.validate().is_err());

        let mut long = input(dec!(1));
        long.name = "x".repeat(101);
        assert!(long.validate().is_err());
    }

    #[test]
    fn case_mode_follows_flag() {
        assert_eq!(SearchCaseMode::from_flag(true), SearchCaseMode::Sensitive);
        assert_eq!(SearchCaseMode::from_flag(false), SearchCaseMode::Insensitive);
        assert_eq!(SearchCaseMode::default(), SearchCaseMode::Insensitive);
    }
}
