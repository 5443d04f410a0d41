use crate::{
    auth::user,
    db::{stale_write_error, unique_violation_error, DbPool},
    entities::{customer, order},
    errors::ServiceError,
    services::{contains_ignore_case, page_window, search_term},
    PaginatedResponse,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use validator::Validate;

/// Fields accepted when creating or replacing a customer record.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomerInput {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(
        email(message = "Email must be a valid address"),
        length(max = 256, message = "Email cannot exceed 256 characters")
    )]
    pub email: String,
    #[validate(length(max = 15, message = "Phone number cannot exceed 15 characters"))]
    pub phone_number: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub address: Option<String>,
}

/// A customer with every order that references it, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerWithOrders {
    #[serde(flatten)]
    pub customer: customer::Model,
    pub orders: Vec<order::Model>,
}

/// Legacy customer records. Emails are unique across customers.
#[derive(Debug, Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create_customer(
        &self,
        input: CustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;
        let email = input.email.trim().to_lowercase();
        self.ensure_email_free(&email, None).await?;

        let model = customer::ActiveModel {
            name: Set(input.name.trim().to_string()),
            email: Set(email),
            phone_number: Set(input.phone_number),
            address: Set(input.address),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create customer");
            unique_violation_error(e, "email", DUPLICATE_EMAIL)
        })?;

        info!(customer_id = model.id, "Customer created");
        Ok(model)
    }

    pub async fn get_customer(&self, id: i32) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| customer_not_found(id))
    }

    pub async fn get_with_orders(&self, id: i32) -> Result<CustomerWithOrders, ServiceError> {
        let customer = self.get_customer(id).await?;
        let orders = customer
            .find_related(order::Entity)
            .order_by_desc(order::Column::OrderDate)
            .order_by_desc(order::Column::Id)
            .all(&*self.db)
            .await?;
        Ok(CustomerWithOrders { customer, orders })
    }

    /// Customers ordered by name. A non-blank `term` must occur in the name,
    /// email or phone number, ignoring case.
    pub async fn search(
        &self,
        term: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<PaginatedResponse<customer::Model>, ServiceError> {
        let (page, page_size) = page_window(page, page_size);
        let mut query = customer::Entity::find();
        if let Some(term) = search_term(term) {
            query = query.filter(
                Condition::any()
                    .add(contains_ignore_case(customer::Column::Name, term))
                    .add(contains_ignore_case(customer::Column::Email, term))
                    .add(contains_ignore_case(customer::Column::PhoneNumber, term)),
            );
        }

        let paginator = query
            .order_by_asc(customer::Column::Name)
            .order_by_asc(customer::Column::Id)
            .paginate(&*self.db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;
        Ok(PaginatedResponse::new(items, total, page, page_size))
    }

    #[instrument(skip(self, input), fields(customer_id = id))]
    pub async fn update_customer(
        &self,
        id: i32,
        input: CustomerInput,
    ) -> Result<customer::Model, ServiceError> {
        input.validate()?;
        let existing = self.get_customer(id).await?;
        let email = input.email.trim().to_lowercase();
        self.ensure_email_free(&email, Some(id)).await?;

        let mut active: customer::ActiveModel = existing.into();
        active.name = Set(input.name.trim().to_string());
        active.email = Set(email);
        active.phone_number = Set(input.phone_number);
        active.address = Set(input.address);

        match active.update(&*self.db).await {
            Ok(model) => {
                info!(customer_id = id, "Customer updated");
                Ok(model)
            }
            Err(DbErr::RecordNotUpdated) => {
                let still_exists = customer::Entity::find_by_id(id)
                    .one(&*self.db)
                    .await?
                    .is_some();
                Err(stale_write_error("Customer", id, still_exists))
            }
            Err(e) => Err(unique_violation_error(e, "email", DUPLICATE_EMAIL)),
        }
    }

    /// Deletes a customer. Orders and accounts pointing at it keep existing
    /// with the link cleared. Returns how many orders were detached.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, id: i32) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        customer::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| customer_not_found(id))?;

        let detached = order::Entity::update_many()
            .col_expr(order::Column::CustomerId, Expr::value(Option::<i32>::None))
            .filter(order::Column::CustomerId.eq(id))
            .exec(&txn)
            .await?
            .rows_affected;

        user::Entity::update_many()
            .col_expr(user::Column::CustomerId, Expr::value(Option::<i32>::None))
            .filter(user::Column::CustomerId.eq(id))
            .exec(&txn)
            .await?;

        customer::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, customer_id = id, "Failed to commit customer deletion");
            ServiceError::DatabaseError(e)
        })?;

        info!(customer_id = id, detached_orders = detached, "Customer deleted");
        Ok(detached)
    }

    pub async fn count_customers(&self) -> Result<u64, ServiceError> {
        Ok(customer::Entity::find().count(&*self.db).await?)
    }

    async fn ensure_email_free(&self, email: &str, except: Option<i32>) -> Result<(), ServiceError> {
        let mut query = customer::Entity::find().filter(customer::Column::Email.eq(email));
        if let Some(id) = except {
            query = query.filter(customer::Column::Id.ne(id));
        }
        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::invalid_field("email", DUPLICATE_EMAIL));
        }
        Ok(())
    }
}

const DUPLICATE_EMAIL: &str = "A customer with this email already exists";

fn customer_not_found(id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Customer {} not found", id))
}
