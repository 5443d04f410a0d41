use crate::{
    auth::user,
    db::{stale_write_error, DbPool},
    entities::{customer, food, order, order_line, OrderStatus, MAX_MONEY},
    errors::ServiceError,
    services::page_window,
    PaginatedResponse,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Request to open a new, empty order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrder {
    pub owner_id: Uuid,
    pub customer_id: Option<i32>,
    #[validate(length(max = 500, message = "Delivery address cannot exceed 500 characters"))]
    pub delivery_address: Option<String>,
    #[validate(length(max = 15, message = "Contact number cannot exceed 15 characters"))]
    pub contact_number: Option<String>,
}

/// An order line together with the name of the food it refers to.
#[derive(Debug, Clone, Serialize)]
pub struct OrderLineDetail {
    #[serde(flatten)]
    pub line: order_line::Model,
    pub food_name: Option<String>,
}

/// An order with its lines and owner.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
    pub lines: Vec<OrderLineDetail>,
}

/// An order listed with its owner.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: order::Model,
    pub owner_name: Option<String>,
    pub owner_email: Option<String>,
}

/// Order counts over some set of orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderCounts {
    pub total: u64,
    pub pending: u64,
    pub completed: u64,
}

/// Most units of one food a single line may carry.
pub const MAX_LINE_QUANTITY: i32 = 10_000;

/// `unit_price × quantity`, rounded to cents, or `None` when the result does
/// not fit a money column.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Option<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .map(|total| total.round_dp(2))
        .filter(|total| *total <= MAX_MONEY)
}

/// Sum of line totals, rounded to cents.
pub fn sum_line_totals<I>(totals: I) -> Decimal
where
    I: IntoIterator<Item = Decimal>,
{
    totals
        .into_iter()
        .fold(Decimal::ZERO, |acc, t| acc + t)
        .round_dp(2)
}

/// Owns orders and their lines. Every mutation runs in one transaction and
/// leaves `total_amount` equal to the sum of the order's line totals.
#[derive(Debug, Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    enforce_transitions: bool,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, enforce_transitions: bool) -> Self {
        Self {
            db,
            enforce_transitions,
        }
    }

    /// Opens an empty Pending order for an existing account.
    #[instrument(skip(self, request), fields(owner_id = %request.owner_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<order::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db;

        if user::Entity::find_by_id(request.owner_id)
            .one(db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "Owner account {} not found",
                request.owner_id
            )));
        }

        if let Some(customer_id) = request.customer_id {
            if customer::Entity::find_by_id(customer_id)
                .one(db)
                .await?
                .is_none()
            {
                return Err(ServiceError::NotFound(format!(
                    "Customer {} not found",
                    customer_id
                )));
            }
        }

        let now = Utc::now();
        let model = order::ActiveModel {
            user_id: Set(request.owner_id),
            customer_id: Set(request.customer_id),
            order_date: Set(now),
            total_amount: Set(Decimal::ZERO),
            status: Set(OrderStatus::Pending),
            delivery_address: Set(request.delivery_address),
            contact_number: Set(request.contact_number),
            delivered_date: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create order");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = model.id, "Order created successfully");
        Ok(model)
    }

    /// Adds a line priced at the food's current price and brings the order
    /// total up to date in the same transaction.
    #[instrument(skip(self))]
    pub async fn add_line(
        &self,
        order_id: i32,
        food_id: i32,
        quantity: i32,
    ) -> Result<order_line::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::invalid_field(
                "quantity",
                "Quantity must be greater than zero",
            ));
        }
        if quantity > MAX_LINE_QUANTITY {
            return Err(ServiceError::invalid_field(
                "quantity",
                format!("Quantity cannot exceed {}", MAX_LINE_QUANTITY),
            ));
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = find_order(&txn, order_id).await?;
        let food = food::Entity::find_by_id(food_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Food {} not found", food_id)))?;
        if !food.is_available {
            return Err(ServiceError::invalid_field(
                "food_id",
                format!("{} is not available", food.name),
            ));
        }

        let unit_price = food.price.round_dp(2);
        let amount = line_total(unit_price, quantity).ok_or_else(|| {
            ServiceError::invalid_field("quantity", "Line total exceeds the largest order amount")
        })?;
        let line = order_line::ActiveModel {
            order_id: Set(order.id),
            food_id: Set(food.id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            line_total: Set(amount),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let total = refresh_total(&txn, &order).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id, "Failed to commit order line");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id, line_id = line.id, total = %total, "Order line added");
        Ok(line)
    }

    /// Removes a line and returns its order with the reduced total.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, line_id: i32) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let line = order_line::Entity::find_by_id(line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| line_not_found(line_id))?;
        let order = find_order(&txn, line.order_id).await?;

        let deleted = order_line::Entity::delete_by_id(line.id).exec(&txn).await?;
        if deleted.rows_affected == 0 {
            return Err(line_not_found(line_id));
        }

        refresh_total(&txn, &order).await?;
        let updated = find_order(&txn, order.id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, line_id, "Failed to commit line removal");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = updated.id, line_id, total = %updated.total_amount, "Order line removed");
        Ok(updated)
    }

    /// Sets the status. Delivered stamps `delivered_date`; leaving Delivered
    /// clears it. With transition enforcement on, only forward moves and
    /// cancellation of open orders are accepted.
    #[instrument(skip(self), fields(new_status = %status))]
    pub async fn update_status(
        &self,
        order_id: i32,
        status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = find_order(&txn, order_id).await?;
        if self.enforce_transitions && !order.status.can_transition_to(status) {
            warn!(order_id, from = %order.status, to = %status, "Rejected status transition");
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from {} to {}",
                order_id, order.status, status
            )));
        }

        let now = Utc::now();
        let delivered_date = match status {
            OrderStatus::Delivered => order.delivered_date.or(Some(now)),
            _ => None,
        };

        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(status))
            .col_expr(order::Column::DeliveredDate, Expr::value(delivered_date))
            .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(now)))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Version.eq(order.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            let still_exists = order::Entity::find_by_id(order.id).one(&txn).await?.is_some();
            return Err(stale_write_error("Order", order.id, still_exists));
        }

        let updated = find_order(&txn, order.id).await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id, "Failed to commit status change");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id, from = %order.status, to = %status, "Order status updated");
        Ok(updated)
    }

    /// Deletes the order's lines, then the order. Returns how many lines
    /// were removed.
    #[instrument(skip(self))]
    pub async fn delete_order(&self, order_id: i32) -> Result<u64, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let order = find_order(&txn, order_id).await?;

        let lines_removed = order_line::Entity::delete_many()
            .filter(order_line::Column::OrderId.eq(order.id))
            .exec(&txn)
            .await?
            .rows_affected;

        let removed = order::Entity::delete_by_id(order.id).exec(&txn).await?;
        if removed.rows_affected == 0 {
            // Deleted by a concurrent request after the lookup above.
            warn!(order_id, "Order already deleted");
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id, "Failed to commit order deletion");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id, lines_removed, "Order deleted");
        Ok(lines_removed)
    }

    pub async fn get_order(&self, order_id: i32) -> Result<order::Model, ServiceError> {
        find_order(&*self.db, order_id).await
    }

    /// A line and the order it belongs to.
    pub async fn get_line(
        &self,
        line_id: i32,
    ) -> Result<(order_line::Model, order::Model), ServiceError> {
        let db = &*self.db;
        let (line, order) = order_line::Entity::find_by_id(line_id)
            .find_also_related(order::Entity)
            .one(db)
            .await?
            .ok_or_else(|| line_not_found(line_id))?;
        let order = order.ok_or_else(|| order_not_found(line.order_id))?;
        Ok((line, order))
    }

    pub async fn get_order_details(&self, order_id: i32) -> Result<OrderDetails, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;
        let owner = user::Entity::find_by_id(order.user_id).one(db).await?;
        let mut lines = self.lines_for(&[order.id]).await?;

        Ok(OrderDetails {
            lines: lines.remove(&order.id).unwrap_or_default(),
            owner_name: owner.as_ref().map(user::Model::display_name),
            owner_email: owner.map(|o| o.email),
            order,
        })
    }

    /// Lines of the given orders with their food names, grouped by order id
    /// and ordered by line id.
    pub async fn lines_for(
        &self,
        order_ids: &[i32],
    ) -> Result<HashMap<i32, Vec<OrderLineDetail>>, ServiceError> {
        let mut grouped: HashMap<i32, Vec<OrderLineDetail>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }

        let rows = order_line::Entity::find()
            .filter(order_line::Column::OrderId.is_in(order_ids.iter().copied()))
            .order_by_asc(order_line::Column::Id)
            .find_also_related(food::Entity)
            .all(&*self.db)
            .await?;

        for (line, food) in rows {
            grouped.entry(line.order_id).or_default().push(OrderLineDetail {
                food_name: food.map(|f| f.name),
                line,
            });
        }
        Ok(grouped)
    }

    /// All orders, newest first, optionally restricted to one status.
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u64,
        page_size: u64,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let mut query = order::Entity::find();
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        self.paged(query, page, page_size).await
    }

    /// Orders owned by one account, newest first.
    pub async fn list_orders_for_owner(
        &self,
        owner_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let query = order::Entity::find().filter(order::Column::UserId.eq(owner_id));
        self.paged(query, page, page_size).await
    }

    async fn paged(
        &self,
        query: Select<order::Entity>,
        page: u64,
        page_size: u64,
    ) -> Result<PaginatedResponse<order::Model>, ServiceError> {
        let (page, page_size) = page_window(page, page_size);
        let paginator = newest_first(query).paginate(&*self.db, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;
        Ok(PaginatedResponse::new(items, total, page, page_size))
    }

    /// Total, pending (not Delivered) and completed (Delivered) counts, over
    /// every order or one owner's orders.
    pub async fn order_counts(&self, owner_id: Option<Uuid>) -> Result<OrderCounts, ServiceError> {
        let db = &*self.db;
        let scoped = || {
            let query = order::Entity::find();
            match owner_id {
                Some(owner) => query.filter(order::Column::UserId.eq(owner)),
                None => query,
            }
        };

        let total = scoped().count(db).await?;
        let completed = scoped()
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .count(db)
            .await?;

        Ok(OrderCounts {
            total,
            pending: total.saturating_sub(completed),
            completed,
        })
    }

    /// Sum of `total_amount` over delivered orders.
    pub async fn delivered_revenue(&self) -> Result<Decimal, ServiceError> {
        let totals: Vec<Decimal> = order::Entity::find()
            .select_only()
            .column(order::Column::TotalAmount)
            .filter(order::Column::Status.eq(OrderStatus::Delivered))
            .into_tuple()
            .all(&*self.db)
            .await?;
        Ok(sum_line_totals(totals))
    }

    /// Most recent orders with their owners. `open_only` drops delivered
    /// orders.
    pub async fn recent_orders(
        &self,
        limit: u64,
        owner_id: Option<Uuid>,
        open_only: bool,
    ) -> Result<Vec<OrderSummary>, ServiceError> {
        let mut query = order::Entity::find();
        if let Some(owner) = owner_id {
            query = query.filter(order::Column::UserId.eq(owner));
        }
        if open_only {
            query = query.filter(order::Column::Status.ne(OrderStatus::Delivered));
        }

        let rows = newest_first(query)
            .limit(limit)
            .find_also_related(user::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(order, owner)| OrderSummary {
                owner_name: owner.as_ref().map(user::Model::display_name),
                owner_email: owner.map(|o| o.email),
                order,
            })
            .collect())
    }
}

fn newest_first(query: Select<order::Entity>) -> Select<order::Entity> {
    query
        .order_by_desc(order::Column::OrderDate)
        .order_by_desc(order::Column::Id)
}

fn order_not_found(order_id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Order {} not found", order_id))
}

fn line_not_found(line_id: i32) -> ServiceError {
    ServiceError::NotFound(format!("Order line {} not found", line_id))
}

async fn find_order<C>(conn: &C, order_id: i32) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| order_not_found(order_id))
}

/// Recomputes the order total from its lines and writes it, guarded by the
/// version read earlier in the same transaction.
async fn refresh_total<C>(conn: &C, order: &order::Model) -> Result<Decimal, ServiceError>
where
    C: ConnectionTrait,
{
    let totals: Vec<Decimal> = order_line::Entity::find()
        .select_only()
        .column(order_line::Column::LineTotal)
        .filter(order_line::Column::OrderId.eq(order.id))
        .into_tuple()
        .all(conn)
        .await?;
    let total = sum_line_totals(totals);
    if total > MAX_MONEY {
        return Err(ServiceError::invalid_field(
            "quantity",
            "Order total would exceed the largest order amount",
        ));
    }

    let result = order::Entity::update_many()
        .col_expr(order::Column::TotalAmount, Expr::value(total))
        .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1))
        .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Version.eq(order.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let still_exists = order::Entity::find_by_id(order.id).one(conn).await?.is_some();
        return Err(stale_write_error("Order", order.id, still_exists));
    }

    Ok(total)
}
