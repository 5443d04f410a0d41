use crate::{
    auth::{user, user_role, Role, RoleSet},
    db::{unique_violation_error, DbPool},
    entities::customer,
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Profile of an account provisioned from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
    #[validate(length(max = 100, message = "First name cannot exceed 100 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 100, message = "Last name cannot exceed 100 characters"))]
    pub last_name: Option<String>,
    #[validate(length(max = 15, message = "Phone number cannot exceed 15 characters"))]
    pub phone_number: Option<String>,
    #[validate(length(max = 500, message = "Address cannot exceed 500 characters"))]
    pub address: Option<String>,
}

const DUPLICATE_ACCOUNT_EMAIL: &str = "An account with this email already exists";

/// Principal accounts and their role assignments.
#[derive(Debug, Clone)]
pub struct AccountService {
    db: Arc<DbPool>,
}

impl AccountService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_account(&self, request: NewAccount) -> Result<user::Model, ServiceError> {
        request.validate()?;
        let email = normalize_email(&request.email);

        if self.find_account_by_email(&email).await?.is_some() {
            return Err(ServiceError::invalid_field("email", DUPLICATE_ACCOUNT_EMAIL));
        }

        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            phone_number: Set(request.phone_number),
            address: Set(request.address),
            customer_id: Set(None),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| unique_violation_error(e, "email", DUPLICATE_ACCOUNT_EMAIL))?;

        info!(account_id = %account.id, "Account provisioned");
        Ok(account)
    }

    pub async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db)
            .await?)
    }

    pub async fn get_account(&self, id: Uuid) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Account {} not found", id)))
    }

    /// Active roles of an account.
    pub async fn roles_for(&self, id: Uuid) -> Result<RoleSet, ServiceError> {
        let names = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(id))
            .filter(user_role::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|assignment| assignment.role_name);
        Ok(RoleSet::from_names(names))
    }

    /// Grants a role. Assigning a role the account already holds is a no-op;
    /// a revoked assignment is reactivated.
    #[instrument(skip(self))]
    pub async fn assign_role(
        &self,
        account_id: Uuid,
        role: Role,
        assigned_by: Option<String>,
    ) -> Result<user_role::Model, ServiceError> {
        let db = &*self.db;
        self.get_account(account_id).await?;

        let existing = user_role::Entity::find()
            .filter(user_role::Column::UserId.eq(account_id))
            .filter(user_role::Column::RoleName.eq(role.as_ref()))
            .one(db)
            .await?;

        let assignment = match existing {
            Some(assignment) if assignment.is_active => return Ok(assignment),
            Some(assignment) => {
                let mut active: user_role::ActiveModel = assignment.into();
                active.is_active = Set(true);
                active.assigned_date = Set(Utc::now());
                active.assigned_by = Set(assigned_by);
                active.update(db).await?
            }
            None => {
                let inserted = user_role::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(account_id),
                    role_name: Set(role.to_string()),
                    assigned_date: Set(Utc::now()),
                    assigned_by: Set(assigned_by),
                    is_active: Set(true),
                }
                .insert(db)
                .await;
                match inserted {
                    Ok(assignment) => assignment,
                    // A concurrent assign won the insert; its row is the result.
                    Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                        user_role::Entity::find()
                            .filter(user_role::Column::UserId.eq(account_id))
                            .filter(user_role::Column::RoleName.eq(role.as_ref()))
                            .one(db)
                            .await?
                            .ok_or(ServiceError::DatabaseError(e))?
                    }
                    Err(e) => return Err(ServiceError::DatabaseError(e)),
                }
            }
        };

        info!(account_id = %account_id, role = %role, "Role assigned");
        Ok(assignment)
    }

    /// Deactivates a role assignment. Returns whether anything changed.
    #[instrument(skip(self))]
    pub async fn revoke_role(&self, account_id: Uuid, role: Role) -> Result<bool, ServiceError> {
        let result = user_role::Entity::update_many()
            .col_expr(
                user_role::Column::IsActive,
                sea_orm::sea_query::Expr::value(false),
            )
            .filter(user_role::Column::UserId.eq(account_id))
            .filter(user_role::Column::RoleName.eq(role.as_ref()))
            .filter(user_role::Column::IsActive.eq(true))
            .exec(&*self.db)
            .await?;

        let revoked = result.rows_affected > 0;
        if revoked {
            info!(account_id = %account_id, role = %role, "Role revoked");
        }
        Ok(revoked)
    }

    pub async fn count_accounts(&self) -> Result<u64, ServiceError> {
        Ok(user::Entity::find().count(&*self.db).await?)
    }

    /// Accounts actively holding `role`.
    pub async fn count_accounts_with_role(&self, role: Role) -> Result<u64, ServiceError> {
        Ok(user_role::Entity::find()
            .filter(user_role::Column::RoleName.eq(role.as_ref()))
            .filter(user_role::Column::IsActive.eq(true))
            .count(&*self.db)
            .await?)
    }

    /// Points an account at a legacy customer record, or clears the link.
    #[instrument(skip(self))]
    pub async fn link_customer(
        &self,
        account_id: Uuid,
        customer_id: Option<i32>,
    ) -> Result<user::Model, ServiceError> {
        let db = &*self.db;
        let account = self.get_account(account_id).await?;

        if let Some(customer_id) = customer_id {
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

        let mut active: user::ActiveModel = account.into();
        active.customer_id = Set(customer_id);
        active.updated_at = Set(Some(Utc::now()));
        Ok(active.update(db).await?)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
