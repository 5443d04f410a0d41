use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Database entity for principal accounts. Credentials live with the external
/// identity provider; only the profile and the optional legacy customer link
/// are stored here.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub customer_id: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// "First Last", falling back to the email address.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.email.clone()
        } else {
            full
        }
    }
}

/// Database relationships for User entity
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::auth::user_role::Entity")]
    UserRole,
    #[sea_orm(has_many = "crate::entities::order::Entity")]
    Order,
    #[sea_orm(has_many = "crate::entities::menu_grant::Entity")]
    MenuGrant,
    #[sea_orm(
        belongs_to = "crate::entities::customer::Entity",
        from = "Column::CustomerId",
        to = "crate::entities::customer::Column::Id"
    )]
    Customer,
}

impl Related<crate::auth::user_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserRole.def()
    }
}

impl Related<crate::entities::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<crate::entities::menu_grant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MenuGrant.def()
    }
}

impl Related<crate::entities::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(first: Option<&str>, last: Option<&str>) -> Model {
        Model {
            id: Uuid::new_v4(),
            email: "ana@example.com".into(),
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
            phone_number: None,
            address: None,
            customer_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn display_name_prefers_full_name() {
        assert_eq!(account(Some("Ana"), Some("Lima")).display_name(), "Ana Lima");
        assert_eq!(account(Some("Ana"), None).display_name(), "Ana");
        assert_eq!(account(None, None).display_name(), "ana@example.com");
    }
}
