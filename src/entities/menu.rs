use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Navigation entry. Menus form a forest through `parent_menu_id`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "menus")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub url: Option<String>,
    pub icon_class: Option<String>,
    pub display_order: i32,
    pub parent_menu_id: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentMenuId",
        to = "Column::Id",
        on_delete = "Restrict"
    )]
    Parent,
    #[sea_orm(has_many = "super::menu_grant::Entity")]
    MenuGrant,
}

impl Related<super::menu_grant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MenuGrant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
