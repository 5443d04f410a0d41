//! Reference data: the default navigation menu and its grants to the
//! configured administrator. Safe to run on every start.

use crate::{
    auth::{user, Role},
    db::DbPool,
    entities::{menu, menu_grant},
    errors::ServiceError,
    services::accounts::AccountService,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const SEEDED_BY: &str = "System";

/// (name, url, icon, display order)
const DEFAULT_MENUS: [(&str, &str, &str, i32); 7] = [
    ("Dashboard", "/Dashboard/Index", "fas fa-tachometer-alt", 1),
    ("Food Management", "/Food/Index", "fas fa-utensils", 2),
    ("Order Management", "/Order/Index", "fas fa-shopping-cart", 3),
    ("Customer Management", "/Customer/Index", "fas fa-users", 4),
    ("User Management", "/User/Index", "fas fa-user-cog", 5),
    ("Role Management", "/Role/Index", "fas fa-user-shield", 6),
    ("Reports", "/Report/Index", "fas fa-chart-bar", 7),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub menus_created: usize,
    pub grants_created: usize,
}

/// Inserts the default menus when none exist, then grants every menu to the
/// admin account named by `admin_email` if that account has no grants yet.
/// The admin account also receives the Admin role.
#[instrument(skip(db))]
pub async fn seed_reference_data(
    db: Arc<DbPool>,
    admin_email: Option<&str>,
) -> Result<SeedReport, ServiceError> {
    let mut report = SeedReport::default();

    if menu::Entity::find().count(&*db).await? == 0 {
        let txn = db.begin().await?;
        let now = Utc::now();
        for (name, url, icon, order) in DEFAULT_MENUS {
            menu::ActiveModel {
                name: Set(name.to_string()),
                url: Set(Some(url.to_string())),
                icon_class: Set(Some(icon.to_string())),
                display_order: Set(order),
                parent_menu_id: Set(None),
                is_active: Set(true),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await?;
        report.menus_created = DEFAULT_MENUS.len();
        info!(count = report.menus_created, "Seeded default menus");
    }

    let Some(email) = admin_email else {
        return Ok(report);
    };

    let accounts = AccountService::new(db.clone());
    let Some(admin) = accounts.find_account_by_email(email).await? else {
        warn!(email, "Admin account for seeding not found; skipping menu grants");
        return Ok(report);
    };
    accounts
        .assign_role(admin.id, Role::Admin, Some(SEEDED_BY.to_string()))
        .await?;

    report.grants_created = grant_all_menus(&db, &admin).await?;
    Ok(report)
}

async fn grant_all_menus(db: &DbPool, admin: &user::Model) -> Result<usize, ServiceError> {
    let existing = menu_grant::Entity::find()
        .filter(menu_grant::Column::UserId.eq(admin.id))
        .count(db)
        .await?;
    if existing > 0 {
        return Ok(0);
    }

    let menus = menu::Entity::find()
        .order_by_asc(menu::Column::DisplayOrder)
        .all(db)
        .await?;

    let txn = db.begin().await?;
    let now = Utc::now();
    for menu in &menus {
        menu_grant::ActiveModel {
            user_id: Set(admin.id),
            menu_id: Set(menu.id),
            assigned_date: Set(now),
            assigned_by: Set(Some(SEEDED_BY.to_string())),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    info!(account_id = %admin.id, count = menus.len(), "Granted default menus to admin");
    Ok(menus.len())
}
