pub mod accounts;
pub mod customers;
pub mod dashboard;
pub mod foods;
pub mod health;
pub mod menus;
pub mod orders;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        accounts::AccountService,
        catalog::{CatalogService, SearchCaseMode},
        customers::CustomerService,
        dashboard::DashboardService,
        menus::MenuService,
        orders::OrderService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub accounts: Arc<AccountService>,
    pub customers: Arc<CustomerService>,
    pub menus: Arc<MenuService>,
    pub dashboard: Arc<DashboardService>,
}

impl AppServices {
    /// Wires every service to one pool, using the behaviour switches from
    /// configuration.
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let catalog = CatalogService::new(
            db_pool.clone(),
            SearchCaseMode::from_flag(config.catalog_search_case_sensitive),
        );
        let orders = OrderService::new(db_pool.clone(), config.enforce_status_transitions);
        let accounts = AccountService::new(db_pool.clone());
        let menus = MenuService::new(db_pool.clone());
        let dashboard = DashboardService::new(
            accounts.clone(),
            catalog.clone(),
            orders.clone(),
            menus.clone(),
            config.dashboard_recent_orders,
        );

        Self {
            catalog: Arc::new(catalog),
            orders: Arc::new(orders),
            accounts: Arc::new(accounts),
            customers: Arc::new(CustomerService::new(db_pool)),
            menus: Arc::new(menus),
            dashboard: Arc::new(dashboard),
        }
    }
}
