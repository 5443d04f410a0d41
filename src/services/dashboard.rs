//! Role-scoped dashboard read models.
//!
//! A principal sees exactly one view, picked by its highest-precedence role
//! (Admin > Manager > Staff > Customer). Principals without any known role
//! get a view that only carries their navigation menus.

use crate::{
    auth::{Principal, Role},
    entities::menu,
    errors::ServiceError,
    services::{
        accounts::AccountService,
        catalog::CatalogService,
        menus::MenuService,
        orders::{OrderDetails, OrderService, OrderSummary},
    },
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct AdminDashboard {
    pub total_users: u64,
    pub total_customers: u64,
    pub total_food_items: u64,
    pub total_orders: u64,
    pub pending_orders: u64,
    pub completed_orders: u64,
    pub total_revenue: Decimal,
    pub recent_orders: Vec<OrderSummary>,
    pub menus: Vec<menu::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerDashboard {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub completed_orders: u64,
    pub total_revenue: Decimal,
    pub recent_orders: Vec<OrderSummary>,
    pub menus: Vec<menu::Model>,
}

/// Open work only; no revenue.
#[derive(Debug, Clone, Serialize)]
pub struct StaffDashboard {
    pub pending_orders: u64,
    pub recent_orders: Vec<OrderSummary>,
    pub menus: Vec<menu::Model>,
}

/// The principal's own orders, with line items.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerDashboard {
    pub total_orders: u64,
    pub pending_orders: u64,
    pub recent_orders: Vec<OrderDetails>,
    pub menus: Vec<menu::Model>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneralDashboard {
    pub menus: Vec<menu::Model>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view")]
pub enum DashboardView {
    Admin(AdminDashboard),
    Manager(ManagerDashboard),
    Staff(StaffDashboard),
    Customer(CustomerDashboard),
    General(GeneralDashboard),
}

impl DashboardView {
    /// The role the view was built for, if any.
    pub fn role(&self) -> Option<Role> {
        match self {
            DashboardView::Admin(_) => Some(Role::Admin),
            DashboardView::Manager(_) => Some(Role::Manager),
            DashboardView::Staff(_) => Some(Role::Staff),
            DashboardView::Customer(_) => Some(Role::Customer),
            DashboardView::General(_) => None,
        }
    }

    pub fn menus(&self) -> &[menu::Model] {
        match self {
            DashboardView::Admin(v) => &v.menus,
            DashboardView::Manager(v) => &v.menus,
            DashboardView::Staff(v) => &v.menus,
            DashboardView::Customer(v) => &v.menus,
            DashboardView::General(v) => &v.menus,
        }
    }
}

/// Builds dashboards from the catalog, order and account services.
#[derive(Debug, Clone)]
pub struct DashboardService {
    accounts: AccountService,
    catalog: CatalogService,
    orders: OrderService,
    menus: MenuService,
    recent_limit: u64,
}

impl DashboardService {
    pub fn new(
        accounts: AccountService,
        catalog: CatalogService,
        orders: OrderService,
        menus: MenuService,
        recent_limit: u64,
    ) -> Self {
        Self {
            accounts,
            catalog,
            orders,
            menus,
            recent_limit: recent_limit.max(1),
        }
    }

    #[instrument(skip(self, principal), fields(principal_id = %principal.id))]
    pub async fn build_for(&self, principal: &Principal) -> Result<DashboardView, ServiceError> {
        let menus = self.menus.resolve_menus_for(principal.id).await?;
        let role = principal.roles.primary();
        debug!(role = ?role, "Building dashboard");

        let view = match role {
            Some(Role::Admin) => DashboardView::Admin(self.admin_view(menus).await?),
            Some(Role::Manager) => DashboardView::Manager(self.manager_view(menus).await?),
            Some(Role::Staff) => DashboardView::Staff(self.staff_view(menus).await?),
            Some(Role::Customer) => {
                DashboardView::Customer(self.customer_view(principal, menus).await?)
            }
            None => DashboardView::General(GeneralDashboard { menus }),
        };
        Ok(view)
    }

    async fn admin_view(&self, menus: Vec<menu::Model>) -> Result<AdminDashboard, ServiceError> {
        let counts = self.orders.order_counts(None).await?;
        Ok(AdminDashboard {
            total_users: self.accounts.count_accounts().await?,
            total_customers: self.accounts.count_accounts_with_role(Role::Customer).await?,
            total_food_items: self.catalog.count_foods().await?,
            total_orders: counts.total,
            pending_orders: counts.pending,
            completed_orders: counts.completed,
            total_revenue: self.orders.delivered_revenue().await?,
            recent_orders: self.orders.recent_orders(self.recent_limit, None, false).await?,
            menus,
        })
    }

    async fn manager_view(
        &self,
        menus: Vec<menu::Model>,
    ) -> Result<ManagerDashboard, ServiceError> {
        let counts = self.orders.order_counts(None).await?;
        Ok(ManagerDashboard {
            total_orders: counts.total,
            pending_orders: counts.pending,
            completed_orders: counts.completed,
            total_revenue: self.orders.delivered_revenue().await?,
            recent_orders: self.orders.recent_orders(self.recent_limit, None, false).await?,
            menus,
        })
    }

    async fn staff_view(&self, menus: Vec<menu::Model>) -> Result<StaffDashboard, ServiceError> {
        let counts = self.orders.order_counts(None).await?;
        Ok(StaffDashboard {
            pending_orders: counts.pending,
            recent_orders: self.orders.recent_orders(self.recent_limit, None, true).await?,
            menus,
        })
    }

    async fn customer_view(
        &self,
        principal: &Principal,
        menus: Vec<menu::Model>,
    ) -> Result<CustomerDashboard, ServiceError> {
        let counts = self.orders.order_counts(Some(principal.id)).await?;
        let recent = self
            .orders
            .recent_orders(self.recent_limit, Some(principal.id), false)
            .await?;

        let ids: Vec<i32> = recent.iter().map(|summary| summary.order.id).collect();
        let mut lines = self.orders.lines_for(&ids).await?;
        let recent_orders = recent
            .into_iter()
            .map(|summary| OrderDetails {
                lines: lines.remove(&summary.order.id).unwrap_or_default(),
                owner_name: summary.owner_name,
                owner_email: summary.owner_email,
                order: summary.order,
            })
            .collect();

        Ok(CustomerDashboard {
            total_orders: counts.total,
            pending_orders: counts.pending,
            recent_orders,
            menus,
        })
    }
}
