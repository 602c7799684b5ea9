//! The STMBudget screens and who may open them.

use super::error::RouteError;
use super::route::{Breadcrumb, MenuItem, RouteDescriptor, RouteTable};
use crate::auth::Role;

/// Route name breadcrumbs start from
pub const HOME_ROUTE: &str = "dashboard";

const ALL_ROLES: &[Role] = &[Role::Admin, Role::Manager, Role::Salesman, Role::SupplyChain];
const SALES: &[Role] = &[Role::Salesman, Role::Manager, Role::Admin];
const MANAGEMENT: &[Role] = &[Role::Manager, Role::Admin];
const SUPPLY: &[Role] = &[Role::SupplyChain, Role::Admin];
const ADMIN: &[Role] = &[Role::Admin];

/// Build the route table for the STMBudget application
pub fn default_routes() -> Result<RouteTable, RouteError> {
    let routes = [
        RouteDescriptor::new("home", "/")?
            .roles(ALL_ROLES)
            .redirect_to("/dashboard"),
        RouteDescriptor::new("dashboard", "/dashboard")?
            .roles(ALL_ROLES)
            .title("Dashboard")
            .description("Sales, budget and stock overview")
            .menu("Dashboard"),
        RouteDescriptor::new("sales_budget", "/sales-budget")?
            .roles(SALES)
            .title("Sales Budget")
            .menu("Budget"),
        RouteDescriptor::new("budget_allocation", "/budget-allocation")?
            .roles(SALES)
            .title("Budget Allocation")
            .parent("sales_budget"),
        RouteDescriptor::new("rolling_forecast", "/rolling-forecast")?
            .roles(SALES)
            .title("Rolling Forecast")
            .menu("Forecast"),
        RouteDescriptor::new("forecast_analysis", "/forecast-analysis")?
            .roles(SALES)
            .title("Forecast Analysis")
            .parent("rolling_forecast"),
        RouteDescriptor::new("approval_center", "/approval-center")?
            .roles(MANAGEMENT)
            .title("Approval Center")
            .cacheable(false)
            .menu("Approvals"),
        RouteDescriptor::new("inventory_management", "/inventory-management")?
            .roles(SUPPLY)
            .title("Inventory Management")
            .menu("Inventory"),
        RouteDescriptor::new("distribution_management", "/distribution-management")?
            .roles(SUPPLY)
            .title("Distribution Management")
            .parent("inventory_management"),
        RouteDescriptor::new("bi_dashboard", "/bi-dashboard")?
            .roles(MANAGEMENT)
            .title("Business Intelligence"),
        RouteDescriptor::new("reports", "/reports")?
            .roles(MANAGEMENT)
            .title("Reports"),
        RouteDescriptor::new("advanced_admin", "/advanced-admin")?
            .roles(ADMIN)
            .title("Admin Panel")
            .menu("Admin"),
        RouteDescriptor::new("user_management", "/user-management")?
            .roles(ADMIN)
            .title("User Management")
            .cacheable(false)
            .parent("advanced_admin"),
        RouteDescriptor::new("profile", "/profile")?
            .roles(ALL_ROLES)
            .title("Profile"),
        RouteDescriptor::new("offline", "/offline")?
            .title("Offline")
            .cacheable(false),
    ];

    let mut table = RouteTable::new();
    for route in routes {
        table.register(route)?;
    }
    Ok(table)
}

pub fn menu_items(table: &RouteTable, role: Option<Role>) -> Vec<MenuItem> {
    table.menu_items(role)
}

pub fn breadcrumbs(table: &RouteTable, path: &str) -> Vec<Breadcrumb> {
    table.breadcrumbs(path, HOME_ROUTE)
}
