//! Static role → action catalog.
//!
//! The table is built once on first use and never mutated afterwards, so
//! concurrent readers need no synchronization.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Permission that matches every action.
pub const WILDCARD: &str = "*";

/// Action identifiers understood by the policy engine.
pub mod actions {
    pub const ORDER_READ: &str = "order.read";
    pub const ORDER_CREATE: &str = "order.create";
    pub const ORDER_UPDATE_STATUS: &str = "order.update_status";
    pub const ORDER_CANCEL: &str = "order.cancel";
    pub const ORDER_REFUND: &str = "order.refund";
    pub const PAYMENT_CAPTURE: &str = "payment.capture";
    pub const PRODUCT_READ: &str = "product.read";
    pub const PRODUCT_WRITE: &str = "product.write";
    pub const INVENTORY_READ: &str = "inventory.read";
    pub const INVENTORY_ADJUST: &str = "inventory.adjust";
    pub const BRANCH_READ: &str = "branch.read";
    pub const BRANCH_MANAGE: &str = "branch.manage";
    pub const STAFF_MANAGE: &str = "staff.manage";
    pub const DELIVERY_READ: &str = "delivery.read";
    pub const DELIVERY_UPDATE: &str = "delivery.update";
    pub const CUSTOMER_READ: &str = "customer.read";
    pub const CART_MANAGE: &str = "cart.manage";
    pub const REPORT_READ: &str = "report.read";
    pub const AUDIT_READ: &str = "audit.read";
}

/// Roles known to the platform.
///
/// System roles (`SuperAdmin`, `Customer`) apply everywhere, task roles apply
/// globally but are limited in what they touch, and branch roles only count
/// inside the branch they were assigned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Customer,
    BranchManager,
    Cashier,
    InventoryClerk,
    SalesStaff,
    DeliveryDriver,
    SupportAgent,
    /// Any role string this build does not recognise. Grants nothing.
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Customer => "customer",
            Role::BranchManager => "branch_manager",
            Role::Cashier => "cashier",
            Role::InventoryClerk => "inventory_clerk",
            Role::SalesStaff => "sales_staff",
            Role::DeliveryDriver => "delivery_driver",
            Role::SupportAgent => "support_agent",
            Role::Unknown => "unknown",
        }
    }

    pub fn is_task_role(&self) -> bool {
        matches!(self, Role::DeliveryDriver | Role::SupportAgent)
    }

    /// Task roles that may only act on work assigned to the actor.
    pub fn is_own_work_only(&self) -> bool {
        matches!(self, Role::DeliveryDriver)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    /// Accepts `branch_manager`, `BRANCH_MANAGER` and `branch-manager`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Ok(match normalized.as_str() {
            "super_admin" => Role::SuperAdmin,
            "customer" => Role::Customer,
            "branch_manager" => Role::BranchManager,
            "cashier" => Role::Cashier,
            "inventory_clerk" => Role::InventoryClerk,
            "sales_staff" => Role::SalesStaff,
            "delivery_driver" => Role::DeliveryDriver,
            "support_agent" => Role::SupportAgent,
            _ => Role::Unknown,
        })
    }
}

lazy_static! {
    static ref CATALOG: HashMap<Role, HashSet<&'static str>> = {
        use self::actions::*;

        let mut catalog = HashMap::new();
        catalog.insert(Role::SuperAdmin, [WILDCARD].into_iter().collect());
        catalog.insert(
            Role::Customer,
            [PRODUCT_READ, CART_MANAGE, ORDER_CREATE, ORDER_READ, BRANCH_READ]
                .into_iter()
                .collect(),
        );
        catalog.insert(
            Role::BranchManager,
            [
                ORDER_READ,
                ORDER_CREATE,
                ORDER_UPDATE_STATUS,
                ORDER_CANCEL,
                ORDER_REFUND,
                PAYMENT_CAPTURE,
                PRODUCT_READ,
                PRODUCT_WRITE,
                INVENTORY_READ,
                INVENTORY_ADJUST,
                BRANCH_READ,
                STAFF_MANAGE,
                DELIVERY_READ,
                CUSTOMER_READ,
                REPORT_READ,
                AUDIT_READ,
            ]
            .into_iter()
            .collect(),
        );
        catalog.insert(
            Role::Cashier,
            [
                ORDER_READ,
                ORDER_CREATE,
                ORDER_UPDATE_STATUS,
                PAYMENT_CAPTURE,
                PRODUCT_READ,
                CUSTOMER_READ,
                BRANCH_READ,
            ]
            .into_iter()
            .collect(),
        );
        catalog.insert(
            Role::InventoryClerk,
            [PRODUCT_READ, PRODUCT_WRITE, INVENTORY_READ, INVENTORY_ADJUST, BRANCH_READ]
                .into_iter()
                .collect(),
        );
        catalog.insert(
            Role::SalesStaff,
            [ORDER_READ, ORDER_CREATE, PRODUCT_READ, CUSTOMER_READ, BRANCH_READ]
                .into_iter()
                .collect(),
        );
        catalog.insert(
            Role::DeliveryDriver,
            [DELIVERY_READ, DELIVERY_UPDATE, ORDER_READ].into_iter().collect(),
        );
        catalog.insert(
            Role::SupportAgent,
            [ORDER_READ, CUSTOMER_READ, DELIVERY_READ].into_iter().collect(),
        );
        catalog.insert(Role::Unknown, HashSet::new());
        catalog
    };
}

/// Actions granted to `role`.
pub fn permissions_for_role(role: Role) -> &'static HashSet<&'static str> {
    // every variant is inserted above
    &CATALOG[&role]
}
