//! Ownership rules applied by handlers before calling into the order engine.

use super::Principal;
use crate::entities::order;
use crate::errors::ServiceError;
use uuid::Uuid;

/// Owners may work on their own orders; Staff and above on any order.
pub fn ensure_order_access(principal: &Principal, order: &order::Model) -> Result<(), ServiceError> {
    if order.user_id == principal.id || principal.is_privileged() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "Order {} belongs to another account",
            order.id
        )))
    }
}

/// Picks the owner of a new order. Only privileged principals may place
/// orders on behalf of someone else.
pub fn resolve_order_owner(
    principal: &Principal,
    requested: Option<Uuid>,
) -> Result<Uuid, ServiceError> {
    match requested {
        None => Ok(principal.id),
        Some(owner) if owner == principal.id => Ok(owner),
        Some(owner) if principal.is_privileged() => Ok(owner),
        Some(_) => Err(ServiceError::Forbidden(
            "Only staff can place orders for other accounts".to_string(),
        )),
    }
}
