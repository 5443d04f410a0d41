pub mod customer;
pub mod food;
pub mod menu;
pub mod menu_grant;
pub mod order;
pub mod order_line;

pub use order::OrderStatus;

/// Largest amount a `DECIMAL(16, 2)` money column holds.
pub const MAX_MONEY: rust_decimal::Decimal = rust_decimal_macros::dec!(99999999999999.99);
