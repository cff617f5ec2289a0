//! Cascade
//!
//! Cascade is a rule-driven discount calculation engine for shop carts:
//! given an ordered cart, voucher codes, checkout attributes and customer
//! group memberships, it computes a deterministic per-article discount
//! breakdown and cart summary, and records rule and voucher usage when a
//! cart is committed.

pub mod actions;
pub mod articles;
pub mod eligibility;
pub mod engine;
pub mod fixtures;
pub mod groups;
pub mod prelude;
pub mod registry;
pub mod resolver;
pub mod rounding;
pub mod rules;
pub mod state;
pub mod summary;
pub mod vouchers;
