//! Vouchers
//!
//! A voucher is a redeemable handle to a price rule, optionally bound to a
//! single customer. Normal vouchers are bounded by their rule's usage
//! caps; bonus vouchers are strictly single-use. Redemption is recorded by
//! [`crate::engine::DiscountEngine::commit_discounts`].

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::PriceRule;

/// Normal (rule-capped) or bonus (single-use) voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherKind {
    /// Redeemable until the backing rule's usage caps are reached.
    Normal,

    /// Redeemable exactly once; redemption stamps `time_redeemed`.
    Bonus,
}

/// A redeemable handle to a [`PriceRule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    /// Voucher identifier.
    pub id: String,

    /// The code customers enter; unique across vouchers.
    pub code: String,

    /// The rule this voucher redeems.
    pub rule_id: String,

    /// Customer the voucher is bound to; `None` for anonymous vouchers.
    pub customer_id: Option<String>,

    /// Normal or bonus.
    pub kind: VoucherKind,

    /// When a bonus voucher was redeemed.
    pub time_redeemed: Option<Timestamp>,

    /// Inclusive start of the validity window.
    pub valid_from: Option<Timestamp>,

    /// Inclusive end of the validity window.
    pub valid_to: Option<Timestamp>,

    /// Committed redemptions of a normal voucher.
    pub times_redeemed: u32,

    /// Opaque caller payload; never inspected by the engine.
    pub custom: Option<serde_json::Value>,
}

impl Voucher {
    /// Creates a normal voucher for `rule`. An empty `customer_id` leaves
    /// the voucher anonymous.
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        rule: &PriceRule,
        customer_id: impl Into<String>,
    ) -> Self {
        let customer_id = customer_id.into();
        Self {
            id: id.into(),
            code: code.into(),
            rule_id: rule.id.clone(),
            customer_id: (!customer_id.is_empty()).then_some(customer_id),
            kind: VoucherKind::Normal,
            time_redeemed: None,
            valid_from: rule.valid_from,
            valid_to: rule.valid_to,
            times_redeemed: 0,
            custom: None,
        }
    }

    /// Creates a single-use bonus voucher bound to `customer_id`.
    pub fn bonus(
        id: impl Into<String>,
        code: impl Into<String>,
        rule: &PriceRule,
        customer_id: impl Into<String>,
    ) -> Self {
        let mut voucher = Self::new(id, code, rule, customer_id);
        voucher.kind = VoucherKind::Bonus;
        voucher
    }

    /// Whether `at` falls inside the voucher's validity window.
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        if let Some(from) = self.valid_from {
            if at < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if at > to {
                return false;
            }
        }
        true
    }

    /// Whether the voucher may be redeemed by `customer_id` at `at`,
    /// given the backing `rule`'s committed usage.
    ///
    /// Returns the first failing [`VoucherRejection`], or `Ok(())`.
    /// Cart-dependent conditions (rule eligibility, minimum order) are
    /// checked by the engine, not here.
    pub fn redeemable_by(
        &self,
        rule: &PriceRule,
        customer_id: &str,
        at: Timestamp,
    ) -> Result<(), VoucherRejection> {
        if !self.is_valid_at(at) || !rule.is_valid_at(at) {
            return Err(VoucherRejection::Expired);
        }
        match self.kind {
            VoucherKind::Bonus => {
                if self.time_redeemed.is_some() {
                    return Err(VoucherRejection::AlreadyRedeemed);
                }
            }
            VoucherKind::Normal => {
                if rule.usage_exhausted(customer_id) {
                    return Err(VoucherRejection::AlreadyRedeemed);
                }
            }
        }
        if let Some(bound) = &self.customer_id {
            if bound != customer_id {
                return Err(VoucherRejection::WrongCustomer);
            }
        }
        Ok(())
    }
}

/// Why a voucher code was not accepted. Local to the code: a rejection
/// never aborts the surrounding calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum VoucherRejection {
    /// No voucher with this code exists.
    #[error("no voucher with this code exists")]
    NotFound,

    /// The voucher or its rule is outside its validity window.
    #[error("voucher is outside its validity window")]
    Expired,

    /// The voucher (or its rule's usage cap) is used up.
    #[error("voucher has already been redeemed")]
    AlreadyRedeemed,

    /// The voucher is bound to a different customer.
    #[error("voucher belongs to a different customer")]
    WrongCustomer,

    /// The backing rule is not eligible for any article in the cart.
    #[error("voucher rule does not apply to any article in the cart")]
    RuleNotEligible,

    /// The backing rule's minimum order amount is not reached.
    #[error("minimum order amount for the voucher is not reached")]
    MinOrderNotReached,
}
