//! Summary
//!
//! Aggregates a finished discount state into cart-level totals: net cart
//! value, rebates and voucher reductions, shipping, and the final net,
//! plus the per-category breakdown and the fate of every voucher code the
//! caller passed in.

use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    rules::RuleKind,
    state::OrderDiscounts,
    vouchers::VoucherRejection,
};

/// A voucher code that was not applied, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedVoucher {
    /// The code as the caller passed it.
    pub code: String,

    /// The rejection reason.
    pub reason: VoucherRejection,
}

/// Cart-level totals of one calculation.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Undiscounted net of all non-shipping articles.
    pub sum_cart_net: Decimal,

    /// Discounts on non-shipping articles from promotion and payment
    /// rules.
    pub rebates_net: Decimal,

    /// Discounts on non-shipping articles from vouchers.
    pub vouchers_net: Decimal,

    /// Shipping cost after shipping discounts, clamped at zero.
    pub shipping_net: Decimal,

    /// `sum_cart_net − rebates_net − vouchers_net + shipping_net`,
    /// clamped at zero.
    pub sum_final_net: Decimal,

    /// Applied discount totals by rule kind, across all articles.
    pub discounts_by_kind: FxHashMap<RuleKind, Decimal>,

    /// Voucher codes that were applied, in caller order.
    pub accepted_voucher_codes: Vec<String>,

    /// Voucher codes that were rejected, in caller order.
    pub rejected_vouchers: Vec<RejectedVoucher>,
}

impl Summary {
    /// Builds the summary for `state`. Articles whose IDs are in
    /// `shipping_article_ids` count towards shipping; everything else
    /// towards the cart net.
    pub fn build(
        state: &OrderDiscounts,
        shipping_article_ids: &FxHashSet<String>,
        accepted_voucher_codes: Vec<String>,
        rejected_vouchers: Vec<RejectedVoucher>,
    ) -> Self {
        let mut sum_cart_net = Decimal::ZERO;
        let mut rebates_net = Decimal::ZERO;
        let mut vouchers_net = Decimal::ZERO;
        let mut shipping_gross = Decimal::ZERO;
        let mut shipping_discounts = Decimal::ZERO;
        let mut discounts_by_kind: FxHashMap<RuleKind, Decimal> = FxHashMap::default();

        for entry in state.iter() {
            let is_shipping = shipping_article_ids.contains(&entry.article_id);

            if is_shipping {
                shipping_gross += entry.initial_line_total();
                shipping_discounts += entry.total_discount_amount;
            } else {
                sum_cart_net += entry.initial_line_total();
            }

            for applied in &entry.applied_discounts {
                *discounts_by_kind.entry(applied.rule_kind).or_default() +=
                    applied.discount_amount;

                if !is_shipping {
                    match applied.rule_kind {
                        RuleKind::Voucher | RuleKind::BonusVoucher => {
                            vouchers_net += applied.discount_amount;
                        }
                        _ => rebates_net += applied.discount_amount,
                    }
                }
            }
        }

        let shipping_net = (shipping_gross - shipping_discounts).max(Decimal::ZERO);
        let sum_final_net =
            (sum_cart_net - rebates_net - vouchers_net + shipping_net).max(Decimal::ZERO);

        Self {
            sum_cart_net,
            rebates_net,
            vouchers_net,
            shipping_net,
            sum_final_net,
            discounts_by_kind,
            accepted_voucher_codes,
            rejected_vouchers,
        }
    }
}
