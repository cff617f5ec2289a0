//! Action evaluators
//!
//! One evaluator per [`RuleAction`], each consuming a selected rule (plus
//! the voucher it came in through, if any) and mutating the discount
//! state. Shared invariants live here: eligibility filtering, stop-flag
//! handling, the price basis a percent evaluator reads, and the
//! construction of [`DiscountApplied`] trail entries.

use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    rules::{PriceRule, RuleAction},
    state::{ArticleDiscounts, DiscountApplied, OrderDiscounts},
    vouchers::Voucher,
};

pub mod cart_by_absolute;
pub mod cart_by_percent;
pub mod item_by_absolute;
pub mod item_by_percent;
pub mod item_set_absolute;
pub mod scaled;

/// A rule together with the voucher that selected it, if any.
#[derive(Debug, Clone, Copy)]
pub struct RuleVoucherPair<'a> {
    /// The rule to apply.
    pub rule: &'a PriceRule,

    /// The redeeming voucher, for voucher-phase applications.
    pub voucher: Option<&'a Voucher>,
}

impl RuleVoucherPair<'_> {
    fn applied_for(
        &self,
        entry: &ArticleDiscounts,
        base: Decimal,
        single: Decimal,
        amount: Decimal,
    ) -> DiscountApplied {
        DiscountApplied {
            price_rule_id: self.rule.id.clone(),
            rule_kind: self.rule.kind,
            mapping_id: self.rule.mapping_id.clone(),
            voucher_id: self.voucher.map(|v| v.id.clone()),
            voucher_code: self.voucher.map(|v| v.code.clone()),
            calculation_base_price: base,
            price: entry.initial_item_price,
            discount_single: single,
            discount_amount: amount,
            quantity: entry.quantity,
        }
    }
}

/// Which per-unit price a percent evaluator reads.
///
/// Vouchers price against the snapshot taken before the voucher phase so
/// percent vouchers never compound on each other; every other phase reads
/// the running price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceBasis {
    /// The running (post earlier rules) per-unit price.
    Current,

    /// The per-unit price snapshotted before the voucher phase.
    VoucherSnapshot,
}

fn basis_price(entry: &ArticleDiscounts, basis: PriceBasis) -> Decimal {
    match basis {
        PriceBasis::Current => entry.current_item_price,
        PriceBasis::VoucherSnapshot => entry.voucher_calculation_base_item_price,
    }
}

/// `percent` (0–100) of `base`.
fn percent_of(percent: Decimal, base: Decimal) -> Decimal {
    Percentage::from(percent / Decimal::ONE_HUNDRED) * base
}

/// Cart positions the rule may act on: inside the orchestrator's scope
/// restriction (if any), not halted by an exclusive rule, and passing the
/// eligibility predicate.
pub(crate) fn eligible_positions(
    rule: &PriceRule,
    state: &OrderDiscounts,
    ctx: &CalculationContext<'_>,
    scope: Option<&FxHashSet<usize>>,
) -> Vec<usize> {
    state
        .iter()
        .filter(|entry| scope.is_none_or(|allowed| allowed.contains(&entry.position)))
        .filter(|entry| !entry.stop_applying_discounts)
        .filter(|entry| ctx.validate(rule, &entry.article_id, state).is_ok())
        .map(|entry| entry.position)
        .collect()
}

/// Distributes a cart-scope line discount across `positions`, weighted by
/// each position's share of `weights`, and records one trail entry per
/// position that received a share.
fn record_distributed(
    pair: &RuleVoucherPair<'_>,
    state: &mut OrderDiscounts,
    ctx: &CalculationContext<'_>,
    positions: &[usize],
    weights: &[Decimal],
    total: Decimal,
    basis: PriceBasis,
) {
    let shares = crate::rounding::distribute_proportionally(total, weights, ctx.round_step);

    for (position, share) in positions.iter().zip(shares) {
        if share == Decimal::ZERO {
            continue;
        }
        if let Some(entry) = state.at_position_mut(*position) {
            let base = basis_price(entry, basis);
            let single = if entry.quantity > Decimal::ZERO {
                share / entry.quantity
            } else {
                Decimal::ZERO
            };
            let applied = pair.applied_for(entry, base, single, share);
            entry.record(applied, pair.rule.exclusive);
        }
    }
}

/// Applies one selected rule to the state, dispatching on its action.
///
/// `scope` restricts the rule to a subset of cart positions (the
/// customer-promotion phase applies per-article winners this way);
/// `basis` selects the price a percent evaluator reads.
pub fn apply(
    pair: &RuleVoucherPair<'_>,
    state: &mut OrderDiscounts,
    ctx: &CalculationContext<'_>,
    scope: Option<&FxHashSet<usize>>,
    basis: PriceBasis,
) {
    match pair.rule.action {
        RuleAction::ItemByPercent => item_by_percent::apply(pair, state, ctx, scope, basis),
        RuleAction::ItemByAbsolute => item_by_absolute::apply(pair, state, ctx, scope),
        RuleAction::CartByPercent => cart_by_percent::apply(pair, state, ctx, scope, basis),
        RuleAction::CartByAbsolute => cart_by_absolute::apply(pair, state, ctx, scope),
        RuleAction::ItemSetAbsolute => item_set_absolute::apply(pair, state, ctx, scope),
        RuleAction::Scaled => scaled::apply(pair, state, ctx, scope),
    }
}
