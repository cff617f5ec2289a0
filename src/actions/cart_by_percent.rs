//! Cart-scope percentage discounts.

use rust_decimal::Decimal;
use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    state::OrderDiscounts,
};

use super::{PriceBasis, RuleVoucherPair, basis_price, eligible_positions, percent_of, record_distributed};

/// Computes `rule.amount` percent of the rule's discountable base (the
/// summed basis line totals of the eligible articles) and distributes it
/// proportionally across those articles.
pub fn apply(
    pair: &RuleVoucherPair<'_>,
    state: &mut OrderDiscounts,
    ctx: &CalculationContext<'_>,
    scope: Option<&FxHashSet<usize>>,
    basis: PriceBasis,
) {
    let positions = eligible_positions(pair.rule, state, ctx, scope);
    if positions.is_empty() {
        return;
    }

    let weights: Vec<Decimal> = positions
        .iter()
        .filter_map(|position| state.at_position(*position))
        .map(|entry| basis_price(entry, basis) * entry.quantity)
        .collect();

    let base: Decimal = weights.iter().copied().sum();
    let total = percent_of(pair.rule.amount, base);

    record_distributed(pair, state, ctx, &positions, &weights, total, basis);
}
