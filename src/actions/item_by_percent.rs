//! Per-unit percentage discounts.

use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    rounding::round_to_step,
    state::OrderDiscounts,
};

use super::{PriceBasis, RuleVoucherPair, basis_price, eligible_positions, percent_of};

/// Discounts every eligible article by `rule.amount` percent of its basis
/// price. The per-unit discount stays unrounded; the line amount is
/// rounded to the cart's step.
pub fn apply(
    pair: &RuleVoucherPair<'_>,
    state: &mut OrderDiscounts,
    ctx: &CalculationContext<'_>,
    scope: Option<&FxHashSet<usize>>,
    basis: PriceBasis,
) {
    for position in eligible_positions(pair.rule, state, ctx, scope) {
        if let Some(entry) = state.at_position_mut(position) {
            let base = basis_price(entry, basis);
            let single = percent_of(pair.rule.amount, base);
            let amount = round_to_step(single * entry.quantity, ctx.round_step);

            let applied = pair.applied_for(entry, base, single, amount);
            entry.record(applied, pair.rule.exclusive);
        }
    }
}
