//! Per-unit absolute discounts.

use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    rounding::round_to_step,
    state::OrderDiscounts,
};

use super::{RuleVoucherPair, eligible_positions};

/// Takes `rule.amount` off every unit of every eligible article, clamped
/// at the running price so a line never goes negative.
pub fn apply(
    pair: &RuleVoucherPair<'_>,
    state: &mut OrderDiscounts,
    ctx: &CalculationContext<'_>,
    scope: Option<&FxHashSet<usize>>,
) {
    for position in eligible_positions(pair.rule, state, ctx, scope) {
        if let Some(entry) = state.at_position_mut(position) {
            let base = entry.current_item_price;
            let single = pair.rule.amount.min(base);
            let amount = round_to_step(single * entry.quantity, ctx.round_step);

            let applied = pair.applied_for(entry, base, single, amount);
            entry.record(applied, pair.rule.exclusive);
        }
    }
}
