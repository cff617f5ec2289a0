//! Scaled discounts.
//!
//! A scaled rule carries an ascending table of levels. The first level
//! whose range contains the trigger value — the eligible quantity sum, or
//! the eligible price base for price-triggered levels — decides the
//! amount. Order-promotion rules distribute cart-scope; every other kind
//! applies per item.

use rust_decimal::Decimal;
use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    rounding::round_to_step,
    rules::{RuleKind, ScaledLevel},
    state::OrderDiscounts,
};

use super::{PriceBasis, RuleVoucherPair, eligible_positions, percent_of, record_distributed};

/// Applies the matching scale level, if any.
pub fn apply(
    pair: &RuleVoucherPair<'_>,
    state: &mut OrderDiscounts,
    ctx: &CalculationContext<'_>,
    scope: Option<&FxHashSet<usize>>,
) {
    let positions = eligible_positions(pair.rule, state, ctx, scope);
    if positions.is_empty() {
        return;
    }

    let quantity_sum: Decimal = positions
        .iter()
        .filter_map(|position| state.at_position(*position))
        .map(|entry| entry.quantity)
        .sum();

    let weights: Vec<Decimal> = positions
        .iter()
        .filter_map(|position| state.at_position(*position))
        .map(|entry| entry.current_line_total())
        .collect();

    let price_sum: Decimal = weights.iter().copied().sum();

    let Some(level) = matching_level(&pair.rule.scaled_levels, quantity_sum, price_sum) else {
        return;
    };

    if pair.rule.kind == RuleKind::OrderPromotion {
        let total = if level.amount_is_percentage {
            percent_of(level.amount, price_sum)
        } else {
            level.amount.min(price_sum)
        };
        record_distributed(pair, state, ctx, &positions, &weights, total, PriceBasis::Current);
        return;
    }

    for position in positions {
        if let Some(entry) = state.at_position_mut(position) {
            let base = entry.current_item_price;
            let single = if level.amount_is_percentage {
                percent_of(level.amount, base)
            } else {
                level.amount.min(base)
            };
            let amount = round_to_step(single * entry.quantity, ctx.round_step);

            let applied = pair.applied_for(entry, base, single, amount);
            entry.record(applied, pair.rule.exclusive);
        }
    }
}

fn matching_level(
    levels: &[ScaledLevel],
    quantity_sum: Decimal,
    price_sum: Decimal,
) -> Option<&ScaledLevel> {
    levels.iter().find(|level| {
        let trigger = if level.threshold_is_price {
            price_sum
        } else {
            quantity_sum
        };
        level.from_value <= trigger && trigger <= level.to_value
    })
}
