//! Cart-scope absolute discounts.

use rust_decimal::Decimal;
use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    state::OrderDiscounts,
};

use super::{PriceBasis, RuleVoucherPair, eligible_positions, record_distributed};

/// Distributes `rule.amount` proportionally across the eligible articles,
/// clamped at their summed running line totals so the cart can never be
/// discounted below zero.
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

    let weights: Vec<Decimal> = positions
        .iter()
        .filter_map(|position| state.at_position(*position))
        .map(|entry| entry.current_line_total())
        .collect();

    let base: Decimal = weights.iter().copied().sum();
    let total = pair.rule.amount.min(base);

    record_distributed(pair, state, ctx, &positions, &weights, total, PriceBasis::Current);
}

#[cfg(test)]
mod tests {
    use crate::{
        resolver::Memberships,
        rules::{PriceRule, RuleAction},
        actions::test_support::{cart, context, dec, pair},
    };

    use super::*;

    fn absolute_rule(amount: &str) -> PriceRule {
        let mut rule = PriceRule::new("cart-absolute");
        rule.action = RuleAction::CartByAbsolute;
        rule.amount = dec(amount);
        rule
    }

    #[test]
    fn distributes_the_amount_proportionally() {
        let cart = cart(&[("sku-1", "350", "2"), ("sku-2", "34.93", "2")]);
        let memberships = Memberships::default();
        let ctx = context(&cart, &memberships);
        let mut state = OrderDiscounts::init(&cart);
        let rule = absolute_rule("100");

        apply(&pair(&rule), &mut state, &ctx, None);

        // Weights 700 and 69.86; shares 90.95 + 9.05 at step 0.05.
        let shares: Vec<Decimal> = state.iter().map(|e| e.total_discount_amount).collect();
        assert_eq!(shares, vec![dec("90.95"), dec("9.05")]);
        assert_eq!(state.total_discount(), dec("100.00"));
    }

    #[test]
    fn clamps_at_the_discountable_base() {
        let cart = cart(&[("sku-1", "10", "1"), ("sku-2", "20", "1")]);
        let memberships = Memberships::default();
        let ctx = context(&cart, &memberships);
        let mut state = OrderDiscounts::init(&cart);
        let rule = absolute_rule("500");

        apply(&pair(&rule), &mut state, &ctx, None);

        assert_eq!(state.total_discount(), dec("30.00"));
        assert!(
            state.iter().all(|e| e.current_item_price >= Decimal::ZERO),
            "running prices must never go negative"
        );
    }
}
