//! Item-set discounts.
//!
//! A rule configures one or more item sets. For each set, the evaluator
//! finds the largest `k` such that every member is present with quantity
//! at least `k`, then grants `rule.amount × k`, spread proportionally
//! over the set's members.

use rust_decimal::Decimal;
use rustc_hash::FxHashSet;

use crate::{
    eligibility::CalculationContext,
    state::OrderDiscounts,
};

use super::{PriceBasis, RuleVoucherPair, eligible_positions, record_distributed};

/// Applies `rule.amount` once per complete item set in the cart.
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

    for set in &pair.rule.item_sets {
        let complete_sets = count_complete_sets(state, &positions, set);
        if complete_sets == Decimal::ZERO {
            continue;
        }

        let member_positions: Vec<usize> = positions
            .iter()
            .copied()
            .filter(|position| {
                state
                    .at_position(*position)
                    .is_some_and(|entry| set.contains(&entry.article_id))
            })
            .collect();

        let weights: Vec<Decimal> = member_positions
            .iter()
            .filter_map(|position| state.at_position(*position))
            .map(|entry| entry.current_line_total())
            .collect();

        let base: Decimal = weights.iter().copied().sum();
        let total = (pair.rule.amount * complete_sets).min(base);

        record_distributed(
            pair,
            state,
            ctx,
            &member_positions,
            &weights,
            total,
            PriceBasis::Current,
        );
    }
}

/// The largest whole `k` such that each member of `set` appears across
/// `positions` with summed quantity at least `k`. Zero when any member is
/// missing.
fn count_complete_sets(state: &OrderDiscounts, positions: &[usize], set: &[String]) -> Decimal {
    set.iter()
        .map(|member| {
            positions
                .iter()
                .filter_map(|position| state.at_position(*position))
                .filter(|entry| entry.article_id == *member)
                .map(|entry| entry.quantity)
                .sum::<Decimal>()
        })
        .min()
        .unwrap_or(Decimal::ZERO)
        .floor()
}

#[cfg(test)]
mod tests {
    use crate::{
        resolver::Memberships,
        rules::{PriceRule, RuleAction},
        actions::test_support::{cart, context, dec, pair},
    };

    use super::*;

    fn set_rule(amount: &str, sets: &[&[&str]]) -> PriceRule {
        let mut rule = PriceRule::new("item-set");
        rule.action = RuleAction::ItemSetAbsolute;
        rule.amount = dec(amount);
        rule.item_sets = sets
            .iter()
            .map(|set| set.iter().map(ToString::to_string).collect())
            .collect();
        rule
    }

    #[test]
    fn complete_set_grants_the_amount() {
        let cart = cart(&[("sku-1", "100", "1"), ("sku-2", "300", "2"), ("other", "500", "5")]);
        let memberships = Memberships::default();
        let ctx = context(&cart, &memberships);
        let mut state = OrderDiscounts::init(&cart);
        let rule = set_rule("10", &[&["sku-1", "sku-2"]]);

        apply(&pair(&rule), &mut state, &ctx, None);

        // One complete set (sku-1 caps it at 1): 10 split 100:600.
        assert_eq!(state.total_discount(), dec("10.00"));
        let untouched = state.get("other").map(|e| e.total_discount_amount);
        assert_eq!(untouched, Some(Decimal::ZERO));
    }

    #[test]
    fn quantity_bounds_the_set_count() {
        let cart = cart(&[("sku-1", "100", "3"), ("sku-2", "50", "2")]);
        let memberships = Memberships::default();
        let ctx = context(&cart, &memberships);
        let mut state = OrderDiscounts::init(&cart);
        let rule = set_rule("10", &[&["sku-1", "sku-2"]]);

        apply(&pair(&rule), &mut state, &ctx, None);

        // min(3, 2) = 2 complete sets.
        assert_eq!(state.total_discount(), dec("20.00"));
    }

    #[test]
    fn missing_member_grants_nothing() {
        let cart = cart(&[("sku-1", "100", "1")]);
        let memberships = Memberships::default();
        let ctx = context(&cart, &memberships);
        let mut state = OrderDiscounts::init(&cart);
        let rule = set_rule("10", &[&["sku-1", "sku-2"]]);

        apply(&pair(&rule), &mut state, &ctx, None);

        assert_eq!(state.total_discount(), Decimal::ZERO);
    }

    #[test]
    fn each_configured_set_counts_independently() {
        let cart = cart(&[("a1", "100", "1"), ("a2", "100", "1"), ("b1", "100", "1")]);
        let memberships = Memberships::default();
        let ctx = context(&cart, &memberships);
        let mut state = OrderDiscounts::init(&cart);
        let rule = set_rule("10", &[&["a1", "a2"], &["b1", "missing"]]);

        apply(&pair(&rule), &mut state, &ctx, None);

        // Only the first set is complete.
        assert_eq!(state.total_discount(), dec("10.00"));
    }
}
