//! Engine
//!
//! The cascade orchestrator. A calculation initializes one accumulator
//! per cart position, then runs the rule categories in a fixed order over
//! successively reduced prices:
//!
//! 1. product promotions (best-option search),
//! 2. customer promotions (best single rule per article),
//! 3. order promotions (all eligible, by priority),
//! 4. voucher-base snapshot,
//! 5. vouchers (caller code order),
//! 6. payment-method discounts,
//! 7. shipping.
//!
//! Every speculative evaluation — the best-option search and the
//! per-article customer selection — runs on a cloned state and never
//! touches registry counters; usage is recorded only by
//! [`DiscountEngine::commit_discounts`].

use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::{
    actions::{self, PriceBasis, RuleVoucherPair},
    articles::ArticleCollection,
    eligibility::{CalculationContext, RejectionReason},
    registry::{CommitError, Registry, RegistryError, UsagePlan},
    resolver::Memberships,
    rules::{PriceRule, RuleAction, RuleKind},
    state::OrderDiscounts,
    summary::{RejectedVoucher, Summary},
    vouchers::{Voucher, VoucherRejection},
};

/// Errors fatal to a whole calculation.
#[derive(Debug, Error)]
pub enum CalculationError {
    /// The registry could not be read; no discounts were applied.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The rounding step must be positive.
    #[error("rounding step {0} is not positive")]
    InvalidRoundStep(Decimal),
}

/// The result of one calculation: the per-article breakdown plus the cart
/// summary.
#[derive(Debug, Clone)]
pub struct CalculationOutcome {
    /// Per-article discount state, in cart order.
    pub discounts: OrderDiscounts,

    /// Cart-level totals and voucher outcomes.
    pub summary: Summary,
}

/// Which voucher codes were accepted, and why the rest were not.
#[derive(Debug, Clone)]
pub struct VoucherSelection {
    /// Accepted codes, in caller order.
    pub accepted: Vec<String>,

    /// Rejected codes with reasons, in caller order.
    pub rejected: Vec<RejectedVoucher>,
}

/// The rule-driven discount engine, bound to an injected registry.
#[derive(Debug)]
pub struct DiscountEngine<R> {
    registry: R,
}

impl<R: Registry> DiscountEngine<R> {
    /// Creates an engine over `registry`.
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// The backing registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Computes the full discount breakdown for a checkout cart.
    ///
    /// `customer_group_ids`, when given, substitute for registry
    /// resolution of the customer's group memberships. Voucher codes are
    /// honored in the order supplied; a rejected code never fails the
    /// calculation and is reported in the summary instead.
    ///
    /// # Errors
    ///
    /// [`CalculationError::Registry`] when the registry cannot be read,
    /// [`CalculationError::InvalidRoundStep`] for a non-positive step.
    pub fn apply_discounts(
        &self,
        cart: &ArticleCollection,
        customer_group_ids: Option<&[String]>,
        voucher_codes: &[String],
        checkout_attributes: &[String],
        round_step: Decimal,
    ) -> Result<CalculationOutcome, CalculationError> {
        self.calculate(
            cart,
            customer_group_ids,
            voucher_codes,
            checkout_attributes,
            round_step,
            false,
        )
    }

    /// Computes catalog display prices: product promotions only, item
    /// scope, no cart-dependent conditions.
    ///
    /// # Errors
    ///
    /// Same as [`DiscountEngine::apply_discounts`].
    pub fn apply_discounts_on_catalog(
        &self,
        cart: &ArticleCollection,
        customer_group_ids: Option<&[String]>,
        round_step: Decimal,
    ) -> Result<CalculationOutcome, CalculationError> {
        self.calculate(cart, customer_group_ids, &[], &[], round_step, true)
    }

    /// Assesses voucher codes against the undiscounted cart.
    ///
    /// # Errors
    ///
    /// [`CalculationError::Registry`] when the registry cannot be read.
    pub fn pick_applicable_vouchers(
        &self,
        codes: &[String],
        cart: &ArticleCollection,
        checkout_attributes: &[String],
    ) -> Result<VoucherSelection, CalculationError> {
        let memberships = Memberships::resolve(&self.registry, cart, None)?;
        let ctx = CalculationContext {
            cart,
            memberships: &memberships,
            checkout_attributes,
            now: Timestamp::now(),
            round_step: Decimal::ONE,
            is_catalog: false,
        };
        let state = OrderDiscounts::init(cart);

        let (pairs, rejected) = self.select_vouchers(codes, &ctx, &state)?;
        Ok(VoucherSelection {
            accepted: pairs.into_iter().map(|(voucher, _)| voucher.code).collect(),
            rejected,
        })
    }

    /// Assesses a single voucher code. `Ok(None)` means applicable.
    ///
    /// # Errors
    ///
    /// [`CalculationError::Registry`] when the registry cannot be read.
    pub fn validate_voucher(
        &self,
        code: &str,
        cart: &ArticleCollection,
        checkout_attributes: &[String],
    ) -> Result<Option<VoucherRejection>, CalculationError> {
        let selection =
            self.pick_applicable_vouchers(&[code.to_owned()], cart, checkout_attributes)?;
        Ok(selection.rejected.into_iter().map(|r| r.reason).next())
    }

    /// Durably records the usages of a finished calculation: one usage
    /// per distinct rule and voucher, atomically, at most once per cart.
    ///
    /// # Errors
    ///
    /// [`CommitError::AlreadyCommitted`] on a repeated cart,
    /// [`CommitError::UsageCapExceeded`] when a counter would overshoot
    /// (nothing is mutated), or [`CommitError::Registry`].
    pub fn commit_discounts(
        &self,
        discounts: &OrderDiscounts,
        customer_id: &str,
    ) -> Result<(), CommitError> {
        let plan = UsagePlan {
            cart_id: discounts.cart_id().to_owned(),
            customer_id: customer_id.to_owned(),
            rule_ids: discounts.applied_rule_ids(),
            voucher_ids: discounts.applied_voucher_ids(),
            committed_at: Timestamp::now(),
        };
        self.registry.record_usages(&plan)
    }

    fn calculate(
        &self,
        cart: &ArticleCollection,
        customer_group_ids: Option<&[String]>,
        voucher_codes: &[String],
        checkout_attributes: &[String],
        round_step: Decimal,
        is_catalog: bool,
    ) -> Result<CalculationOutcome, CalculationError> {
        if round_step <= Decimal::ZERO {
            return Err(CalculationError::InvalidRoundStep(round_step));
        }

        let memberships = Memberships::resolve(&self.registry, cart, customer_group_ids)?;
        let ctx = CalculationContext {
            cart,
            memberships: &memberships,
            checkout_attributes,
            now: Timestamp::now(),
            round_step,
            is_catalog,
        };

        let mut state = OrderDiscounts::init(cart);

        self.run_product_phase(&mut state, &ctx)?;

        if is_catalog {
            let summary = Summary::build(&state, &FxHashSet::default(), Vec::new(), Vec::new());
            return Ok(CalculationOutcome {
                discounts: state,
                summary,
            });
        }

        self.run_customer_phase(&mut state, &ctx)?;
        self.run_order_phase(&mut state, &ctx)?;

        state.snapshot_voucher_base();
        let (accepted, rejected) = self.run_voucher_phase(&mut state, &ctx, voucher_codes)?;

        self.run_flat_phase(&mut state, &ctx, RuleKind::PaymentMethod)?;
        let shipping_rules = self.run_flat_phase(&mut state, &ctx, RuleKind::Shipping)?;

        let shipping_article_ids = shipping_article_ids(cart, &memberships, &shipping_rules);
        let summary = Summary::build(&state, &shipping_article_ids, accepted, rejected);

        Ok(CalculationOutcome {
            discounts: state,
            summary,
        })
    }

    /// Product promotions: non-conflicting candidates always apply;
    /// conflicting candidates are grouped and the best-scoring
    /// alternative per group wins.
    fn run_product_phase(
        &self,
        state: &mut OrderDiscounts,
        ctx: &CalculationContext<'_>,
    ) -> Result<(), CalculationError> {
        let mut rules = self.registry.rules_by_kind(RuleKind::ProductPromotion)?;
        if ctx.is_catalog {
            // Catalog display prices are per item; cart-shaped actions
            // have no meaning without a real cart.
            rules.retain(|rule| {
                matches!(
                    rule.action,
                    RuleAction::ItemByPercent | RuleAction::ItemByAbsolute | RuleAction::Scaled
                )
            });
        }
        sort_rules(&mut rules);

        let candidates: Vec<PriceRule> = rules
            .into_iter()
            .filter(|rule| ctx.eligible_for_any_article(rule, state).is_ok())
            .collect();

        let coverage: Vec<FxHashSet<usize>> = candidates
            .iter()
            .map(|rule| {
                actions::eligible_positions(rule, state, ctx, None)
                    .into_iter()
                    .collect()
            })
            .collect();

        let groups = conflict_groups(&candidates, &coverage);
        debug!(
            candidates = candidates.len(),
            conflict_groups = groups.len(),
            "product promotion phase"
        );

        for group in groups {
            if let [only] = group.as_slice() {
                if let Some(rule) = candidates.get(*only) {
                    self.apply_rule(rule, None, state, ctx, None, PriceBasis::Current);
                }
                continue;
            }

            // Score each alternative on a clone; the group indices are in
            // (priority desc, id asc) order, so keeping the first best
            // implements the tie-break.
            let baseline = state.total_discount();
            let mut best: Option<(usize, Decimal)> = None;
            for idx in &group {
                let Some(rule) = candidates.get(*idx) else {
                    continue;
                };
                let mut speculative = state.clone();
                self.apply_rule(rule, None, &mut speculative, ctx, None, PriceBasis::Current);
                let gain = speculative.total_discount() - baseline;
                if best.is_none_or(|(_, best_gain)| gain > best_gain) {
                    best = Some((*idx, gain));
                }
            }

            if let Some((winner, gain)) = best {
                if gain > Decimal::ZERO {
                    if let Some(rule) = candidates.get(winner) {
                        debug!(rule = %rule.id, %gain, "best-option winner");
                        self.apply_rule(rule, None, state, ctx, None, PriceBasis::Current);
                    }
                }
            }
        }

        Ok(())
    }

    /// Customer promotions: for every article, the eligible rule with the
    /// largest per-article gain wins; winners apply restricted to their
    /// articles, in priority order.
    fn run_customer_phase(
        &self,
        state: &mut OrderDiscounts,
        ctx: &CalculationContext<'_>,
    ) -> Result<(), CalculationError> {
        let mut rules = self.registry.rules_by_kind(RuleKind::CustomerPromotion)?;
        sort_rules(&mut rules);

        let candidates: Vec<PriceRule> = rules
            .into_iter()
            .filter(|rule| ctx.eligible_for_any_article(rule, state).is_ok())
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        let mut best_per_position: Vec<Option<(usize, Decimal)>> = vec![None; state.len()];
        for (idx, rule) in candidates.iter().enumerate() {
            let mut speculative = state.clone();
            self.apply_rule(rule, None, &mut speculative, ctx, None, PriceBasis::Current);

            for (position, entry) in speculative.iter().enumerate() {
                let before = state
                    .at_position(position)
                    .map(|e| e.total_discount_amount)
                    .unwrap_or_default();
                let gain = entry.total_discount_amount - before;
                if gain <= Decimal::ZERO {
                    continue;
                }
                if let Some(slot) = best_per_position.get_mut(position) {
                    if slot.is_none_or(|(_, best_gain)| gain > best_gain) {
                        *slot = Some((idx, gain));
                    }
                }
            }
        }

        let mut scopes: FxHashMap<usize, FxHashSet<usize>> = FxHashMap::default();
        for (position, winner) in best_per_position.iter().enumerate() {
            if let Some((idx, _)) = winner {
                scopes.entry(*idx).or_default().insert(position);
            }
        }

        for (idx, rule) in candidates.iter().enumerate() {
            if let Some(scope) = scopes.get(&idx) {
                debug!(rule = %rule.id, articles = scope.len(), "customer promotion winner");
                self.apply_rule(rule, None, state, ctx, Some(scope), PriceBasis::Current);
            }
        }

        Ok(())
    }

    /// Order promotions: every eligible rule applies, highest priority
    /// first, each seeing the state its predecessors left behind.
    fn run_order_phase(
        &self,
        state: &mut OrderDiscounts,
        ctx: &CalculationContext<'_>,
    ) -> Result<(), CalculationError> {
        let mut rules = self.registry.rules_by_kind(RuleKind::OrderPromotion)?;
        sort_rules(&mut rules);

        for rule in &rules {
            self.apply_rule(rule, None, state, ctx, None, PriceBasis::Current);
        }
        Ok(())
    }

    /// Vouchers: each accepted code applies in caller order against the
    /// voucher-base snapshot.
    fn run_voucher_phase(
        &self,
        state: &mut OrderDiscounts,
        ctx: &CalculationContext<'_>,
        codes: &[String],
    ) -> Result<(Vec<String>, Vec<RejectedVoucher>), CalculationError> {
        let (pairs, rejected) = self.select_vouchers(codes, ctx, state)?;

        let mut accepted = Vec::with_capacity(pairs.len());
        for (voucher, rule) in &pairs {
            self.apply_rule(
                rule,
                Some(voucher),
                state,
                ctx,
                None,
                PriceBasis::VoucherSnapshot,
            );
            accepted.push(voucher.code.clone());
        }

        Ok((accepted, rejected))
    }

    /// Payment-method and shipping phases share the flat shape of the
    /// order phase. Returns the kind's rules for later classification.
    fn run_flat_phase(
        &self,
        state: &mut OrderDiscounts,
        ctx: &CalculationContext<'_>,
        kind: RuleKind,
    ) -> Result<Vec<PriceRule>, CalculationError> {
        let mut rules = self.registry.rules_by_kind(kind)?;
        sort_rules(&mut rules);

        for rule in &rules {
            self.apply_rule(rule, None, state, ctx, None, PriceBasis::Current);
        }
        Ok(rules)
    }

    fn apply_rule(
        &self,
        rule: &PriceRule,
        voucher: Option<&Voucher>,
        state: &mut OrderDiscounts,
        ctx: &CalculationContext<'_>,
        scope: Option<&FxHashSet<usize>>,
        basis: PriceBasis,
    ) {
        let pair = RuleVoucherPair { rule, voucher };
        actions::apply(&pair, state, ctx, scope, basis);
    }

    /// Resolves each code to an applicable (voucher, rule) pair or a
    /// rejection reason, preserving caller order. Empty strings are
    /// ignored.
    fn select_vouchers(
        &self,
        codes: &[String],
        ctx: &CalculationContext<'_>,
        state: &OrderDiscounts,
    ) -> Result<(Vec<RedeemablePair>, Vec<RejectedVoucher>), CalculationError> {
        let mut pairs = Vec::new();
        let mut rejected = Vec::new();

        for code in codes.iter().filter(|code| !code.is_empty()) {
            match self.assess_voucher(code, ctx, state)? {
                Ok(pair) => pairs.push(pair),
                Err(reason) => rejected.push(RejectedVoucher {
                    code: code.clone(),
                    reason,
                }),
            }
        }

        Ok((pairs, rejected))
    }

    fn assess_voucher(
        &self,
        code: &str,
        ctx: &CalculationContext<'_>,
        state: &OrderDiscounts,
    ) -> Result<Result<RedeemablePair, VoucherRejection>, RegistryError> {
        let Some(voucher) = self.registry.voucher_by_code(code)? else {
            return Ok(Err(VoucherRejection::NotFound));
        };
        let Some(rule) = self.registry.rule_by_id(&voucher.rule_id)? else {
            return Ok(Err(VoucherRejection::NotFound));
        };

        if let Err(reason) = voucher.redeemable_by(&rule, &ctx.cart.customer_id, ctx.now) {
            return Ok(Err(reason));
        }

        match ctx.eligible_for_any_article(&rule, state) {
            Ok(()) => Ok(Ok((voucher, rule))),
            Err(RejectionReason::MinOrderNotReached) => {
                Ok(Err(VoucherRejection::MinOrderNotReached))
            }
            Err(RejectionReason::OutsideValidityWindow) => Ok(Err(VoucherRejection::Expired)),
            Err(RejectionReason::UsageCapReached) => Ok(Err(VoucherRejection::AlreadyRedeemed)),
            Err(_) => Ok(Err(VoucherRejection::RuleNotEligible)),
        }
    }
}

/// A voucher that passed selection, paired with the rule it redeems.
type RedeemablePair = (Voucher, PriceRule);

/// Deterministic rule order: priority descending, then ID.
fn sort_rules(rules: &mut [PriceRule]) {
    rules.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
}

/// Partitions candidate indices into conflict groups: two rules conflict
/// when they share an eligible article and at least one is exclusive;
/// groups are the transitive closure of that relation.
fn conflict_groups(rules: &[PriceRule], coverage: &[FxHashSet<usize>]) -> Vec<Vec<usize>> {
    let count = rules.len();
    let conflicting = |a: usize, b: usize| -> bool {
        let exclusive = rules.get(a).is_some_and(|r| r.exclusive)
            || rules.get(b).is_some_and(|r| r.exclusive);
        let shared = match (coverage.get(a), coverage.get(b)) {
            (Some(left), Some(right)) => !left.is_disjoint(right),
            _ => false,
        };
        exclusive && shared
    };

    let mut assigned = vec![false; count];
    let mut groups = Vec::new();

    for start in 0..count {
        if assigned.get(start).copied().unwrap_or(true) {
            continue;
        }
        if let Some(flag) = assigned.get_mut(start) {
            *flag = true;
        }

        let mut group = vec![start];
        let mut cursor = 0;
        while let Some(&current) = group.get(cursor) {
            cursor += 1;
            for next in 0..count {
                if assigned.get(next).copied().unwrap_or(true) || !conflicting(current, next) {
                    continue;
                }
                if let Some(flag) = assigned.get_mut(next) {
                    *flag = true;
                }
                group.push(next);
            }
        }

        group.sort_unstable();
        groups.push(group);
    }

    groups
}

/// Articles that belong to a product group any shipping rule includes.
fn shipping_article_ids(
    cart: &ArticleCollection,
    memberships: &Memberships,
    shipping_rules: &[PriceRule],
) -> FxHashSet<String> {
    cart.iter()
        .filter(|article| {
            shipping_rules.iter().any(|rule| {
                memberships.article_in_any(&article.id, &rule.included_product_group_ids)
            })
        })
        .map(|article| article.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::registry::MockRegistry;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap_or_default()
    }

    fn cart() -> ArticleCollection {
        let mut cart = ArticleCollection::new("cart-1", "customer-1");
        cart.push(crate::articles::Article::new("sku-1", dec("100"), dec("1")));
        cart
    }

    #[test]
    fn non_positive_round_step_is_rejected() {
        let engine = DiscountEngine::new(MockRegistry::new());

        let result = engine.apply_discounts(&cart(), None, &[], &[], Decimal::ZERO);

        assert!(matches!(
            result,
            Err(CalculationError::InvalidRoundStep(_))
        ));
    }

    #[test]
    fn registry_failure_surfaces_and_applies_nothing() {
        let mut registry = MockRegistry::new();
        registry
            .expect_groups_by_kind()
            .returning(|_| Err(RegistryError::Unavailable("store is down".into())));
        let engine = DiscountEngine::new(registry);

        let result = engine.apply_discounts(&cart(), None, &[], &[], dec("0.05"));

        assert!(matches!(
            result,
            Err(CalculationError::Registry(RegistryError::Unavailable(_)))
        ));
    }

    #[test]
    fn conflict_groups_merge_transitively() {
        let mut exclusive = PriceRule::new("a-exclusive");
        exclusive.exclusive = true;
        let plain_b = PriceRule::new("b");
        let plain_c = PriceRule::new("c");
        let rules = vec![exclusive, plain_b, plain_c];

        // a and b share article 0; b and c share article 1; only a is
        // exclusive, so a+b conflict but b+c do not.
        let coverage = vec![
            std::iter::once(0).collect::<FxHashSet<usize>>(),
            [0, 1].into_iter().collect(),
            std::iter::once(1).collect(),
        ];

        let groups = conflict_groups(&rules, &coverage);

        assert_eq!(groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn conflict_needs_an_exclusive_member() {
        let rules = vec![PriceRule::new("a"), PriceRule::new("b")];
        let coverage = vec![
            std::iter::once(0).collect::<FxHashSet<usize>>(),
            std::iter::once(0).collect(),
        ];

        let groups = conflict_groups(&rules, &coverage);

        assert_eq!(groups.len(), 2, "non-exclusive overlap must not conflict");
    }

    #[test]
    fn sort_rules_orders_by_priority_then_id() {
        let mut low = PriceRule::new("z-low");
        low.priority = 10;
        let mut high = PriceRule::new("high");
        high.priority = 100;
        let mut high_too = PriceRule::new("a-high");
        high_too.priority = 100;

        let mut rules = vec![low, high, high_too];
        sort_rules(&mut rules);

        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a-high", "high", "z-low"]);
    }
}
