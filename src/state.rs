//! Discount state
//!
//! The mutable accumulator a calculation threads through the cascade: one
//! [`ArticleDiscounts`] per cart position, each holding the running price
//! and the applied-discount trail. Rebuilt from scratch on every
//! calculation; never persisted.
//!
//! Accumulators are plain values. The best-option search clones the whole
//! [`OrderDiscounts`] before speculative evaluation and commits by
//! replacing it, so speculative runs can never alias the real state.

use rust_decimal::Decimal;
use smallvec::SmallVec;

use crate::{
    articles::ArticleCollection,
    rules::RuleKind,
};

/// One rule application on one article.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountApplied {
    /// The applying rule.
    pub price_rule_id: String,

    /// The applying rule's cascade phase, for summary attribution.
    pub rule_kind: RuleKind,

    /// The rule's opaque mapping identifier.
    pub mapping_id: String,

    /// Redeeming voucher, when the rule came in through one.
    pub voucher_id: Option<String>,

    /// Redeeming voucher code.
    pub voucher_code: Option<String>,

    /// Per-unit price the discount was computed against.
    pub calculation_base_price: Decimal,

    /// Per-unit price before any discounts.
    pub price: Decimal,

    /// Per-unit discount.
    pub discount_single: Decimal,

    /// Line discount (per-unit × quantity, rounded).
    pub discount_amount: Decimal,

    /// Quantity the discount covered.
    pub quantity: Decimal,
}

/// Per-article accumulator.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDiscounts {
    /// The article this accumulator belongs to.
    pub article_id: String,

    /// The article's cart position (duplicate IDs are legal).
    pub position: usize,

    /// Per-unit price at initialization; set once.
    pub initial_item_price: Decimal,

    /// Per-unit price after the discounts applied so far; never negative.
    pub current_item_price: Decimal,

    /// Article quantity.
    pub quantity: Decimal,

    /// Sum of line discounts applied so far.
    pub total_discount_amount: Decimal,

    /// `total_discount_amount` as a percentage of the initial line total.
    pub total_discount_percentage: Decimal,

    /// Per-unit price snapshotted before the voucher phase; percent
    /// vouchers price against this instead of the running price.
    pub voucher_calculation_base_item_price: Decimal,

    /// The applied-discount trail, in application order.
    pub applied_discounts: SmallVec<[DiscountApplied; 4]>,

    /// Set by an exclusive rule; blocks later item-scope applications.
    pub stop_applying_discounts: bool,
}

impl ArticleDiscounts {
    fn new(article_id: String, position: usize, price: Decimal, quantity: Decimal) -> Self {
        Self {
            article_id,
            position,
            initial_item_price: price,
            current_item_price: price,
            quantity,
            total_discount_amount: Decimal::ZERO,
            total_discount_percentage: Decimal::ZERO,
            voucher_calculation_base_item_price: Decimal::ZERO,
            applied_discounts: SmallVec::new(),
            stop_applying_discounts: false,
        }
    }

    /// The undiscounted line total.
    pub fn initial_line_total(&self) -> Decimal {
        self.initial_item_price * self.quantity
    }

    /// The discounted line total.
    pub fn current_line_total(&self) -> Decimal {
        self.current_item_price * self.quantity
    }

    /// Records one application: appends the trail entry, updates the
    /// totals, reduces the running per-unit price (clamped at zero) and
    /// latches the stop flag for exclusive rules.
    pub fn record(&mut self, applied: DiscountApplied, exclusive: bool) {
        self.total_discount_amount += applied.discount_amount;

        let initial_total = self.initial_line_total();
        if initial_total > Decimal::ZERO {
            self.total_discount_percentage =
                self.total_discount_amount * Decimal::ONE_HUNDRED / initial_total;
        }

        let per_unit = if self.quantity > Decimal::ZERO {
            applied.discount_amount / self.quantity
        } else {
            Decimal::ZERO
        };
        self.current_item_price = (self.current_item_price - per_unit).max(Decimal::ZERO);

        self.applied_discounts.push(applied);

        if exclusive {
            self.stop_applying_discounts = true;
        }
    }
}

/// The whole-cart accumulator: one entry per cart position, iterated in
/// cart order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDiscounts {
    cart_id: String,
    customer_id: String,
    entries: Vec<ArticleDiscounts>,
}

impl OrderDiscounts {
    /// Initializes the accumulator from a cart: running price = initial
    /// price, empty trails, no stop flags.
    pub fn init(cart: &ArticleCollection) -> Self {
        Self {
            cart_id: cart.id.clone(),
            customer_id: cart.customer_id.clone(),
            entries: cart
                .iter()
                .enumerate()
                .map(|(position, article)| {
                    ArticleDiscounts::new(
                        article.id.clone(),
                        position,
                        article.price,
                        article.quantity,
                    )
                })
                .collect(),
        }
    }

    /// The cart this state was computed for.
    pub fn cart_id(&self) -> &str {
        &self.cart_id
    }

    /// The cart's customer.
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Iterates accumulators in cart order.
    pub fn iter(&self) -> impl Iterator<Item = &ArticleDiscounts> {
        self.entries.iter()
    }

    /// Iterates accumulators mutably, in cart order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ArticleDiscounts> {
        self.entries.iter_mut()
    }

    /// The accumulator for the first cart position holding `article_id`.
    pub fn get(&self, article_id: &str) -> Option<&ArticleDiscounts> {
        self.entries.iter().find(|e| e.article_id == article_id)
    }

    /// The accumulator at a cart position.
    pub fn at_position(&self, position: usize) -> Option<&ArticleDiscounts> {
        self.entries.get(position)
    }

    /// Mutable access by cart position.
    pub fn at_position_mut(&mut self, position: usize) -> Option<&mut ArticleDiscounts> {
        self.entries.get_mut(position)
    }

    /// Number of accumulators (= cart positions).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the state tracks no articles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all line discounts; the best-option search score.
    pub fn total_discount(&self) -> Decimal {
        self.entries.iter().map(|e| e.total_discount_amount).sum()
    }

    /// Snapshots the running price of every article as the voucher
    /// calculation base.
    pub fn snapshot_voucher_base(&mut self) {
        for entry in &mut self.entries {
            entry.voucher_calculation_base_item_price = entry.current_item_price;
        }
    }

    /// Distinct applied rule IDs, in first-application order.
    pub fn applied_rule_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for applied in self.entries.iter().flat_map(|e| &e.applied_discounts) {
            if !ids.contains(&applied.price_rule_id) {
                ids.push(applied.price_rule_id.clone());
            }
        }
        ids
    }

    /// Distinct redeemed voucher IDs, in first-application order.
    pub fn applied_voucher_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for applied in self.entries.iter().flat_map(|e| &e.applied_discounts) {
            if let Some(voucher_id) = &applied.voucher_id {
                if !ids.contains(voucher_id) {
                    ids.push(voucher_id.clone());
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use crate::articles::Article;

    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap_or_default()
    }

    fn cart() -> ArticleCollection {
        ArticleCollection::with_articles(
            "cart-1",
            "customer-1",
            [
                Article::new("sku-1", dec("100"), dec("2")),
                Article::new("sku-2", dec("50"), dec("1")),
            ],
        )
    }

    fn applied(rule_id: &str, single: &str, amount: &str, quantity: &str) -> DiscountApplied {
        DiscountApplied {
            price_rule_id: rule_id.into(),
            rule_kind: RuleKind::ProductPromotion,
            mapping_id: String::new(),
            voucher_id: None,
            voucher_code: None,
            calculation_base_price: dec("100"),
            price: dec("100"),
            discount_single: dec(single),
            discount_amount: dec(amount),
            quantity: dec(quantity),
        }
    }

    #[test]
    fn init_mirrors_cart_prices_and_order() {
        let state = OrderDiscounts::init(&cart());

        assert_eq!(state.len(), 2);
        let first = state.at_position(0).map(|e| e.article_id.as_str());
        assert_eq!(first, Some("sku-1"));
        let entry = state.get("sku-1").map(|e| e.current_item_price);
        assert_eq!(entry, Some(dec("100")));
        assert_eq!(state.total_discount(), Decimal::ZERO);
    }

    #[test]
    fn record_reduces_running_price_and_tracks_totals() {
        let mut state = OrderDiscounts::init(&cart());
        if let Some(entry) = state.at_position_mut(0) {
            entry.record(applied("sale", "20", "40", "2"), false);
        }

        let entry = state.get("sku-1");
        let (current, total, percentage) = entry
            .map(|e| {
                (
                    e.current_item_price,
                    e.total_discount_amount,
                    e.total_discount_percentage,
                )
            })
            .unwrap_or_default();

        assert_eq!(current, dec("80"));
        assert_eq!(total, dec("40"));
        assert_eq!(percentage, dec("20"));
    }

    #[test]
    fn running_price_clamps_at_zero() {
        let mut state = OrderDiscounts::init(&cart());
        if let Some(entry) = state.at_position_mut(1) {
            entry.record(applied("big", "70", "70", "1"), false);
        }

        let current = state.get("sku-2").map(|e| e.current_item_price);
        assert_eq!(current, Some(Decimal::ZERO));
    }

    #[test]
    fn exclusive_rule_latches_stop_flag() {
        let mut state = OrderDiscounts::init(&cart());
        if let Some(entry) = state.at_position_mut(0) {
            entry.record(applied("exclusive", "60", "120", "2"), true);
        }

        let stopped = state.get("sku-1").map(|e| e.stop_applying_discounts);
        assert_eq!(stopped, Some(true));
    }

    #[test]
    fn snapshot_captures_running_prices() {
        let mut state = OrderDiscounts::init(&cart());
        if let Some(entry) = state.at_position_mut(0) {
            entry.record(applied("sale", "20", "40", "2"), false);
        }
        state.snapshot_voucher_base();

        let base = state
            .get("sku-1")
            .map(|e| e.voucher_calculation_base_item_price);
        assert_eq!(base, Some(dec("80")));
    }

    #[test]
    fn applied_ids_are_distinct_and_ordered() {
        let mut state = OrderDiscounts::init(&cart());
        if let Some(entry) = state.at_position_mut(0) {
            entry.record(applied("rule-b", "1", "2", "2"), false);
            entry.record(applied("rule-a", "1", "2", "2"), false);
        }
        if let Some(entry) = state.at_position_mut(1) {
            entry.record(applied("rule-b", "1", "1", "1"), false);
        }

        assert_eq!(state.applied_rule_ids(), vec!["rule-b", "rule-a"]);
    }

    #[test]
    fn cloned_state_does_not_alias() {
        let mut state = OrderDiscounts::init(&cart());
        let mut speculative = state.clone();
        if let Some(entry) = speculative.at_position_mut(0) {
            entry.record(applied("sale", "20", "40", "2"), false);
        }

        assert_eq!(state.total_discount(), Decimal::ZERO);
        assert_eq!(speculative.total_discount(), dec("40"));

        state = speculative;
        assert_eq!(state.total_discount(), dec("40"));
    }
}
