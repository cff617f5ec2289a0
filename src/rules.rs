//! Price rules
//!
//! The declarative discount model: who a rule applies to (group filters,
//! checkout attributes, thresholds), how much (amount + action), and in
//! which phase of the cascade it runs (kind). Config validation happens
//! here at upsert time; runtime applicability lives in
//! [`crate::eligibility`].

use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The cascade phase a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleKind {
    /// Product promotions; subject to the best-option search.
    ProductPromotion,

    /// Customer promotions; best single rule per article.
    CustomerPromotion,

    /// Order-scope promotions, applied in priority order.
    OrderPromotion,

    /// Rules redeemed through a normal voucher code.
    Voucher,

    /// Shipping rules; only affect articles of their included groups.
    Shipping,

    /// Discounts granted for a payment method or checkout tag.
    PaymentMethod,

    /// Rules redeemed through a single-use bonus voucher.
    BonusVoucher,
}

/// The arithmetic shape of a rule's discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    /// Per-unit percentage off each eligible article.
    ItemByPercent,

    /// Per-unit absolute amount off each eligible article.
    ItemByAbsolute,

    /// Percentage of the eligible base, distributed proportionally.
    CartByPercent,

    /// Absolute amount off the eligible base, distributed proportionally.
    CartByAbsolute,

    /// Absolute amount per complete configured item set in the cart.
    ItemSetAbsolute,

    /// Amount looked up from a scale of threshold levels.
    Scaled,
}

/// One level of a scaled rule: a trigger range and the amount it grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaledLevel {
    /// Inclusive lower bound of the trigger value.
    pub from_value: Decimal,

    /// Inclusive upper bound of the trigger value.
    pub to_value: Decimal,

    /// Discount amount granted by this level.
    pub amount: Decimal,

    /// Whether `amount` is a percentage rather than an absolute amount.
    pub amount_is_percentage: bool,

    /// Whether the trigger value is the eligible price base; otherwise it
    /// is the eligible quantity sum.
    pub threshold_is_price: bool,
}

/// Usage counters persisted with a rule and written only at commit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageHistory {
    /// Total number of committed carts referencing the rule.
    pub total_usages: u32,

    /// Committed carts per customer ID.
    pub per_customer: FxHashMap<String, u32>,
}

impl UsageHistory {
    /// Committed usages for one customer.
    pub fn for_customer(&self, customer_id: &str) -> u32 {
        self.per_customer.get(customer_id).copied().unwrap_or(0)
    }
}

/// A declarative discount specification.
///
/// Constructed with [`PriceRule::new`] (which applies the defaults an
/// empty rule document carries) and persisted through the registry, which
/// enforces [`PriceRule::validate`] on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRule {
    /// Rule identifier.
    pub id: String,

    /// The cascade phase this rule runs in.
    pub kind: RuleKind,

    /// The discount arithmetic.
    pub action: RuleAction,

    /// Percentage (for `*ByPercent`) or absolute amount, per the action.
    pub amount: Decimal,

    /// Selection priority; higher wins ties.
    pub priority: i32,

    /// Locale → display name.
    pub name: FxHashMap<String, String>,

    /// Locale → description.
    pub description: FxHashMap<String, String>,

    /// Inclusive start of the validity window.
    pub valid_from: Option<Timestamp>,

    /// Inclusive end of the validity window.
    pub valid_to: Option<Timestamp>,

    /// Product groups the rule applies to; empty means all products.
    pub included_product_group_ids: Vec<String>,

    /// Product groups the rule never applies to.
    pub excluded_product_group_ids: Vec<String>,

    /// Customer groups the rule is restricted to; empty means all.
    pub included_customer_group_ids: Vec<String>,

    /// Payment methods / checkout tags required for the rule to fire.
    pub checkout_attributes: Vec<String>,

    /// Minimum summed quantity of matching articles.
    pub qty_threshold: Decimal,

    /// Maximum committed usages across all customers; 0 = unlimited.
    pub max_uses: u32,

    /// Maximum committed usages per customer; 0 = unlimited.
    pub max_uses_per_customer: u32,

    /// Minimum order amount required; 0 = no minimum.
    pub min_order_amount: Decimal,

    /// Whether only articles matching the rule count towards
    /// `min_order_amount`.
    pub min_order_applicable_items_only: bool,

    /// Whether the order-amount base reads discounted (current) prices.
    pub calculate_discounted_order_amount: bool,

    /// Article IDs excluded from the order-amount base.
    pub excluded_item_ids_from_order_amount: Vec<String>,

    /// Item sets for [`RuleAction::ItemSetAbsolute`].
    pub item_sets: Vec<Vec<String>>,

    /// Scale levels for [`RuleAction::Scaled`], ascending by range.
    pub scaled_levels: Vec<ScaledLevel>,

    /// Whether applying this rule stops later item-scope rules on the
    /// same article.
    pub exclusive: bool,

    /// Opaque mapping identifier, copied onto every applied discount.
    pub mapping_id: String,

    /// Opaque caller payload; never inspected by the engine.
    pub custom: Option<serde_json::Value>,

    /// Committed usage counters.
    pub usage: UsageHistory,
}

impl PriceRule {
    /// Creates a product promotion with the document-store defaults:
    /// empty filters, priority 0, unlimited uses, no thresholds.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: RuleKind::ProductPromotion,
            action: RuleAction::ItemByPercent,
            amount: Decimal::ZERO,
            priority: 0,
            name: FxHashMap::default(),
            description: FxHashMap::default(),
            valid_from: None,
            valid_to: None,
            included_product_group_ids: Vec::new(),
            excluded_product_group_ids: Vec::new(),
            included_customer_group_ids: Vec::new(),
            checkout_attributes: Vec::new(),
            qty_threshold: Decimal::ZERO,
            max_uses: 0,
            max_uses_per_customer: 0,
            min_order_amount: Decimal::ZERO,
            min_order_applicable_items_only: false,
            calculate_discounted_order_amount: false,
            excluded_item_ids_from_order_amount: Vec::new(),
            item_sets: Vec::new(),
            scaled_levels: Vec::new(),
            exclusive: false,
            mapping_id: String::new(),
            custom: None,
            usage: UsageHistory::default(),
        }
    }

    /// Creates the rule backing a single-use bonus voucher: a cart-scope
    /// absolute amount valid within the given window.
    pub fn bonus(
        id: impl Into<String>,
        amount: Decimal,
        valid_from: Timestamp,
        valid_to: Timestamp,
    ) -> Self {
        let mut rule = Self::new(id);
        rule.kind = RuleKind::BonusVoucher;
        rule.action = RuleAction::CartByAbsolute;
        rule.amount = amount;
        rule.valid_from = Some(valid_from);
        rule.valid_to = Some(valid_to);
        rule.max_uses = 1;
        rule.max_uses_per_customer = 1;
        rule
    }

    /// Checks the configuration invariants enforced at upsert time.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`RuleConfigError`]: negative amounts or
    /// thresholds, percentages outside 0–100, an inverted validity window,
    /// degenerate item sets, or scale levels that are empty, inverted, or
    /// not strictly ascending.
    pub fn validate(&self) -> Result<(), RuleConfigError> {
        if self.amount < Decimal::ZERO {
            return Err(RuleConfigError::NegativeAmount(self.amount));
        }
        if self.is_percent_action() && self.amount > Decimal::ONE_HUNDRED {
            return Err(RuleConfigError::PercentOutOfRange(self.amount));
        }
        if self.min_order_amount < Decimal::ZERO {
            return Err(RuleConfigError::NegativeMinOrderAmount(self.min_order_amount));
        }
        if self.qty_threshold < Decimal::ZERO {
            return Err(RuleConfigError::NegativeQtyThreshold(self.qty_threshold));
        }
        if let (Some(from), Some(to)) = (self.valid_from, self.valid_to) {
            if from > to {
                return Err(RuleConfigError::InvertedValidityWindow);
            }
        }

        match self.action {
            RuleAction::ItemSetAbsolute => self.validate_item_sets(),
            RuleAction::Scaled => self.validate_scaled_levels(),
            _ => Ok(()),
        }
    }

    fn validate_item_sets(&self) -> Result<(), RuleConfigError> {
        if self.item_sets.is_empty() || self.item_sets.iter().any(Vec::is_empty) {
            return Err(RuleConfigError::EmptyItemSet);
        }
        Ok(())
    }

    fn validate_scaled_levels(&self) -> Result<(), RuleConfigError> {
        if self.scaled_levels.is_empty() {
            return Err(RuleConfigError::NoScaledLevels);
        }

        let mut previous_to: Option<Decimal> = None;
        for level in &self.scaled_levels {
            if level.from_value > level.to_value {
                return Err(RuleConfigError::InvertedScaledLevel {
                    from: level.from_value,
                    to: level.to_value,
                });
            }
            if level.amount < Decimal::ZERO {
                return Err(RuleConfigError::NegativeAmount(level.amount));
            }
            if level.amount_is_percentage && level.amount > Decimal::ONE_HUNDRED {
                return Err(RuleConfigError::PercentOutOfRange(level.amount));
            }
            if let Some(to) = previous_to {
                if level.from_value <= to {
                    return Err(RuleConfigError::NonMonotonicScaledLevels);
                }
            }
            previous_to = Some(level.to_value);
        }
        Ok(())
    }

    /// Whether the rule's amount is a percentage.
    pub fn is_percent_action(&self) -> bool {
        matches!(
            self.action,
            RuleAction::ItemByPercent | RuleAction::CartByPercent
        )
    }

    /// Whether `at` falls inside the rule's validity window.
    pub fn is_valid_at(&self, at: Timestamp) -> bool {
        if let Some(from) = self.valid_from {
            if at < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if at > to {
                return false;
            }
        }
        true
    }

    /// Whether committed usage already exhausts the rule's caps for the
    /// given customer.
    pub fn usage_exhausted(&self, customer_id: &str) -> bool {
        if self.max_uses > 0 && self.usage.total_usages >= self.max_uses {
            return true;
        }
        self.max_uses_per_customer > 0
            && self.usage.for_customer(customer_id) >= self.max_uses_per_customer
    }
}

/// Configuration errors rejected at upsert time.
#[derive(Debug, Error, PartialEq)]
pub enum RuleConfigError {
    /// A discount amount was negative.
    #[error("discount amount {0} is negative")]
    NegativeAmount(Decimal),

    /// A percentage amount was above 100.
    #[error("percentage {0} is outside 0..=100")]
    PercentOutOfRange(Decimal),

    /// The minimum order amount was negative.
    #[error("minimum order amount {0} is negative")]
    NegativeMinOrderAmount(Decimal),

    /// The quantity threshold was negative.
    #[error("quantity threshold {0} is negative")]
    NegativeQtyThreshold(Decimal),

    /// `valid_from` was after `valid_to`.
    #[error("validity window starts after it ends")]
    InvertedValidityWindow,

    /// An item-set rule without usable sets.
    #[error("item set rule has an empty set")]
    EmptyItemSet,

    /// A scaled rule without levels.
    #[error("scaled rule has no levels")]
    NoScaledLevels,

    /// A scale level whose range is inverted.
    #[error("scaled level range {from}..={to} is inverted")]
    InvertedScaledLevel {
        /// Lower bound of the offending level.
        from: Decimal,
        /// Upper bound of the offending level.
        to: Decimal,
    },

    /// Scale levels overlap or are out of order.
    #[error("scaled levels must be strictly ascending")]
    NonMonotonicScaledLevels,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap_or_default()
    }

    fn scaled_level(from: &str, to: &str) -> ScaledLevel {
        ScaledLevel {
            from_value: dec(from),
            to_value: dec(to),
            amount: dec("10"),
            amount_is_percentage: true,
            threshold_is_price: false,
        }
    }

    #[test]
    fn defaults_are_valid() {
        let rule = PriceRule::new("sale");

        assert_eq!(rule.validate(), Ok(()));
        assert_eq!(rule.kind, RuleKind::ProductPromotion);
        assert_eq!(rule.max_uses, 0);
        assert!(rule.included_product_group_ids.is_empty());
    }

    #[test]
    fn percent_above_hundred_is_rejected() {
        let mut rule = PriceRule::new("sale");
        rule.action = RuleAction::ItemByPercent;
        rule.amount = dec("120");

        assert_eq!(
            rule.validate(),
            Err(RuleConfigError::PercentOutOfRange(dec("120")))
        );
    }

    #[test]
    fn absolute_amount_above_hundred_is_fine() {
        let mut rule = PriceRule::new("voucher");
        rule.action = RuleAction::CartByAbsolute;
        rule.amount = dec("250");

        assert_eq!(rule.validate(), Ok(()));
    }

    #[test]
    fn negative_min_order_is_rejected() {
        let mut rule = PriceRule::new("sale");
        rule.min_order_amount = dec("-1");

        assert!(matches!(
            rule.validate(),
            Err(RuleConfigError::NegativeMinOrderAmount(_))
        ));
    }

    #[test]
    fn overlapping_scaled_levels_are_rejected() {
        let mut rule = PriceRule::new("scaled");
        rule.action = RuleAction::Scaled;
        rule.scaled_levels = vec![scaled_level("0", "10"), scaled_level("10", "20")];

        assert_eq!(
            rule.validate(),
            Err(RuleConfigError::NonMonotonicScaledLevels)
        );
    }

    #[test]
    fn ascending_scaled_levels_are_accepted() {
        let mut rule = PriceRule::new("scaled");
        rule.action = RuleAction::Scaled;
        rule.scaled_levels = vec![scaled_level("0", "10"), scaled_level("11", "20")];

        assert_eq!(rule.validate(), Ok(()));
    }

    #[test]
    fn scaled_rule_needs_levels() {
        let mut rule = PriceRule::new("scaled");
        rule.action = RuleAction::Scaled;

        assert_eq!(rule.validate(), Err(RuleConfigError::NoScaledLevels));
    }

    #[test]
    fn validity_window_is_inclusive() {
        let mut rule = PriceRule::new("sale");
        let from: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap_or_default();
        let to: Timestamp = "2024-12-31T00:00:00Z".parse().unwrap_or_default();
        rule.valid_from = Some(from);
        rule.valid_to = Some(to);

        assert!(rule.is_valid_at(from));
        assert!(rule.is_valid_at(to));
        assert!(!rule.is_valid_at(to + jiff::Span::new().seconds(1)));
    }

    #[test]
    fn usage_exhaustion_honors_caps() {
        let mut rule = PriceRule::new("capped");
        rule.max_uses = 2;
        rule.max_uses_per_customer = 1;
        rule.usage.total_usages = 1;
        rule.usage.per_customer.insert("customer-1".into(), 1);

        assert!(rule.usage_exhausted("customer-1"));
        assert!(!rule.usage_exhausted("customer-2"));

        rule.usage.total_usages = 2;
        assert!(rule.usage_exhausted("customer-2"));
    }

    #[test]
    fn bonus_rule_is_single_use_cart_absolute() {
        let from: Timestamp = "2024-01-01T00:00:00Z".parse().unwrap_or_default();
        let to: Timestamp = "2025-01-01T00:00:00Z".parse().unwrap_or_default();
        let rule = PriceRule::bonus("bonus20", dec("200.10"), from, to);

        assert_eq!(rule.kind, RuleKind::BonusVoucher);
        assert_eq!(rule.action, RuleAction::CartByAbsolute);
        assert_eq!(rule.max_uses, 1);
        assert_eq!(rule.validate(), Ok(()));
    }
}
