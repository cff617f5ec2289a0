//! Eligibility
//!
//! The side-effect-free predicate deciding whether a rule may act on an
//! article, combining validity window, usage quotas, group filters,
//! blacklist, checkout attributes, quantity threshold and minimum-order
//! conditions — in that order, first failure wins.

use jiff::Timestamp;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    articles::ArticleCollection,
    resolver::Memberships,
    rules::{PriceRule, RuleKind},
    state::OrderDiscounts,
};

/// Why a rule was not applied to an article. Local to the (rule, article)
/// pair; never aborts a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RejectionReason {
    /// The evaluation timestamp is outside the rule's validity window.
    #[error("rule is outside its validity window")]
    OutsideValidityWindow,

    /// Committed usage already exhausts the rule's caps.
    #[error("rule usage cap is reached")]
    UsageCapReached,

    /// The customer is in none of the rule's included customer groups.
    #[error("customer is not in an included customer group")]
    CustomerGroupMismatch,

    /// The article fails the included/excluded product group filters.
    #[error("article does not match the rule's product groups")]
    ProductGroupMismatch,

    /// The article is blacklisted and the rule does not opt in to it.
    #[error("article is blacklisted")]
    Blacklisted,

    /// None of the rule's required checkout attributes are active.
    #[error("required checkout attribute is not active")]
    CheckoutAttributeMismatch,

    /// The summed quantity of matching articles is below the threshold.
    #[error("quantity threshold is not met")]
    QtyThresholdNotMet,

    /// The relevant order amount is below the rule's minimum.
    #[error("minimum order amount is not reached")]
    MinOrderNotReached,
}

/// Everything a single calculation evaluates against. Built once per
/// `apply_discounts` call and borrowed by the predicate and the action
/// evaluators; owns no mutable state.
#[derive(Debug)]
pub struct CalculationContext<'a> {
    /// The cart being priced.
    pub cart: &'a ArticleCollection,

    /// Resolved group memberships.
    pub memberships: &'a Memberships,

    /// Active payment methods and checkout tags.
    pub checkout_attributes: &'a [String],

    /// The evaluation timestamp all validity windows are checked against.
    pub now: Timestamp,

    /// Monetary rounding step.
    pub round_step: Decimal,

    /// Catalog display mode: quota, checkout-attribute, quantity and
    /// minimum-order conditions are skipped.
    pub is_catalog: bool,
}

impl CalculationContext<'_> {
    /// Conditions that depend only on the rule, the article identity and
    /// the context: validity window, quotas, customer groups, product
    /// groups, blacklist, checkout attributes.
    pub fn passes_base_conditions(
        &self,
        rule: &PriceRule,
        article_id: &str,
    ) -> Result<(), RejectionReason> {
        if !rule.is_valid_at(self.now) {
            return Err(RejectionReason::OutsideValidityWindow);
        }

        if !self.is_catalog && rule.usage_exhausted(&self.cart.customer_id) {
            return Err(RejectionReason::UsageCapReached);
        }

        if !rule.included_customer_group_ids.is_empty()
            && !self
                .memberships
                .customer_in_any(&rule.included_customer_group_ids)
        {
            return Err(RejectionReason::CustomerGroupMismatch);
        }

        let in_included_groups = self
            .memberships
            .article_in_any(article_id, &rule.included_product_group_ids);

        if !rule.included_product_group_ids.is_empty() && !in_included_groups {
            return Err(RejectionReason::ProductGroupMismatch);
        }

        if self
            .memberships
            .article_in_any(article_id, &rule.excluded_product_group_ids)
        {
            return Err(RejectionReason::ProductGroupMismatch);
        }

        // A blacklisted article is off limits unless the rule opted in by
        // including one of the article's groups explicitly.
        if self.memberships.is_blacklisted(article_id) && !in_included_groups {
            return Err(RejectionReason::Blacklisted);
        }

        if !self.is_catalog && !rule.checkout_attributes.is_empty() {
            let active = rule
                .checkout_attributes
                .iter()
                .any(|attr| self.checkout_attributes.contains(attr));
            if !active {
                return Err(RejectionReason::CheckoutAttributeMismatch);
            }
        }

        Ok(())
    }

    /// The full predicate for one (rule, article) pair.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`RejectionReason`] in spec order.
    pub fn validate(
        &self,
        rule: &PriceRule,
        article_id: &str,
        state: &OrderDiscounts,
    ) -> Result<(), RejectionReason> {
        self.passes_base_conditions(rule, article_id)?;

        if self.is_catalog {
            return Ok(());
        }

        if rule.qty_threshold > Decimal::ZERO
            && self.eligible_quantity(rule) < rule.qty_threshold
        {
            return Err(RejectionReason::QtyThresholdNotMet);
        }

        if rule.min_order_amount > Decimal::ZERO
            && self.order_amount_base(rule, state) < rule.min_order_amount
        {
            return Err(RejectionReason::MinOrderNotReached);
        }

        Ok(())
    }

    /// Summed quantity over cart articles passing the base conditions.
    pub fn eligible_quantity(&self, rule: &PriceRule) -> Decimal {
        self.cart
            .iter()
            .filter(|article| self.passes_base_conditions(rule, &article.id).is_ok())
            .map(|article| article.quantity)
            .sum()
    }

    /// The order amount a rule's minimum is checked against.
    ///
    /// Shipping rules read the non-shipping subtotal: articles of the
    /// rule's own included groups never contribute. Other rules restrict
    /// to matching articles when `min_order_applicable_items_only` is
    /// set. `calculate_discounted_order_amount` switches the base from
    /// initial to current prices, and configured item IDs are always
    /// excluded.
    pub fn order_amount_base(&self, rule: &PriceRule, state: &OrderDiscounts) -> Decimal {
        state
            .iter()
            .filter(|entry| {
                if rule
                    .excluded_item_ids_from_order_amount
                    .contains(&entry.article_id)
                {
                    return false;
                }
                if rule.kind == RuleKind::Shipping {
                    return !self
                        .memberships
                        .article_in_any(&entry.article_id, &rule.included_product_group_ids);
                }
                if rule.min_order_applicable_items_only {
                    return self.passes_base_conditions(rule, &entry.article_id).is_ok();
                }
                true
            })
            .map(|entry| {
                let price = if rule.calculate_discounted_order_amount {
                    entry.current_item_price
                } else {
                    entry.initial_item_price
                };
                price * entry.quantity
            })
            .sum()
    }

    /// Checks the rule against every article and reports whether it is
    /// eligible for at least one.
    ///
    /// # Errors
    ///
    /// When no article passes, returns [`RejectionReason::MinOrderNotReached`]
    /// if that was among the failures (it is the most actionable reason
    /// for a shopper), otherwise the first article's reason.
    pub fn eligible_for_any_article(
        &self,
        rule: &PriceRule,
        state: &OrderDiscounts,
    ) -> Result<(), RejectionReason> {
        let mut first_failure = None;

        for article in self.cart.iter() {
            match self.validate(rule, &article.id, state) {
                Ok(()) => return Ok(()),
                Err(RejectionReason::MinOrderNotReached) => {
                    first_failure = Some(RejectionReason::MinOrderNotReached);
                }
                Err(reason) => {
                    if first_failure.is_none() {
                        first_failure = Some(reason);
                    }
                }
            }
        }

        Err(first_failure.unwrap_or(RejectionReason::ProductGroupMismatch))
    }
}
