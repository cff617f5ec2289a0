//! Fixtures
//!
//! Canned groups, rules and carts shared by the integration tests and
//! examples: a sale and a shirts product group, an employee customer
//! group, and the standard mock carts.

use rust_decimal::Decimal;

use crate::{
    articles::{Article, ArticleCollection},
    groups::{Group, GroupKind},
    registry::{Registry, RegistryError},
    rules::{PriceRule, RuleAction, RuleKind},
};

/// The "sale" product group ID.
pub const GROUP_SALE: &str = "sale";

/// The "shirts" product group ID.
pub const GROUP_SHIRTS: &str = "shirts";

/// The "shipping" product group ID.
pub const GROUP_SHIPPING: &str = "shipping";

/// The "regular-customer" customer group ID.
pub const GROUP_REGULAR_CUSTOMERS: &str = "regular-customer";

/// The customer the mock carts belong to.
pub const CUSTOMER_1: &str = "customer-1";

/// Builds a product group over the given article IDs.
pub fn product_group(id: &str, article_ids: &[&str]) -> Group {
    let mut group = Group::new(id, id, GroupKind::Product);
    group.add_item_ids(article_ids.iter().copied());
    group
}

/// Builds a customer group over the given customer IDs.
pub fn customer_group(id: &str, customer_ids: &[&str]) -> Group {
    let mut group = Group::new(id, id, GroupKind::Customer);
    group.add_item_ids(customer_ids.iter().copied());
    group
}

/// Builds a blacklist group over the given article IDs.
pub fn blacklist_group(id: &str, article_ids: &[&str]) -> Group {
    let mut group = Group::new(id, id, GroupKind::Blacklist);
    group.add_item_ids(article_ids.iter().copied());
    group
}

/// Builds a promotion with the given kind, action and amount, restricted
/// to `group_ids` (empty means all products).
pub fn promotion(
    id: &str,
    kind: RuleKind,
    action: RuleAction,
    amount: Decimal,
    group_ids: &[&str],
) -> PriceRule {
    let mut rule = PriceRule::new(id);
    rule.kind = kind;
    rule.action = action;
    rule.amount = amount;
    rule.included_product_group_ids = group_ids.iter().map(ToString::to_string).collect();
    rule
}

/// Seeds the standard product groups: sale covers `sku-1`/`sku-2`,
/// shirts covers `sku-3`/`sku-4`.
///
/// # Errors
///
/// Returns [`RegistryError`] when an upsert fails.
pub fn seed_product_groups<R: Registry>(registry: &R) -> Result<(), RegistryError> {
    registry.upsert_group(product_group(GROUP_SALE, &["sku-1", "sku-2"]))?;
    registry.upsert_group(product_group(GROUP_SHIRTS, &["sku-3", "sku-4"]))?;
    registry.upsert_group(customer_group(GROUP_REGULAR_CUSTOMERS, &[CUSTOMER_1]))?;
    Ok(())
}

/// The standard mock cart: two sale articles at 15 × 10.
pub fn mock_cart() -> ArticleCollection {
    ArticleCollection::with_articles(
        "cart-1",
        CUSTOMER_1,
        [
            Article::new("sku-1", Decimal::from(15), Decimal::TEN),
            Article::new("sku-2", Decimal::from(15), Decimal::TEN),
        ],
    )
}

/// The high/low mock cart: 500 × 2 plus 49.9 × 2.
pub fn mock_cart_high_low() -> ArticleCollection {
    ArticleCollection::with_articles(
        "cart-2",
        CUSTOMER_1,
        [
            Article::new("sku-1", Decimal::from(500), Decimal::TWO),
            Article::new("sku-2", "49.9".parse().unwrap_or_default(), Decimal::TWO),
        ],
    )
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::registry::InMemoryRegistry;

    use super::*;

    #[test]
    fn seeded_groups_exist() -> TestResult {
        let registry = InMemoryRegistry::new();
        seed_product_groups(&registry)?;

        assert!(registry.group_by_id(GroupKind::Product, GROUP_SALE)?.is_some());
        assert!(registry.group_by_id(GroupKind::Product, GROUP_SHIRTS)?.is_some());
        assert!(
            registry
                .group_by_id(GroupKind::Customer, GROUP_REGULAR_CUSTOMERS)?
                .is_some()
        );

        Ok(())
    }

    #[test]
    fn mock_carts_are_stable() {
        assert_eq!(mock_cart().subtotal(), Decimal::from(300));
        assert_eq!(
            mock_cart_high_low().subtotal(),
            "1099.8".parse::<Decimal>().unwrap_or_default()
        );
    }
}
