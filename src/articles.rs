//! Articles
//!
//! The immutable cart model a calculation runs against: an ordered list of
//! [`Article`] line items plus the customer identifiers. A collection is
//! never mutated by the engine; all per-calculation bookkeeping lives in
//! [`crate::state::OrderDiscounts`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single cart line item: product identity, per-unit price and quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Product (or SKU) identifier.
    pub id: String,

    /// Per-unit net price.
    pub price: Decimal,

    /// Quantity, possibly fractional.
    pub quantity: Decimal,

    /// Pre-sale reference price, passed through untouched.
    pub cross_price: Option<Decimal>,
}

impl Article {
    /// Creates an article with the given identity, per-unit price and quantity.
    pub fn new(id: impl Into<String>, price: Decimal, quantity: Decimal) -> Self {
        Self {
            id: id.into(),
            price,
            quantity,
            cross_price: None,
        }
    }

    /// The undiscounted line total, `price * quantity`.
    pub fn line_total(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// An ordered cart of articles plus the identifiers a calculation needs.
///
/// Article order is significant: it is the iteration order of every
/// evaluator and the tie-break for proportional distribution residuals.
/// The same article ID may appear at more than one position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleCollection {
    /// Cart identifier; the key for commit markers.
    pub id: String,

    /// Customer the cart belongs to. Empty for anonymous carts.
    pub customer_id: String,

    /// Free-form customer classification, passed through to consumers.
    pub customer_type: String,

    /// The line items, in cart order.
    pub articles: Vec<Article>,
}

impl ArticleCollection {
    /// Creates an empty cart for the given cart and customer identifiers.
    pub fn new(id: impl Into<String>, customer_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            customer_type: String::new(),
            articles: Vec::new(),
        }
    }

    /// Creates a cart from the given line items.
    pub fn with_articles(
        id: impl Into<String>,
        customer_id: impl Into<String>,
        articles: impl Into<Vec<Article>>,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            customer_type: String::new(),
            articles: articles.into(),
        }
    }

    /// Appends a line item.
    pub fn push(&mut self, article: Article) {
        self.articles.push(article);
    }

    /// Iterates the line items in cart order.
    pub fn iter(&self) -> impl Iterator<Item = &Article> {
        self.articles.iter()
    }

    /// Number of line items.
    pub fn len(&self) -> usize {
        self.articles.len()
    }

    /// Whether the cart has no line items.
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    /// The undiscounted cart total, `Σ price * quantity`.
    pub fn subtotal(&self) -> Decimal {
        self.articles.iter().map(Article::line_total).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap_or_default()
    }

    #[test]
    fn line_total_is_price_times_quantity() {
        let article = Article::new("sku-1", dec("49.90"), dec("2"));

        assert_eq!(article.line_total(), dec("99.80"));
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let cart = ArticleCollection::with_articles(
            "cart-1",
            "customer-1",
            [
                Article::new("sku-1", dec("100"), dec("2")),
                Article::new("sku-2", dec("49.90"), dec("1")),
            ],
        );

        assert_eq!(cart.subtotal(), dec("249.90"));
    }

    #[test]
    fn subtotal_of_empty_cart_is_zero() {
        let cart = ArticleCollection::new("cart-1", "customer-1");

        assert_eq!(cart.subtotal(), Decimal::ZERO);
    }

    #[test]
    fn push_preserves_order() {
        let mut cart = ArticleCollection::new("cart-1", "customer-1");
        cart.push(Article::new("b", dec("1"), dec("1")));
        cart.push(Article::new("a", dec("1"), dec("1")));

        let ids: Vec<&str> = cart.iter().map(|a| a.id.as_str()).collect();

        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn duplicate_ids_keep_both_positions() {
        let cart = ArticleCollection::with_articles(
            "cart-1",
            "customer-1",
            [
                Article::new("sku-1", dec("500"), dec("5")),
                Article::new("sku-1", dec("100"), dec("1")),
            ],
        );

        assert_eq!(cart.len(), 2);
        assert_eq!(cart.subtotal(), dec("2600"));
    }
}
