//! Group membership resolution
//!
//! Resolves, once per calculation, which product groups every cart
//! article belongs to, which articles are blacklisted, and which customer
//! groups the cart's customer is in. Resolution is pure: registry reads
//! only, no caching beyond the returned value.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    articles::ArticleCollection,
    groups::GroupKind,
    registry::{Registry, RegistryError},
};

/// The membership view of one calculation.
#[derive(Debug, Clone, Default)]
pub struct Memberships {
    /// Article ID → product group IDs it belongs to. Articles without any
    /// group membership map to an empty set.
    pub product_groups_per_article: FxHashMap<String, FxHashSet<String>>,

    /// Cart article IDs listed in any blacklist group.
    pub blacklisted_article_ids: FxHashSet<String>,

    /// Customer group IDs of the cart's customer.
    pub customer_group_ids: FxHashSet<String>,
}

impl Memberships {
    /// Resolves memberships for `cart` from the registry.
    ///
    /// When `customer_group_ids` is supplied it substitutes for customer
    /// group resolution (catalog calls and callers that already know the
    /// memberships pass it).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the registry cannot be read.
    pub fn resolve<R: Registry>(
        registry: &R,
        cart: &ArticleCollection,
        customer_group_ids: Option<&[String]>,
    ) -> Result<Self, RegistryError> {
        let mut product_groups_per_article: FxHashMap<String, FxHashSet<String>> = cart
            .iter()
            .map(|article| (article.id.clone(), FxHashSet::default()))
            .collect();

        for group in registry.groups_by_kind(GroupKind::Product)? {
            for (article_id, groups) in &mut product_groups_per_article {
                if group.contains(article_id) {
                    groups.insert(group.id.clone());
                }
            }
        }

        let mut blacklisted_article_ids = FxHashSet::default();
        for group in registry.groups_by_kind(GroupKind::Blacklist)? {
            blacklisted_article_ids
                .extend(cart.iter().map(|a| &a.id).filter(|id| group.contains(id)).cloned());
        }

        let customer_group_ids = match customer_group_ids {
            Some(ids) => ids.iter().cloned().collect(),
            None => {
                let mut ids = FxHashSet::default();
                if !cart.customer_id.is_empty() {
                    for group in registry.groups_by_kind(GroupKind::Customer)? {
                        if group.contains(&cart.customer_id) {
                            ids.insert(group.id.clone());
                        }
                    }
                }
                ids
            }
        };

        Ok(Self {
            product_groups_per_article,
            blacklisted_article_ids,
            customer_group_ids,
        })
    }

    /// Whether the article belongs to at least one of `group_ids`.
    pub fn article_in_any(&self, article_id: &str, group_ids: &[String]) -> bool {
        self.product_groups_per_article
            .get(article_id)
            .is_some_and(|groups| group_ids.iter().any(|id| groups.contains(id)))
    }

    /// Whether the article is listed in any blacklist group.
    pub fn is_blacklisted(&self, article_id: &str) -> bool {
        self.blacklisted_article_ids.contains(article_id)
    }

    /// Whether the cart's customer belongs to at least one of `group_ids`.
    pub fn customer_in_any(&self, group_ids: &[String]) -> bool {
        group_ids.iter().any(|id| self.customer_group_ids.contains(id))
    }
}
