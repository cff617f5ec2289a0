//! Groups
//!
//! Named sets of product IDs, customer IDs, or blacklisted product IDs.
//! Rules reference groups by ID; membership resolution happens in
//! [`crate::resolver`].

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// What a group's member IDs refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKind {
    /// Members are article / product IDs.
    Product,

    /// Members are customer IDs.
    Customer,

    /// Members are article IDs globally barred from discounts.
    ///
    /// A rule may only act on a blacklisted article when one of the rule's
    /// included product groups lists that article explicitly.
    Blacklist,
}

/// A named set of item IDs. IDs are unique per [`GroupKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier, unique within its kind.
    pub id: String,

    /// Display name.
    pub name: String,

    /// What the member IDs refer to.
    pub kind: GroupKind,

    /// The member IDs.
    pub item_ids: FxHashSet<String>,

    /// Opaque caller payload; never inspected by the engine.
    pub custom: Option<serde_json::Value>,
}

impl Group {
    /// Creates an empty group.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: GroupKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            item_ids: FxHashSet::default(),
            custom: None,
        }
    }

    /// Adds member IDs, ignoring duplicates.
    pub fn add_item_ids<I>(&mut self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.item_ids.extend(ids.into_iter().map(Into::into));
    }

    /// Whether `item_id` is a member.
    pub fn contains(&self, item_id: &str) -> bool {
        self.item_ids.contains(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_item_ids_deduplicates() {
        let mut group = Group::new("sale", "Sale", GroupKind::Product);
        group.add_item_ids(["sku-1", "sku-2", "sku-1"]);

        assert_eq!(group.item_ids.len(), 2);
        assert!(group.contains("sku-1"));
        assert!(group.contains("sku-2"));
        assert!(!group.contains("sku-3"));
    }

    #[test]
    fn new_group_is_empty() {
        let group = Group::new("blacklist", "Blacklist", GroupKind::Blacklist);

        assert!(group.item_ids.is_empty());
        assert_eq!(group.kind, GroupKind::Blacklist);
    }
}
