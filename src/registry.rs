//! Registry
//!
//! The persistence collaborator: a document store holding price rules,
//! vouchers and groups, injected into the engine rather than reached
//! through globals. Reads are point lookups a calculation performs up
//! front; [`Registry::record_usages`] is the single write that outlives a
//! calculation and must be atomic.

use jiff::Timestamp;
use thiserror::Error;

use crate::{
    groups::{Group, GroupKind},
    rules::{PriceRule, RuleConfigError, RuleKind},
    vouchers::Voucher,
};

pub mod memory;

pub use memory::InMemoryRegistry;

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store could not be reached; no discounts are applied.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// An upserted rule failed config validation.
    #[error(transparent)]
    InvalidRuleConfig(#[from] RuleConfigError),

    /// An upserted voucher reused another voucher's code.
    #[error("voucher code {0} is already taken")]
    DuplicateVoucherCode(String),
}

/// Errors surfaced by [`Registry::record_usages`]. Fatal to the commit;
/// a failed commit mutates nothing.
#[derive(Debug, Error)]
pub enum CommitError {
    /// This cart was already committed.
    #[error("discounts for cart {cart_id} were already committed")]
    AlreadyCommitted {
        /// The cart whose commit marker already exists.
        cart_id: String,
    },

    /// Committing would raise a rule or voucher above its usage cap.
    #[error("usage cap of rule {rule_id} would be exceeded")]
    UsageCapExceeded {
        /// The rule whose cap would be overshot.
        rule_id: String,
    },

    /// A referenced rule or voucher no longer exists.
    #[error("referenced document {id} does not exist")]
    MissingDocument {
        /// The missing rule or voucher ID.
        id: String,
    },

    /// The store could not be reached.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The usages one committed cart records: each listed rule and voucher is
/// counted exactly once, regardless of how many articles it discounted.
#[derive(Debug, Clone, PartialEq)]
pub struct UsagePlan {
    /// The cart being committed; the key of the commit marker.
    pub cart_id: String,

    /// The customer the per-customer counters are charged to.
    pub customer_id: String,

    /// Distinct rules applied by the calculation.
    pub rule_ids: Vec<String>,

    /// Distinct vouchers redeemed by the calculation.
    pub voucher_ids: Vec<String>,

    /// Commit timestamp; stamps bonus voucher redemption.
    pub committed_at: Timestamp,
}

/// The abstract document store the engine runs against.
///
/// Implementations must make [`Registry::record_usages`] atomic: either
/// every counter in the plan is incremented and the commit marker written,
/// or nothing is. Two concurrent commits for the same rule must serialize
/// so `total_usages` never overshoots `max_uses`.
#[cfg_attr(test, mockall::automock)]
pub trait Registry {
    /// Inserts or replaces a rule after validating its configuration.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidRuleConfig`] when validation fails, or
    /// [`RegistryError::Unavailable`].
    fn upsert_rule(&self, rule: PriceRule) -> Result<(), RegistryError>;

    /// Point lookup of a rule.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn rule_by_id(&self, id: &str) -> Result<Option<PriceRule>, RegistryError>;

    /// All rules of one kind, in unspecified order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn rules_by_kind(&self, kind: RuleKind) -> Result<Vec<PriceRule>, RegistryError>;

    /// Drops every rule.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn remove_all_rules(&self) -> Result<(), RegistryError>;

    /// Inserts or replaces a voucher, keeping the code index unique.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateVoucherCode`] when another voucher holds
    /// the code, or [`RegistryError::Unavailable`].
    fn upsert_voucher(&self, voucher: Voucher) -> Result<(), RegistryError>;

    /// Point lookup of a voucher by ID.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn voucher_by_id(&self, id: &str) -> Result<Option<Voucher>, RegistryError>;

    /// Point lookup of a voucher by code.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn voucher_by_code(&self, code: &str) -> Result<Option<Voucher>, RegistryError>;

    /// Drops every voucher.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn remove_all_vouchers(&self) -> Result<(), RegistryError>;

    /// Inserts or replaces a group, keyed by (kind, id).
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn upsert_group(&self, group: Group) -> Result<(), RegistryError>;

    /// Point lookup of a group within its kind.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn group_by_id(&self, kind: GroupKind, id: &str) -> Result<Option<Group>, RegistryError>;

    /// All groups of one kind, in unspecified order.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn groups_by_kind(&self, kind: GroupKind) -> Result<Vec<Group>, RegistryError>;

    /// Drops every group.
    ///
    /// # Errors
    ///
    /// [`RegistryError::Unavailable`].
    fn remove_all_groups(&self) -> Result<(), RegistryError>;

    /// Atomically records the usages of one committed cart.
    ///
    /// # Errors
    ///
    /// [`CommitError::AlreadyCommitted`] on a repeated cart,
    /// [`CommitError::UsageCapExceeded`] when any counter would overshoot
    /// its cap, [`CommitError::MissingDocument`] for dangling references,
    /// or [`CommitError::Registry`]. On any error nothing is mutated.
    fn record_usages(&self, plan: &UsagePlan) -> Result<(), CommitError>;
}
