//! In-memory registry
//!
//! A thread-safe document store backing tests and single-process
//! deployments. One `RwLock` guards all collections; taking the write
//! lock for [`Registry::record_usages`] is what makes a commit a
//! transaction: cap checks and counter increments happen under the same
//! guard, so concurrent commits serialize and never overshoot a cap.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::info;

use crate::{
    groups::{Group, GroupKind},
    registry::{CommitError, Registry, RegistryError, UsagePlan},
    rules::{PriceRule, RuleKind},
    vouchers::{Voucher, VoucherKind},
};

#[derive(Debug, Default)]
struct Documents {
    rules: FxHashMap<String, PriceRule>,
    vouchers: FxHashMap<String, Voucher>,
    voucher_ids_by_code: FxHashMap<String, String>,
    groups: FxHashMap<(GroupKind, String), Group>,
    committed_carts: FxHashSet<String>,
}

/// An in-memory [`Registry`].
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    documents: RwLock<Documents>,
}

impl InMemoryRegistry {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Documents>, RegistryError> {
        self.documents.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Documents>, RegistryError> {
        self.documents.write().map_err(poisoned)
    }
}

fn poisoned<G>(_: PoisonError<G>) -> RegistryError {
    RegistryError::Unavailable("store lock poisoned".into())
}

/// Checks every cap in `plan` against `docs` without mutating anything.
fn check_caps(docs: &Documents, plan: &UsagePlan) -> Result<(), CommitError> {
    for rule_id in &plan.rule_ids {
        let rule = docs
            .rules
            .get(rule_id)
            .ok_or_else(|| CommitError::MissingDocument { id: rule_id.clone() })?;

        let total_exceeded = rule.max_uses > 0 && rule.usage.total_usages >= rule.max_uses;
        let customer_exceeded = rule.max_uses_per_customer > 0
            && rule.usage.for_customer(&plan.customer_id) >= rule.max_uses_per_customer;

        if total_exceeded || customer_exceeded {
            return Err(CommitError::UsageCapExceeded {
                rule_id: rule_id.clone(),
            });
        }
    }

    for voucher_id in &plan.voucher_ids {
        let voucher = docs
            .vouchers
            .get(voucher_id)
            .ok_or_else(|| CommitError::MissingDocument { id: voucher_id.clone() })?;

        if voucher.kind == VoucherKind::Bonus && voucher.time_redeemed.is_some() {
            return Err(CommitError::UsageCapExceeded {
                rule_id: voucher.rule_id.clone(),
            });
        }
    }

    Ok(())
}

impl Registry for InMemoryRegistry {
    fn upsert_rule(&self, rule: PriceRule) -> Result<(), RegistryError> {
        rule.validate()?;
        self.write()?.rules.insert(rule.id.clone(), rule);
        Ok(())
    }

    fn rule_by_id(&self, id: &str) -> Result<Option<PriceRule>, RegistryError> {
        Ok(self.read()?.rules.get(id).cloned())
    }

    fn rules_by_kind(&self, kind: RuleKind) -> Result<Vec<PriceRule>, RegistryError> {
        Ok(self
            .read()?
            .rules
            .values()
            .filter(|rule| rule.kind == kind)
            .cloned()
            .collect())
    }

    fn remove_all_rules(&self) -> Result<(), RegistryError> {
        self.write()?.rules.clear();
        Ok(())
    }

    fn upsert_voucher(&self, voucher: Voucher) -> Result<(), RegistryError> {
        let mut docs = self.write()?;

        if let Some(holder) = docs.voucher_ids_by_code.get(&voucher.code) {
            if *holder != voucher.id {
                return Err(RegistryError::DuplicateVoucherCode(voucher.code));
            }
        }

        // Replacing a voucher may change its code; drop the stale index entry.
        if let Some(previous) = docs.vouchers.get(&voucher.id) {
            if previous.code != voucher.code {
                let stale = previous.code.clone();
                docs.voucher_ids_by_code.remove(&stale);
            }
        }

        docs.voucher_ids_by_code
            .insert(voucher.code.clone(), voucher.id.clone());
        docs.vouchers.insert(voucher.id.clone(), voucher);
        Ok(())
    }

    fn voucher_by_id(&self, id: &str) -> Result<Option<Voucher>, RegistryError> {
        Ok(self.read()?.vouchers.get(id).cloned())
    }

    fn voucher_by_code(&self, code: &str) -> Result<Option<Voucher>, RegistryError> {
        let docs = self.read()?;
        Ok(docs
            .voucher_ids_by_code
            .get(code)
            .and_then(|id| docs.vouchers.get(id))
            .cloned())
    }

    fn remove_all_vouchers(&self) -> Result<(), RegistryError> {
        let mut docs = self.write()?;
        docs.vouchers.clear();
        docs.voucher_ids_by_code.clear();
        Ok(())
    }

    fn upsert_group(&self, group: Group) -> Result<(), RegistryError> {
        self.write()?
            .groups
            .insert((group.kind, group.id.clone()), group);
        Ok(())
    }

    fn group_by_id(&self, kind: GroupKind, id: &str) -> Result<Option<Group>, RegistryError> {
        Ok(self.read()?.groups.get(&(kind, id.to_owned())).cloned())
    }

    fn groups_by_kind(&self, kind: GroupKind) -> Result<Vec<Group>, RegistryError> {
        Ok(self
            .read()?
            .groups
            .values()
            .filter(|group| group.kind == kind)
            .cloned()
            .collect())
    }

    fn remove_all_groups(&self) -> Result<(), RegistryError> {
        self.write()?.groups.clear();
        Ok(())
    }

    fn record_usages(&self, plan: &UsagePlan) -> Result<(), CommitError> {
        let mut docs = self.write()?;

        if docs.committed_carts.contains(&plan.cart_id) {
            return Err(CommitError::AlreadyCommitted {
                cart_id: plan.cart_id.clone(),
            });
        }

        // Validate the whole plan first; mutate only once nothing can fail.
        check_caps(&docs, plan)?;

        for rule_id in &plan.rule_ids {
            if let Some(rule) = docs.rules.get_mut(rule_id) {
                rule.usage.total_usages += 1;
                *rule
                    .usage
                    .per_customer
                    .entry(plan.customer_id.clone())
                    .or_insert(0) += 1;
            }
        }

        for voucher_id in &plan.voucher_ids {
            if let Some(voucher) = docs.vouchers.get_mut(voucher_id) {
                match voucher.kind {
                    VoucherKind::Bonus => voucher.time_redeemed = Some(plan.committed_at),
                    VoucherKind::Normal => voucher.times_redeemed += 1,
                }
            }
        }

        docs.committed_carts.insert(plan.cart_id.clone());

        info!(
            cart_id = %plan.cart_id,
            rules = plan.rule_ids.len(),
            vouchers = plan.voucher_ids.len(),
            "recorded discount usages"
        );

        Ok(())
    }
}
