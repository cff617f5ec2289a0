//! Cascade prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    articles::{Article, ArticleCollection},
    engine::{CalculationError, CalculationOutcome, DiscountEngine, VoucherSelection},
    groups::{Group, GroupKind},
    registry::{CommitError, InMemoryRegistry, Registry, RegistryError, UsagePlan},
    rules::{PriceRule, RuleAction, RuleConfigError, RuleKind, ScaledLevel, UsageHistory},
    state::{ArticleDiscounts, DiscountApplied, OrderDiscounts},
    summary::{RejectedVoucher, Summary},
    vouchers::{Voucher, VoucherKind, VoucherRejection},
};
