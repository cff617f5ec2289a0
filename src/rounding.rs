//! Rounding
//!
//! Every monetary output of the engine is rounded to the caller-supplied
//! step (typically `0.05` or `0.01`) with banker's rounding. Proportional
//! distribution hands the residual to the last share so the rounded parts
//! always sum to the rounded whole.

use rust_decimal::{Decimal, RoundingStrategy};

/// Rounds `value` to the nearest multiple of `step`.
///
/// Midpoints round to the even multiple. A non-positive `step` returns
/// `value` unchanged; callers validate the step at the API boundary.
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }

    (value / step).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * step
}

/// Splits `total` across `weights` proportionally, rounding each share to
/// `step`.
///
/// The last non-zero weight receives whatever residual rounding left over,
/// so the shares sum to `round_to_step(total, step)` exactly. Zero weights
/// receive a zero share. If all weights are zero the result is all zeros.
pub fn distribute_proportionally(total: Decimal, weights: &[Decimal], step: Decimal) -> Vec<Decimal> {
    let weight_sum: Decimal = weights.iter().copied().sum();

    if weight_sum <= Decimal::ZERO {
        return vec![Decimal::ZERO; weights.len()];
    }

    let rounded_total = round_to_step(total, step);
    let last_nonzero = weights.iter().rposition(|w| *w > Decimal::ZERO);

    let mut distributed = Decimal::ZERO;
    weights
        .iter()
        .enumerate()
        .map(|(idx, weight)| {
            if *weight <= Decimal::ZERO {
                return Decimal::ZERO;
            }
            if Some(idx) == last_nonzero {
                return rounded_total - distributed;
            }
            let share = round_to_step(total * *weight / weight_sum, step);
            distributed += share;
            share
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap_or_default()
    }

    #[test]
    fn rounds_to_nickel_steps() {
        assert_eq!(round_to_step(dec("90.9256"), dec("0.05")), dec("90.95"));
        assert_eq!(round_to_step(dec("14.97"), dec("0.05")), dec("14.95"));
        assert_eq!(round_to_step(dec("100"), dec("0.05")), dec("100.00"));
    }

    #[test]
    fn midpoints_round_to_even_multiples() {
        // 0.125 / 0.05 = 2.5; banker's rounding picks the even quotient 2.
        assert_eq!(round_to_step(dec("0.125"), dec("0.05")), dec("0.10"));
        // 0.175 / 0.05 = 3.5; rounds to 4.
        assert_eq!(round_to_step(dec("0.175"), dec("0.05")), dec("0.20"));
    }

    #[test]
    fn non_positive_step_is_identity() {
        assert_eq!(round_to_step(dec("1.234"), Decimal::ZERO), dec("1.234"));
        assert_eq!(round_to_step(dec("1.234"), dec("-0.05")), dec("1.234"));
    }

    #[test]
    fn distribution_sums_to_rounded_total() {
        let weights = [dec("700"), dec("69.86")];
        let shares = distribute_proportionally(dec("100"), &weights, dec("0.05"));

        assert_eq!(shares, vec![dec("90.95"), dec("9.05")]);
        assert_eq!(shares.iter().copied().sum::<Decimal>(), dec("100.00"));
    }

    #[test]
    fn distribution_across_three_weights() {
        let weights = [dec("200"), dec("600"), dec("1000")];
        let shares = distribute_proportionally(dec("180"), &weights, dec("0.05"));

        assert_eq!(shares, vec![dec("20.00"), dec("60.00"), dec("100.00")]);
    }

    #[test]
    fn zero_weights_get_zero_shares() {
        let weights = [dec("0"), dec("50"), dec("0"), dec("50")];
        let shares = distribute_proportionally(dec("10"), &weights, dec("0.05"));

        assert_eq!(
            shares,
            vec![Decimal::ZERO, dec("5.00"), Decimal::ZERO, dec("5.00")]
        );
    }

    #[test]
    fn all_zero_weights_distribute_nothing() {
        let shares = distribute_proportionally(dec("10"), &[Decimal::ZERO; 3], dec("0.05"));

        assert_eq!(shares, vec![Decimal::ZERO; 3]);
    }
}
