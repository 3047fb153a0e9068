/// Level payment that amortizes `present_value` over `periods` at `rate` per period.
pub(crate) fn level_payment(present_value: f64, rate: f64, periods: u32) -> f64 {
    if !(present_value > 0.0) || periods == 0 {
        return 0.0;
    }
    let n = periods as f64;
    if rate.abs() < 1e-12 {
        return present_value / n;
    }
    if rate <= -1.0 {
        return present_value;
    }
    let denom = 1.0 - (1.0 + rate).powf(-n);
    if denom <= 1e-12 {
        present_value / n
    } else {
        present_value * rate / denom
    }
}

/// PMT over `periods` years at `annual_rate_percent`.
pub fn pmt(present_value: f64, periods: u32, annual_rate_percent: f64) -> f64 {
    level_payment(present_value, annual_rate_percent / 100.0, periods)
}

/// Rounded level annual withdrawal; zero for a non-positive balance or horizon.
pub fn annual_withdrawal(balance: f64, receiving_years: u32, return_rate_percent: f64) -> f64 {
    if balance <= 0.0 || receiving_years == 0 {
        return 0.0;
    }
    pmt(balance, receiving_years, return_rate_percent).round()
}

/// One month of accrual: compound at `annual_rate_percent / 12`, then add the contribution.
pub fn accrue_month(balance: f64, monthly_contribution: f64, annual_rate_percent: f64) -> f64 {
    balance * (1.0 + annual_rate_percent / 100.0 / 12.0) + monthly_contribution.max(0.0)
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PensionPhase {
    Accrual,
    Receiving {
        monthly_withdrawal: f64,
        months_left: u32,
    },
    Finished,
}

/// Mutable per-run pension state. The withdrawal is fixed once on entering
/// the receiving phase and never recomputed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PensionState {
    pub balance: f64,
    pub phase: PensionPhase,
}

impl PensionState {
    pub fn accruing(balance: f64) -> Self {
        Self {
            balance: balance.max(0.0),
            phase: PensionPhase::Accrual,
        }
    }

    pub fn is_accruing(&self) -> bool {
        matches!(self.phase, PensionPhase::Accrual)
    }

    /// Switches to the receiving phase using the balance at this instant.
    /// Returns the fixed monthly withdrawal, or `None` if not accruing.
    pub fn begin_receiving(&mut self, receiving_years: u32, annual_rate_percent: f64) -> Option<f64> {
        if !self.is_accruing() {
            return None;
        }
        let monthly = annual_withdrawal(self.balance, receiving_years, annual_rate_percent) / 12.0;
        self.phase = if monthly > 0.0 {
            PensionPhase::Receiving {
                monthly_withdrawal: monthly,
                months_left: receiving_years.saturating_mul(12),
            }
        } else {
            PensionPhase::Finished
        };
        Some(monthly)
    }

    pub fn accrue(&mut self, monthly_contribution: f64, annual_rate_percent: f64) -> f64 {
        if !self.is_accruing() {
            return 0.0;
        }
        self.balance = accrue_month(self.balance, 0.0, annual_rate_percent);
        let contribution = monthly_contribution.max(0.0);
        self.balance += contribution;
        contribution
    }

    /// Pays one month of the fixed withdrawal. The balance keeps compounding
    /// and is floored at zero; the payment itself stays level for the term.
    pub fn withdraw(&mut self, annual_rate_percent: f64) -> f64 {
        let PensionPhase::Receiving {
            monthly_withdrawal,
            months_left,
        } = self.phase
        else {
            return 0.0;
        };
        self.balance = (accrue_month(self.balance, 0.0, annual_rate_percent) - monthly_withdrawal)
            .max(0.0);
        let months_left = months_left.saturating_sub(1);
        self.phase = if months_left == 0 {
            PensionPhase::Finished
        } else {
            PensionPhase::Receiving {
                monthly_withdrawal,
                months_left,
            }
        };
        monthly_withdrawal
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, PensionPhase::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn pmt_zero_rate_divides_evenly() {
        assert_approx(pmt(24_000.0, 20, 0.0), 1_200.0);
    }

    #[test]
    fn pmt_matches_annuity_formula() {
        let r: f64 = 0.04;
        let expected = 24_000.0 * r / (1.0 - (1.0 + r).powf(-20.0));
        assert_approx(pmt(24_000.0, 20, 4.0), expected);
    }

    #[test]
    fn annual_withdrawal_is_rounded_and_zero_for_degenerate_input() {
        assert_eq!(annual_withdrawal(24_000.0, 20, 4.0), 1_766.0);
        assert_eq!(annual_withdrawal(0.0, 20, 4.0), 0.0);
        assert_eq!(annual_withdrawal(-5.0, 20, 4.0), 0.0);
        assert_eq!(annual_withdrawal(24_000.0, 0, 4.0), 0.0);
    }

    #[test]
    fn withdrawals_cover_balance_times_compounding_factor() {
        let (balance, years, rate) = (24_000.0, 20u32, 4.0);
        let annual = annual_withdrawal(balance, years, rate);
        let r: f64 = rate / 100.0;
        let factor = years as f64 * r / (1.0 - (1.0 + r).powf(-(years as f64)));
        assert!((annual * years as f64 - balance * factor).abs() <= years as f64 * 0.5);
    }

    #[test]
    fn accrual_compounds_monthly_then_adds_contribution() {
        assert_approx(accrue_month(1_200.0, 100.0, 12.0), 1_212.0 + 100.0);
        let mut state = PensionState::accruing(1_200.0);
        assert_approx(state.accrue(100.0, 12.0), 100.0);
        assert_approx(state.balance, 1_312.0);
    }

    #[test]
    fn withdrawal_is_fixed_at_transition_and_level_for_the_term() {
        let mut state = PensionState::accruing(24_000.0);
        let monthly = state.begin_receiving(20, 4.0).expect("was accruing");
        assert_approx(monthly, 1_766.0 / 12.0);
        assert!(state.begin_receiving(20, 9.0).is_none());
        assert_eq!(state.accrue(500.0, 4.0), 0.0);

        let mut paid = Vec::new();
        while !state.is_finished() {
            paid.push(state.withdraw(4.0));
        }
        assert_eq!(paid.len(), 240);
        assert!(paid.iter().all(|p| *p == monthly));
        assert_eq!(state.withdraw(4.0), 0.0);
    }

    #[test]
    fn empty_pension_finishes_immediately() {
        let mut state = PensionState::accruing(0.0);
        assert_eq!(state.begin_receiving(20, 4.0), Some(0.0));
        assert!(state.is_finished());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(40))]

        #[test]
        fn prop_withdrawal_is_deterministic_and_non_negative(
            balance in 0u32..5_000_000,
            years in 0u32..40,
            rate_bp in 0u32..1_000
        ) {
            let rate = rate_bp as f64 / 100.0;
            let a = annual_withdrawal(balance as f64, years, rate);
            let b = annual_withdrawal(balance as f64, years, rate);
            prop_assert_eq!(a, b);
            prop_assert!(a >= 0.0);
        }
    }
}
