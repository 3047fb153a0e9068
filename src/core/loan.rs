use super::pension::level_payment;
use super::types::{LoanTerms, RepaymentScheme, YearMonth};

/// Principal and interest paid over some period.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PeriodSplit {
    pub principal: f64,
    pub interest: f64,
}

impl PeriodSplit {
    pub fn total(self) -> f64 {
        self.principal + self.interest
    }
}

/// Derived loan state. Balances are closed-form functions of elapsed months;
/// nothing here is decremented in place.
///
/// Payment `k` (1..=n) falls in month `start + k`, so the last payment lands in
/// the maturity month.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Loan {
    pub principal: f64,
    /// Annual percent, already resolved from fixed/floating terms.
    pub annual_rate: f64,
    pub scheme: RepaymentScheme,
    pub grace_months: u32,
    pub start: YearMonth,
    pub maturity: YearMonth,
}

impl Loan {
    pub fn from_terms(terms: &LoanTerms, annual_rate: f64, default_start: YearMonth) -> Self {
        Self {
            principal: terms.principal,
            annual_rate,
            scheme: terms.scheme,
            grace_months: terms.grace_months,
            start: terms.start.unwrap_or(default_start),
            maturity: terms.maturity,
        }
    }

    pub fn total_months(&self) -> u32 {
        self.start.months_until(self.maturity).max(0) as u32
    }

    fn monthly_rate(&self) -> f64 {
        (self.annual_rate / 100.0 / 12.0).max(0.0)
    }

    fn is_degenerate(&self) -> bool {
        !(self.principal > 0.0) || self.total_months() == 0
    }

    /// Interest-only months actually applied, always leaving one amortizing month.
    pub fn effective_grace(&self) -> u32 {
        match self.scheme {
            RepaymentScheme::Graduated => self
                .grace_months
                .min(self.total_months().saturating_sub(1)),
            _ => 0,
        }
    }

    pub fn payments_made_by(&self, as_of: YearMonth) -> u32 {
        self.start
            .months_until(as_of)
            .clamp(0, self.total_months() as i64) as u32
    }

    /// Outstanding principal after `k` scheduled payments.
    pub fn balance_after(&self, k: u32) -> f64 {
        let n = self.total_months();
        if self.is_degenerate() || k >= n {
            return 0.0;
        }

        let p = self.principal;
        let r = self.monthly_rate();
        match self.scheme {
            RepaymentScheme::Bullet => p,
            RepaymentScheme::EqualPrincipal => p * (1.0 - k as f64 / n as f64),
            RepaymentScheme::EqualInstallment => annuity_balance(p, r, n, k),
            RepaymentScheme::Graduated => {
                let grace = self.effective_grace();
                if k <= grace {
                    p
                } else {
                    annuity_balance(p, r, n - grace, k - grace)
                }
            }
        }
    }

    /// Remaining principal at the end of `as_of`, after that month's payment.
    pub fn remaining_balance(&self, as_of: YearMonth) -> f64 {
        self.balance_after(self.payments_made_by(as_of))
    }

    /// The scheme's rated payment. For equal principal this is the analytic
    /// average payment; for graduated loans the post-grace installment.
    pub fn monthly_payment(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        let p = self.principal;
        let r = self.monthly_rate();
        let n = self.total_months();
        match self.scheme {
            RepaymentScheme::Bullet => p * r,
            RepaymentScheme::EqualInstallment => level_payment(p, r, n),
            RepaymentScheme::EqualPrincipal => self.average_payment(),
            RepaymentScheme::Graduated => level_payment(p, r, n - self.effective_grace()),
        }
    }

    /// Average of an equal-principal schedule from its first and last month interest.
    pub fn average_payment(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        let n = self.total_months() as f64;
        let r = self.monthly_rate();
        let principal_part = self.principal / n;
        let first_interest = self.principal * r;
        let last_interest = principal_part * r;
        principal_part + (first_interest + last_interest) / 2.0
    }

    pub fn total_interest(&self) -> f64 {
        if self.is_degenerate() {
            return 0.0;
        }
        let p = self.principal;
        let r = self.monthly_rate();
        let n = self.total_months();
        match self.scheme {
            RepaymentScheme::Bullet => p * r * n as f64,
            RepaymentScheme::EqualInstallment => {
                (level_payment(p, r, n) * n as f64 - p).max(0.0)
            }
            RepaymentScheme::EqualPrincipal => p * r * (n as f64 + 1.0) / 2.0,
            RepaymentScheme::Graduated => {
                let grace = self.effective_grace();
                let amortizing = n - grace;
                let grace_interest = p * r * grace as f64;
                let post_grace = level_payment(p, r, amortizing) * amortizing as f64 - p;
                grace_interest + post_grace.max(0.0)
            }
        }
    }

    /// Scheduled payment due in `at`, zero outside `start+1 ..= maturity`.
    pub fn payment_in(&self, at: YearMonth) -> PeriodSplit {
        let k = self.start.months_until(at);
        if self.is_degenerate() || k < 1 || k > self.total_months() as i64 {
            return PeriodSplit::default();
        }
        let k = k as u32;
        let before = self.balance_after(k - 1);
        PeriodSplit {
            principal: (before - self.balance_after(k)).max(0.0),
            interest: before * self.monthly_rate(),
        }
    }

    /// Principal and interest paid within `year`, clipped to the payment months.
    pub fn yearly_split(&self, year: i32) -> PeriodSplit {
        let first = self.start.plus_months(1).index().max(YearMonth::new(year, 1).index());
        let last = self.maturity.index().min(YearMonth::new(year, 12).index());
        if self.is_degenerate() || first > last {
            return PeriodSplit::default();
        }

        let k_first = self.start.months_until(YearMonth::from_index(first)) as u32;
        let k_last = self.start.months_until(YearMonth::from_index(last)) as u32;
        let r = self.monthly_rate();
        let interest = (k_first..=k_last)
            .map(|k| self.balance_after(k - 1) * r)
            .sum();

        PeriodSplit {
            principal: (self.balance_after(k_first - 1) - self.balance_after(k_last)).max(0.0),
            interest,
        }
    }

    pub fn matures_in(&self, at: YearMonth) -> bool {
        !self.is_degenerate() && self.maturity == at && self.total_months() > 0
    }
}

fn annuity_balance(principal: f64, r: f64, n: u32, k: u32) -> f64 {
    if k >= n {
        return 0.0;
    }
    if r <= 0.0 {
        return principal * (1.0 - k as f64 / n as f64);
    }
    let grown_n = (1.0 + r).powi(n as i32);
    let grown_k = (1.0 + r).powi(k as i32);
    (principal * (grown_n - grown_k) / (grown_n - 1.0)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn loan(principal: f64, rate: f64, scheme: RepaymentScheme, months: i64) -> Loan {
        let start = YearMonth::new(2025, 1);
        Loan {
            principal,
            annual_rate: rate,
            scheme,
            grace_months: 0,
            start,
            maturity: start.plus_months(months),
        }
    }

    #[test]
    fn zero_rate_loans_amortize_linearly_with_no_interest() {
        for scheme in [
            RepaymentScheme::EqualInstallment,
            RepaymentScheme::EqualPrincipal,
            RepaymentScheme::Graduated,
        ] {
            let l = loan(12_000.0, 0.0, scheme, 120);
            for k in 0..=120 {
                assert_approx(l.balance_after(k), 12_000.0 * (1.0 - k as f64 / 120.0));
            }
            assert_approx(l.remaining_balance(l.maturity), 0.0);
            assert_approx(l.total_interest(), 0.0);
        }
    }

    #[test]
    fn equal_principal_midpoint_balance_is_half() {
        let l = loan(12_000.0, 0.0, RepaymentScheme::EqualPrincipal, 120);
        assert_eq!(l.remaining_balance(l.start.plus_months(60)), 6_000.0);
    }

    #[test]
    fn equal_installment_principal_sums_to_original() {
        let l = loan(300_000.0, 4.5, RepaymentScheme::EqualInstallment, 360);
        let mut principal = 0.0;
        let mut interest = 0.0;
        for k in 1..=360 {
            let split = l.payment_in(l.start.plus_months(k));
            principal += split.principal;
            interest += split.interest;
            assert_approx_tol(split.total(), l.monthly_payment(), 1e-6);
        }
        assert_approx_tol(principal, 300_000.0, 1.0);
        assert_approx_tol(interest, l.total_interest(), 1.0);
        assert_eq!(l.remaining_balance(l.maturity), 0.0);
    }

    #[test]
    fn bullet_balance_is_principal_until_maturity() {
        let l = loan(50_000.0, 6.0, RepaymentScheme::Bullet, 36);
        for k in 0..36 {
            assert_eq!(l.remaining_balance(l.start.plus_months(k)), 50_000.0);
        }
        assert_eq!(l.remaining_balance(l.maturity), 0.0);
        assert_approx(l.monthly_payment(), 250.0);
        assert_approx(l.total_interest(), 250.0 * 36.0);
        assert_approx(l.payment_in(l.maturity).principal, 50_000.0);
    }

    #[test]
    fn equal_principal_average_payment_matches_first_and_last_month() {
        let l = loan(120_000.0, 6.0, RepaymentScheme::EqualPrincipal, 120);
        let first = l.payment_in(l.start.plus_months(1)).total();
        let last = l.payment_in(l.maturity).total();
        assert_approx(l.average_payment(), (first + last) / 2.0);
        assert_approx(first, 1_000.0 + 600.0);
    }

    #[test]
    fn graduated_loan_is_interest_only_during_grace() {
        let mut l = loan(100_000.0, 3.6, RepaymentScheme::Graduated, 60);
        l.grace_months = 12;
        for k in 1..=12 {
            let split = l.payment_in(l.start.plus_months(k));
            assert_approx(split.principal, 0.0);
            assert_approx(split.interest, 300.0);
        }
        assert_approx(l.balance_after(12), 100_000.0);
        let amortizing = loan(100_000.0, 3.6, RepaymentScheme::EqualInstallment, 48);
        assert_approx(l.monthly_payment(), amortizing.monthly_payment());
        assert_approx_tol(
            l.total_interest(),
            300.0 * 12.0 + amortizing.total_interest(),
            1e-6,
        );
    }

    #[test]
    fn graduated_grace_is_capped_below_term() {
        let mut l = loan(10_000.0, 5.0, RepaymentScheme::Graduated, 6);
        l.grace_months = 24;
        assert_eq!(l.effective_grace(), 5);
        assert!(l.monthly_payment() > 10_000.0);
        assert_eq!(l.balance_after(6), 0.0);
    }

    #[test]
    fn degenerate_loans_yield_zero() {
        let zero = loan(0.0, 5.0, RepaymentScheme::EqualInstallment, 12);
        let past = loan(10_000.0, 5.0, RepaymentScheme::EqualInstallment, -3);
        for l in [zero, past] {
            assert_eq!(l.monthly_payment(), 0.0);
            assert_eq!(l.total_interest(), 0.0);
            assert_eq!(l.remaining_balance(l.start), 0.0);
            assert_eq!(l.yearly_split(2025), PeriodSplit::default());
        }
    }

    #[test]
    fn yearly_split_handles_partial_first_and_last_years() {
        let start = YearMonth::new(2025, 10);
        let l = Loan {
            principal: 24_000.0,
            annual_rate: 0.0,
            scheme: RepaymentScheme::EqualPrincipal,
            grace_months: 0,
            start,
            maturity: start.plus_months(24),
        };
        // payments in Nov and Dec 2025, all of 2026, Jan..Oct 2027
        assert_approx(l.yearly_split(2025).principal, 2_000.0);
        assert_approx(l.yearly_split(2026).principal, 12_000.0);
        assert_approx(l.yearly_split(2027).principal, 10_000.0);
        assert_eq!(l.yearly_split(2028), PeriodSplit::default());
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_yearly_splits_sum_to_principal_and_total_interest(
            principal in 1_000u32..1_000_000,
            rate_bp in 0u32..1_200,
            months in 1i64..360,
            scheme_idx in 0usize..4,
            grace in 0u32..36
        ) {
            let scheme = [
                RepaymentScheme::Bullet,
                RepaymentScheme::EqualInstallment,
                RepaymentScheme::EqualPrincipal,
                RepaymentScheme::Graduated,
            ][scheme_idx];
            let mut l = loan(principal as f64, rate_bp as f64 / 100.0, scheme, months);
            l.grace_months = grace;

            let mut principal_sum = 0.0;
            let mut interest_sum = 0.0;
            for year in l.start.year..=l.maturity.year {
                let split = l.yearly_split(year);
                prop_assert!(split.principal >= 0.0 && split.interest >= 0.0);
                principal_sum += split.principal;
                interest_sum += split.interest;
            }
            let tol = 1e-6 * principal as f64;
            prop_assert!((principal_sum - principal as f64).abs() <= tol.max(1.0));
            prop_assert!((interest_sum - l.total_interest()).abs() <= tol.max(1.0));
            prop_assert!(l.monthly_payment() >= 0.0);
        }
    }
}
