use serde::{Deserialize, Serialize};

use super::types::SavingsAccount;

/// One progressive bracket: `tax = base * rate% - deduction` for bases up to `upper`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    /// Inclusive upper bound of the bracket; `None` for the top bracket.
    pub upper: Option<f64>,
    pub rate: f64,
    pub deduction: f64,
}

/// Simplified single-country rules, amounts in the engine's money unit and
/// rates in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaxRules {
    pub interest_rate: f64,
    pub isa_rate: f64,
    pub isa_general_exemption: f64,
    pub isa_preferential_exemption: f64,
    pub primary_residence_threshold: f64,
    pub basic_deduction: f64,
    pub local_surcharge: f64,
    pub holding_min_years: u32,
    pub primary_holding_rate: f64,
    pub primary_holding_cap: f64,
    pub general_holding_rate: f64,
    pub general_holding_cap: f64,
    pub brackets: Vec<TaxBracket>,
    pub pension_rate_under_70: f64,
    pub pension_rate_70s: f64,
    pub pension_rate_80_plus: f64,
}

impl Default for TaxRules {
    fn default() -> Self {
        let bracket = |upper: Option<f64>, rate: f64, deduction: f64| TaxBracket {
            upper,
            rate,
            deduction,
        };
        Self {
            interest_rate: 15.4,
            isa_rate: 9.9,
            isa_general_exemption: 2_000_000.0,
            isa_preferential_exemption: 4_000_000.0,
            primary_residence_threshold: 1_200_000_000.0,
            basic_deduction: 2_500_000.0,
            local_surcharge: 10.0,
            holding_min_years: 3,
            primary_holding_rate: 8.0,
            primary_holding_cap: 80.0,
            general_holding_rate: 2.0,
            general_holding_cap: 30.0,
            brackets: vec![
                bracket(Some(14_000_000.0), 6.0, 0.0),
                bracket(Some(50_000_000.0), 15.0, 1_260_000.0),
                bracket(Some(88_000_000.0), 24.0, 5_760_000.0),
                bracket(Some(150_000_000.0), 35.0, 15_440_000.0),
                bracket(Some(300_000_000.0), 38.0, 19_940_000.0),
                bracket(Some(500_000_000.0), 40.0, 25_940_000.0),
                bracket(Some(1_000_000_000.0), 42.0, 35_940_000.0),
                bracket(None, 45.0, 65_940_000.0),
            ],
            pension_rate_under_70: 5.5,
            pension_rate_70s: 4.4,
            pension_rate_80_plus: 3.3,
        }
    }
}

/// A real-estate disposal as seen by the capital-gains calculation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PropertySale {
    pub sale_price: f64,
    pub purchase_price: f64,
    pub years_held: u32,
    pub primary_residence: bool,
}

pub fn interest_income_tax(gain: f64, tax_exempt: bool, rules: &TaxRules) -> f64 {
    if tax_exempt || gain <= 0.0 {
        return 0.0;
    }
    gain * rules.interest_rate / 100.0
}

/// Long-term holding deduction as a fraction of the taxable gain.
pub fn holding_deduction_rate(years_held: u32, primary_residence: bool, rules: &TaxRules) -> f64 {
    if years_held < rules.holding_min_years {
        return 0.0;
    }
    let (per_year, cap) = if primary_residence {
        (rules.primary_holding_rate, rules.primary_holding_cap)
    } else {
        (rules.general_holding_rate, rules.general_holding_cap)
    };
    (years_held as f64 * per_year).min(cap) / 100.0
}

/// Tax on `base` from the bracket table, before the local surcharge.
pub fn progressive_tax(base: f64, rules: &TaxRules) -> f64 {
    if base <= 0.0 {
        return 0.0;
    }
    rules
        .brackets
        .iter()
        .find(|b| b.upper.is_none_or(|upper| base <= upper))
        .or(rules.brackets.last())
        .map_or(0.0, |b| (base * b.rate / 100.0 - b.deduction).max(0.0))
}

pub fn capital_gains_tax(sale: PropertySale, rules: &TaxRules) -> f64 {
    let gain = sale.sale_price - sale.purchase_price;
    if gain <= 0.0 {
        return 0.0;
    }

    let threshold = rules.primary_residence_threshold;
    let taxable_gain = if sale.primary_residence {
        if sale.sale_price <= threshold {
            return 0.0;
        }
        gain * (sale.sale_price - threshold) / sale.sale_price
    } else {
        gain
    };

    let deduction = taxable_gain * holding_deduction_rate(sale.years_held, sale.primary_residence, rules);
    let base = taxable_gain - deduction - rules.basic_deduction;
    let tax = progressive_tax(base, rules);
    tax * (1.0 + rules.local_surcharge / 100.0)
}

pub fn isa_maturity_tax(gain: f64, account: SavingsAccount, rules: &TaxRules) -> f64 {
    let exemption = match account {
        SavingsAccount::IsaPreferential => rules.isa_preferential_exemption,
        _ => rules.isa_general_exemption,
    };
    let taxable = gain - exemption;
    if taxable <= 0.0 {
        return 0.0;
    }
    taxable * rules.isa_rate / 100.0
}

pub fn pension_income_tax(monthly_withdrawal: f64, age: u32, rules: &TaxRules) -> f64 {
    if monthly_withdrawal <= 0.0 {
        return 0.0;
    }
    let rate = match age {
        80.. => rules.pension_rate_80_plus,
        70..=79 => rules.pension_rate_70s,
        _ => rules.pension_rate_under_70,
    };
    monthly_withdrawal * rate / 100.0
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

    fn home(sale_price: f64) -> PropertySale {
        PropertySale {
            sale_price,
            purchase_price: 600_000_000.0,
            years_held: 5,
            primary_residence: true,
        }
    }

    #[test]
    fn interest_tax_is_flat_unless_exempt_or_loss() {
        let rules = TaxRules::default();
        assert_approx(interest_income_tax(1_000.0, false, &rules), 154.0);
        assert_eq!(interest_income_tax(1_000.0, true, &rules), 0.0);
        assert_eq!(interest_income_tax(-10.0, false, &rules), 0.0);
    }

    #[test]
    fn primary_residence_at_threshold_is_exempt_and_above_is_taxed() {
        let rules = TaxRules::default();
        assert_eq!(capital_gains_tax(home(1_200_000_000.0), &rules), 0.0);
        assert_eq!(capital_gains_tax(home(1_000_000_000.0), &rules), 0.0);
        assert!(capital_gains_tax(home(1_800_000_000.0), &rules) > 0.0);
    }

    #[test]
    fn primary_residence_only_taxes_excess_value_share() {
        let rules = TaxRules::default();
        let sale = home(1_800_000_000.0);
        let gain = 1_200_000_000.0;
        let taxable = gain * 600_000_000.0 / 1_800_000_000.0;
        let base = taxable * (1.0 - 0.40) - 2_500_000.0;
        let expected = (base * 0.38 - 19_940_000.0) * 1.1;
        assert!((capital_gains_tax(sale, &rules) - expected).abs() < 1e-3);
    }

    #[test]
    fn non_primary_gain_uses_smaller_holding_deduction() {
        let rules = TaxRules::default();
        let sale = PropertySale {
            sale_price: 400_000_000.0,
            purchase_price: 300_000_000.0,
            years_held: 10,
            primary_residence: false,
        };
        let base = 100_000_000.0 * 0.80 - 2_500_000.0;
        let expected = (base * 0.24 - 5_760_000.0) * 1.1;
        assert!((capital_gains_tax(sale, &rules) - expected).abs() < 1e-3);
    }

    #[test]
    fn holding_deduction_starts_at_three_years_and_caps() {
        let rules = TaxRules::default();
        assert_eq!(holding_deduction_rate(2, true, &rules), 0.0);
        assert_approx(holding_deduction_rate(3, true, &rules), 0.24);
        assert_approx(holding_deduction_rate(15, true, &rules), 0.80);
        assert_approx(holding_deduction_rate(3, false, &rules), 0.06);
        assert_approx(holding_deduction_rate(40, false, &rules), 0.30);
    }

    #[test]
    fn losses_and_small_gains_pay_nothing() {
        let rules = TaxRules::default();
        let mut sale = home(500_000_000.0);
        sale.primary_residence = false;
        assert_eq!(capital_gains_tax(sale, &rules), 0.0);
        sale.sale_price = 601_000_000.0;
        assert_eq!(capital_gains_tax(sale, &rules), 0.0);
    }

    #[test]
    fn progressive_table_is_continuous_at_bracket_edges() {
        let rules = TaxRules::default();
        for pair in rules.brackets.windows(2) {
            let edge = pair[0].upper.expect("inner bracket has an upper bound");
            let below = edge * pair[0].rate / 100.0 - pair[0].deduction;
            let above = edge * pair[1].rate / 100.0 - pair[1].deduction;
            assert!((below - above).abs() < 1.0, "discontinuity at {edge}");
        }
        assert_approx(progressive_tax(10_000_000.0, &rules), 600_000.0);
    }

    #[test]
    fn isa_tax_applies_above_tiered_exemption() {
        let rules = TaxRules::default();
        assert_eq!(isa_maturity_tax(1_500_000.0, SavingsAccount::IsaGeneral, &rules), 0.0);
        assert_approx(
            isa_maturity_tax(3_000_000.0, SavingsAccount::IsaGeneral, &rules),
            99_000.0,
        );
        assert_eq!(
            isa_maturity_tax(3_000_000.0, SavingsAccount::IsaPreferential, &rules),
            0.0
        );
    }

    #[test]
    fn pension_tax_uses_age_bands() {
        let rules = TaxRules::default();
        assert_approx(pension_income_tax(1_000.0, 65, &rules), 55.0);
        assert_approx(pension_income_tax(1_000.0, 70, &rules), 44.0);
        assert_approx(pension_income_tax(1_000.0, 79, &rules), 44.0);
        assert_approx(pension_income_tax(1_000.0, 80, &rules), 33.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_capital_gains_tax_is_never_negative_nor_exceeds_gain(
            purchase in 1u64..2_000_000_000,
            sale in 1u64..4_000_000_000,
            years in 0u32..40,
            primary in proptest::bool::ANY
        ) {
            let rules = TaxRules::default();
            let s = PropertySale {
                sale_price: sale as f64,
                purchase_price: purchase as f64,
                years_held: years,
                primary_residence: primary,
            };
            let tax = capital_gains_tax(s, &rules);
            prop_assert!(tax >= 0.0);
            prop_assert!(tax <= (sale as f64 - purchase as f64).max(0.0));
        }
    }
}
