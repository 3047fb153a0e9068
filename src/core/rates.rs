use super::types::{Assumptions, GlobalRates, RateCategory, ScenarioMode};

/// Preset table for a scenario, or `None` for the non-preset modes.
pub fn preset_rates(mode: ScenarioMode) -> Option<GlobalRates> {
    match mode {
        ScenarioMode::Optimistic => Some(GlobalRates {
            inflation: 2.0,
            income_growth: 4.0,
            investment_return: 7.0,
            real_estate_growth: 4.0,
        }),
        ScenarioMode::Average => Some(GlobalRates {
            inflation: 2.5,
            income_growth: 3.0,
            investment_return: 5.0,
            real_estate_growth: 2.5,
        }),
        ScenarioMode::Pessimistic => Some(GlobalRates {
            inflation: 3.5,
            income_growth: 1.5,
            investment_return: 3.0,
            real_estate_growth: 0.5,
        }),
        ScenarioMode::Individual | ScenarioMode::Custom => None,
    }
}

impl GlobalRates {
    fn for_category(&self, category: RateCategory) -> Option<f64> {
        match category {
            RateCategory::Inflation => Some(self.inflation),
            RateCategory::Income => Some(self.income_growth),
            RateCategory::Investment => Some(self.investment_return),
            RateCategory::RealEstate => Some(self.real_estate_growth),
            RateCategory::Fixed => None,
        }
    }
}

/// Annual percent an item actually grows at under the selected scenario.
pub fn effective_rate(base_rate: f64, category: RateCategory, assumptions: &Assumptions) -> f64 {
    if category == RateCategory::Fixed {
        return base_rate;
    }

    let table = match assumptions.scenario {
        ScenarioMode::Individual => return base_rate,
        ScenarioMode::Custom => Some(assumptions.custom_rates),
        preset => preset_rates(preset),
    };

    table
        .and_then(|rates| rates.for_category(category))
        .unwrap_or(base_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assumptions(scenario: ScenarioMode) -> Assumptions {
        Assumptions {
            scenario,
            custom_rates: GlobalRates {
                inflation: 1.1,
                income_growth: 2.2,
                investment_return: 3.3,
                real_estate_growth: 4.4,
            },
            ..Assumptions::default()
        }
    }

    #[test]
    fn fixed_category_ignores_every_scenario() {
        for mode in ScenarioMode::ALL {
            assert_eq!(effective_rate(6.5, RateCategory::Fixed, &assumptions(mode)), 6.5);
        }
    }

    #[test]
    fn individual_mode_keeps_item_rate() {
        let a = assumptions(ScenarioMode::Individual);
        assert_eq!(effective_rate(9.0, RateCategory::Investment, &a), 9.0);
    }

    #[test]
    fn custom_mode_substitutes_user_rates_per_category() {
        let a = assumptions(ScenarioMode::Custom);
        assert_eq!(effective_rate(9.0, RateCategory::Inflation, &a), 1.1);
        assert_eq!(effective_rate(9.0, RateCategory::Income, &a), 2.2);
        assert_eq!(effective_rate(9.0, RateCategory::Investment, &a), 3.3);
        assert_eq!(effective_rate(9.0, RateCategory::RealEstate, &a), 4.4);
    }

    #[test]
    fn presets_are_ordered_for_investment_returns() {
        let opt = effective_rate(0.0, RateCategory::Investment, &assumptions(ScenarioMode::Optimistic));
        let avg = effective_rate(0.0, RateCategory::Investment, &assumptions(ScenarioMode::Average));
        let pes =
            effective_rate(0.0, RateCategory::Investment, &assumptions(ScenarioMode::Pessimistic));
        assert!(opt > avg && avg > pes);
        assert!(preset_rates(ScenarioMode::Custom).is_none());
    }
}
