use std::collections::HashSet;

use super::error::EngineError;
use super::types::{
    ActivationWindow, EndSpec, FinancialItem, ItemKind, ItemSpec, Profile, YearMonth,
};

/// Linear month index used for an unbounded window end.
pub const UNBOUNDED_END_INDEX: i64 = 9999 * 12;

const MAX_PENSION_AGE: u32 = 150;
const MAX_RECEIVING_YEARS: u32 = 100;

impl ActivationWindow {
    pub fn start_index(&self) -> i64 {
        self.start.index()
    }

    pub fn end_index(&self) -> i64 {
        self.end.map_or(UNBOUNDED_END_INDEX, YearMonth::index)
    }

    pub fn contains(&self, at: YearMonth) -> bool {
        let target = at.index();
        self.start_index() <= target && target <= self.end_index()
    }

    /// Interval overlap with January..December of `year`.
    pub fn overlaps_year(&self, year: i32) -> bool {
        let year_start = YearMonth::new(year, 1).index();
        let year_end = YearMonth::new(year, 12).index();
        self.start_index() <= year_end && self.end_index() >= year_start
    }
}

pub fn is_active(item: &FinancialItem, year: i32, month: u32) -> bool {
    item.window.contains(YearMonth::new(year, month))
}

pub fn is_active_in_year(item: &FinancialItem, year: i32) -> bool {
    item.window.overlaps_year(year)
}

/// Resolves an entered end to a concrete month. "Until retirement" ends in
/// December of the year before the owner's retirement year.
pub fn resolve_end(end: EndSpec, spec: &ItemSpec, profile: &Profile) -> Option<YearMonth> {
    match end {
        EndSpec::At { year, month } => Some(YearMonth::new(year, month)),
        EndSpec::UntilRetirement => Some(YearMonth::new(
            profile.retirement_year_of(spec.owner) - 1,
            12,
        )),
        EndSpec::Unbounded => None,
    }
}

/// Turns entered item specs into items with concrete activation windows.
///
/// This is the only place "until retirement" is interpreted; the loop and the
/// resolver only ever see concrete windows.
pub fn resolve_items(
    profile: &Profile,
    specs: &[ItemSpec],
) -> Result<Vec<FinancialItem>, EngineError> {
    let mut seen = HashSet::with_capacity(specs.len());
    let mut items = Vec::with_capacity(specs.len());

    for spec in specs {
        if spec.id.trim().is_empty() {
            return Err(EngineError::InvalidItem {
                id: spec.name.clone(),
                reason: "item id must not be empty".to_string(),
            });
        }
        if !seen.insert(spec.id.as_str()) {
            return Err(EngineError::DuplicateItem(spec.id.clone()));
        }
        validate_month(spec, spec.start)?;
        if let EndSpec::At { year, month } = spec.end {
            validate_month(spec, YearMonth::new(year, month))?;
        }
        validate_kind(spec)?;

        items.push(FinancialItem {
            id: spec.id.clone(),
            name: spec.name.clone(),
            owner: spec.owner,
            window: ActivationWindow {
                start: spec.start,
                end: resolve_end(spec.end, spec, profile),
            },
            rate_category: spec.rate_category,
            kind: spec.kind.clone(),
        });
    }

    Ok(items)
}

fn validate_month(spec: &ItemSpec, at: YearMonth) -> Result<(), EngineError> {
    if (1..=12).contains(&at.month) {
        Ok(())
    } else {
        Err(EngineError::InvalidItem {
            id: spec.id.clone(),
            reason: format!("month {} is outside 1..=12", at.month),
        })
    }
}

fn validate_kind(spec: &ItemSpec) -> Result<(), EngineError> {
    let loan = match &spec.kind {
        ItemKind::Debt { loan } => Some(loan),
        ItemKind::RealEstate { loan, .. } => loan.as_ref(),
        _ => None,
    };
    if let Some(loan) = loan {
        validate_month(spec, loan.maturity)?;
        if let Some(start) = loan.start {
            validate_month(spec, start)?;
        }
    }
    if let ItemKind::Savings {
        maturity: Some(maturity),
        ..
    } = &spec.kind
    {
        validate_month(spec, *maturity)?;
    }
    if let ItemKind::Pension {
        receiving_start_age,
        receiving_years,
        ..
    } = &spec.kind
    {
        if *receiving_start_age > MAX_PENSION_AGE {
            return Err(EngineError::InvalidItem {
                id: spec.id.clone(),
                reason: format!("receiving start age {receiving_start_age} is out of range"),
            });
        }
        if *receiving_years > MAX_RECEIVING_YEARS {
            return Err(EngineError::InvalidItem {
                id: spec.id.clone(),
                reason: format!("receiving term of {receiving_years} years is out of range"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExpenseCategory, Frequency, Owner, PensionLayer, RateCategory};
    use proptest::prelude::{prop_assert, proptest};

    fn profile() -> Profile {
        Profile {
            birth_year: 1990,
            retirement_age: 60,
            spouse_birth_year: Some(1992),
            spouse_retirement_age: Some(55),
        }
    }

    fn expense_spec(start: YearMonth, end: EndSpec) -> ItemSpec {
        ItemSpec {
            id: "rent".to_string(),
            name: "Rent".to_string(),
            owner: Owner::Me,
            start,
            end,
            rate_category: RateCategory::Inflation,
            kind: ItemKind::Expense {
                category: ExpenseCategory::Housing,
                amount: 100.0,
                frequency: Frequency::Monthly,
                growth_rate: 0.0,
            },
        }
    }

    fn item(start: YearMonth, end: Option<YearMonth>) -> FinancialItem {
        FinancialItem {
            id: "x".to_string(),
            name: "x".to_string(),
            owner: Owner::Me,
            window: ActivationWindow { start, end },
            rate_category: RateCategory::Fixed,
            kind: ItemKind::PhysicalAsset {
                current_value: 1.0,
                growth_rate: 0.0,
            },
        }
    }

    #[test]
    fn month_check_is_inclusive_at_both_ends() {
        let it = item(YearMonth::new(2030, 3), Some(YearMonth::new(2031, 2)));
        assert!(!is_active(&it, 2030, 2));
        assert!(is_active(&it, 2030, 3));
        assert!(is_active(&it, 2031, 2));
        assert!(!is_active(&it, 2031, 3));
    }

    #[test]
    fn short_interval_is_visible_to_yearly_check_but_not_a_mid_year_sample() {
        let it = item(YearMonth::new(2030, 2), Some(YearMonth::new(2030, 2)));
        assert!(is_active_in_year(&it, 2030));
        assert!(!is_active(&it, 2030, 6));
        assert!(!is_active_in_year(&it, 2029));
        assert!(!is_active_in_year(&it, 2031));
    }

    #[test]
    fn unbounded_window_runs_through_year_9999() {
        let it = item(YearMonth::new(2030, 1), None);
        assert!(is_active(&it, 9998, 12));
        assert!(is_active_in_year(&it, 9999));
        assert!(!is_active(&it, 10000, 1));
    }

    #[test]
    fn end_before_start_is_never_active() {
        let it = item(YearMonth::new(2030, 6), Some(YearMonth::new(2030, 1)));
        for month in 1..=12 {
            assert!(!is_active(&it, 2030, month));
        }
        assert!(!is_active_in_year(&it, 2030));
    }

    #[test]
    fn until_retirement_resolves_per_owner() {
        let mut spec = expense_spec(YearMonth::new(2020, 1), EndSpec::UntilRetirement);
        let items = resolve_items(&profile(), std::slice::from_ref(&spec)).expect("valid");
        assert_eq!(items[0].window.end, Some(YearMonth::new(2049, 12)));

        spec.owner = Owner::Spouse;
        let items = resolve_items(&profile(), &[spec]).expect("valid");
        assert_eq!(items[0].window.end, Some(YearMonth::new(2046, 12)));
    }

    #[test]
    fn resolve_rejects_duplicate_ids_and_bad_months() {
        let spec = expense_spec(YearMonth::new(2020, 1), EndSpec::Unbounded);
        let err = resolve_items(&profile(), &[spec.clone(), spec.clone()]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateItem(id) if id == "rent"));

        let bad = expense_spec(YearMonth::new(2020, 13), EndSpec::Unbounded);
        assert!(matches!(
            resolve_items(&profile(), &[bad]),
            Err(EngineError::InvalidItem { .. })
        ));
    }

    #[test]
    fn resolve_rejects_out_of_range_pension_terms() {
        let pension = |receiving_start_age, receiving_years| ItemSpec {
            id: "pension".to_string(),
            name: "Pension".to_string(),
            owner: Owner::Me,
            start: YearMonth::new(2020, 1),
            end: EndSpec::Unbounded,
            rate_category: RateCategory::Fixed,
            kind: ItemKind::Pension {
                layer: PensionLayer::Personal,
                balance: 1_000.0,
                monthly_contribution: 0.0,
                return_rate: 0.0,
                receiving_start_age,
                receiving_years,
                monthly_benefit: 0.0,
            },
        };

        assert!(resolve_items(&profile(), &[pension(65, 20)]).is_ok());
        assert!(matches!(
            resolve_items(&profile(), &[pension(u32::MAX, 20)]),
            Err(EngineError::InvalidItem { id, .. }) if id == "pension"
        ));
        assert!(matches!(
            resolve_items(&profile(), &[pension(65, u32::MAX)]),
            Err(EngineError::InvalidItem { id, .. }) if id == "pension"
        ));
    }

    #[test]
    fn year_month_index_round_trips_across_year_boundaries() {
        let dec = YearMonth::new(2030, 12);
        assert_eq!(dec.plus_months(1), YearMonth::new(2031, 1));
        assert_eq!(YearMonth::new(2031, 1).plus_months(-1), dec);
        assert_eq!(dec.months_until(YearMonth::new(2040, 12)), 120);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_any_active_month_implies_active_year(
            start_year in 2000i32..2100,
            start_month in 1u32..=12,
            len in 0i64..60,
            offset in 0i64..60
        ) {
            let start = YearMonth::new(start_year, start_month);
            let it = item(start, Some(start.plus_months(len)));
            let at = start.plus_months(offset);
            if is_active(&it, at.year, at.month) {
                prop_assert!(is_active_in_year(&it, at.year));
            }
            prop_assert!(is_active_in_year(&it, start_year));
        }
    }
}
