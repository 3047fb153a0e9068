use super::types::{Summary, YearSnapshot};

/// Net worth multiple of annual expense that counts as financially independent.
pub const FI_MULTIPLE: f64 = 25.0;

/// Reduces yearly snapshots into headline metrics in a single pass.
/// `first_year_months` counts the simulated months in the first snapshot so a
/// partial opening year's expense can be annualized for the FI target.
pub fn build_summary(
    yearly: &[YearSnapshot],
    first_year_months: u32,
    opening_net_worth: f64,
    retirement_year: i32,
) -> Summary {
    let start_year = yearly.first().map_or(retirement_year, |s| s.year);
    let fi_target = yearly.first().map_or(0.0, |s| {
        s.flows.expense * 12.0 / f64::from(first_year_months.clamp(1, 12)) * FI_MULTIPLE
    });

    let mut peak_net_worth = opening_net_worth;
    let mut peak_year = start_year;
    let mut fi_year = None;
    let mut bankruptcy_year = None;
    let mut retirement_net_worth = None;

    for snapshot in yearly {
        let net_worth = snapshot.balances.net_worth;
        if net_worth > peak_net_worth {
            peak_net_worth = net_worth;
            peak_year = snapshot.year;
        }
        if fi_year.is_none() && fi_target > 0.0 && net_worth >= fi_target {
            fi_year = Some(snapshot.year);
        }
        if bankruptcy_year.is_none() && snapshot.balances.financial_assets < 0.0 {
            bankruptcy_year = Some(snapshot.year);
        }
        if snapshot.year == retirement_year {
            retirement_net_worth = Some(net_worth);
        }
    }

    Summary {
        current_net_worth: opening_net_worth,
        retirement_net_worth,
        peak_net_worth,
        peak_year,
        fi_target,
        fi_year,
        years_to_fi: fi_year.map(|year| (year - start_year).max(0) as u32),
        bankruptcy_year,
    }
}
