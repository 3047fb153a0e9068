mod activation;
mod engine;
mod error;
mod loan;
mod pension;
mod rates;
mod summary;
mod tax;
mod types;

pub use activation::{UNBOUNDED_END_INDEX, is_active, is_active_in_year, resolve_end, resolve_items};
pub use engine::{compare_scenarios, run_simulation, simulate};
pub use error::EngineError;
pub use loan::{Loan, PeriodSplit};
pub use pension::{PensionPhase, PensionState, accrue_month, annual_withdrawal, pmt};
pub use rates::{effective_rate, preset_rates};
pub use summary::{FI_MULTIPLE, build_summary};
pub use tax::{
    PropertySale, TaxBracket, TaxRules, capital_gains_tax, holding_deduction_rate,
    interest_income_tax, isa_maturity_tax, pension_income_tax, progressive_tax,
};
pub use types::*;
