use tracing::{debug, info, warn};

use super::activation::resolve_items;
use super::error::EngineError;
use super::loan::{Loan, PeriodSplit};
use super::pension::PensionState;
use super::rates::effective_rate;
use super::summary::build_summary;
use super::tax::{
    PropertySale, capital_gains_tax, interest_income_tax, isa_maturity_tax, pension_income_tax,
};
use super::types::{
    Assumptions, Balances, FinancialItem, FlowKind, Flows, Frequency, ItemFlow, ItemKind, ItemSpec,
    MonthSnapshot, Owner, PensionLayer, Profile, SavingsAccount, ScenarioMode, SimulationEvent,
    SimulationOptions, SimulationRequest, SimulationResult, SurplusTarget, YearMonth,
    YearSnapshot,
};

const MAX_AGE: u32 = 130;

/// Runs a request as received from the API or CLI.
pub fn simulate(request: &SimulationRequest) -> Result<SimulationResult, EngineError> {
    let profile = request.profile.as_ref().ok_or(EngineError::MissingProfile)?;
    run_simulation(profile, &request.items, &request.assumptions, &request.options)
}

/// Validates inputs, then steps month by month from the start month to
/// December of the final year of life expectancy.
pub fn run_simulation(
    profile: &Profile,
    specs: &[ItemSpec],
    assumptions: &Assumptions,
    options: &SimulationOptions,
) -> Result<SimulationResult, EngineError> {
    validate_profile(profile)?;
    let horizon = resolve_horizon(profile, options)?;
    let items = resolve_items(profile, specs)?;
    validate_priority(&items, &assumptions.priority)?;

    info!(
        start_year = horizon.start.year,
        start_month = horizon.start.month,
        end_year = horizon.end_year,
        items = items.len(),
        scenario = ?assumptions.scenario,
        "running simulation"
    );

    let result = project(profile, &items, assumptions, horizon, options.monthly_detail);

    if let Some(year) = result.summary.bankruptcy_year {
        warn!(year, "financial assets go negative");
    }
    info!(
        fi_year = ?result.summary.fi_year,
        peak_net_worth = result.summary.peak_net_worth,
        "simulation finished"
    );
    Ok(result)
}

/// Runs the same household once per scenario mode, in the given order.
pub fn compare_scenarios(
    request: &SimulationRequest,
    modes: &[ScenarioMode],
) -> Result<Vec<(ScenarioMode, SimulationResult)>, EngineError> {
    modes
        .iter()
        .map(|&mode| {
            let mut variant = request.clone();
            variant.assumptions.scenario = mode;
            simulate(&variant).map(|result| (mode, result))
        })
        .collect()
}

#[derive(Copy, Clone, Debug)]
struct Horizon {
    start: YearMonth,
    end_year: i32,
}

fn validate_profile(profile: &Profile) -> Result<(), EngineError> {
    let plausible_year = 1900..=2200;
    if !plausible_year.contains(&profile.birth_year) {
        return Err(EngineError::InvalidProfile(format!(
            "birth year {} is out of range",
            profile.birth_year
        )));
    }
    if profile.retirement_age == 0 || profile.retirement_age > MAX_AGE {
        return Err(EngineError::InvalidProfile(format!(
            "retirement age {} is out of range",
            profile.retirement_age
        )));
    }
    match (profile.spouse_birth_year, profile.spouse_retirement_age) {
        (Some(year), _) if !plausible_year.contains(&year) => Err(EngineError::InvalidProfile(
            format!("spouse birth year {year} is out of range"),
        )),
        (_, Some(age)) if age == 0 || age > MAX_AGE => Err(EngineError::InvalidProfile(
            format!("spouse retirement age {age} is out of range"),
        )),
        (None, Some(_)) => Err(EngineError::InvalidProfile(
            "spouse retirement age requires a spouse birth year".to_string(),
        )),
        _ => Ok(()),
    }
}

fn resolve_horizon(profile: &Profile, options: &SimulationOptions) -> Result<Horizon, EngineError> {
    let start = options
        .start
        .ok_or_else(|| EngineError::InvalidHorizon("start month is required".to_string()))?;
    if !(1..=12).contains(&start.month) {
        return Err(EngineError::InvalidHorizon(format!(
            "start month {} is outside 1..=12",
            start.month
        )));
    }
    if options.life_expectancy == 0 || options.life_expectancy > MAX_AGE {
        return Err(EngineError::InvalidHorizon(format!(
            "life expectancy {} is out of range",
            options.life_expectancy
        )));
    }

    let end_year = profile.birth_year + options.life_expectancy as i32;
    if end_year < start.year {
        return Err(EngineError::InvalidHorizon(format!(
            "life expectancy ends in {end_year}, before the start year {}",
            start.year
        )));
    }
    Ok(Horizon { start, end_year })
}

fn validate_priority(items: &[FinancialItem], priority: &[SurplusTarget]) -> Result<(), EngineError> {
    for target in priority {
        if let SurplusTarget::Savings { item_id, .. } = target {
            let known = items
                .iter()
                .any(|item| item.id == *item_id && matches!(item.kind, ItemKind::Savings { .. }));
            if !known {
                return Err(EngineError::UnknownPriorityTarget(item_id.clone()));
            }
        }
    }
    Ok(())
}

fn project(
    profile: &Profile,
    items: &[FinancialItem],
    assumptions: &Assumptions,
    horizon: Horizon,
    monthly_detail: bool,
) -> SimulationResult {
    let ctx = RunContext {
        profile,
        assumptions,
        start: horizon.start,
    };
    let mut household = Household::new(&ctx, items);
    let opening = household.balances(horizon.start);

    let years = (horizon.end_year - horizon.start.year + 1).max(0) as usize;
    let mut yearly = Vec::with_capacity(years);
    let mut monthly = monthly_detail.then(|| Vec::with_capacity(years * 12));

    for year in horizon.start.year..=horizon.end_year {
        let first_month = if year == horizon.start.year {
            horizon.start.month
        } else {
            1
        };

        let mut flows = Flows::default();
        let mut events = Vec::new();
        let mut balances = opening;

        for month in first_month..=12 {
            let snapshot = household.step_month(&ctx, YearMonth::new(year, month));
            flows.absorb(&snapshot.flows);
            events.extend(snapshot.events.iter().cloned());
            balances = snapshot.balances;
            if let Some(rows) = monthly.as_mut() {
                rows.push(snapshot);
            }
        }

        yearly.push(YearSnapshot {
            year,
            age: profile.age_in(Owner::Me, year),
            spouse_age: profile
                .spouse_birth_year
                .map(|birth| (year - birth).max(0) as u32),
            flows,
            balances,
            events,
        });
    }

    let first_year_months = 13 - horizon.start.month;
    let summary = build_summary(
        &yearly,
        first_year_months,
        opening.net_worth,
        profile.retirement_year(),
    );
    SimulationResult {
        start_year: horizon.start.year,
        end_year: horizon.end_year,
        retirement_year: profile.retirement_year(),
        yearly,
        monthly,
        summary,
    }
}

struct RunContext<'a> {
    profile: &'a Profile,
    assumptions: &'a Assumptions,
    start: YearMonth,
}

impl RunContext<'_> {
    fn is_after_start(&self, at: YearMonth) -> bool {
        at.index() > self.start.index()
    }

    fn retirement_events(&self, at: YearMonth, events: &mut Vec<SimulationEvent>) {
        if at.month != 1 {
            return;
        }
        if at.year == self.profile.retirement_year() {
            events.push(SimulationEvent::Retirement { owner: Owner::Me });
        }
        if self.profile.spouse_birth_year.is_some()
            && at.year == self.profile.retirement_year_of(Owner::Spouse)
        {
            events.push(SimulationEvent::Retirement {
                owner: Owner::Spouse,
            });
        }
    }
}

fn later_of(a: YearMonth, b: YearMonth) -> YearMonth {
    if a.index() >= b.index() { a } else { b }
}

/// Growth applied once per full year elapsed since `base`.
fn yearly_growth(rate_percent: f64, base: YearMonth, at: YearMonth) -> f64 {
    let years = (base.months_until(at) / 12).max(0);
    (1.0 + rate_percent / 100.0).powi(years as i32)
}

/// Growth accrued smoothly per month since `base`.
fn monthly_growth(rate_percent: f64, base: YearMonth, at: YearMonth) -> f64 {
    let months = base.months_until(at).max(0) as f64;
    (1.0 + rate_percent / 100.0).powf(months / 12.0)
}

fn outstanding(loan: &Loan, at: YearMonth) -> f64 {
    if at.index() < loan.start.index() {
        0.0
    } else {
        loan.remaining_balance(at)
    }
}

#[derive(Debug)]
struct CashFlowSlot<'a> {
    item: &'a FinancialItem,
    kind: FlowKind,
    amount: f64,
    frequency: Frequency,
    rate: f64,
    growth_base: YearMonth,
}

impl CashFlowSlot<'_> {
    fn amount_in(&self, at: YearMonth) -> f64 {
        let window = self.item.window;
        if !window.contains(at) {
            return 0.0;
        }
        let due = match self.frequency {
            Frequency::Monthly => true,
            Frequency::Yearly => at.month == window.start.month,
            Frequency::Once => at == window.start,
        };
        if !due {
            return 0.0;
        }
        self.amount * yearly_growth(self.rate, self.growth_base, at)
    }
}

#[derive(Debug)]
struct SavingsSlot<'a> {
    item: &'a FinancialItem,
    account: SavingsAccount,
    contribution: f64,
    rate: f64,
    tax_exempt: bool,
    maturity: Option<YearMonth>,
    balance: f64,
    basis: f64,
    closed: bool,
}

impl SavingsSlot<'_> {
    fn deposit(&mut self, amount: f64) {
        self.balance += amount;
        self.basis += amount;
    }

    /// Takes up to `amount`, shrinking the cost basis pro rata.
    fn withdraw(&mut self, amount: f64) -> f64 {
        let taken = self.balance.max(0.0).min(amount);
        if self.balance > 0.0 {
            self.basis *= (self.balance - taken) / self.balance;
        }
        self.balance -= taken;
        taken
    }
}

#[derive(Debug)]
struct DebtSlot<'a> {
    item: &'a FinancialItem,
    loan: Loan,
    settled: bool,
}

#[derive(Debug)]
struct PropertySlot<'a> {
    item: &'a FinancialItem,
    current_value: f64,
    purchase_price: f64,
    acquired: YearMonth,
    rate: f64,
    primary_residence: bool,
    monthly_rent: f64,
    valuation_base: YearMonth,
    loan: Option<Loan>,
    loan_settled: bool,
    sold: bool,
}

impl PropertySlot<'_> {
    fn is_held(&self, at: YearMonth) -> bool {
        !self.sold && self.item.window.contains(at)
    }

    fn value_at(&self, at: YearMonth) -> f64 {
        self.current_value * monthly_growth(self.rate, self.valuation_base, at)
    }

    fn open_loan(&self) -> Option<Loan> {
        self.loan.filter(|_| !self.loan_settled)
    }
}

#[derive(Debug)]
struct PensionSlot<'a> {
    item: &'a FinancialItem,
    layer: PensionLayer,
    contribution: f64,
    rate: f64,
    receiving_start: YearMonth,
    receiving_years: u32,
    monthly_benefit: f64,
    benefit_started: bool,
    state: PensionState,
}

impl PensionSlot<'_> {
    /// Public-layer pensions with a stated benefit pay that benefit instead of a PMT draw.
    fn pays_fixed_benefit(&self) -> bool {
        self.layer == PensionLayer::Public && self.monthly_benefit > 0.0
    }
}

#[derive(Debug)]
struct AssetSlot<'a> {
    item: &'a FinancialItem,
    current_value: f64,
    rate: f64,
    valuation_base: YearMonth,
}

/// Per-month flows, events, and non-flow cash movements.
#[derive(Default)]
struct MonthLedger {
    flows: Flows,
    events: Vec<SimulationEvent>,
    transfers: f64,
}

impl MonthLedger {
    fn record(&mut self, item: &FinancialItem, kind: FlowKind, amount: f64) {
        if amount == 0.0 {
            return;
        }
        match kind {
            FlowKind::Income => self.flows.income += amount,
            FlowKind::Expense => self.flows.expense += amount,
            FlowKind::Contribution => self.flows.contributions += amount,
            FlowKind::Tax => self.flows.tax += amount,
            FlowKind::DebtService => {}
        }
        self.push_breakdown(item, kind, amount);
    }

    fn record_debt(&mut self, item: &FinancialItem, split: PeriodSplit) {
        if split.total() == 0.0 {
            return;
        }
        self.flows.principal_paid += split.principal;
        self.flows.interest_paid += split.interest;
        self.push_breakdown(item, FlowKind::DebtService, split.total());
    }

    fn push_breakdown(&mut self, item: &FinancialItem, kind: FlowKind, amount: f64) {
        let breakdown = &mut self.flows.breakdown;
        match breakdown
            .iter_mut()
            .find(|f| f.item_id == item.id && f.kind == kind)
        {
            Some(existing) => existing.amount += amount,
            None => breakdown.push(ItemFlow {
                item_id: item.id.clone(),
                name: item.name.clone(),
                kind,
                amount,
            }),
        }
    }
}

/// Mutable state for one run. Rebuilt from the items for every call.
struct Household<'a> {
    cash: f64,
    cash_flows: Vec<CashFlowSlot<'a>>,
    savings: Vec<SavingsSlot<'a>>,
    debts: Vec<DebtSlot<'a>>,
    properties: Vec<PropertySlot<'a>>,
    pensions: Vec<PensionSlot<'a>>,
    assets: Vec<AssetSlot<'a>>,
}

impl<'a> Household<'a> {
    fn new(ctx: &RunContext, items: &'a [FinancialItem]) -> Self {
        let mut household = Household {
            cash: ctx.assumptions.opening_cash,
            cash_flows: Vec::new(),
            savings: Vec::new(),
            debts: Vec::new(),
            properties: Vec::new(),
            pensions: Vec::new(),
            assets: Vec::new(),
        };

        for item in items {
            let rate_of = |base: f64| effective_rate(base, item.rate_category, ctx.assumptions);
            let growth_base = later_of(item.window.start, ctx.start);

            match &item.kind {
                ItemKind::Income {
                    amount,
                    frequency,
                    growth_rate,
                    ..
                }
                | ItemKind::Expense {
                    amount,
                    frequency,
                    growth_rate,
                    ..
                } => household.cash_flows.push(CashFlowSlot {
                    item,
                    kind: if matches!(item.kind, ItemKind::Income { .. }) {
                        FlowKind::Income
                    } else {
                        FlowKind::Expense
                    },
                    amount: *amount,
                    frequency: *frequency,
                    rate: rate_of(*growth_rate),
                    growth_base,
                }),
                ItemKind::Savings {
                    account,
                    balance,
                    monthly_contribution,
                    return_rate,
                    tax_exempt,
                    maturity,
                } => household.savings.push(SavingsSlot {
                    item,
                    account: *account,
                    contribution: monthly_contribution.max(0.0),
                    rate: rate_of(*return_rate),
                    tax_exempt: *tax_exempt,
                    maturity: *maturity,
                    balance: balance.max(0.0),
                    basis: balance.max(0.0),
                    closed: false,
                }),
                ItemKind::Debt { loan } => household.debts.push(DebtSlot {
                    item,
                    loan: Loan::from_terms(loan, loan.rate.annual_percent(), growth_base),
                    settled: false,
                }),
                ItemKind::RealEstate {
                    current_value,
                    purchase_price,
                    acquired,
                    growth_rate,
                    primary_residence,
                    monthly_rent,
                    loan,
                } => household.properties.push(PropertySlot {
                    item,
                    current_value: *current_value,
                    purchase_price: *purchase_price,
                    acquired: *acquired,
                    rate: rate_of(*growth_rate),
                    primary_residence: *primary_residence,
                    monthly_rent: *monthly_rent,
                    valuation_base: growth_base,
                    loan: loan
                        .as_ref()
                        .map(|terms| Loan::from_terms(terms, terms.rate.annual_percent(), growth_base)),
                    loan_settled: false,
                    sold: false,
                }),
                ItemKind::Pension {
                    layer,
                    balance,
                    monthly_contribution,
                    return_rate,
                    receiving_start_age,
                    receiving_years,
                    monthly_benefit,
                } => household.pensions.push(PensionSlot {
                    item,
                    layer: *layer,
                    contribution: monthly_contribution.max(0.0),
                    rate: rate_of(*return_rate),
                    receiving_start: YearMonth::new(
                        ctx.profile
                            .birth_year_of(item.owner)
                            .saturating_add(i32::try_from(*receiving_start_age).unwrap_or(i32::MAX)),
                        1,
                    ),
                    receiving_years: *receiving_years,
                    monthly_benefit: *monthly_benefit,
                    benefit_started: false,
                    state: PensionState::accruing(*balance),
                }),
                ItemKind::PhysicalAsset {
                    current_value,
                    growth_rate,
                } => household.assets.push(AssetSlot {
                    item,
                    current_value: *current_value,
                    rate: rate_of(*growth_rate),
                    valuation_base: growth_base,
                }),
            }
        }

        household
    }

    fn step_month(&mut self, ctx: &RunContext, at: YearMonth) -> MonthSnapshot {
        let mut ledger = MonthLedger::default();
        ctx.retirement_events(at, &mut ledger.events);

        self.apply_cash_flows(at, &mut ledger);
        self.apply_debts(ctx, at, &mut ledger);
        self.apply_savings(ctx, at, &mut ledger);
        self.apply_pensions(ctx, at, &mut ledger);
        self.apply_properties(ctx, at, &mut ledger);

        let flows = &mut ledger.flows;
        flows.net_cash_flow =
            flows.income - flows.expense - flows.debt_service() - flows.contributions - flows.tax;
        let net = flows.net_cash_flow;

        self.cash += ledger.transfers;
        if net >= 0.0 {
            self.distribute_surplus(&ctx.assumptions.priority, net);
        } else {
            let uncovered = self.cover_deficit(&ctx.assumptions.priority, -net);
            if uncovered > 0.0 {
                debug!(year = at.year, month = at.month, uncovered, "cash shortfall");
                ledger
                    .events
                    .push(SimulationEvent::CashShortfall { amount: uncovered });
            }
        }

        MonthSnapshot {
            year: at.year,
            month: at.month,
            balances: self.balances(at),
            flows: ledger.flows,
            events: ledger.events,
        }
    }

    fn apply_cash_flows(&self, at: YearMonth, ledger: &mut MonthLedger) {
        for slot in &self.cash_flows {
            ledger.record(slot.item, slot.kind, slot.amount_in(at));
        }
    }

    fn apply_debts(&mut self, ctx: &RunContext, at: YearMonth, ledger: &mut MonthLedger) {
        for slot in self.debts.iter_mut().filter(|slot| !slot.settled) {
            if !slot.item.window.contains(at) {
                continue;
            }
            let loan = slot.loan;
            if loan.start == at && ctx.is_after_start(at) && loan.principal > 0.0 {
                ledger.transfers += loan.principal;
                ledger.events.push(SimulationEvent::LoanDisbursed {
                    item_id: slot.item.id.clone(),
                    name: slot.item.name.clone(),
                    amount: loan.principal,
                });
            }

            let mut split = loan.payment_in(at);
            let mut ends = None;
            if loan.matures_in(at) {
                ends = Some(false);
            } else if slot.item.window.end == Some(at) && at.index() >= loan.start.index() {
                split.principal += loan.remaining_balance(at);
                ends = Some(true);
            }
            ledger.record_debt(slot.item, split);

            if let Some(early) = ends {
                slot.settled = true;
                debug!(item = %slot.item.id, early, "loan closed");
                ledger.events.push(SimulationEvent::LoanMatured {
                    item_id: slot.item.id.clone(),
                    name: slot.item.name.clone(),
                    early,
                });
            }
        }
    }

    fn apply_savings(&mut self, ctx: &RunContext, at: YearMonth, ledger: &mut MonthLedger) {
        let rules = &ctx.assumptions.tax;
        for slot in self.savings.iter_mut().filter(|slot| !slot.closed) {
            slot.balance *= 1.0 + slot.rate / 100.0 / 12.0;
            if slot.contribution > 0.0 && slot.item.window.contains(at) {
                slot.deposit(slot.contribution);
                ledger.record(slot.item, FlowKind::Contribution, slot.contribution);
            }

            if slot.maturity != Some(at) {
                continue;
            }
            let gain = slot.balance - slot.basis;
            let tax = if slot.tax_exempt {
                0.0
            } else if slot.account.is_isa() {
                isa_maturity_tax(gain, slot.account, rules)
            } else {
                interest_income_tax(gain, false, rules)
            };
            let proceeds = slot.balance;
            ledger.transfers += proceeds;
            ledger.record(slot.item, FlowKind::Tax, tax);
            ledger.events.push(SimulationEvent::SavingsMatured {
                item_id: slot.item.id.clone(),
                name: slot.item.name.clone(),
                proceeds,
                tax,
            });
            debug!(item = %slot.item.id, proceeds, tax, "savings matured");
            slot.balance = 0.0;
            slot.basis = 0.0;
            slot.closed = true;
        }
    }

    fn apply_pensions(&mut self, ctx: &RunContext, at: YearMonth, ledger: &mut MonthLedger) {
        let rules = &ctx.assumptions.tax;
        for slot in &mut self.pensions {
            let receiving = at.index() >= slot.receiving_start.index();

            if slot.pays_fixed_benefit() {
                if !receiving {
                    if slot.item.window.contains(at) {
                        ledger.record(slot.item, FlowKind::Contribution, slot.contribution);
                    }
                    continue;
                }
                let months_in = slot.receiving_start.months_until(at);
                let term = i64::from(slot.receiving_years) * 12;
                if term > 0 && months_in >= term {
                    continue;
                }
                let benefit =
                    slot.monthly_benefit * yearly_growth(slot.rate, slot.receiving_start, at);
                if !slot.benefit_started {
                    slot.benefit_started = true;
                    ledger.events.push(SimulationEvent::PensionStarted {
                        item_id: slot.item.id.clone(),
                        name: slot.item.name.clone(),
                        monthly_withdrawal: benefit,
                    });
                }
                ledger.record(slot.item, FlowKind::Income, benefit);
                if term > 0 && months_in == term - 1 {
                    ledger.events.push(SimulationEvent::PensionEnded {
                        item_id: slot.item.id.clone(),
                        name: slot.item.name.clone(),
                    });
                }
                continue;
            }

            if receiving && slot.state.is_accruing() {
                if let Some(monthly) = slot.state.begin_receiving(slot.receiving_years, slot.rate) {
                    debug!(item = %slot.item.id, monthly, "pension enters receiving phase");
                    if monthly > 0.0 {
                        ledger.events.push(SimulationEvent::PensionStarted {
                            item_id: slot.item.id.clone(),
                            name: slot.item.name.clone(),
                            monthly_withdrawal: monthly,
                        });
                    } else if slot.state.balance > 0.0 {
                        // no payout term: the whole balance is released at once
                        ledger.transfers += slot.state.balance;
                        slot.state.balance = 0.0;
                        ledger.events.push(SimulationEvent::PensionEnded {
                            item_id: slot.item.id.clone(),
                            name: slot.item.name.clone(),
                        });
                    }
                }
            }

            if slot.state.is_accruing() {
                let contribution = if slot.item.window.contains(at) {
                    slot.contribution
                } else {
                    0.0
                };
                let paid = slot.state.accrue(contribution, slot.rate);
                ledger.record(slot.item, FlowKind::Contribution, paid);
                continue;
            }
            if slot.state.is_finished() {
                continue;
            }

            let withdrawal = slot.state.withdraw(slot.rate);
            ledger.record(slot.item, FlowKind::Income, withdrawal);
            if slot.layer != PensionLayer::Public {
                let age = ctx.profile.age_in(slot.item.owner, at.year);
                ledger.record(slot.item, FlowKind::Tax, pension_income_tax(withdrawal, age, rules));
            }
            if slot.state.is_finished() {
                ledger.transfers += slot.state.balance;
                slot.state.balance = 0.0;
                ledger.events.push(SimulationEvent::PensionEnded {
                    item_id: slot.item.id.clone(),
                    name: slot.item.name.clone(),
                });
            }
        }
    }

    fn apply_properties(&mut self, ctx: &RunContext, at: YearMonth, ledger: &mut MonthLedger) {
        let rules = &ctx.assumptions.tax;
        for slot in self.properties.iter_mut().filter(|slot| slot.is_held(at)) {
            let window = slot.item.window;
            if at == window.start && ctx.is_after_start(at) {
                ledger.transfers -= slot.purchase_price;
                ledger.events.push(SimulationEvent::PropertyAcquired {
                    item_id: slot.item.id.clone(),
                    name: slot.item.name.clone(),
                    price: slot.purchase_price,
                });
            }

            if let Some(loan) = slot.open_loan() {
                if loan.start == at && ctx.is_after_start(at) && loan.principal > 0.0 {
                    ledger.transfers += loan.principal;
                    ledger.events.push(SimulationEvent::LoanDisbursed {
                        item_id: slot.item.id.clone(),
                        name: slot.item.name.clone(),
                        amount: loan.principal,
                    });
                }
                ledger.record_debt(slot.item, loan.payment_in(at));
                if loan.matures_in(at) {
                    slot.loan_settled = true;
                    ledger.events.push(SimulationEvent::LoanMatured {
                        item_id: slot.item.id.clone(),
                        name: slot.item.name.clone(),
                        early: false,
                    });
                }
            }

            if slot.monthly_rent > 0.0 {
                let rent = slot.monthly_rent * yearly_growth(slot.rate, slot.valuation_base, at);
                ledger.record(slot.item, FlowKind::Income, rent);
            }

            if window.end != Some(at) {
                continue;
            }
            let sale_price = slot.value_at(at);
            let tax = capital_gains_tax(
                PropertySale {
                    sale_price,
                    purchase_price: slot.purchase_price,
                    years_held: (slot.acquired.months_until(at).max(0) / 12) as u32,
                    primary_residence: slot.primary_residence,
                },
                rules,
            );
            ledger.transfers += sale_price;
            ledger.record(slot.item, FlowKind::Tax, tax);
            if let Some(loan) = slot.open_loan() {
                let payoff = outstanding(&loan, at);
                ledger.record_debt(
                    slot.item,
                    PeriodSplit {
                        principal: payoff,
                        interest: 0.0,
                    },
                );
                slot.loan_settled = true;
            }
            slot.sold = true;
            debug!(item = %slot.item.id, sale_price, tax, "property sold");
            ledger.events.push(SimulationEvent::PropertySold {
                item_id: slot.item.id.clone(),
                name: slot.item.name.clone(),
                proceeds: sale_price,
                tax,
            });
        }
    }

    fn open_savings_mut(&mut self, item_id: &str) -> Option<&mut SavingsSlot<'a>> {
        self.savings
            .iter_mut()
            .find(|slot| !slot.closed && slot.item.id == item_id)
    }

    fn distribute_surplus(&mut self, priority: &[SurplusTarget], surplus: f64) {
        let mut remaining = surplus;
        for target in priority {
            if remaining <= 0.0 {
                break;
            }
            match target {
                SurplusTarget::CashBuffer { amount } => {
                    let top_up = (amount - self.cash).max(0.0).min(remaining);
                    self.cash += top_up;
                    remaining -= top_up;
                }
                SurplusTarget::Savings {
                    item_id,
                    monthly_limit,
                } => {
                    if let Some(slot) = self.open_savings_mut(item_id) {
                        let deposit =
                            monthly_limit.map_or(remaining, |limit| limit.max(0.0).min(remaining));
                        slot.deposit(deposit);
                        remaining -= deposit;
                    }
                }
            }
        }
        self.cash += remaining;
    }

    /// Draws from cash, then from the savings targets in reverse priority.
    /// Returns what could not be covered; that amount drives cash negative.
    fn cover_deficit(&mut self, priority: &[SurplusTarget], deficit: f64) -> f64 {
        let from_cash = self.cash.max(0.0).min(deficit);
        self.cash -= from_cash;
        let mut remaining = deficit - from_cash;

        for target in priority.iter().rev() {
            if remaining <= 0.0 {
                break;
            }
            if let SurplusTarget::Savings { item_id, .. } = target {
                if let Some(slot) = self.open_savings_mut(item_id) {
                    remaining -= slot.withdraw(remaining);
                }
            }
        }

        if remaining > 0.0 {
            self.cash -= remaining;
            remaining
        } else {
            0.0
        }
    }

    fn balances(&self, at: YearMonth) -> Balances {
        let savings: f64 = self
            .savings
            .iter()
            .filter(|slot| !slot.closed)
            .map(|slot| slot.balance)
            .sum();
        let pension_assets: f64 = self.pensions.iter().map(|slot| slot.state.balance).sum();
        let real_estate: f64 = self
            .properties
            .iter()
            .filter(|slot| slot.is_held(at))
            .map(|slot| slot.value_at(at))
            .sum();
        let physical_assets: f64 = self
            .assets
            .iter()
            .filter(|slot| slot.item.window.contains(at))
            .map(|slot| slot.current_value * monthly_growth(slot.rate, slot.valuation_base, at))
            .sum();

        let standalone_debt: f64 = self
            .debts
            .iter()
            .filter(|slot| !slot.settled && slot.item.window.contains(at))
            .map(|slot| outstanding(&slot.loan, at))
            .sum();
        let property_debt: f64 = self
            .properties
            .iter()
            .filter(|slot| slot.is_held(at))
            .filter_map(PropertySlot::open_loan)
            .map(|loan| outstanding(&loan, at))
            .sum();
        let debts = standalone_debt + property_debt;

        let financial_assets = self.cash + savings;
        Balances {
            cash: self.cash,
            savings,
            financial_assets,
            pension_assets,
            real_estate,
            physical_assets,
            debts,
            net_worth: financial_assets + pension_assets + real_estate + physical_assets - debts,
        }
    }
}
