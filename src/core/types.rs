use serde::{Deserialize, Serialize};

use super::tax::TaxRules;

/// Month-granular point in time. `month` is 1-based.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub const fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// Linear month index, `year * 12 + month`.
    pub fn index(self) -> i64 {
        self.year as i64 * 12 + self.month as i64
    }

    pub fn from_index(index: i64) -> Self {
        let zero_based = index - 1;
        Self {
            year: zero_based.div_euclid(12) as i32,
            month: (zero_based.rem_euclid(12) + 1) as u32,
        }
    }

    pub fn plus_months(self, months: i64) -> Self {
        Self::from_index(self.index() + months)
    }

    /// Signed number of months from `self` to `later`.
    pub fn months_until(self, later: YearMonth) -> i64 {
        later.index() - self.index()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Owner {
    #[serde(rename = "self")]
    Me,
    Spouse,
    Common,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RateCategory {
    Fixed,
    Inflation,
    Income,
    Investment,
    RealEstate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScenarioMode {
    Individual,
    Custom,
    Optimistic,
    Average,
    Pessimistic,
}

impl ScenarioMode {
    pub const ALL: [ScenarioMode; 5] = [
        ScenarioMode::Individual,
        ScenarioMode::Custom,
        ScenarioMode::Optimistic,
        ScenarioMode::Average,
        ScenarioMode::Pessimistic,
    ];
}

/// Annual rates in percent for the non-fixed rate categories.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalRates {
    pub inflation: f64,
    pub income_growth: f64,
    pub investment_return: f64,
    pub real_estate_growth: f64,
}

impl Default for GlobalRates {
    fn default() -> Self {
        Self {
            inflation: 2.5,
            income_growth: 3.0,
            investment_return: 5.0,
            real_estate_growth: 2.5,
        }
    }
}

/// Where a monthly surplus goes, in list order. Deficits are drawn from cash
/// first, then from these targets in reverse order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum SurplusTarget {
    /// Keep cash topped up to `amount` before anything else is funded.
    #[serde(rename_all = "camelCase")]
    CashBuffer { amount: f64 },
    /// Deposit into a savings item, optionally capped per month.
    #[serde(rename_all = "camelCase")]
    Savings {
        item_id: String,
        #[serde(default)]
        monthly_limit: Option<f64>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Assumptions {
    pub scenario: ScenarioMode,
    pub custom_rates: GlobalRates,
    pub priority: Vec<SurplusTarget>,
    pub opening_cash: f64,
    pub tax: TaxRules,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            scenario: ScenarioMode::Individual,
            custom_rates: GlobalRates::default(),
            priority: Vec::new(),
            opening_cash: 0.0,
            tax: TaxRules::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub birth_year: i32,
    pub retirement_age: u32,
    #[serde(default)]
    pub spouse_birth_year: Option<i32>,
    #[serde(default)]
    pub spouse_retirement_age: Option<u32>,
}

impl Profile {
    pub fn retirement_year(&self) -> i32 {
        self.birth_year + self.retirement_age as i32
    }

    /// Birth year of whoever owns an item; `common` follows `self`.
    pub fn birth_year_of(&self, owner: Owner) -> i32 {
        match owner {
            Owner::Spouse => self.spouse_birth_year.unwrap_or(self.birth_year),
            Owner::Me | Owner::Common => self.birth_year,
        }
    }

    pub fn retirement_year_of(&self, owner: Owner) -> i32 {
        match (owner, self.spouse_birth_year, self.spouse_retirement_age) {
            (Owner::Spouse, Some(birth), Some(age)) => birth + age as i32,
            (Owner::Spouse, Some(birth), None) => birth + self.retirement_age as i32,
            _ => self.retirement_year(),
        }
    }

    pub fn age_in(&self, owner: Owner, year: i32) -> u32 {
        (year - self.birth_year_of(owner)).max(0) as u32
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SimulationOptions {
    /// First simulated month. The API fills this with the current month when absent.
    pub start: Option<YearMonth>,
    pub life_expectancy: u32,
    pub monthly_detail: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            start: None,
            life_expectancy: 90,
            monthly_detail: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Frequency {
    Monthly,
    Yearly,
    Once,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomeCategory {
    Labor,
    Business,
    Rental,
    Financial,
    Other,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpenseCategory {
    Living,
    Housing,
    Education,
    Insurance,
    Other,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SavingsAccount {
    Deposit,
    Installment,
    Investment,
    /// General-type ISA, lower exemption tier.
    IsaGeneral,
    /// Preferential ISA, higher exemption tier.
    IsaPreferential,
}

impl SavingsAccount {
    pub fn is_isa(self) -> bool {
        matches!(self, SavingsAccount::IsaGeneral | SavingsAccount::IsaPreferential)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PensionLayer {
    Public,
    Retirement,
    Personal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepaymentScheme {
    Bullet,
    EqualInstallment,
    EqualPrincipal,
    Graduated,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InterestRate {
    Fixed {
        rate: f64,
    },
    #[serde(rename_all = "camelCase")]
    Floating {
        base_rate: f64,
        spread: f64,
    },
}

impl InterestRate {
    /// Annual percent after fixed/floating resolution.
    pub fn annual_percent(self) -> f64 {
        match self {
            InterestRate::Fixed { rate } => rate,
            InterestRate::Floating { base_rate, spread } => base_rate + spread,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanTerms {
    pub principal: f64,
    pub rate: InterestRate,
    pub scheme: RepaymentScheme,
    #[serde(default)]
    pub grace_months: u32,
    /// Origination month; the run's start month when absent.
    #[serde(default)]
    pub start: Option<YearMonth>,
    pub maturity: YearMonth,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemKind {
    #[serde(rename_all = "camelCase")]
    Income {
        category: IncomeCategory,
        amount: f64,
        frequency: Frequency,
        #[serde(default)]
        growth_rate: f64,
    },
    #[serde(rename_all = "camelCase")]
    Expense {
        category: ExpenseCategory,
        amount: f64,
        frequency: Frequency,
        #[serde(default)]
        growth_rate: f64,
    },
    #[serde(rename_all = "camelCase")]
    Savings {
        account: SavingsAccount,
        balance: f64,
        #[serde(default)]
        monthly_contribution: f64,
        #[serde(default)]
        return_rate: f64,
        #[serde(default)]
        tax_exempt: bool,
        #[serde(default)]
        maturity: Option<YearMonth>,
    },
    Debt {
        loan: LoanTerms,
    },
    #[serde(rename_all = "camelCase")]
    RealEstate {
        current_value: f64,
        purchase_price: f64,
        acquired: YearMonth,
        #[serde(default)]
        growth_rate: f64,
        #[serde(default)]
        primary_residence: bool,
        #[serde(default)]
        monthly_rent: f64,
        #[serde(default)]
        loan: Option<LoanTerms>,
    },
    #[serde(rename_all = "camelCase")]
    Pension {
        layer: PensionLayer,
        #[serde(default)]
        balance: f64,
        #[serde(default)]
        monthly_contribution: f64,
        #[serde(default)]
        return_rate: f64,
        receiving_start_age: u32,
        #[serde(default)]
        receiving_years: u32,
        /// Public-layer benefit paid instead of a PMT withdrawal.
        #[serde(default)]
        monthly_benefit: f64,
    },
    #[serde(rename_all = "camelCase")]
    PhysicalAsset {
        current_value: f64,
        #[serde(default)]
        growth_rate: f64,
    },
}

/// End of an item's activation window as entered.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EndSpec {
    At { year: i32, month: u32 },
    UntilRetirement,
    Unbounded,
}

/// A financial item as it arrives from the item-construction boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSpec {
    pub id: String,
    pub name: String,
    pub owner: Owner,
    pub start: YearMonth,
    pub end: EndSpec,
    pub rate_category: RateCategory,
    #[serde(flatten)]
    pub kind: ItemKind,
}

/// Closed month interval; `end: None` means active through year 9999.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActivationWindow {
    pub start: YearMonth,
    pub end: Option<YearMonth>,
}

/// An item with its activation window resolved to concrete months.
#[derive(Clone, Debug, PartialEq)]
pub struct FinancialItem {
    pub id: String,
    pub name: String,
    pub owner: Owner,
    pub window: ActivationWindow,
    pub rate_category: RateCategory,
    pub kind: ItemKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    pub profile: Option<Profile>,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub assumptions: Assumptions,
    #[serde(default)]
    pub options: SimulationOptions,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowKind {
    Income,
    Expense,
    DebtService,
    Contribution,
    Tax,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFlow {
    pub item_id: String,
    pub name: String,
    pub kind: FlowKind,
    pub amount: f64,
}

/// Flow totals for one period. Debt service is `principal_paid + interest_paid`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Flows {
    pub income: f64,
    pub expense: f64,
    pub principal_paid: f64,
    pub interest_paid: f64,
    pub contributions: f64,
    pub tax: f64,
    pub net_cash_flow: f64,
    pub breakdown: Vec<ItemFlow>,
}

impl Flows {
    pub fn debt_service(&self) -> f64 {
        self.principal_paid + self.interest_paid
    }

    pub(crate) fn absorb(&mut self, other: &Flows) {
        self.income += other.income;
        self.expense += other.expense;
        self.principal_paid += other.principal_paid;
        self.interest_paid += other.interest_paid;
        self.contributions += other.contributions;
        self.tax += other.tax;
        self.net_cash_flow += other.net_cash_flow;
        for flow in &other.breakdown {
            match self
                .breakdown
                .iter_mut()
                .find(|f| f.item_id == flow.item_id && f.kind == flow.kind)
            {
                Some(existing) => existing.amount += flow.amount,
                None => self.breakdown.push(flow.clone()),
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    pub cash: f64,
    pub savings: f64,
    pub financial_assets: f64,
    pub pension_assets: f64,
    pub real_estate: f64,
    pub physical_assets: f64,
    pub debts: f64,
    pub net_worth: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SimulationEvent {
    #[serde(rename_all = "camelCase")]
    Retirement { owner: Owner },
    #[serde(rename_all = "camelCase")]
    LoanDisbursed {
        item_id: String,
        name: String,
        amount: f64,
    },
    #[serde(rename_all = "camelCase")]
    LoanMatured {
        item_id: String,
        name: String,
        early: bool,
    },
    #[serde(rename_all = "camelCase")]
    PensionStarted {
        item_id: String,
        name: String,
        monthly_withdrawal: f64,
    },
    #[serde(rename_all = "camelCase")]
    PensionEnded { item_id: String, name: String },
    #[serde(rename_all = "camelCase")]
    SavingsMatured {
        item_id: String,
        name: String,
        proceeds: f64,
        tax: f64,
    },
    #[serde(rename_all = "camelCase")]
    PropertyAcquired {
        item_id: String,
        name: String,
        price: f64,
    },
    #[serde(rename_all = "camelCase")]
    PropertySold {
        item_id: String,
        name: String,
        proceeds: f64,
        tax: f64,
    },
    #[serde(rename_all = "camelCase")]
    CashShortfall { amount: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthSnapshot {
    pub year: i32,
    pub month: u32,
    pub flows: Flows,
    pub balances: Balances,
    pub events: Vec<SimulationEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub year: i32,
    pub age: u32,
    pub spouse_age: Option<u32>,
    pub flows: Flows,
    pub balances: Balances,
    pub events: Vec<SimulationEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub current_net_worth: f64,
    pub retirement_net_worth: Option<f64>,
    pub peak_net_worth: f64,
    pub peak_year: i32,
    pub fi_target: f64,
    pub fi_year: Option<i32>,
    pub years_to_fi: Option<u32>,
    pub bankruptcy_year: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub start_year: i32,
    pub end_year: i32,
    pub retirement_year: i32,
    pub yearly: Vec<YearSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<Vec<MonthSnapshot>>,
    pub summary: Summary,
}
