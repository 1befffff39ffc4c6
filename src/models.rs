//! Data models for the payroll engine.
//!
//! Earnings, pay periods, payment details and calculated totals.  All
//! monetary values are [`Decimal`]s; nothing in this crate touches
//! floating point.  Every type derives `Serialize`/`Deserialize` so it
//! can be persisted or sent over the HTTP API unchanged.

use crate::error::{PayrollError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often an employee is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayPeriodType {
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "bi-weekly")]
    BiWeekly,
    #[serde(rename = "monthly")]
    Monthly,
}

impl PayPeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayPeriodType::Weekly => "weekly",
            PayPeriodType::BiWeekly => "bi-weekly",
            PayPeriodType::Monthly => "monthly",
        }
    }

    pub fn periods_per_year(&self) -> u32 {
        match self {
            PayPeriodType::Weekly => 52,
            PayPeriodType::BiWeekly => 26,
            PayPeriodType::Monthly => 12,
        }
    }

    /// Length of one period in months, as the workflow reports it.
    pub fn months(&self) -> Decimal {
        match self {
            PayPeriodType::Weekly => Decimal::new(23, 2),
            PayPeriodType::BiWeekly => Decimal::new(46, 2),
            PayPeriodType::Monthly => Decimal::ONE,
        }
    }
}

impl fmt::Display for PayPeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayPeriodType {
    type Err = PayrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "weekly" => Ok(PayPeriodType::Weekly),
            "bi-weekly" => Ok(PayPeriodType::BiWeekly),
            "monthly" => Ok(PayPeriodType::Monthly),
            other => Err(PayrollError::validation(format!("unknown pay period type '{other}'"))),
        }
    }
}

/// Inclusive date range covered by one payroll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub period_type: PayPeriodType,
}

impl PayPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate, period_type: PayPeriodType) -> Result<Self> {
        let period = Self {
            start,
            end,
            period_type,
        };
        period.validate()?;
        Ok(period)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(PayrollError::validation(format!(
                "pay period start {} is after end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Whether the period lies entirely inside `[from, to]`.
    pub fn within(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.start >= from && self.end <= to
    }
}

/// Largest amount accepted for any earnings field (12 integer digits).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 0);

/// Earnings for one employee over one pay period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earnings {
    /// Salary for the period before any additions.
    pub basic_salary: Decimal,
    /// Overtime hours worked in the period.
    #[serde(default)]
    pub overtime_hours: Decimal,
    /// Amount paid per overtime hour.
    #[serde(default)]
    pub overtime_rate: Decimal,
    /// One-off bonus paid with this payroll.
    #[serde(default)]
    pub bonus: Decimal,
    /// Sales commission earned in the period.
    #[serde(default)]
    pub commission: Decimal,
    /// Arrears owed from earlier periods.
    #[serde(default)]
    pub back_pay: Decimal,
}

impl Earnings {
    pub fn salary(basic_salary: Decimal) -> Self {
        Self {
            basic_salary,
            overtime_hours: Decimal::ZERO,
            overtime_rate: Decimal::ZERO,
            bonus: Decimal::ZERO,
            commission: Decimal::ZERO,
            back_pay: Decimal::ZERO,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("basic_salary", self.basic_salary),
            ("overtime_hours", self.overtime_hours),
            ("overtime_rate", self.overtime_rate),
            ("bonus", self.bonus),
            ("commission", self.commission),
            ("back_pay", self.back_pay),
        ];
        for (name, value) in fields {
            if value < Decimal::ZERO {
                return Err(PayrollError::validation(format!(
                    "{name} must not be negative (got {value})"
                )));
            }
            if value > MAX_AMOUNT {
                return Err(PayrollError::validation(format!(
                    "{name} exceeds the maximum of {MAX_AMOUNT} (got {value})"
                )));
            }
        }
        Ok(())
    }

    pub fn overtime_amount(&self) -> Decimal {
        self.overtime_hours * self.overtime_rate
    }

    pub fn gross(&self) -> Decimal {
        self.basic_salary + self.overtime_amount() + self.bonus + self.commission + self.back_pay
    }
}

/// Hours recorded against the period.  Informational only; they do not
/// feed the calculation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkRecord {
    pub regular_hours: Decimal,
    pub holiday_hours: Decimal,
    pub sick_hours: Decimal,
    pub vacation_hours: Decimal,
    pub unpaid_leave_hours: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    BankTransfer,
    Check,
    Cash,
    MobilePayment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentDetails {
    pub method: PaymentMethod,
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub routing_number: Option<String>,
    pub check_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceType {
    Transport,
    Meal,
    Housing,
    Communication,
    Other,
}

/// An allowance itemised on the payslip.  Recorded with the payroll but
/// not part of the statutory calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub allowance_type: AllowanceType,
    pub amount: Decimal,
    /// Whether the allowance counts as taxable income for reporting.
    #[serde(default = "default_taxable")]
    pub taxable: bool,
    #[serde(default)]
    pub description: String,
}

fn default_taxable() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeductionType {
    LoanRepayment,
    UnionDues,
    Insurance,
    Garnishment,
    Advance,
    Other,
}

/// A non-statutory deduction itemised on the payslip, such as a loan
/// repayment.  Recorded with the payroll; it does not change the
/// statutory totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherDeduction {
    pub deduction_type: DeductionType,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    /// Repeats on every payroll until removed.
    #[serde(default)]
    pub recurring: bool,
}

/// Itemised amounts must be non-negative and within [`MAX_AMOUNT`].
fn check_item_amount(kind: &str, amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO || amount > MAX_AMOUNT {
        return Err(PayrollError::validation(format!(
            "{kind} amount must be between 0 and {MAX_AMOUNT} (got {amount})"
        )));
    }
    Ok(())
}

impl Allowance {
    pub fn validate(&self) -> Result<()> {
        check_item_amount("allowance", self.amount)
    }
}

impl OtherDeduction {
    pub fn validate(&self) -> Result<()> {
        check_item_amount("deduction", self.amount)
    }
}

/// Result of one calculation.  Monetary fields are rounded to cents.
///
/// `total_deductions` is the sum of the five employee-side line items
/// and `net_pay == gross_earnings - total_deductions` exactly.  The
/// employer pension contribution is a cost to the business and is not
/// deducted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollTotals {
    /// Overtime hours multiplied by the overtime rate.
    pub overtime_amount: Decimal,
    /// Everything earned in the period.
    pub gross_earnings: Decimal,
    /// Gross scaled to a year by the annualization factor.
    pub annual_gross: Decimal,
    /// Annual income above the personal allowance.
    pub paye_taxable_income: Decimal,
    /// Income tax withheld for the period.
    pub paye_amount: Decimal,
    /// National Insurance Scheme, employee share.
    pub nis_contribution: Decimal,
    pub education_tax_amount: Decimal,
    /// HEART Trust/NTA contribution.
    pub heart_trust_amount: Decimal,
    pub pension_employee_contribution: Decimal,
    /// Paid by the business on top of gross; never deducted.
    pub pension_employer_contribution: Decimal,
    /// PAYE, NIS, Education Tax, HEART and employee pension.
    pub total_deductions: Decimal,
    /// Take-home pay.
    pub net_pay: Decimal,
}

/// One employee's line in a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunEntry {
    pub employee_id: String,
    pub earnings: Earnings,
}

/// Input to a batch payroll run for one business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunInput {
    /// Selects the business's rule override; national defaults apply
    /// when absent.
    #[serde(default)]
    pub business_id: Option<String>,
    pub pay_period: PayPeriod,
    pub entries: Vec<PayRunEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeePayResult {
    pub employee_id: String,
    pub totals: PayrollTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayRunResult {
    pub period: PayPeriod,
    pub tax_year: i32,
    pub results: Vec<EmployeePayResult>,
}
