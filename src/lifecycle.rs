//! # Payroll record lifecycle
//!
//! ```text
//! Draft ──calculate──▶ Calculated ──approve──▶ Approved ──mark_as_paid──▶ Paid
//!   │  ◀────update─────────┘                      │
//!   └──────────────approve────────────────────────┘
//!
//! Draft / Calculated / Approved ──cancel──▶ Cancelled
//! ```
//!
//! Every transition checks the current state before touching the
//! record.  A rejected transition returns
//! [`PayrollError::InvalidTransition`] and leaves the record exactly as
//! it was.  Callers are expected to hold exclusive access to a record
//! while transitioning it; the ledger does this under its lock.

use crate::error::{PayrollError, Result};
use crate::models::{
    Allowance, Earnings, OtherDeduction, PayPeriod, PaymentDetails, PayrollTotals, WorkRecord,
};
use crate::rules::TaxRuleSet;
use crate::tax::TaxCalculator;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayrollStatus {
    Draft,
    Calculated,
    Approved,
    Paid,
    Cancelled,
}

impl PayrollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayrollStatus::Draft => "draft",
            PayrollStatus::Calculated => "calculated",
            PayrollStatus::Approved => "approved",
            PayrollStatus::Paid => "paid",
            PayrollStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Derived values may still change.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Draft | Self::Calculated)
    }
}

impl fmt::Display for PayrollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayrollStatus {
    type Err = PayrollError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "calculated" => Ok(Self::Calculated),
            "approved" => Ok(Self::Approved),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(PayrollError::validation(format!("unknown payroll status '{other}'"))),
        }
    }
}

/// Immutable audit entry written by each approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approver: String,
    pub approved_at: DateTime<Utc>,
    pub comment: String,
}

/// Everything needed to open a new payroll record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPayroll {
    pub employee_id: String,
    pub period: PayPeriod,
    pub pay_date: NaiveDate,
    pub earnings: Earnings,
    #[serde(default)]
    pub work: WorkRecord,
    #[serde(default)]
    pub payment: PaymentDetails,
    #[serde(default)]
    pub allowances: Vec<Allowance>,
    #[serde(default)]
    pub other_deductions: Vec<OtherDeduction>,
    #[serde(default)]
    pub notes: String,
    pub created_by: String,
}

impl NewPayroll {
    pub fn validate(&self) -> Result<()> {
        if self.employee_id.trim().is_empty() {
            return Err(PayrollError::validation("employee_id is required"));
        }
        self.period.validate()?;
        self.earnings.validate()?;
        validate_items(&self.allowances, &self.other_deductions)
    }
}

fn validate_items(allowances: &[Allowance], deductions: &[OtherDeduction]) -> Result<()> {
    allowances.iter().try_for_each(Allowance::validate)?;
    deductions.iter().try_for_each(OtherDeduction::validate)
}

/// Partial edit of an open record.  `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollUpdate {
    pub period: Option<PayPeriod>,
    pub pay_date: Option<NaiveDate>,
    pub earnings: Option<Earnings>,
    pub work: Option<WorkRecord>,
    pub payment: Option<PaymentDetails>,
    /// Replaces the whole list when present.
    pub allowances: Option<Vec<Allowance>>,
    /// Replaces the whole list when present.
    pub other_deductions: Option<Vec<OtherDeduction>>,
    pub notes: Option<String>,
}

/// One employee's payroll for one pay period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollRecord {
    /// Ledger-assigned identifier.
    pub id: u64,
    /// Human-facing number, `PAY-YYYYMM-NNNNN`.
    pub payroll_number: String,
    /// Owning business.  Records are only visible through it.
    pub business_id: String,
    pub employee_id: String,
    pub period: PayPeriod,
    /// Date the employee is due to be paid.
    pub pay_date: NaiveDate,
    pub earnings: Earnings,
    pub work: WorkRecord,
    /// Figures from the latest calculation under the business's rules.
    pub totals: PayrollTotals,
    pub status: PayrollStatus,
    pub payment: PaymentDetails,
    pub allowances: Vec<Allowance>,
    pub other_deductions: Vec<OtherDeduction>,
    /// Set together with `paid_date` when the payroll is paid.
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: String,
    pub created_by: String,
    /// Who recorded the payment.
    pub processed_by: Option<String>,
    pub processed_date: Option<DateTime<Utc>>,
    /// Append-only.
    pub approvals: Vec<ApprovalRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayrollRecord {
    /// Open a record in `Draft`.  Totals are computed straight away so a
    /// draft approved without an explicit calculation still carries real
    /// figures.
    pub fn draft(
        id: u64,
        payroll_number: String,
        business_id: String,
        new: NewPayroll,
        calculator: &dyn TaxCalculator,
        rules: &TaxRuleSet,
    ) -> Result<Self> {
        new.validate()?;
        let totals = calculator.calculate(&new.earnings, new.period.period_type, rules)?;
        let now = Utc::now();
        Ok(Self {
            id,
            payroll_number,
            business_id,
            employee_id: new.employee_id,
            period: new.period,
            pay_date: new.pay_date,
            earnings: new.earnings,
            work: new.work,
            totals,
            status: PayrollStatus::Draft,
            payment: new.payment,
            allowances: new.allowances,
            other_deductions: new.other_deductions,
            is_paid: false,
            paid_date: None,
            notes: new.notes,
            created_by: new.created_by,
            processed_by: None,
            processed_date: None,
            approvals: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Recompute every derived field (DRAFT/CALCULATED → CALCULATED).
    ///
    /// May be repeated while the record is open; each run overwrites the
    /// previous totals.
    pub fn calculate(
        &mut self,
        calculator: &dyn TaxCalculator,
        rules: &TaxRuleSet,
    ) -> Result<&PayrollTotals> {
        self.require_open(PayrollStatus::Calculated)?;
        let totals = calculator.calculate(&self.earnings, self.period.period_type, rules)?;
        self.totals = totals;
        self.transition(PayrollStatus::Calculated);
        Ok(&self.totals)
    }

    /// Approve the payroll (DRAFT/CALCULATED → APPROVED) and append an
    /// audit entry.  Totals are not recomputed.
    pub fn approve(&mut self, approver: &str, comment: &str) -> Result<ApprovalRecord> {
        self.require_open(PayrollStatus::Approved)?;
        let entry = ApprovalRecord {
            approver: approver.to_string(),
            approved_at: Utc::now(),
            comment: comment.to_string(),
        };
        self.approvals.push(entry.clone());
        self.transition(PayrollStatus::Approved);
        Ok(entry)
    }

    /// Record payment (APPROVED → PAID).
    pub fn mark_as_paid(&mut self, processor: &str) -> Result<()> {
        if self.status != PayrollStatus::Approved {
            return Err(self.invalid(PayrollStatus::Paid));
        }
        let now = Utc::now();
        self.is_paid = true;
        self.paid_date = Some(now);
        self.processed_by = Some(processor.to_string());
        self.processed_date = Some(now);
        self.transition(PayrollStatus::Paid);
        Ok(())
    }

    /// Cancel from any non-terminal state.
    pub fn cancel(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.invalid(PayrollStatus::Cancelled));
        }
        self.transition(PayrollStatus::Cancelled);
        Ok(())
    }

    /// Apply an edit to an open record.  Totals are recomputed from the
    /// edited values and the record returns to `Draft`.
    pub fn apply_update(
        &mut self,
        update: PayrollUpdate,
        calculator: &dyn TaxCalculator,
        rules: &TaxRuleSet,
    ) -> Result<()> {
        if !self.status.is_open() {
            return Err(PayrollError::Conflict(format!(
                "payroll {} is {} and can no longer be edited",
                self.payroll_number, self.status
            )));
        }
        if let Some(period) = &update.period {
            period.validate()?;
        }
        validate_items(
            update.allowances.as_deref().unwrap_or(&[]),
            update.other_deductions.as_deref().unwrap_or(&[]),
        )?;
        let earnings = update.earnings.as_ref().unwrap_or(&self.earnings);
        let period_type = update.period.map_or(self.period.period_type, |p| p.period_type);
        let totals = calculator.calculate(earnings, period_type, rules)?;

        if let Some(period) = update.period {
            self.period = period;
        }
        if let Some(pay_date) = update.pay_date {
            self.pay_date = pay_date;
        }
        if let Some(earnings) = update.earnings {
            self.earnings = earnings;
        }
        if let Some(work) = update.work {
            self.work = work;
        }
        if let Some(payment) = update.payment {
            self.payment = payment;
        }
        if let Some(allowances) = update.allowances {
            self.allowances = allowances;
        }
        if let Some(other_deductions) = update.other_deductions {
            self.other_deductions = other_deductions;
        }
        if let Some(notes) = update.notes {
            self.notes = notes;
        }
        self.totals = totals;
        self.transition(PayrollStatus::Draft);
        Ok(())
    }

    fn require_open(&self, to: PayrollStatus) -> Result<()> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: PayrollStatus) -> PayrollError {
        PayrollError::InvalidTransition {
            from: self.status,
            to,
        }
    }

    fn transition(&mut self, to: PayrollStatus) {
        if self.status != to {
            tracing::info!(
                payroll_number = %self.payroll_number,
                from = %self.status,
                to = %to,
                "payroll status changed"
            );
        }
        self.status = to;
        self.updated_at = Utc::now();
    }
}
