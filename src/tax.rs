//! Statutory deduction calculators.
//!
//! The [`TaxCalculator`] trait is the seam between the payroll workflow
//! and a jurisdiction's rules.  [`JamaicaCalculator`] implements PAYE,
//! NIS, Education Tax, HEART Trust/NTA and the optional pension scheme
//! over a [`TaxRuleSet`].  Calculation is a pure function of its inputs
//! and holds no state, so one calculator may be shared across threads.

use crate::error::Result;
use crate::models::{Earnings, PayPeriodType, PayrollTotals};
use crate::rules::{PayeBracket, TaxRuleSet};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Stored monetary values carry two fraction digits.
pub const MONEY_SCALE: u32 = 2;

/// Round half-up (away from zero) to cents.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// How period earnings are scaled to an annual figure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Annualization {
    /// Always ×12, whatever the declared pay period.  Matches the
    /// long-standing workflow behaviour and is only exact for monthly
    /// payrolls.
    #[default]
    FlatMonthly,
    /// ×12, ×26 or ×52 according to the pay period type.
    #[serde(rename = "by-period")]
    ByPayPeriod,
}

impl Annualization {
    pub fn factor(&self, period_type: PayPeriodType) -> Decimal {
        match self {
            Annualization::FlatMonthly => Decimal::from(12u32),
            Annualization::ByPayPeriod => Decimal::from(period_type.periods_per_year()),
        }
    }
}

/// Computes gross pay, statutory deductions and net pay for one
/// employee and one pay period.
///
/// Implementations must be thread-safe (`Send + Sync`) because batch
/// runs invoke them concurrently.
pub trait TaxCalculator: Send + Sync {
    /// Jurisdiction code, e.g. `"JM"`.
    fn jurisdiction(&self) -> &str;

    /// Either returns complete totals or an error; never a partial
    /// result.
    fn calculate(
        &self,
        earnings: &Earnings,
        period_type: PayPeriodType,
        rules: &TaxRuleSet,
    ) -> Result<PayrollTotals>;
}

/// Jamaican statutory deductions.
#[derive(Debug, Clone, Copy, Default)]
pub struct JamaicaCalculator {
    annualization: Annualization,
}

impl JamaicaCalculator {
    pub fn new(annualization: Annualization) -> Self {
        Self { annualization }
    }
}

impl TaxCalculator for JamaicaCalculator {
    fn jurisdiction(&self) -> &str {
        "JM"
    }

    fn calculate(
        &self,
        earnings: &Earnings,
        period_type: PayPeriodType,
        rules: &TaxRuleSet,
    ) -> Result<PayrollTotals> {
        earnings.validate()?;
        rules.validate()?;

        if self.annualization == Annualization::FlatMonthly && period_type != PayPeriodType::Monthly {
            tracing::warn!(
                period_type = %period_type,
                "annualizing a non-monthly payroll by 12; statutory amounts will be overstated"
            );
        }

        let factor = self.annualization.factor(period_type);
        let overtime_amount = earnings.overtime_amount();
        let gross = earnings.gross();
        let annual_gross = gross * factor;

        let taxable_income = (annual_gross - rules.personal_allowance).max(Decimal::ZERO);
        let annual_paye = progressive_tax(&rules.paye_brackets, taxable_income);
        let paye_amount = round_money(annual_paye / factor);

        let nisable_income = annual_gross.min(rules.nis_annual_cap);
        let nis_contribution = round_money(nisable_income * rules.nis_rate / factor);

        let education_taxable = (annual_gross - rules.education_tax_threshold).max(Decimal::ZERO);
        let education_tax_amount = round_money(education_taxable * rules.education_tax_rate / factor);

        let heart_trust_amount = round_money(annual_gross * rules.heart_trust_rate / factor);

        let (pension_employee_contribution, pension_employer_contribution) =
            if rules.pension_employee_rate > Decimal::ZERO {
                (
                    round_money(gross * rules.pension_employee_rate),
                    round_money(gross * rules.pension_employer_rate),
                )
            } else {
                (Decimal::ZERO, Decimal::ZERO)
            };

        let gross_earnings = round_money(gross);
        let total_deductions = paye_amount
            + nis_contribution
            + education_tax_amount
            + heart_trust_amount
            + pension_employee_contribution;
        let net_pay = gross_earnings - total_deductions;

        tracing::debug!(
            %gross_earnings,
            %total_deductions,
            %net_pay,
            tax_year = rules.tax_year,
            "calculated payroll totals"
        );

        Ok(PayrollTotals {
            overtime_amount: round_money(overtime_amount),
            gross_earnings,
            annual_gross: round_money(annual_gross),
            paye_taxable_income: round_money(taxable_income),
            paye_amount,
            nis_contribution,
            education_tax_amount,
            heart_trust_amount,
            pension_employee_contribution,
            pension_employer_contribution,
            total_deductions,
            net_pay,
        })
    }
}

/// Annual tax on `taxable_income` under a progressive bracket table.
///
/// Each bracket taxes the slice of income between its own threshold and
/// the next bracket's threshold (unbounded for the last one).
pub fn progressive_tax(brackets: &[PayeBracket], taxable_income: Decimal) -> Decimal {
    brackets
        .iter()
        .enumerate()
        .map(|(i, bracket)| {
            let ceiling = match brackets.get(i + 1) {
                Some(next) => taxable_income.min(next.threshold),
                None => taxable_income,
            };
            (ceiling - bracket.threshold).max(Decimal::ZERO) * bracket.rate
        })
        .sum()
}
