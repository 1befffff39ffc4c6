//! Batch payroll computation.
//!
//! [`run_payroll`] turns a [`PayRunInput`] into a [`PayRunResult`],
//! calculating each employee's totals in parallel with [`rayon`].  The
//! calculator is stateless, so entries need no coordination.  A run is
//! all-or-nothing: if any entry fails, no results are returned.

use crate::error::Result;
use crate::models::{EmployeePayResult, PayRunInput, PayRunResult};
use crate::rules::RuleBook;
use crate::tax::TaxCalculator;
use rayon::prelude::*;

pub fn run_payroll(
    input: &PayRunInput,
    rule_book: &RuleBook,
    calculator: &dyn TaxCalculator,
) -> Result<PayRunResult> {
    input.pay_period.validate()?;
    let rules = match input.business_id.as_deref() {
        Some(business_id) => rule_book.rules_for(business_id),
        None => rule_book.default_rules(),
    };
    let period_type = input.pay_period.period_type;

    let results = input
        .entries
        .par_iter()
        .map(|entry| -> Result<EmployeePayResult> {
            let totals = calculator.calculate(&entry.earnings, period_type, rules)?;
            Ok(EmployeePayResult {
                employee_id: entry.employee_id.clone(),
                totals,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        jurisdiction = calculator.jurisdiction(),
        employees = results.len(),
        tax_year = rules.tax_year,
        "payroll run complete"
    );
    Ok(PayRunResult {
        period: input.pay_period,
        tax_year: rules.tax_year,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PayrollError;
    use crate::models::{Earnings, PayPeriod, PayPeriodType, PayRunEntry};
    use crate::rules::TaxRuleSet;
    use crate::tax::JamaicaCalculator;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn period() -> PayPeriod {
        PayPeriod::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
            PayPeriodType::Monthly,
        )
        .unwrap()
    }

    fn entry(id: &str, basic: rust_decimal::Decimal) -> PayRunEntry {
        PayRunEntry {
            employee_id: id.into(),
            earnings: Earnings::salary(basic),
        }
    }

    #[test]
    fn computes_every_entry_in_order() {
        let book = RuleBook::new(TaxRuleSet::jamaica(2024)).unwrap();
        let input = PayRunInput {
            business_id: None,
            pay_period: period(),
            entries: (0..50).map(|i| entry(&format!("e{i}"), dec!(100000))).collect(),
        };
        let result = run_payroll(&input, &book, &JamaicaCalculator::default()).unwrap();

        assert_eq!(result.results.len(), 50);
        assert_eq!(result.results[7].employee_id, "e7");
        assert!(result.results.iter().all(|r| r.totals.net_pay == dec!(93041.67)));
        assert_eq!(result.tax_year, 2024);
    }

    #[test]
    fn uses_business_override() {
        let mut book = RuleBook::new(TaxRuleSet::jamaica(2024)).unwrap();
        book.insert_override(
            "biz-pension",
            TaxRuleSet::jamaica(2024).with_pension(dec!(0.05), dec!(0.05)),
        )
        .unwrap();
        let input = PayRunInput {
            business_id: Some("biz-pension".into()),
            pay_period: period(),
            entries: vec![entry("e1", dec!(100000))],
        };
        let result = run_payroll(&input, &book, &JamaicaCalculator::default()).unwrap();
        assert_eq!(result.results[0].totals.pension_employee_contribution, dec!(5000.00));
    }

    #[test]
    fn one_bad_entry_fails_the_run() {
        let book = RuleBook::new(TaxRuleSet::jamaica(2024)).unwrap();
        let input = PayRunInput {
            business_id: None,
            pay_period: period(),
            entries: vec![entry("e1", dec!(100000)), entry("e2", dec!(-1))],
        };
        let err = run_payroll(&input, &book, &JamaicaCalculator::default()).unwrap_err();
        assert!(matches!(err, PayrollError::Validation(_)));
    }

    #[test]
    fn inverted_period_is_rejected() {
        let book = RuleBook::new(TaxRuleSet::jamaica(2024)).unwrap();
        let mut pay_period = period();
        std::mem::swap(&mut pay_period.start, &mut pay_period.end);
        let input = PayRunInput {
            business_id: None,
            pay_period,
            entries: vec![entry("e1", dec!(100000))],
        };
        assert!(run_payroll(&input, &book, &JamaicaCalculator::default()).is_err());
    }
}
