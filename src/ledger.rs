//! In-memory payroll ledger.
//!
//! Holds payroll records per business and applies the workflow rules
//! around the lifecycle: payroll numbering, edits only before approval,
//! deletion only in draft, listing filters, and the summary and tax
//! report aggregates.  The ledger itself is not synchronised; wrap it in
//! a lock when sharing it (see [`crate::api::AppState`]).  Holding that
//! lock across a transition is what serialises concurrent operations on
//! the same record.

use crate::error::{PayrollError, Result};
use crate::lifecycle::{ApprovalRecord, NewPayroll, PayrollRecord, PayrollStatus, PayrollUpdate};
use crate::rules::TaxRuleSet;
use crate::tax::{round_money, TaxCalculator};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Filters for [`PayrollLedger::list`].  Dates bound the pay period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollFilter {
    pub employee_id: Option<String>,
    pub status: Option<PayrollStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl PayrollFilter {
    fn matches(&self, record: &PayrollRecord) -> bool {
        if let Some(employee_id) = &self.employee_id {
            if &record.employee_id != employee_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if record.period.start < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if record.period.end > end {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollSummary {
    pub total_payrolls: usize,
    pub total_gross_pay: Decimal,
    pub total_net_pay: Decimal,
    pub total_deductions: Decimal,
    pub average_gross_pay: Decimal,
    pub average_net_pay: Decimal,
    pub total_paye: Decimal,
    pub total_nis: Decimal,
    pub total_education_tax: Decimal,
    pub total_heart_trust: Decimal,
    pub unpaid_payrolls: usize,
    pub draft_payrolls: usize,
}

/// Condensed view of a record used in listings and reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollEntry {
    pub id: u64,
    pub payroll_number: String,
    pub employee_id: String,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub gross_earnings: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
    pub status: PayrollStatus,
    pub pay_date: NaiveDate,
    pub is_paid: bool,
}

impl From<&PayrollRecord> for PayrollEntry {
    fn from(record: &PayrollRecord) -> Self {
        Self {
            id: record.id,
            payroll_number: record.payroll_number.clone(),
            employee_id: record.employee_id.clone(),
            pay_period_start: record.period.start,
            pay_period_end: record.period.end,
            gross_earnings: record.totals.gross_earnings,
            total_deductions: record.totals.total_deductions,
            net_pay: record.totals.net_pay,
            status: record.status,
            pay_date: record.pay_date,
            is_paid: record.is_paid,
        }
    }
}

/// Statutory remittance totals for approved and paid payrolls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxReport {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_paye: Decimal,
    pub total_nis: Decimal,
    pub total_education_tax: Decimal,
    pub total_heart_trust: Decimal,
    pub total_gross_pay: Decimal,
    pub employee_count: usize,
    pub payroll_entries: Vec<PayrollEntry>,
}

#[derive(Debug, Default)]
pub struct PayrollLedger {
    records: BTreeMap<u64, PayrollRecord>,
    next_id: u64,
    sequences: HashMap<String, u32>,
}

impl PayrollLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Open a draft payroll for `business_id`, with totals computed under
    /// `rules`.
    ///
    /// Payroll numbers take the form `PAY-YYYYMM-NNNNN` with a
    /// per-business sequence that never reuses a number, even after a
    /// draft is deleted.
    pub fn create(
        &mut self,
        business_id: &str,
        new: NewPayroll,
        calculator: &dyn TaxCalculator,
        rules: &TaxRuleSet,
    ) -> Result<&PayrollRecord> {
        new.validate()?;
        let sequence = self.sequences.get(business_id).copied().unwrap_or(0) + 1;
        let today = Utc::now().date_naive();
        let payroll_number = format!(
            "PAY-{}{:02}-{:05}",
            today.year(),
            today.month(),
            sequence
        );
        let id = self.next_id + 1;
        let record = PayrollRecord::draft(
            id,
            payroll_number,
            business_id.to_string(),
            new,
            calculator,
            rules,
        )?;

        self.sequences.insert(business_id.to_string(), sequence);
        self.next_id = id;
        tracing::info!(
            business_id,
            payroll_number = %record.payroll_number,
            employee_id = %record.employee_id,
            "payroll created"
        );
        Ok(&*self.records.entry(id).or_insert(record))
    }

    pub fn get(&self, business_id: &str, id: u64) -> Result<&PayrollRecord> {
        self.records
            .get(&id)
            .filter(|r| r.business_id == business_id)
            .ok_or_else(|| not_found(business_id, id))
    }

    fn get_mut(&mut self, business_id: &str, id: u64) -> Result<&mut PayrollRecord> {
        self.records
            .get_mut(&id)
            .filter(|r| r.business_id == business_id)
            .ok_or_else(|| not_found(business_id, id))
    }

    /// Records of one business, most recent pay period first.
    pub fn list(&self, business_id: &str, filter: &PayrollFilter) -> Vec<&PayrollRecord> {
        let mut records: Vec<&PayrollRecord> = self
            .for_business(business_id)
            .filter(|r| filter.matches(r))
            .collect();
        records.sort_by(|a, b| {
            b.period
                .start
                .cmp(&a.period.start)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        records
    }

    pub fn update(
        &mut self,
        business_id: &str,
        id: u64,
        update: PayrollUpdate,
        calculator: &dyn TaxCalculator,
        rules: &TaxRuleSet,
    ) -> Result<&PayrollRecord> {
        let record = self.get_mut(business_id, id)?;
        record.apply_update(update, calculator, rules)?;
        Ok(&*record)
    }

    /// Physically remove a record.  Only drafts may be deleted.
    pub fn delete(&mut self, business_id: &str, id: u64) -> Result<PayrollRecord> {
        let record = self.get(business_id, id)?;
        if record.status != PayrollStatus::Draft {
            return Err(PayrollError::Conflict(format!(
                "payroll {} is {}; only draft payrolls can be deleted",
                record.payroll_number, record.status
            )));
        }
        let removed = self.records.remove(&id).ok_or_else(|| not_found(business_id, id))?;
        tracing::info!(business_id, payroll_number = %removed.payroll_number, "payroll deleted");
        Ok(removed)
    }

    pub fn calculate(
        &mut self,
        business_id: &str,
        id: u64,
        calculator: &dyn TaxCalculator,
        rules: &TaxRuleSet,
    ) -> Result<&PayrollRecord> {
        let record = self.get_mut(business_id, id)?;
        record.calculate(calculator, rules)?;
        Ok(&*record)
    }

    pub fn approve(&mut self, business_id: &str, id: u64, approver: &str, comment: &str) -> Result<ApprovalRecord> {
        self.get_mut(business_id, id)?.approve(approver, comment)
    }

    pub fn mark_paid(&mut self, business_id: &str, id: u64, processor: &str) -> Result<&PayrollRecord> {
        let record = self.get_mut(business_id, id)?;
        record.mark_as_paid(processor)?;
        Ok(&*record)
    }

    pub fn cancel(&mut self, business_id: &str, id: u64) -> Result<&PayrollRecord> {
        let record = self.get_mut(business_id, id)?;
        record.cancel()?;
        Ok(&*record)
    }

    /// Aggregate figures over every record whose pay period falls inside
    /// the optional date bounds.
    pub fn summary(
        &self,
        business_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> PayrollSummary {
        let filter = PayrollFilter {
            start_date,
            end_date,
            ..Default::default()
        };
        let mut summary = PayrollSummary::default();
        for record in self.for_business(business_id).filter(|r| filter.matches(r)) {
            let totals = &record.totals;
            summary.total_payrolls += 1;
            summary.total_gross_pay += totals.gross_earnings;
            summary.total_net_pay += totals.net_pay;
            summary.total_deductions += totals.total_deductions;
            summary.total_paye += totals.paye_amount;
            summary.total_nis += totals.nis_contribution;
            summary.total_education_tax += totals.education_tax_amount;
            summary.total_heart_trust += totals.heart_trust_amount;
            if !record.is_paid {
                summary.unpaid_payrolls += 1;
            }
            if record.status == PayrollStatus::Draft {
                summary.draft_payrolls += 1;
            }
        }
        if summary.total_payrolls > 0 {
            let count = Decimal::from(summary.total_payrolls as u64);
            summary.average_gross_pay = round_money(summary.total_gross_pay / count);
            summary.average_net_pay = round_money(summary.total_net_pay / count);
        }
        summary
    }

    /// Statutory totals for approved and paid payrolls whose pay period
    /// lies entirely within `[start, end]`.
    pub fn tax_report(&self, business_id: &str, start: NaiveDate, end: NaiveDate) -> Result<TaxReport> {
        if start > end {
            return Err(PayrollError::validation(format!(
                "report start {start} is after end {end}"
            )));
        }
        let mut records: Vec<&PayrollRecord> = self
            .for_business(business_id)
            .filter(|r| matches!(r.status, PayrollStatus::Approved | PayrollStatus::Paid))
            .filter(|r| r.period.within(start, end))
            .collect();
        records.sort_by(|a, b| a.period.start.cmp(&b.period.start).then_with(|| a.id.cmp(&b.id)));

        let employee_count = records
            .iter()
            .map(|r| r.employee_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let mut report = TaxReport {
            period_start: start,
            period_end: end,
            total_paye: Decimal::ZERO,
            total_nis: Decimal::ZERO,
            total_education_tax: Decimal::ZERO,
            total_heart_trust: Decimal::ZERO,
            total_gross_pay: Decimal::ZERO,
            employee_count,
            payroll_entries: Vec::with_capacity(records.len()),
        };
        for record in records {
            let totals = &record.totals;
            report.total_paye += totals.paye_amount;
            report.total_nis += totals.nis_contribution;
            report.total_education_tax += totals.education_tax_amount;
            report.total_heart_trust += totals.heart_trust_amount;
            report.total_gross_pay += totals.gross_earnings;
            report.payroll_entries.push(PayrollEntry::from(record));
        }
        Ok(report)
    }

    fn for_business(&self, business_id: &str) -> impl Iterator<Item = &PayrollRecord> + '_ {
        let business_id = business_id.to_owned();
        self.records.values().filter(move |r| r.business_id == business_id)
    }
}

fn not_found(business_id: &str, id: u64) -> PayrollError {
    PayrollError::NotFound(format!("payroll {id} for business {business_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Earnings, PayPeriod, PayPeriodType, PaymentDetails, WorkRecord};
    use crate::tax::JamaicaCalculator;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn new_payroll(employee: &str, month: u32, basic: Decimal) -> NewPayroll {
        NewPayroll {
            employee_id: employee.into(),
            period: PayPeriod::new(
                date(2024, month, 1),
                date(2024, month, 28),
                PayPeriodType::Monthly,
            )
            .unwrap(),
            pay_date: date(2024, month, 28),
            earnings: Earnings::salary(basic),
            work: WorkRecord::default(),
            payment: PaymentDetails::default(),
            allowances: Vec::new(),
            other_deductions: Vec::new(),
            notes: String::new(),
            created_by: "owner".into(),
        }
    }

    fn calc_rules() -> (JamaicaCalculator, TaxRuleSet) {
        (JamaicaCalculator::default(), TaxRuleSet::jamaica(2024))
    }

    fn open<'a>(ledger: &'a mut PayrollLedger, business: &str, new: NewPayroll) -> Result<&'a PayrollRecord> {
        let (calc, rules) = calc_rules();
        ledger.create(business, new, &calc, &rules)
    }

    #[test]
    fn numbers_are_sequential_per_business() {
        let mut ledger = PayrollLedger::new();
        let a1 = open(&mut ledger, "a", new_payroll("e1", 1, dec!(1000))).unwrap().payroll_number.clone();
        let a2 = open(&mut ledger, "a", new_payroll("e2", 1, dec!(1000))).unwrap().payroll_number.clone();
        let b1 = open(&mut ledger, "b", new_payroll("e3", 1, dec!(1000))).unwrap().payroll_number.clone();

        assert!(a1.starts_with("PAY-") && a1.ends_with("-00001"));
        assert!(a2.ends_with("-00002"));
        assert!(b1.ends_with("-00001"));
        assert_eq!(a1.len(), "PAY-202401-00001".len());
    }

    #[test]
    fn numbers_are_not_reused_after_delete() {
        let mut ledger = PayrollLedger::new();
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(1000))).unwrap().id;
        ledger.delete("a", id).unwrap();
        let next = open(&mut ledger, "a", new_payroll("e1", 1, dec!(1000))).unwrap();
        assert!(next.payroll_number.ends_with("-00002"));
    }

    #[test]
    fn invalid_create_stores_nothing() {
        let mut ledger = PayrollLedger::new();
        assert!(open(&mut ledger, "a", new_payroll("e1", 1, dec!(-1))).is_err());
        assert!(ledger.is_empty());
        let ok = open(&mut ledger, "a", new_payroll("e1", 1, dec!(1))).unwrap();
        assert!(ok.payroll_number.ends_with("-00001"));
    }

    #[test]
    fn records_are_scoped_to_their_business() {
        let mut ledger = PayrollLedger::new();
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(1000))).unwrap().id;
        assert!(ledger.get("a", id).is_ok());
        assert!(matches!(ledger.get("b", id), Err(PayrollError::NotFound(_))));
        assert!(ledger.approve("b", id, "x", "").is_err());
    }

    #[test]
    fn list_filters_and_orders_newest_first() {
        let mut ledger = PayrollLedger::new();
        open(&mut ledger, "a", new_payroll("e1", 1, dec!(1000))).unwrap();
        open(&mut ledger, "a", new_payroll("e1", 3, dec!(1000))).unwrap();
        let feb = open(&mut ledger, "a", new_payroll("e2", 2, dec!(1000))).unwrap().id;
        open(&mut ledger, "b", new_payroll("e1", 2, dec!(1000))).unwrap();
        let (calc, rules) = calc_rules();
        ledger.calculate("a", feb, &calc, &rules).unwrap();

        let all = ledger.list("a", &PayrollFilter::default());
        let months: Vec<u32> = all.iter().map(|r| r.period.start.month()).collect();
        assert_eq!(months, vec![3, 2, 1]);

        let by_employee = ledger.list(
            "a",
            &PayrollFilter {
                employee_id: Some("e1".into()),
                ..Default::default()
            },
        );
        assert_eq!(by_employee.len(), 2);

        let calculated = ledger.list(
            "a",
            &PayrollFilter {
                status: Some(PayrollStatus::Calculated),
                ..Default::default()
            },
        );
        assert_eq!(calculated.len(), 1);

        let ranged = ledger.list(
            "a",
            &PayrollFilter {
                start_date: Some(date(2024, 2, 1)),
                end_date: Some(date(2024, 2, 29)),
                ..Default::default()
            },
        );
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].id, feb);
    }

    #[test]
    fn only_drafts_are_deleted() {
        let mut ledger = PayrollLedger::new();
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(1000))).unwrap().id;
        let (calc, rules) = calc_rules();
        ledger.calculate("a", id, &calc, &rules).unwrap();

        assert!(matches!(ledger.delete("a", id), Err(PayrollError::Conflict(_))));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn full_workflow_through_ledger() {
        let mut ledger = PayrollLedger::new();
        let (calc, rules) = calc_rules();
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(100000))).unwrap().id;

        let record = ledger.calculate("a", id, &calc, &rules).unwrap();
        assert_eq!(record.totals.net_pay, dec!(93041.67));

        let approval = ledger.approve("a", id, "manager", "ok").unwrap();
        assert_eq!(approval.comment, "ok");

        assert!(matches!(
            ledger.update("a", id, PayrollUpdate::default(), &calc, &rules),
            Err(PayrollError::Conflict(_))
        ));

        let paid = ledger.mark_paid("a", id, "clerk").unwrap();
        assert_eq!(paid.status, PayrollStatus::Paid);
        assert!(ledger.cancel("a", id).is_err());
    }

    #[test]
    fn mark_paid_on_draft_keeps_status() {
        let mut ledger = PayrollLedger::new();
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(100000))).unwrap().id;
        let err = ledger.mark_paid("a", id, "clerk").unwrap_err();
        assert!(matches!(err, PayrollError::InvalidTransition { .. }));
        assert_eq!(ledger.get("a", id).unwrap().status, PayrollStatus::Draft);
    }

    #[test]
    fn draft_approved_without_calculation_reports_real_figures() {
        let mut ledger = PayrollLedger::new();
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(100000))).unwrap().id;
        ledger.approve("a", id, "manager", "").unwrap();
        let paid = ledger.mark_paid("a", id, "clerk").unwrap();
        assert_eq!(paid.totals.net_pay, dec!(93041.67));

        let report = ledger.tax_report("a", date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(report.total_gross_pay, dec!(100000));
        assert_eq!(report.total_nis, dec!(2500));
        assert_eq!(report.payroll_entries[0].net_pay, dec!(93041.67));
    }

    #[test]
    fn update_recomputes_with_business_rules() {
        let mut ledger = PayrollLedger::new();
        let calc = JamaicaCalculator::default();
        let pension = TaxRuleSet::jamaica(2024).with_pension(dec!(0.05), dec!(0.05));
        let id = open(&mut ledger, "a", new_payroll("e1", 1, dec!(100000))).unwrap().id;

        let update = PayrollUpdate {
            notes: Some("joined pension".into()),
            ..Default::default()
        };
        let record = ledger.update("a", id, update, &calc, &pension).unwrap();
        assert_eq!(record.status, PayrollStatus::Draft);
        assert_eq!(record.totals.pension_employee_contribution, dec!(5000));
        assert_eq!(record.totals.net_pay, dec!(88041.67));
    }

    #[test]
    fn summary_aggregates_business_records() {
        let mut ledger = PayrollLedger::new();
        let (calc, rules) = calc_rules();
        let first = open(&mut ledger, "a", new_payroll("e1", 1, dec!(100000))).unwrap().id;
        let second = open(&mut ledger, "a", new_payroll("e2", 1, dec!(1000000))).unwrap().id;
        open(&mut ledger, "a", new_payroll("e3", 1, dec!(5000))).unwrap();
        ledger.calculate("a", first, &calc, &rules).unwrap();
        ledger.calculate("a", second, &calc, &rules).unwrap();
        ledger.approve("a", second, "m", "").unwrap();
        ledger.mark_paid("a", second, "c").unwrap();

        let summary = ledger.summary("a", None, None);
        assert_eq!(summary.total_payrolls, 3);
        assert_eq!(summary.total_gross_pay, dec!(1105000));
        assert_eq!(summary.total_net_pay, dec!(835033.34));
        assert_eq!(summary.total_deductions, dec!(269966.66));
        assert_eq!(summary.total_paye, dec!(206250));
        assert_eq!(summary.total_nis, dec!(5150));
        assert_eq!(summary.average_gross_pay, dec!(368333.33));
        assert_eq!(summary.unpaid_payrolls, 2);
        assert_eq!(summary.draft_payrolls, 1);

        assert_eq!(ledger.summary("nobody", None, None), PayrollSummary::default());
    }

    #[test]
    fn tax_report_covers_approved_and_paid_in_range() {
        let mut ledger = PayrollLedger::new();
        let (calc, rules) = calc_rules();
        let jan = open(&mut ledger, "a", new_payroll("e1", 1, dec!(100000))).unwrap().id;
        let feb = open(&mut ledger, "a", new_payroll("e1", 2, dec!(100000))).unwrap().id;
        let feb_other = open(&mut ledger, "a", new_payroll("e2", 2, dec!(1000000))).unwrap().id;
        let mar = open(&mut ledger, "a", new_payroll("e3", 3, dec!(100000))).unwrap().id;
        for id in [jan, feb, feb_other, mar] {
            ledger.calculate("a", id, &calc, &rules).unwrap();
        }
        ledger.approve("a", feb, "m", "").unwrap();
        ledger.approve("a", jan, "m", "").unwrap();
        ledger.mark_paid("a", jan, "c").unwrap();
        ledger.approve("a", mar, "m", "").unwrap();
        // feb_other stays calculated and is excluded

        let report = ledger.tax_report("a", date(2024, 1, 1), date(2024, 2, 29)).unwrap();
        assert_eq!(report.payroll_entries.len(), 2);
        assert_eq!(report.payroll_entries[0].id, jan);
        assert_eq!(report.employee_count, 1);
        assert_eq!(report.total_nis, dec!(5000.00));
        assert_eq!(report.total_education_tax, dec!(2916.66));
        assert_eq!(report.total_gross_pay, dec!(200000));

        assert!(ledger.tax_report("a", date(2024, 3, 1), date(2024, 1, 1)).is_err());
    }
}
