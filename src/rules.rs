//! Statutory tax rule sets.
//!
//! A [`TaxRuleSet`] carries every rate and threshold the calculator
//! needs.  Nothing in [`crate::tax`] hard-codes a statutory figure; the
//! national defaults live in [`TaxRuleSet::jamaica`] and each business
//! may override them through a [`RuleBook`].  Overrides are stored as
//! versioned JSON files on disk and loaded at start-up.

use crate::error::{PayrollError, Result};
use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One PAYE band: income above `threshold` (up to the next band's
/// threshold) is taxed at `rate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeBracket {
    pub threshold: Decimal,
    pub rate: Decimal,
}

impl PayeBracket {
    pub fn new(threshold: Decimal, rate: Decimal) -> Self {
        Self { threshold, rate }
    }
}

/// Statutory parameters for one tax year.  All amounts are annual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRuleSet {
    pub tax_year: i32,
    pub personal_allowance: Decimal,
    /// Ordered by strictly increasing threshold.  Taxable income at or
    /// below the first threshold pays no PAYE.
    pub paye_brackets: Vec<PayeBracket>,
    pub nis_rate: Decimal,
    pub nis_annual_cap: Decimal,
    pub education_tax_rate: Decimal,
    pub education_tax_threshold: Decimal,
    pub heart_trust_rate: Decimal,
    #[serde(default)]
    pub pension_employee_rate: Decimal,
    #[serde(default)]
    pub pension_employer_rate: Decimal,
}

impl TaxRuleSet {
    /// National statutory defaults.  Pension is an opt-in scheme and is
    /// therefore disabled; see [`TaxRuleSet::with_pension`].
    pub fn jamaica(tax_year: i32) -> Self {
        Self {
            tax_year,
            personal_allowance: Decimal::new(1_500_000, 0),
            paye_brackets: vec![
                PayeBracket::new(Decimal::new(1_500_000, 0), Decimal::new(25, 2)),
                PayeBracket::new(Decimal::new(6_000_000, 0), Decimal::new(30, 2)),
            ],
            nis_rate: Decimal::new(3, 2),
            nis_annual_cap: Decimal::new(1_000_000, 0),
            education_tax_rate: Decimal::new(25, 3),
            education_tax_threshold: Decimal::new(500_000, 0),
            heart_trust_rate: Decimal::new(3, 2),
            pension_employee_rate: Decimal::ZERO,
            pension_employer_rate: Decimal::ZERO,
        }
    }

    pub fn with_pension(mut self, employee_rate: Decimal, employer_rate: Decimal) -> Self {
        self.pension_employee_rate = employee_rate;
        self.pension_employer_rate = employer_rate;
        self
    }

    /// Check the rule set is internally consistent.
    ///
    /// Thresholds must be strictly increasing, every rate must lie in
    /// `[0, 1]` and no amount may be negative.
    pub fn validate(&self) -> Result<()> {
        let rates = [
            ("nis_rate", self.nis_rate),
            ("education_tax_rate", self.education_tax_rate),
            ("heart_trust_rate", self.heart_trust_rate),
            ("pension_employee_rate", self.pension_employee_rate),
            ("pension_employer_rate", self.pension_employer_rate),
        ];
        for (name, rate) in rates {
            check_rate(name, rate)?;
        }

        let amounts = [
            ("personal_allowance", self.personal_allowance),
            ("nis_annual_cap", self.nis_annual_cap),
            ("education_tax_threshold", self.education_tax_threshold),
        ];
        for (name, amount) in amounts {
            if amount < Decimal::ZERO {
                return Err(PayrollError::configuration(format!(
                    "{name} must not be negative (got {amount})"
                )));
            }
        }

        let mut previous: Option<Decimal> = None;
        for (i, bracket) in self.paye_brackets.iter().enumerate() {
            check_rate(&format!("paye_brackets[{i}].rate"), bracket.rate)?;
            if bracket.threshold < Decimal::ZERO {
                return Err(PayrollError::configuration(format!(
                    "paye_brackets[{i}].threshold must not be negative (got {})",
                    bracket.threshold
                )));
            }
            if let Some(prev) = previous {
                if bracket.threshold <= prev {
                    return Err(PayrollError::configuration(format!(
                        "PAYE thresholds must be strictly increasing: {} follows {}",
                        bracket.threshold, prev
                    )));
                }
            }
            previous = Some(bracket.threshold);
        }
        Ok(())
    }
}

fn check_rate(name: &str, rate: Decimal) -> Result<()> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(PayrollError::configuration(format!(
            "{name} must be between 0 and 1 (got {rate})"
        )));
    }
    Ok(())
}

/// A per-business override as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOverride {
    pub business_id: String,
    pub rules: TaxRuleSet,
}

/// Resolves the rule set for a business: its own override when one is
/// registered, otherwise the national default.
#[derive(Debug, Clone)]
pub struct RuleBook {
    default: TaxRuleSet,
    overrides: HashMap<String, TaxRuleSet>,
}

impl RuleBook {
    pub fn new(default: TaxRuleSet) -> Result<Self> {
        default.validate()?;
        Ok(Self {
            default,
            overrides: HashMap::new(),
        })
    }

    pub fn insert_override(&mut self, business_id: impl Into<String>, rules: TaxRuleSet) -> Result<()> {
        rules.validate()?;
        self.overrides.insert(business_id.into(), rules);
        Ok(())
    }

    pub fn default_rules(&self) -> &TaxRuleSet {
        &self.default
    }

    pub fn override_for(&self, business_id: &str) -> Option<&TaxRuleSet> {
        self.overrides.get(business_id)
    }

    pub fn rules_for(&self, business_id: &str) -> &TaxRuleSet {
        match self.override_for(business_id) {
            Some(rules) => rules,
            None => &self.default,
        }
    }

    /// Register every valid override found in `path`.  Overrides that
    /// fail validation are skipped with a warning.
    pub fn load_overrides(&mut self, path: &Path) -> anyhow::Result<usize> {
        let mut loaded = 0;
        for entry in load_rule_overrides_from_dir(path)? {
            let business_id = entry.business_id.clone();
            match self.insert_override(entry.business_id, entry.rules) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    tracing::warn!(business_id = %business_id, error = %err, "rejected rule override");
                }
            }
        }
        Ok(loaded)
    }
}

/// Load all rule overrides from a directory.
///
/// Every `.json` file is parsed as a [`RuleOverride`].  Files that do not
/// parse are logged and skipped.  A missing directory yields no
/// overrides.
pub fn load_rule_overrides_from_dir(path: &Path) -> anyhow::Result<Vec<RuleOverride>> {
    let mut overrides = Vec::new();
    if !path.is_dir() {
        tracing::debug!(path = %path.display(), "rule directory not found, using defaults only");
        return Ok(overrides);
    }
    let entries = std::fs::read_dir(path)
        .with_context(|| format!("reading rule directory {}", path.display()))?;
    for entry in entries {
        let entry = entry?;
        let file = entry.path();
        if !entry.file_type()?.is_file() || file.extension().map_or(true, |ext| ext != "json") {
            continue;
        }
        let data = std::fs::read_to_string(&file)
            .with_context(|| format!("reading rule file {}", file.display()))?;
        match serde_json::from_str::<RuleOverride>(&data) {
            Ok(rule) => overrides.push(rule),
            Err(err) => {
                tracing::warn!(file = %file.display(), error = %err, "failed to parse rule file");
            }
        }
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn jamaica_defaults_are_valid() {
        let rules = TaxRuleSet::jamaica(2024);
        assert!(rules.validate().is_ok());
        assert_eq!(rules.personal_allowance, dec!(1500000));
        assert_eq!(rules.paye_brackets.len(), 2);
        assert_eq!(rules.education_tax_rate, dec!(0.025));
        assert_eq!(rules.pension_employee_rate, Decimal::ZERO);
    }

    #[test]
    fn rejects_non_monotonic_thresholds() {
        let mut rules = TaxRuleSet::jamaica(2024);
        rules.paye_brackets = vec![
            PayeBracket::new(dec!(6000000), dec!(0.30)),
            PayeBracket::new(dec!(1500000), dec!(0.25)),
        ];
        assert!(matches!(rules.validate(), Err(PayrollError::Configuration(_))));

        rules.paye_brackets = vec![
            PayeBracket::new(dec!(1500000), dec!(0.25)),
            PayeBracket::new(dec!(1500000), dec!(0.30)),
        ];
        assert!(matches!(rules.validate(), Err(PayrollError::Configuration(_))));
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let rules = TaxRuleSet::jamaica(2024).with_pension(dec!(1.5), dec!(0.05));
        assert!(matches!(rules.validate(), Err(PayrollError::Configuration(_))));

        let mut rules = TaxRuleSet::jamaica(2024);
        rules.nis_rate = dec!(-0.01);
        assert!(matches!(rules.validate(), Err(PayrollError::Configuration(_))));
    }

    #[test]
    fn rejects_negative_allowance() {
        let mut rules = TaxRuleSet::jamaica(2024);
        rules.personal_allowance = dec!(-1);
        assert!(matches!(rules.validate(), Err(PayrollError::Configuration(_))));
    }

    #[test]
    fn rule_book_resolves_override_or_default() {
        let mut book = RuleBook::new(TaxRuleSet::jamaica(2024)).unwrap();
        let mut custom = TaxRuleSet::jamaica(2024);
        custom.personal_allowance = dec!(1700000);
        book.insert_override("biz-1", custom).unwrap();

        assert_eq!(book.rules_for("biz-1").personal_allowance, dec!(1700000));
        assert_eq!(book.rules_for("biz-2").personal_allowance, dec!(1500000));
        assert!(book.override_for("biz-2").is_none());
    }

    #[test]
    fn rule_book_refuses_invalid_override() {
        let mut book = RuleBook::new(TaxRuleSet::jamaica(2024)).unwrap();
        let mut broken = TaxRuleSet::jamaica(2024);
        broken.heart_trust_rate = dec!(3);
        assert!(book.insert_override("biz-1", broken).is_err());
        assert!(book.override_for("biz-1").is_none());
    }

    #[test]
    fn loads_overrides_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut custom = TaxRuleSet::jamaica(2025);
        custom.personal_allowance = dec!(1800000);
        let good = RuleOverride {
            business_id: "biz-7".into(),
            rules: custom,
        };
        std::fs::write(dir.path().join("biz-7.json"), serde_json::to_string(&good).unwrap()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut invalid = TaxRuleSet::jamaica(2025);
        invalid.nis_rate = dec!(2);
        let bad = RuleOverride {
            business_id: "biz-8".into(),
            rules: invalid,
        };
        std::fs::write(dir.path().join("biz-8.json"), serde_json::to_string(&bad).unwrap()).unwrap();

        let mut book = RuleBook::new(TaxRuleSet::jamaica(2025)).unwrap();
        let loaded = book.load_overrides(dir.path()).unwrap();
        assert_eq!(loaded, 1);
        assert_eq!(book.rules_for("biz-7").personal_allowance, dec!(1800000));
        assert!(book.override_for("biz-8").is_none());
    }

    #[test]
    fn missing_directory_yields_no_overrides() {
        let overrides = load_rule_overrides_from_dir(Path::new("/definitely/not/here")).unwrap();
        assert!(overrides.is_empty());
    }
}
