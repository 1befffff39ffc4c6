//! Payroll Engine library crate.
//!
//! Jamaican statutory payroll: a pure calculator over a configurable
//! [`rules::TaxRuleSet`], the payroll record lifecycle (calculate →
//! approve → mark paid), an in-memory ledger for the surrounding
//! workflow, a parallel batch runner and an HTTP API.  Applications can
//! call [`tax::JamaicaCalculator`] and [`lifecycle::PayrollRecord`]
//! directly or embed the API via [`api::build_router`].

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod models;
pub mod rules;
pub mod tax;
pub mod telemetry;

pub use error::PayrollError;
