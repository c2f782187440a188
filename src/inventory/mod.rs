//! Stata package inventory reports.

pub mod ado;
