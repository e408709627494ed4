//! SQL validation for two-way templates
//!
//! A two-way template must stay runnable as written: with its markers read
//! as plain comments and its dummy literals in place, the raw text parses as
//! SQL. This crate checks that property and the SQL produced by evaluation.

pub mod validator;

pub use validator::{ParsedSql, SqlValidator, ValidationError};
