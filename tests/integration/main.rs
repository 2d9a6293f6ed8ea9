//! Integration test suite entry point.

mod analytics_tests;
mod assignment_tests;
mod churn_tests;
mod evaluation_tests;
mod fixture;
mod query_tests;
