//! End-to-end tests running the marpack binary against local fixtures.

#![cfg(unix)]

mod common;
mod names_tests;
mod partials_tests;
mod tools_tests;
