pub mod app;
pub mod cache;
pub mod config;
pub mod controller;
pub mod datastore;
pub mod log;
pub mod model;
pub mod query;
pub mod ui_state;

#[cfg(test)]
mod e2e_tests;
