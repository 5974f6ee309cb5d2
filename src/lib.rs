pub mod aggregate;
pub mod builder;
pub mod catalog;
pub mod comparison;
pub mod config;
pub mod db;
pub mod demo;
pub mod error;
pub mod filters;
pub mod fixtures;
pub mod form;
pub mod geography;
pub mod logging;
pub mod models;
pub mod report;

#[cfg(test)]
mod testing;
