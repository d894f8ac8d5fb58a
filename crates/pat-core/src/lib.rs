//! Core library for `pat` — the Caido project archive tool.
//!
//! Reconciles the project catalog, the project directories and `.tgz`
//! packages, and moves projects between the active and archived states.

pub mod catalog;
pub mod config;
pub mod error;
pub mod naming;
pub mod package;
pub mod project;
pub mod reconcile;
