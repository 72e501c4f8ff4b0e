//! Database module: entity models and SQL repositories.
//!
//! This module is split into two submodules:
//! - `model`: query filters and view models used by repository calls.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `zenbook::db` — we re-export the
//! repository API and the filter types for convenience.

pub mod model;
pub mod repo;

pub use model::{BookingFilter, ClassRequestFilter, PostedTimeFilter};
pub use repo::*;
