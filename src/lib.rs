//! Wavemap library
//!
//! Territory exploration on a hexagonal grid: trackers report positions,
//! newly visited cells are scored from their visited neighbours, and the
//! accumulated state is served for maps and rankings.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
