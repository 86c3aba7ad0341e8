//! Budget User — accounts, profiles and password resets.

pub mod application;
pub mod domain;
