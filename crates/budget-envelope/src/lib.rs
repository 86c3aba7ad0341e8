//! Budget Envelope — money set aside per purpose, capped by a target.

pub mod application;
pub mod domain;
