//! Budget Plan — monthly plans split into incomes, needs, wants and savings.

pub mod application;
pub mod domain;
