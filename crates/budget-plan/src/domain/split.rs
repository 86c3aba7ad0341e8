//! The 50/30/20 rule.
//!
//! Half of the income goes to needs, 30% to wants and 20% to savings.
//! Needs are split 40/20/40 over three categories, wants and savings 50/50
//! over two each. Work happens in cents; whatever a percentage rounds away
//! is carried by the last entry of its group, so the parts always add up
//! to the total exactly.

use budget_core::money::Amount;
use uuid::Uuid;

use super::events::PlanEntry;

const NEEDS_PERCENT: i64 = 50;
const WANTS_PERCENT: i64 = 30;
const NEEDS_WEIGHTS: [i64; 3] = [40, 20, 40];
const WANTS_WEIGHTS: [i64; 2] = [50, 50];
const SAVINGS_WEIGHTS: [i64; 2] = [50, 50];

/// A category key with the display name to give it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabel {
    /// Stable category key.
    pub category: String,
    /// Display name, already translated by the caller.
    pub name: String,
}

impl CategoryLabel {
    fn new(category: &str, name: &str) -> Self {
        Self {
            category: category.to_owned(),
            name: name.to_owned(),
        }
    }
}

/// Names of the generated entries. Translation is the caller's business;
/// the defaults are English.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabels {
    /// Labels of the three needs.
    pub needs: [CategoryLabel; 3],
    /// Labels of the two wants.
    pub wants: [CategoryLabel; 2],
    /// Labels of the two savings.
    pub savings: [CategoryLabel; 2],
}

impl Default for CategoryLabels {
    fn default() -> Self {
        Self {
            needs: [
                CategoryLabel::new("housing", "Housing"),
                CategoryLabel::new("utilities", "Utilities"),
                CategoryLabel::new("food", "Food"),
            ],
            wants: [
                CategoryLabel::new("leisure", "Leisure"),
                CategoryLabel::new("shopping", "Shopping"),
            ],
            savings: [
                CategoryLabel::new("emergency_fund", "Emergency fund"),
                CategoryLabel::new("retirement", "Retirement"),
            ],
        }
    }
}

/// Entries derived from a total income.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Needs, in label order.
    pub needs: Vec<PlanEntry>,
    /// Wants, in label order.
    pub wants: Vec<PlanEntry>,
    /// Savings, in label order.
    pub savings: Vec<PlanEntry>,
}

/// Splits `total` 50/30/20 and names the parts with `labels`.
#[must_use]
pub fn split_income(total: Amount, labels: &CategoryLabels) -> Split {
    let needs = total.percent(NEEDS_PERCENT);
    let wants = total.percent(WANTS_PERCENT);
    let savings = Amount::from_cents(total.cents() - needs.cents() - wants.cents());
    Split {
        needs: distribute(needs, &NEEDS_WEIGHTS, &labels.needs),
        wants: distribute(wants, &WANTS_WEIGHTS, &labels.wants),
        savings: distribute(savings, &SAVINGS_WEIGHTS, &labels.savings),
    }
}

fn distribute(amount: Amount, weights: &[i64], labels: &[CategoryLabel]) -> Vec<PlanEntry> {
    let mut remaining = amount.cents();
    weights
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (weight, label))| {
            let share = if i + 1 == weights.len() {
                remaining
            } else {
                amount.percent(*weight).cents()
            };
            remaining -= share;
            PlanEntry {
                id: Uuid::new_v4(),
                name: label.name.clone(),
                amount: Amount::from_cents(share),
                category: label.category.clone(),
            }
        })
        .collect()
}
