// Pick legality: pure validation of a proposed pick against roster rules.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::pick::PickRecord;
use crate::protocol::DriverPayload;

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// Money in tenths of a currency unit.
///
/// All budget arithmetic is integer arithmetic on tenths, so repeated
/// validation of the same inputs can never drift the way accumulated floats
/// would.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(u32);

impl Price {
    pub const ZERO: Price = Price(0);

    pub fn from_tenths(tenths: u32) -> Self {
        Price(tenths)
    }

    pub fn tenths(self) -> u32 {
        self.0
    }

    pub fn saturating_sub(self, other: Price) -> Price {
        Price(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Price) -> Price {
        Price(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

// ---------------------------------------------------------------------------
// Limits and derived constraints
// ---------------------------------------------------------------------------

/// League-configured roster limits, identical for every fantasy team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterLimits {
    pub max_drivers: u32,
    pub max_per_constructor: u32,
    pub budget: Price,
}

/// A team's current standing against the limits.
///
/// Never persisted: recomputed from the session pick history plus the driver
/// price list on every validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterConstraint {
    pub max_drivers: u32,
    pub max_per_constructor: u32,
    pub budget_remaining: Price,
    pub drivers_held: u32,
    pub held_per_constructor: HashMap<String, u32>,
}

impl RosterConstraint {
    /// Recompute a team's constraint from the pick history and driver list.
    ///
    /// `drivers` must cover drafted drivers as well as available ones; picks
    /// whose driver is missing from the list still count against the roster
    /// cap but contribute nothing to spend or constructor counts.
    pub fn derive(
        team_id: &str,
        picks: &[PickRecord],
        drivers: &[DriverPayload],
        limits: &RosterLimits,
    ) -> RosterConstraint {
        let mut spent = Price::ZERO;
        let mut drivers_held = 0u32;
        let mut held_per_constructor: HashMap<String, u32> = HashMap::new();

        for pick in picks.iter().filter(|p| p.team_id == team_id) {
            drivers_held += 1;
            match drivers.iter().find(|d| d.driver_id == pick.driver_id) {
                Some(driver) => {
                    spent = spent.saturating_add(driver.price);
                    *held_per_constructor
                        .entry(driver.constructor_id.clone())
                        .or_insert(0) += 1;
                }
                None => {
                    debug!(
                        "pick {} references driver {} missing from the price list",
                        pick.pick_number, pick.driver_id
                    );
                }
            }
        }

        RosterConstraint {
            max_drivers: limits.max_drivers,
            max_per_constructor: limits.max_per_constructor,
            budget_remaining: limits.budget.saturating_sub(spent),
            drivers_held,
            held_per_constructor,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A pick proposed for validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PickRequest {
    pub team_id: String,
    pub driver_id: String,
    pub constructor_id: String,
    pub price: Price,
}

/// One violated roster rule. Violations can co-occur; callers get the full
/// list so the user sees every problem at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RuleViolation {
    DriverUnavailable {
        driver_id: String,
    },
    RosterCapExceeded {
        held: u32,
        max_drivers: u32,
    },
    ConstructorCapExceeded {
        constructor_id: String,
        held: u32,
        max_per_constructor: u32,
    },
    BudgetExceeded {
        price: Price,
        budget_remaining: Price,
    },
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleViolation::DriverUnavailable { driver_id } => {
                write!(f, "driver {driver_id} has already been drafted")
            }
            RuleViolation::RosterCapExceeded { held, max_drivers } => {
                write!(f, "roster is full ({held} of {max_drivers} drivers)")
            }
            RuleViolation::ConstructorCapExceeded {
                constructor_id,
                held,
                max_per_constructor,
            } => write!(
                f,
                "already holding {held} of {max_per_constructor} allowed drivers from {constructor_id}"
            ),
            RuleViolation::BudgetExceeded {
                price,
                budget_remaining,
            } => write!(
                f,
                "price {price} exceeds remaining budget {budget_remaining}"
            ),
        }
    }
}

/// Join a violation list into a single user-facing sentence.
pub fn summarize(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Decide whether a proposed pick is legal.
///
/// Checks run in a fixed order and accumulate every violation instead of
/// short-circuiting. Pure: identical inputs always yield identical output.
pub fn validate(
    request: &PickRequest,
    constraint: &RosterConstraint,
    already_drafted: &HashSet<String>,
) -> Result<(), Vec<RuleViolation>> {
    let mut violations = Vec::new();

    if already_drafted.contains(&request.driver_id) {
        violations.push(RuleViolation::DriverUnavailable {
            driver_id: request.driver_id.clone(),
        });
    }

    if constraint.drivers_held + 1 > constraint.max_drivers {
        violations.push(RuleViolation::RosterCapExceeded {
            held: constraint.drivers_held,
            max_drivers: constraint.max_drivers,
        });
    }

    let held_from_constructor = constraint
        .held_per_constructor
        .get(&request.constructor_id)
        .copied()
        .unwrap_or(0);
    if held_from_constructor + 1 > constraint.max_per_constructor {
        violations.push(RuleViolation::ConstructorCapExceeded {
            constructor_id: request.constructor_id.clone(),
            held: held_from_constructor,
            max_per_constructor: constraint.max_per_constructor,
        });
    }

    if request.price > constraint.budget_remaining {
        violations.push(RuleViolation::BudgetExceeded {
            price: request.price,
            budget_remaining: constraint.budget_remaining,
        });
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn driver(id: &str, constructor: &str, price_tenths: u32) -> DriverPayload {
        DriverPayload {
            driver_id: id.to_string(),
            name: id.to_uppercase(),
            constructor_id: constructor.to_string(),
            price: Price::from_tenths(price_tenths),
            avg_points_tenths: 100,
        }
    }

    fn pick(number: u32, team_id: &str, driver_id: &str) -> PickRecord {
        PickRecord {
            round: (number - 1) / 4 + 1,
            pick_number: number,
            team_id: team_id.to_string(),
            driver_id: driver_id.to_string(),
            is_auto_pick: false,
            created_at: Utc::now(),
        }
    }

    fn limits() -> RosterLimits {
        RosterLimits {
            max_drivers: 5,
            max_per_constructor: 2,
            budget: Price::from_tenths(1000),
        }
    }

    fn open_constraint() -> RosterConstraint {
        RosterConstraint {
            max_drivers: 5,
            max_per_constructor: 2,
            budget_remaining: Price::from_tenths(1000),
            drivers_held: 0,
            held_per_constructor: HashMap::new(),
        }
    }

    fn request(driver_id: &str, constructor: &str, price_tenths: u32) -> PickRequest {
        PickRequest {
            team_id: "team_a".into(),
            driver_id: driver_id.into(),
            constructor_id: constructor.into(),
            price: Price::from_tenths(price_tenths),
        }
    }

    #[test]
    fn price_display_renders_tenths() {
        assert_eq!(Price::from_tenths(75).to_string(), "7.5");
        assert_eq!(Price::from_tenths(50).to_string(), "5.0");
        assert_eq!(Price::ZERO.to_string(), "0.0");
        assert_eq!(Price::from_tenths(1234).to_string(), "123.4");
    }

    #[test]
    fn price_arithmetic_saturates() {
        let five = Price::from_tenths(50);
        let seven_and_half = Price::from_tenths(75);
        assert_eq!(five.saturating_sub(seven_and_half), Price::ZERO);
        assert_eq!(seven_and_half.saturating_sub(five), Price::from_tenths(25));
        assert!(seven_and_half > five);
    }

    #[test]
    fn legal_pick_passes() {
        let result = validate(&request("ver", "redbull", 300), &open_constraint(), &HashSet::new());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn already_drafted_driver_rejected() {
        let drafted: HashSet<String> = ["ver".to_string()].into_iter().collect();
        let result = validate(&request("ver", "redbull", 300), &open_constraint(), &drafted);
        assert_eq!(
            result,
            Err(vec![RuleViolation::DriverUnavailable {
                driver_id: "ver".into()
            }])
        );
    }

    #[test]
    fn full_roster_rejected() {
        let mut constraint = open_constraint();
        constraint.drivers_held = 5;
        let result = validate(&request("ver", "redbull", 300), &constraint, &HashSet::new());
        assert_eq!(
            result,
            Err(vec![RuleViolation::RosterCapExceeded {
                held: 5,
                max_drivers: 5
            }])
        );
    }

    #[test]
    fn constructor_cap_rejected() {
        let mut constraint = open_constraint();
        constraint.drivers_held = 2;
        constraint.held_per_constructor.insert("redbull".into(), 2);
        let result = validate(&request("per", "redbull", 300), &constraint, &HashSet::new());
        assert_eq!(
            result,
            Err(vec![RuleViolation::ConstructorCapExceeded {
                constructor_id: "redbull".into(),
                held: 2,
                max_per_constructor: 2
            }])
        );
    }

    #[test]
    fn budget_exceeded_rejected() {
        let mut constraint = open_constraint();
        constraint.budget_remaining = Price::from_tenths(50);
        let result = validate(&request("ver", "redbull", 75), &constraint, &HashSet::new());
        assert_eq!(
            result,
            Err(vec![RuleViolation::BudgetExceeded {
                price: Price::from_tenths(75),
                budget_remaining: Price::from_tenths(50)
            }])
        );
    }

    #[test]
    fn exact_budget_passes() {
        let mut constraint = open_constraint();
        constraint.budget_remaining = Price::from_tenths(75);
        let result = validate(&request("ver", "redbull", 75), &constraint, &HashSet::new());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn violations_accumulate_in_check_order() {
        let mut constraint = open_constraint();
        constraint.drivers_held = 5;
        constraint.held_per_constructor.insert("redbull".into(), 2);
        constraint.budget_remaining = Price::from_tenths(10);
        let drafted: HashSet<String> = ["ver".to_string()].into_iter().collect();

        let violations = validate(&request("ver", "redbull", 75), &constraint, &drafted)
            .expect_err("every rule should be violated");
        assert_eq!(violations.len(), 4);
        assert!(matches!(violations[0], RuleViolation::DriverUnavailable { .. }));
        assert!(matches!(violations[1], RuleViolation::RosterCapExceeded { .. }));
        assert!(matches!(
            violations[2],
            RuleViolation::ConstructorCapExceeded { .. }
        ));
        assert!(matches!(violations[3], RuleViolation::BudgetExceeded { .. }));
    }

    #[test]
    fn validation_is_idempotent() {
        let mut constraint = open_constraint();
        constraint.budget_remaining = Price::from_tenths(50);
        let drafted: HashSet<String> = ["ham".to_string()].into_iter().collect();
        let req = request("ham", "mercedes", 75);

        let first = validate(&req, &constraint, &drafted);
        let second = validate(&req, &constraint, &drafted);
        assert_eq!(first, second);
    }

    #[test]
    fn derive_computes_spend_and_counts() {
        let drivers = vec![
            driver("ver", "redbull", 300),
            driver("per", "redbull", 200),
            driver("ham", "mercedes", 250),
        ];
        let picks = vec![
            pick(1, "team_a", "ver"),
            pick(2, "team_b", "ham"),
            pick(3, "team_a", "per"),
        ];

        let constraint = RosterConstraint::derive("team_a", &picks, &drivers, &limits());
        assert_eq!(constraint.drivers_held, 2);
        assert_eq!(constraint.budget_remaining, Price::from_tenths(500));
        assert_eq!(constraint.held_per_constructor.get("redbull"), Some(&2));
        assert_eq!(constraint.held_per_constructor.get("mercedes"), None);
    }

    #[test]
    fn derive_counts_unknown_drivers_against_roster_cap() {
        let drivers = vec![driver("ver", "redbull", 300)];
        let picks = vec![pick(1, "team_a", "ver"), pick(2, "team_a", "ghost")];

        let constraint = RosterConstraint::derive("team_a", &picks, &drivers, &limits());
        assert_eq!(constraint.drivers_held, 2);
        // The unknown driver cannot contribute spend without a price.
        assert_eq!(constraint.budget_remaining, Price::from_tenths(700));
    }

    #[test]
    fn summarize_joins_messages() {
        let text = summarize(&[
            RuleViolation::DriverUnavailable {
                driver_id: "ver".into(),
            },
            RuleViolation::BudgetExceeded {
                price: Price::from_tenths(75),
                budget_remaining: Price::from_tenths(50),
            },
        ]);
        assert!(text.contains("already been drafted"));
        assert!(text.contains("7.5"));
        assert!(text.contains("; "));
    }
}
