//! Constraint evaluation for a single candidate rake.
//!
//! Evaluation is pure: it reads the candidate, the resolved constraints and
//! the route table and reports every violated rule. It never fails.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::constraints::ActiveConstraints;
use crate::model::{MaterialType, Order, Priority, Rake, Route};

/// Id reported for load exceeding wagon capacity.
pub const CAPACITY_RULE: &str = "capacity";
/// Id reported for a missing or blocked route.
pub const ROUTE_RULE: &str = "route";
/// Id reported when an order or route serves another destination.
pub const DESTINATION_RULE: &str = "destination";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ViolationKind {
    CapacityExceeded { load: f64, capacity: f64 },
    DestinationMismatch { item: String, destination: String },
    RouteMissing { route_id: String },
    RouteBlocked { route_id: String },
    RouteCapacity { route_id: String, used: u32, limit: u32 },
    BelowMinimumSize { wagons: usize, required: u32 },
    SidingLimit { occupied: u32, limit: u32 },
    MaterialMixed { materials: Vec<MaterialType> },
    PriorityPrecedence { critical_order: String },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::CapacityExceeded { load, capacity } => {
                write!(f, "load {load}t exceeds wagon capacity {capacity}t")
            }
            ViolationKind::DestinationMismatch { item, destination } => {
                write!(f, "{item} does not serve {destination}")
            }
            ViolationKind::RouteMissing { route_id } => write!(f, "route {route_id} does not exist"),
            ViolationKind::RouteBlocked { route_id } => write!(f, "route {route_id} is blocked"),
            ViolationKind::RouteCapacity { route_id, used, limit } => {
                write!(f, "route {route_id} already carries {used} of {limit} rakes today")
            }
            ViolationKind::BelowMinimumSize { wagons, required } => {
                write!(f, "{wagons} wagons, at least {required} required")
            }
            ViolationKind::SidingLimit { occupied, limit } => {
                write!(f, "siding already holds {occupied} of {limit} loading rakes")
            }
            ViolationKind::MaterialMixed { materials } => {
                write!(f, "rake mixes materials {materials:?}")
            }
            ViolationKind::PriorityPrecedence { critical_order } => {
                write!(f, "critical order {critical_order} still fits this rake")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub constraint_id: String,
    pub kind: ViolationKind,
    pub reason: String,
}

impl Violation {
    fn new(constraint_id: &str, kind: ViolationKind) -> Self {
        Self {
            constraint_id: constraint_id.to_string(),
            reason: kind.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub valid: bool,
    pub violations: Vec<Violation>,
}

impl Evaluation {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
        }
    }

    pub fn violates(&self, constraint_id: &str) -> bool {
        self.violations.iter().any(|v| v.constraint_id == constraint_id)
    }
}

/// Routes indexed by id and by destination.
///
/// Iteration is ordered by id so lookups stay deterministic. A duplicated
/// route id keeps its first record.
#[derive(Debug, Clone, Default)]
pub struct RouteTable<'a> {
    by_id: BTreeMap<&'a str, &'a Route>,
    by_destination: BTreeMap<&'a str, Vec<&'a Route>>,
}

impl<'a> RouteTable<'a> {
    pub fn new(routes: &'a [Route]) -> Self {
        let mut by_id = BTreeMap::new();
        for route in routes {
            by_id.entry(route.id.as_str()).or_insert(route);
        }

        let mut by_destination: BTreeMap<&'a str, Vec<&'a Route>> = BTreeMap::new();
        for route in by_id.values() {
            by_destination
                .entry(route.destination.as_str())
                .or_default()
                .push(*route);
        }

        Self { by_id, by_destination }
    }

    pub fn get(&self, route_id: &str) -> Option<&'a Route> {
        self.by_id.get(route_id).copied()
    }

    /// Every route (blocked or not) ending at `destination`, by id.
    pub fn serving(&self, destination: &str) -> &[&'a Route] {
        self.by_destination
            .get(destination)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// A rake under evaluation, with the shared state it competes for.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'c> {
    pub rake: &'c Rake,
    /// Orders carried by the rake, in `rake.order_ids` order.
    pub orders: &'c [&'c Order],
    /// Rakes already on the rake's route for the day, not counting this one.
    pub route_usage: u32,
    /// Rakes forming or loading at the siding, not counting this one.
    pub siding_occupancy: u32,
    /// Critical orders that were tried and are still unassigned.
    pub waiting_critical: &'c [&'c Order],
}

pub struct Evaluator<'a> {
    constraints: &'a ActiveConstraints,
    routes: &'a RouteTable<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(constraints: &'a ActiveConstraints, routes: &'a RouteTable<'a>) -> Self {
        Self { constraints, routes }
    }

    pub fn evaluate(&self, candidate: &Candidate<'_>) -> Evaluation {
        let rake = candidate.rake;
        let mut violations = Vec::new();

        if rake.current_load > rake.total_capacity {
            violations.push(Violation::new(
                CAPACITY_RULE,
                ViolationKind::CapacityExceeded {
                    load: rake.current_load,
                    capacity: rake.total_capacity,
                },
            ));
        }

        for order in candidate.orders {
            if order.destination != rake.destination {
                violations.push(Violation::new(
                    DESTINATION_RULE,
                    ViolationKind::DestinationMismatch {
                        item: order.id.clone(),
                        destination: rake.destination.clone(),
                    },
                ));
            }
        }

        self.check_route(candidate, &mut violations);

        if let Some(rule) = &self.constraints.min_rake_size {
            if rake.wagon_ids.len() < rule.value as usize {
                violations.push(Violation::new(
                    &rule.id,
                    ViolationKind::BelowMinimumSize {
                        wagons: rake.wagon_ids.len(),
                        required: rule.value,
                    },
                ));
            }
        }

        if let Some(rule) = &self.constraints.siding_limit {
            if candidate.siding_occupancy + 1 > rule.value {
                violations.push(Violation::new(
                    &rule.id,
                    ViolationKind::SidingLimit {
                        occupied: candidate.siding_occupancy,
                        limit: rule.value,
                    },
                ));
            }
        }

        if let Some(rule) = &self.constraints.material_segregation {
            let mut materials: Vec<MaterialType> = candidate.orders.iter().map(|o| o.material_type).collect();
            materials.sort();
            materials.dedup();
            if materials.len() > 1 {
                violations.push(Violation::new(&rule.id, ViolationKind::MaterialMixed { materials }));
            }
        }

        if let Some(rule_id) = self.constraints.strict_priority() {
            if let Some(critical) = self.blocking_critical(candidate) {
                violations.push(Violation::new(
                    rule_id,
                    ViolationKind::PriorityPrecedence {
                        critical_order: critical.id.clone(),
                    },
                ));
            }
        }

        Evaluation::from_violations(violations)
    }

    fn check_route(&self, candidate: &Candidate<'_>, violations: &mut Vec<Violation>) {
        let rake = candidate.rake;
        let Some(route) = self.routes.get(&rake.route_id) else {
            violations.push(Violation::new(
                ROUTE_RULE,
                ViolationKind::RouteMissing {
                    route_id: rake.route_id.clone(),
                },
            ));
            return;
        };

        if route.is_blocked {
            violations.push(Violation::new(
                ROUTE_RULE,
                ViolationKind::RouteBlocked {
                    route_id: route.id.clone(),
                },
            ));
        }

        if route.destination != rake.destination {
            violations.push(Violation::new(
                DESTINATION_RULE,
                ViolationKind::DestinationMismatch {
                    item: route.id.clone(),
                    destination: rake.destination.clone(),
                },
            ));
        }

        let limit = self.constraints.route_limit(route.capacity_per_day);
        if candidate.route_usage + 1 > limit {
            // The route's own daily capacity applies even with the rule off.
            let rule_id = match &self.constraints.max_rakes_per_route {
                Some(rule) if rule.value < route.capacity_per_day => rule.id.as_str(),
                _ => ROUTE_RULE,
            };
            violations.push(Violation::new(
                rule_id,
                ViolationKind::RouteCapacity {
                    route_id: route.id.clone(),
                    used: candidate.route_usage,
                    limit,
                },
            ));
        }
    }

    /// First waiting critical order that would fit if the rake's
    /// non-critical load were taken off.
    fn blocking_critical<'c>(&self, candidate: &Candidate<'c>) -> Option<&'c Order> {
        let non_critical_load: f64 = candidate
            .orders
            .iter()
            .filter(|o| o.priority != Priority::Critical)
            .map(|o| o.quantity)
            .sum();
        if non_critical_load <= 0.0 {
            return None;
        }

        let rake = candidate.rake;
        let reclaimable = rake.remaining_capacity() + non_critical_load;
        let segregate = self.constraints.material_segregation.is_some();
        let material = rake.material_type.or_else(|| {
            candidate
                .orders
                .iter()
                .find(|o| o.priority == Priority::Critical)
                .map(|o| o.material_type)
        });

        candidate.waiting_critical.iter().copied().find(|waiting| {
            waiting.destination == rake.destination
                && waiting.quantity <= reclaimable
                && (!segregate || material.is_none_or(|m| m == waiting.material_type))
        })
    }
}
