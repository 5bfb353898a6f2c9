//! Pre-commit validation of proposed rakes against the current stores.
//!
//! The fleet and route tables may have moved on since planning (a wagon
//! went to maintenance, a route was blocked). Every proposal is re-checked;
//! a stale one comes back as invalidated with its reasons and is never
//! dropped or confirmed silently.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::constraints::{ActiveConstraints, ConstraintSet};
use crate::evaluator::RouteTable;
use crate::model::{Occupancy, Rake, RakeStatus, Route, Wagon, WagonStatus};

/// A precondition that no longer holds for a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StaleReason {
    #[error("wagon {wagon_id} no longer exists")]
    WagonMissing { wagon_id: String },

    #[error("wagon {wagon_id} is {status:?}, not idle")]
    WagonUnavailable { wagon_id: String, status: WagonStatus },

    #[error("wagon {wagon_id} is listed more than once")]
    WagonRepeated { wagon_id: String },

    #[error("wagon {wagon_id} is already confirmed for rake {rake_id}")]
    WagonClaimed { wagon_id: String, rake_id: String },

    #[error("wagons now carry {capacity}t, below the planned load of {load}t")]
    CapacityShrunk { load: f64, capacity: f64 },

    #[error("route {route_id} no longer exists")]
    RouteMissing { route_id: String },

    #[error("route {route_id} now ends at {destination}")]
    RouteRedirected { route_id: String, destination: String },

    #[error("route {route_id} is blocked")]
    RouteBlocked { route_id: String },

    #[error("route {route_id} is full: {used} of {limit} rakes booked")]
    RouteCapacity { route_id: String, used: u32, limit: u32 },

    #[error("siding is full: {occupied} of {limit} rakes loading")]
    SidingLimit { occupied: u32, limit: u32 },

    #[error("{wagons} wagons, at least {required} required")]
    BelowMinimumSize { wagons: usize, required: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidatedRake {
    pub rake: Rake,
    pub reasons: Vec<StaleReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub confirmed: Vec<Rake>,
    pub invalidated: Vec<InvalidatedRake>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalidated.is_empty()
    }
}

/// Re-checks proposals against current fleet and route state.
///
/// Rakes are confirmed in input order; an earlier confirmed rake takes
/// precedence for shared wagons, route slots and siding slots.
#[instrument(skip_all, fields(rakes = proposed.len(), wagons = current_wagons.len()))]
pub fn validate(
    proposed: &[Rake],
    current_wagons: &[Wagon],
    current_routes: &[Route],
    constraints: &ConstraintSet,
    occupancy: &Occupancy,
) -> ValidationReport {
    let active = constraints.resolve();
    let routes = RouteTable::new(current_routes);
    let mut wagons: BTreeMap<&str, &Wagon> = BTreeMap::new();
    for wagon in current_wagons {
        wagons.entry(wagon.id.as_str()).or_insert(wagon);
    }

    let independent: Vec<Vec<StaleReason>> = proposed
        .par_iter()
        .map(|rake| check_rake(rake, &wagons, &routes, &active))
        .collect();

    let mut report = ValidationReport::default();
    let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
    let mut route_usage = occupancy.route_bookings.clone();

    for (rake, mut reasons) in proposed.iter().zip(independent) {
        for wagon_id in &rake.wagon_ids {
            if let Some(owner) = claimed.get(wagon_id.as_str()) {
                reasons.push(StaleReason::WagonClaimed {
                    wagon_id: wagon_id.clone(),
                    rake_id: owner.to_string(),
                });
            }
        }

        if let Some(route) = routes.get(&rake.route_id) {
            let used = route_usage.get(&route.id).copied().unwrap_or(0);
            let limit = active.route_limit(route.capacity_per_day);
            if used + 1 > limit {
                reasons.push(StaleReason::RouteCapacity {
                    route_id: route.id.clone(),
                    used,
                    limit,
                });
            }
        }

        if let Some(rule) = &active.siding_limit {
            let occupied = occupancy.loading_rakes + report.confirmed.len() as u32;
            if occupied + 1 > rule.value {
                reasons.push(StaleReason::SidingLimit {
                    occupied,
                    limit: rule.value,
                });
            }
        }

        if reasons.is_empty() {
            for wagon_id in &rake.wagon_ids {
                claimed.insert(wagon_id.as_str(), rake.id.as_str());
            }
            *route_usage.entry(rake.route_id.clone()).or_insert(0) += 1;
            let mut confirmed = rake.clone();
            confirmed.status = RakeStatus::Ready;
            report.confirmed.push(confirmed);
        } else {
            debug!(rake = %rake.id, reasons = reasons.len(), "rake invalidated");
            report.invalidated.push(InvalidatedRake {
                rake: rake.clone(),
                reasons,
            });
        }
    }

    info!(
        confirmed = report.confirmed.len(),
        invalidated = report.invalidated.len(),
        "validation finished"
    );
    report
}

/// Checks that only depend on the rake itself and the current snapshot.
fn check_rake(
    rake: &Rake,
    wagons: &BTreeMap<&str, &Wagon>,
    routes: &RouteTable<'_>,
    active: &ActiveConstraints,
) -> Vec<StaleReason> {
    let mut reasons = Vec::new();
    let mut capacity = 0.0;
    let mut seen = BTreeSet::new();

    for wagon_id in &rake.wagon_ids {
        if !seen.insert(wagon_id.as_str()) {
            reasons.push(StaleReason::WagonRepeated {
                wagon_id: wagon_id.clone(),
            });
            continue;
        }
        match wagons.get(wagon_id.as_str()) {
            None => reasons.push(StaleReason::WagonMissing {
                wagon_id: wagon_id.clone(),
            }),
            Some(wagon) => {
                capacity += wagon.capacity;
                if !wagon.is_idle() {
                    reasons.push(StaleReason::WagonUnavailable {
                        wagon_id: wagon_id.clone(),
                        status: wagon.status,
                    });
                }
            }
        }
    }

    if capacity < rake.current_load {
        reasons.push(StaleReason::CapacityShrunk {
            load: rake.current_load,
            capacity,
        });
    }

    match routes.get(&rake.route_id) {
        None => reasons.push(StaleReason::RouteMissing {
            route_id: rake.route_id.clone(),
        }),
        Some(route) => {
            if route.destination != rake.destination {
                reasons.push(StaleReason::RouteRedirected {
                    route_id: route.id.clone(),
                    destination: route.destination.clone(),
                });
            }
            if route.is_blocked {
                reasons.push(StaleReason::RouteBlocked {
                    route_id: route.id.clone(),
                });
            }
        }
    }

    if let Some(rule) = &active.min_rake_size {
        if rake.wagon_ids.len() < rule.value as usize {
            reasons.push(StaleReason::BelowMinimumSize {
                wagons: rake.wagon_ids.len(),
                required: rule.value,
            });
        }
    }

    reasons
}
