//! Test fixtures for rake-planner.
//!
//! Provides:
//! - The plant dashboard dataset (orders, fleet, routes, constraints)
//! - Small builders for hand-made fleets
//! - A checker for the invariants every plan must hold
#![allow(dead_code, unused_imports)]

pub mod plant;

pub use plant::*;

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing_subscriber::EnvFilter;

use rake_planner::constraints::{ConstraintSet, PriorityMode};
use rake_planner::cost::DistanceCostModel;
use rake_planner::model::{Occupancy, Order, Route, Wagon};
use rake_planner::planner::{plan, PlanOptions, PlanResult};

/// Routes planner logs to the test output. `RUST_LOG=rake_planner=debug`
/// shows placement decisions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn plan_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 9).unwrap()
}

/// Fixed plan date, no time limit.
pub fn options() -> PlanOptions {
    PlanOptions {
        plan_date: plan_date(),
        ..Default::default()
    }
}

pub fn run(orders: &[Order], wagons: &[Wagon], routes: &[Route], constraints: &ConstraintSet) -> PlanResult {
    init_tracing();
    plan(orders, wagons, routes, constraints, &DistanceCostModel::default(), options())
}

/// Idle wagons `WGN-001`, `WGN-002`, ... with the given capacities.
pub fn fleet(capacities: &[f64]) -> Vec<Wagon> {
    capacities
        .iter()
        .enumerate()
        .map(|(i, &capacity)| Wagon::new(format!("WGN-{:03}", i + 1), capacity))
        .collect()
}

pub fn mumbai() -> Route {
    Route::new("RT-001", "Mumbai Port")
}

/// No minimum size, no route cap, no siding limit.
pub fn loose(mode: PriorityMode) -> ConstraintSet {
    ConstraintSet::empty().priority(mode)
}

pub fn placed_ids(result: &PlanResult) -> Vec<&str> {
    result
        .proposed_rakes
        .iter()
        .flat_map(|r| r.order_ids.iter().map(String::as_str))
        .collect()
}

/// Panics when `result` breaks any structural or enabled constraint.
pub fn assert_plan_invariants(
    result: &PlanResult,
    orders: &[Order],
    wagons: &[Wagon],
    routes: &[Route],
    constraints: &ConstraintSet,
    occupancy: &Occupancy,
) {
    let active = constraints.resolve();
    let wagon_by_id: BTreeMap<&str, &Wagon> = wagons.iter().rev().map(|w| (w.id.as_str(), w)).collect();
    let order_by_id: BTreeMap<&str, &Order> = orders.iter().rev().map(|o| (o.id.as_str(), o)).collect();
    let route_by_id: BTreeMap<&str, &Route> = routes.iter().rev().map(|r| (r.id.as_str(), r)).collect();

    let mut used_wagons = BTreeSet::new();
    let mut placed_orders = BTreeSet::new();
    let mut per_route: BTreeMap<&str, u32> = BTreeMap::new();

    for rake in &result.proposed_rakes {
        assert!(!rake.wagon_ids.is_empty(), "{} has no wagons", rake.id);
        assert!(!rake.order_ids.is_empty(), "{} has no orders", rake.id);

        let mut capacity = 0.0;
        for wagon_id in &rake.wagon_ids {
            let wagon = wagon_by_id[wagon_id.as_str()];
            assert!(wagon.is_idle(), "{} uses non-idle wagon {wagon_id}", rake.id);
            assert!(used_wagons.insert(wagon_id.as_str()), "wagon {wagon_id} used twice");
            capacity += wagon.capacity;
        }
        assert!((capacity - rake.total_capacity).abs() < 1e-6);

        let mut load = 0.0;
        let mut materials = BTreeSet::new();
        for order_id in &rake.order_ids {
            let order = order_by_id[order_id.as_str()];
            assert!(placed_orders.insert(order_id.as_str()), "order {order_id} placed twice");
            assert_eq!(order.destination, rake.destination);
            load += order.quantity;
            materials.insert(order.material_type);
        }
        assert!((load - rake.current_load).abs() < 1e-6);
        assert!(rake.current_load <= rake.total_capacity + 1e-6, "{} overloaded", rake.id);

        let route = route_by_id[rake.route_id.as_str()];
        assert!(!route.is_blocked, "{} on blocked route", rake.id);
        assert_eq!(route.destination, rake.destination);
        *per_route.entry(route.id.as_str()).or_insert(0) += 1;

        if let Some(rule) = &active.min_rake_size {
            assert!(rake.wagon_ids.len() >= rule.value as usize, "{} below minimum size", rake.id);
        }
        if active.material_segregation.is_some() {
            assert_eq!(materials.len(), 1, "{} mixes materials", rake.id);
        }
    }

    for (route_id, count) in per_route {
        let route = route_by_id[route_id];
        let limit = active.route_limit(route.capacity_per_day);
        assert!(count + occupancy.booked(route_id) <= limit, "route {route_id} over capacity");
    }

    if let (Some(rule), false) = (&active.siding_limit, result.proposed_rakes.is_empty()) {
        assert!(occupancy.loading_rakes + result.proposed_rakes.len() as u32 <= rule.value);
    }

    // Every order is either placed once or reported once.
    let unplaced: Vec<&str> = result.unplaced_ids();
    for id in &unplaced {
        assert!(!placed_orders.contains(id), "order {id} both placed and unplaced");
    }
    let mut accounted: Vec<&str> = placed_orders.iter().copied().chain(unplaced).collect();
    accounted.sort();
    let mut expected: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
    expected.sort();
    assert_eq!(accounted, expected);
}
