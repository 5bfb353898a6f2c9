//! In-memory order, fleet and route store.
//!
//! Readers get owned copies taken under a read lock, so one planning pass
//! always sees a consistent snapshot. `commit` takes the write lock, checks
//! every rake against the current state and applies all of them or none.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use crate::constraints::ConstraintSet;
use crate::error::PlannerError;
use crate::model::{Occupancy, Order, OrderStatus, Rake, Route, Snapshot, Wagon, WagonStatus};
use crate::traits::{CommitReceipt, CommitStore, PlanningStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Snapshot>,
}

impl MemoryStore {
    /// Wraps a snapshot, rejecting duplicate order, wagon or route ids.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, PlannerError> {
        check_unique("order", snapshot.orders.iter().map(|o| o.id.as_str()))?;
        check_unique("wagon", snapshot.wagons.iter().map(|w| w.id.as_str()))?;
        check_unique("route", snapshot.routes.iter().map(|r| r.id.as_str()))?;
        snapshot.constraints.check()?;
        Ok(Self {
            state: RwLock::new(snapshot),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, PlannerError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PlannerError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Copy of the whole current state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.read().clone()
    }

    pub fn to_json_string(&self) -> Result<String, PlannerError> {
        Ok(serde_json::to_string_pretty(&*self.state.read())?)
    }

    /// Applies `update` to one wagon. Returns false when the id is unknown.
    pub fn update_wagon(&self, wagon_id: &str, update: impl FnOnce(&mut Wagon)) -> bool {
        let mut state = self.state.write();
        match state.wagons.iter_mut().find(|w| w.id == wagon_id) {
            Some(wagon) => {
                update(wagon);
                true
            }
            None => false,
        }
    }

    /// Applies `update` to one route. Returns false when the id is unknown.
    pub fn update_route(&self, route_id: &str, update: impl FnOnce(&mut Route)) -> bool {
        let mut state = self.state.write();
        match state.routes.iter_mut().find(|r| r.id == route_id) {
            Some(route) => {
                update(route);
                true
            }
            None => false,
        }
    }

    /// Toggles a constraint by id. Returns false when the id is unknown.
    pub fn set_constraint_enabled(&self, constraint_id: &str, enabled: bool) -> bool {
        self.state.write().constraints.set_enabled(constraint_id, enabled)
    }
}

impl PlanningStore for MemoryStore {
    fn list_orders(&self) -> Vec<Order> {
        self.state.read().orders.clone()
    }

    fn list_wagons(&self) -> Vec<Wagon> {
        self.state.read().wagons.clone()
    }

    fn list_routes(&self) -> Vec<Route> {
        self.state.read().routes.clone()
    }

    fn constraints(&self) -> ConstraintSet {
        self.state.read().constraints.clone()
    }

    fn occupancy(&self) -> Occupancy {
        self.state.read().occupancy.clone()
    }
}

impl CommitStore for MemoryStore {
    #[instrument(skip_all, fields(rakes = rakes.len()))]
    fn commit(&self, rakes: &[Rake]) -> Result<CommitReceipt, PlannerError> {
        let mut state = self.state.write();

        if let Err(err) = check_commit(&state, rakes) {
            warn!(error = %err, "commit rejected");
            return Err(err);
        }

        let wagon_ids: BTreeSet<&str> = rakes
            .iter()
            .flat_map(|r| r.wagon_ids.iter().map(String::as_str))
            .collect();
        let order_ids: BTreeSet<&str> = rakes
            .iter()
            .flat_map(|r| r.order_ids.iter().map(String::as_str))
            .collect();

        for wagon in state.wagons.iter_mut().filter(|w| wagon_ids.contains(w.id.as_str())) {
            wagon.status = WagonStatus::Loading;
        }
        for order in state.orders.iter_mut().filter(|o| order_ids.contains(o.id.as_str())) {
            order.status = OrderStatus::Planned;
        }
        for rake in rakes {
            *state
                .occupancy
                .route_bookings
                .entry(rake.route_id.clone())
                .or_insert(0) += 1;
        }
        state.occupancy.loading_rakes += rakes.len() as u32;

        let receipt = CommitReceipt {
            rake_ids: rakes.iter().map(|r| r.id.clone()).collect(),
            wagons_loading: wagon_ids.len(),
            orders_planned: order_ids.len(),
        };
        info!(
            rakes = receipt.rake_ids.len(),
            wagons = receipt.wagons_loading,
            orders = receipt.orders_planned,
            "committed rakes"
        );
        Ok(receipt)
    }
}

fn check_unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<(), PlannerError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(PlannerError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Checks the whole batch against the current state without changing it.
fn check_commit(state: &Snapshot, rakes: &[Rake]) -> Result<(), PlannerError> {
    let wagons: BTreeMap<&str, &Wagon> = state.wagons.iter().map(|w| (w.id.as_str(), w)).collect();
    let orders: BTreeMap<&str, &Order> = state.orders.iter().map(|o| (o.id.as_str(), o)).collect();
    let routes: BTreeMap<&str, &Route> = state.routes.iter().map(|r| (r.id.as_str(), r)).collect();
    let active = state.constraints.resolve();

    let mut claimed_wagons = BTreeSet::new();
    let mut claimed_orders = BTreeSet::new();
    let mut bookings = state.occupancy.route_bookings.clone();

    for rake in rakes {
        let conflict = |reason: String| PlannerError::CommitConflict {
            rake_id: rake.id.clone(),
            reason,
        };

        for wagon_id in &rake.wagon_ids {
            let wagon = wagons
                .get(wagon_id.as_str())
                .ok_or_else(|| conflict(format!("wagon {wagon_id} does not exist")))?;
            if !wagon.is_idle() {
                return Err(conflict(format!("wagon {wagon_id} is {:?}", wagon.status)));
            }
            if !claimed_wagons.insert(wagon_id.as_str()) {
                return Err(conflict(format!("wagon {wagon_id} appears in two rakes")));
            }
        }

        for order_id in &rake.order_ids {
            let order = orders
                .get(order_id.as_str())
                .ok_or_else(|| conflict(format!("order {order_id} does not exist")))?;
            if order.status != OrderStatus::Pending {
                return Err(conflict(format!("order {order_id} is {:?}", order.status)));
            }
            if !claimed_orders.insert(order_id.as_str()) {
                return Err(conflict(format!("order {order_id} appears in two rakes")));
            }
        }

        let route = routes
            .get(rake.route_id.as_str())
            .ok_or_else(|| PlannerError::UnknownRoute {
                rake_id: rake.id.clone(),
                route_id: rake.route_id.clone(),
            })?;
        if route.is_blocked {
            return Err(conflict(format!("route {} is blocked", route.id)));
        }
        let booked = bookings.entry(route.id.clone()).or_insert(0);
        let limit = active.route_limit(route.capacity_per_day);
        if *booked + 1 > limit {
            return Err(conflict(format!("route {} already has {booked} of {limit} rakes", route.id)));
        }
        *booked += 1;
    }

    if let Some(rule) = &active.siding_limit {
        let occupied = state.occupancy.loading_rakes + rakes.len() as u32;
        if occupied > rule.value {
            let rake_id = rakes.last().map(|r| r.id.clone()).unwrap_or_default();
            return Err(PlannerError::CommitConflict {
                rake_id,
                reason: format!("siding would hold {occupied} rakes, limit {}", rule.value),
            });
        }
    }

    Ok(())
}
