//! Seams between the planner and the rest of the plant system.
//!
//! The planner reads a point-in-time view through [`PlanningStore`] and
//! prices rakes through a [`CostModel`]. Committing accepted proposals goes
//! through [`CommitStore`]; the planner itself never writes.

use crate::constraints::ConstraintSet;
use crate::error::PlannerError;
use crate::model::{Occupancy, Order, Rake, Route, Wagon};

/// Prices a rake running on a route.
///
/// Any `Fn(f64, &Route) -> f64` taking the rake's total capacity in tons is
/// a cost model, so alternatives can be swapped in without touching
/// placement.
pub trait CostModel {
    fn rake_cost(&self, total_capacity: f64, route: &Route) -> f64;
}

impl<F> CostModel for F
where
    F: Fn(f64, &Route) -> f64,
{
    fn rake_cost(&self, total_capacity: f64, route: &Route) -> f64 {
        self(total_capacity, route)
    }
}

/// Read side of the order, fleet and route stores.
pub trait PlanningStore {
    fn list_orders(&self) -> Vec<Order>;

    fn list_wagons(&self) -> Vec<Wagon>;

    fn list_idle_wagons(&self) -> Vec<Wagon> {
        self.list_wagons()
            .into_iter()
            .filter(Wagon::is_idle)
            .collect()
    }

    fn list_routes(&self) -> Vec<Route>;

    fn constraints(&self) -> ConstraintSet;

    fn occupancy(&self) -> Occupancy;
}

/// Summary of an accepted commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub rake_ids: Vec<String>,
    pub wagons_loading: usize,
    pub orders_planned: usize,
}

/// Write side: applies confirmed rakes all-or-nothing.
pub trait CommitStore: PlanningStore {
    fn commit(&self, rakes: &[Rake]) -> Result<CommitReceipt, PlannerError>;
}
