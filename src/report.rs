//! Plan KPIs for the dashboard cards.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Priority, Rake};
use crate::planner::UnplacedOrder;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub rakes: usize,
    pub wagons_assigned: usize,
    pub idle_wagons_remaining: usize,
    /// Tons.
    pub tons_planned: f64,
    /// Tons.
    pub total_capacity: f64,
    /// Planned load over assigned capacity, 0–100.
    pub utilization_pct: f64,
    pub total_estimated_cost: f64,
    pub unplaced_by_priority: BTreeMap<Priority, usize>,
}

impl PlanSummary {
    pub fn from_plan(rakes: &[Rake], unplaced: &[UnplacedOrder], idle_wagons_remaining: usize) -> Self {
        let tons_planned: f64 = rakes.iter().map(|r| r.current_load).sum();
        let total_capacity: f64 = rakes.iter().map(|r| r.total_capacity).sum();
        let utilization_pct = if total_capacity > 0.0 {
            tons_planned / total_capacity * 100.0
        } else {
            0.0
        };

        let mut unplaced_by_priority = BTreeMap::new();
        for order in unplaced {
            *unplaced_by_priority.entry(order.priority).or_insert(0) += 1;
        }

        Self {
            rakes: rakes.len(),
            wagons_assigned: rakes.iter().map(|r| r.wagon_ids.len()).sum(),
            idle_wagons_remaining,
            tons_planned,
            total_capacity,
            utilization_pct,
            total_estimated_cost: rakes.iter().map(|r| r.estimated_cost).sum(),
            unplaced_by_priority,
        }
    }
}
