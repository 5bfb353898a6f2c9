//! Distance-normalised rake cost (default cost model).
//!
//! `cost = total_capacity × cost_per_ton × (distance / reference_distance)`.
//! A route exactly at the reference distance costs its per-ton rate.

use crate::model::Route;
use crate::traits::CostModel;

/// Reference haul length in kilometres.
const DEFAULT_REFERENCE_DISTANCE_KM: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct DistanceCostModel {
    /// Distance that maps to a factor of 1.0.
    pub reference_distance_km: f64,
}

impl Default for DistanceCostModel {
    fn default() -> Self {
        Self {
            reference_distance_km: DEFAULT_REFERENCE_DISTANCE_KM,
        }
    }
}

impl DistanceCostModel {
    pub fn new(reference_distance_km: f64) -> Self {
        Self {
            reference_distance_km,
        }
    }

    fn distance_factor(&self, route: &Route) -> f64 {
        if self.reference_distance_km <= 0.0 {
            return 1.0;
        }
        route.distance.max(0.0) / self.reference_distance_km
    }
}

impl CostModel for DistanceCostModel {
    fn rake_cost(&self, total_capacity: f64, route: &Route) -> f64 {
        total_capacity * route.cost_per_ton * self.distance_factor(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_distance_costs_per_ton_rate() {
        let model = DistanceCostModel::default();
        let route = Route::new("RT-001", "Mumbai Port").distance(1000.0).cost_per_ton(420.0);
        assert_eq!(model.rake_cost(600.0, &route), 252_000.0);
    }

    #[test]
    fn test_cost_scales_with_distance() {
        let model = DistanceCostModel::default();
        let near = Route::new("RT-004", "Kolkata Yard").distance(500.0).cost_per_ton(300.0);
        let far = Route::new("RT-001", "Mumbai Port").distance(1500.0).cost_per_ton(300.0);
        assert!(model.rake_cost(100.0, &near) < model.rake_cost(100.0, &far));
        assert_eq!(model.rake_cost(100.0, &near), 15_000.0);
    }

    #[test]
    fn test_zero_reference_falls_back_to_flat_rate() {
        let model = DistanceCostModel::new(0.0);
        let route = Route::new("RT-002", "Chennai Hub").distance(980.0).cost_per_ton(350.0);
        assert_eq!(model.rake_cost(10.0, &route), 3500.0);
    }

    #[test]
    fn test_closure_is_a_cost_model() {
        let flat = |capacity: f64, _route: &Route| capacity;
        let route = Route::new("RT-002", "Chennai Hub");
        assert_eq!(flat.rake_cost(120.0, &route), 120.0);
    }
}
