//! Plan invariants over generated snapshots.

mod fixtures;

use fixtures::*;

use chrono::Days;
use proptest::prelude::*;

use rake_planner::constraints::{ConstraintSet, PriorityMode};
use rake_planner::cost::DistanceCostModel;
use rake_planner::model::{MaterialType, Occupancy, Order, Priority, Route, Wagon, WagonStatus};
use rake_planner::planner::{plan, PlanBudget, PlanOptions, PlanResult, UnplacedReason};
use rake_planner::validator::validate;

const DESTINATIONS: [&str; 4] = ["Mumbai Port", "Chennai Hub", "Kolkata Yard", "Goa Jetty"];
const PRIORITIES: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Critical];
const MATERIALS: [MaterialType; 3] = [MaterialType::Coil, MaterialType::Plate, MaterialType::Billet];
const MODES: [PriorityMode; 3] = [PriorityMode::Strict, PriorityMode::Balanced, PriorityMode::Flexible];

#[derive(Debug, Clone)]
struct Case {
    orders: Vec<Order>,
    wagons: Vec<Wagon>,
    routes: Vec<Route>,
    constraints: ConstraintSet,
    occupancy: Occupancy,
}

fn orders() -> impl Strategy<Value = Vec<Order>> {
    prop::collection::vec((0..4usize, 1.0f64..300.0, 0..4usize, 0..3usize, 0..10u64), 0..15).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (dest, quantity, priority, material, due))| {
                Order::new(format!("ORD-{:03}", i + 1), DESTINATIONS[dest], quantity, PRIORITIES[priority])
                    .material(MATERIALS[material])
                    .due(plan_date() + Days::new(due))
            })
            .collect()
    })
}

fn wagons() -> impl Strategy<Value = Vec<Wagon>> {
    prop::collection::vec((50.0f64..80.0, prop::bool::weighted(0.8)), 0..25).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (capacity, idle))| {
                let wagon = Wagon::new(format!("WGN-{:03}", i + 1), capacity);
                if idle { wagon } else { wagon.status(WagonStatus::InTransit) }
            })
            .collect()
    })
}

fn routes() -> impl Strategy<Value = Vec<Route>> {
    (1..4u32, 1..4u32, any::<bool>()).prop_map(|(mumbai_cap, kolkata_cap, chennai_blocked)| {
        let chennai = Route::new("RT-002", "Chennai Hub").distance(980.0).cost_per_ton(350.0);
        vec![
            Route::new("RT-001", "Mumbai Port")
                .distance(1450.0)
                .cost_per_ton(420.0)
                .capacity_per_day(mumbai_cap),
            if chennai_blocked { chennai.blocked() } else { chennai },
            Route::new("RT-004", "Kolkata Yard")
                .distance(780.0)
                .cost_per_ton(310.0)
                .capacity_per_day(kolkata_cap),
            Route::new("RT-005", "Kolkata Yard").distance(820.0).cost_per_ton(300.0).capacity_per_day(1),
        ]
    })
}

fn constraints() -> impl Strategy<Value = ConstraintSet> {
    (
        0..4u32,
        prop::option::of(1..4u32),
        prop::option::of(1..6u32),
        any::<bool>(),
        0..3usize,
    )
        .prop_map(|(min_size, route_cap, siding, segregate, mode)| {
            let mut set = ConstraintSet::empty().priority(MODES[mode]);
            if min_size > 0 {
                set = set.min_rake_size(min_size);
            }
            if let Some(cap) = route_cap {
                set = set.route_capacity(cap);
            }
            if let Some(limit) = siding {
                set = set.siding_limit(limit);
            }
            if segregate {
                set = set.segregate_materials();
            }
            set
        })
}

fn cases() -> impl Strategy<Value = Case> {
    (orders(), wagons(), routes(), constraints(), 0..3u32, 0..2u32).prop_map(
        |(orders, wagons, routes, constraints, loading_rakes, mumbai_booked)| {
            let mut occupancy = Occupancy {
                loading_rakes,
                ..Default::default()
            };
            occupancy.route_bookings.insert("RT-001".to_string(), mumbai_booked);
            Case {
                orders,
                wagons,
                routes,
                constraints,
                occupancy,
            }
        },
    )
}

fn plan_case(case: &Case, budget: PlanBudget) -> PlanResult {
    plan(
        &case.orders,
        &case.wagons,
        &case.routes,
        &case.constraints,
        &DistanceCostModel::default(),
        PlanOptions {
            budget,
            occupancy: case.occupancy.clone(),
            ..options()
        },
    )
}

/// Strict mode: no rake keeps lower-priority load that a waiting critical
/// order of the same destination could take over.
fn assert_no_critical_left_behind(case: &Case, result: &PlanResult) {
    let segregate = case.constraints.resolve().material_segregation.is_some();
    let waiting: Vec<&Order> = result
        .unplaced_orders
        .iter()
        .filter(|u| u.priority == Priority::Critical)
        .filter(|u| {
            !matches!(
                u.reason,
                UnplacedReason::NotPending
                    | UnplacedReason::InvalidQuantity
                    | UnplacedReason::DuplicateOrder
                    | UnplacedReason::BudgetExceeded
            )
        })
        .filter_map(|u| case.orders.iter().find(|o| o.id == u.order_id))
        .collect();

    for rake in &result.proposed_rakes {
        let carried: Vec<&Order> = rake
            .order_ids
            .iter()
            .filter_map(|id| case.orders.iter().find(|o| &o.id == id))
            .collect();
        let lower_load: f64 = carried
            .iter()
            .filter(|o| o.priority != Priority::Critical)
            .map(|o| o.quantity)
            .sum();
        if lower_load <= 0.0 {
            continue;
        }
        let material = rake.material_type.or_else(|| {
            carried
                .iter()
                .find(|o| o.priority == Priority::Critical)
                .map(|o| o.material_type)
        });
        for critical in &waiting {
            let fits = critical.destination == rake.destination
                && critical.quantity <= rake.remaining_capacity() + lower_load
                && (!segregate || material.is_none_or(|m| m == critical.material_type));
            assert!(!fits, "{} keeps lower-priority load while {} waits", rake.id, critical.id);
        }
    }
}

proptest! {
    #[test]
    fn prop_plans_respect_every_constraint(case in cases()) {
        let result = plan_case(&case, PlanBudget::default());
        assert_plan_invariants(&result, &case.orders, &case.wagons, &case.routes, &case.constraints, &case.occupancy);
    }

    #[test]
    fn prop_strict_mode_never_sacrifices_a_fittable_critical(case in cases()) {
        let strict = Case {
            constraints: case.constraints.clone().priority(PriorityMode::Strict),
            ..case
        };
        let result = plan_case(&strict, PlanBudget::default());
        assert_no_critical_left_behind(&strict, &result);
    }

    #[test]
    fn prop_fresh_plan_validates_clean(case in cases()) {
        let result = plan_case(&case, PlanBudget::default());
        let report = validate(&result.proposed_rakes, &case.wagons, &case.routes, &case.constraints, &case.occupancy);
        prop_assert!(report.is_clean(), "stale reasons on a fresh plan: {:?}", report.invalidated);
        prop_assert_eq!(report.confirmed.len(), result.proposed_rakes.len());
    }

    #[test]
    fn prop_plans_are_reproducible(case in cases()) {
        let first = plan_case(&case, PlanBudget::default());
        let second = plan_case(&case, PlanBudget::default());
        prop_assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&second).unwrap());
    }

    #[test]
    fn prop_budget_bounds_iterations(case in cases(), max in 0..10usize) {
        let result = plan_case(&case, PlanBudget::iterations(max));
        prop_assert!(result.iterations <= max);
        assert_plan_invariants(&result, &case.orders, &case.wagons, &case.routes, &case.constraints, &case.occupancy);
    }
}
