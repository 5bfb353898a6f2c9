//! The plant's dashboard dataset: six orders, a 45-wagon fleet, four routes
//! and the default constraint records.

use chrono::NaiveDate;

use rake_planner::constraints::ConstraintSet;
use rake_planner::model::{MaterialType, Order, OrderStatus, Priority, Route, Snapshot, Wagon, WagonStatus};

pub const PLANT_CONSTRAINTS: &str = r#"[
    {"id": "CST-001", "name": "Minimum Rake Size", "type": "rake_size", "value": 8, "enabled": true, "description": "Minimum number of wagons per rake"},
    {"id": "CST-002", "name": "Route Capacity Limit", "type": "route_capacity", "value": 6, "enabled": true, "description": "Maximum rakes per route per day"},
    {"id": "CST-003", "name": "Siding Loading Capacity", "type": "siding_limit", "value": 3, "enabled": true, "description": "Maximum rakes loading simultaneously"},
    {"id": "CST-004", "name": "Priority Order First", "type": "priority", "value": "enabled", "enabled": true, "description": "Critical orders must be planned first"}
]"#;

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn plant_orders() -> Vec<Order> {
    vec![
        Order::new("ORD-001", "Mumbai Port", 450.0, Priority::Critical)
            .customer("Tata Steel Processing")
            .material(MaterialType::Coil)
            .due(ymd(2024, 10, 12)),
        Order::new("ORD-002", "Chennai Hub", 320.0, Priority::High)
            .customer("JSW Steel Ltd")
            .material(MaterialType::Plate)
            .status(OrderStatus::Planned)
            .due(ymd(2024, 10, 15)),
        Order::new("ORD-003", "Delhi NCR", 580.0, Priority::High)
            .customer("SAIL Manufacturing")
            .material(MaterialType::Billet)
            .due(ymd(2024, 10, 14)),
        Order::new("ORD-004", "Kolkata Yard", 280.0, Priority::Medium)
            .customer("Essar Steel")
            .material(MaterialType::Slab)
            .due(ymd(2024, 10, 18)),
        Order::new("ORD-005", "Bangalore Depot", 195.0, Priority::Medium)
            .customer("Jindal Steel")
            .material(MaterialType::Pipe)
            .status(OrderStatus::Loading)
            .due(ymd(2024, 10, 16)),
        Order::new("ORD-006", "Hyderabad Hub", 410.0, Priority::Low)
            .customer("ArcelorMittal")
            .material(MaterialType::Coil)
            .due(ymd(2024, 10, 20)),
    ]
}

/// WGN-001..015 idle, 016..025 loading, 026..040 in transit, 041..045 in
/// maintenance. Capacities cycle 60, 65, 70, 75 tons.
pub fn plant_wagons() -> Vec<Wagon> {
    (0..45)
        .map(|i| {
            let wagon_type = match i % 3 {
                0 => "BOXN",
                1 => "BCNA",
                _ => "BRN",
            };
            let status = match i {
                0..=14 => WagonStatus::Idle,
                15..=24 => WagonStatus::Loading,
                25..=39 => WagonStatus::InTransit,
                _ => WagonStatus::Maintenance,
            };
            Wagon::new(format!("WGN-{:03}", i + 1), 60.0 + (i % 4) as f64 * 5.0)
                .wagon_type(wagon_type)
                .status(status)
        })
        .collect()
}

pub fn plant_routes() -> Vec<Route> {
    vec![
        Route {
            name: "Main Western Corridor".to_string(),
            estimated_time: 28.0,
            ..Route::new("RT-001", "Mumbai Port")
                .distance(1450.0)
                .cost_per_ton(420.0)
                .capacity_per_day(6)
        },
        Route {
            name: "Southern Express".to_string(),
            estimated_time: 20.0,
            ..Route::new("RT-002", "Chennai Hub")
                .distance(980.0)
                .cost_per_ton(350.0)
                .capacity_per_day(8)
        },
        Route {
            name: "Northern Link".to_string(),
            estimated_time: 24.0,
            ..Route::new("RT-003", "Delhi NCR")
                .distance(1200.0)
                .cost_per_ton(390.0)
                .capacity_per_day(5)
                .blocked()
        },
        Route {
            name: "Eastern Route".to_string(),
            estimated_time: 16.0,
            ..Route::new("RT-004", "Kolkata Yard")
                .distance(780.0)
                .cost_per_ton(310.0)
                .capacity_per_day(7)
        },
    ]
}

pub fn plant_constraints() -> ConstraintSet {
    ConstraintSet::from_json_str(PLANT_CONSTRAINTS).unwrap()
}

pub fn plant_snapshot() -> Snapshot {
    Snapshot {
        orders: plant_orders(),
        wagons: plant_wagons(),
        routes: plant_routes(),
        constraints: plant_constraints(),
        occupancy: Default::default(),
    }
}
