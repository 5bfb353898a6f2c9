//! Plant logistics data model.
//!
//! Field names serialize in the dashboard's camelCase shape so snapshots
//! exported from the order, fleet and route stores load unchanged.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::constraints::ConstraintSet;

/// Order priority. Declaration order gives `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialType {
    Coil,
    Plate,
    Billet,
    Slab,
    Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Planned,
    Loading,
    Dispatched,
    Delivered,
}

/// Fleet status. Only `Idle` wagons can be assigned to a new rake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WagonStatus {
    Idle,
    Loading,
    InTransit,
    Maintenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RakeStatus {
    Forming,
    Ready,
}

/// A customer order waiting to be carried to its destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    pub destination: String,
    pub material_type: MaterialType,
    /// Tons.
    pub quantity: f64,
    pub priority: Priority,
    pub status: OrderStatus,
    pub due_date: NaiveDate,
}

impl Order {
    /// A pending coil order due on 2024-10-15.
    pub fn new(id: impl Into<String>, destination: impl Into<String>, quantity: f64, priority: Priority) -> Self {
        Self {
            id: id.into(),
            customer: None,
            destination: destination.into(),
            material_type: MaterialType::Coil,
            quantity,
            priority,
            status: OrderStatus::Pending,
            due_date: default_date(),
        }
    }

    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = date;
        self
    }

    pub fn material(mut self, material: MaterialType) -> Self {
        self.material_type = material;
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wagon {
    pub id: String,
    #[serde(rename = "type")]
    pub wagon_type: String,
    /// Tons.
    pub capacity: f64,
    pub status: WagonStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
}

impl Wagon {
    /// An idle BOXN wagon.
    pub fn new(id: impl Into<String>, capacity: f64) -> Self {
        Self {
            id: id.into(),
            wagon_type: "BOXN".to_string(),
            capacity,
            status: WagonStatus::Idle,
            current_location: None,
        }
    }

    pub fn status(mut self, status: WagonStatus) -> Self {
        self.status = status;
        self
    }

    pub fn wagon_type(mut self, wagon_type: impl Into<String>) -> Self {
        self.wagon_type = wagon_type.into();
        self
    }

    pub fn is_idle(&self) -> bool {
        self.status == WagonStatus::Idle
    }
}

/// A rail corridor from the plant to one destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub destination: String,
    /// Kilometres.
    pub distance: f64,
    /// Hours.
    #[serde(default)]
    pub estimated_time: f64,
    pub cost_per_ton: f64,
    pub is_blocked: bool,
    /// Rakes per day.
    #[serde(rename = "capacity")]
    pub capacity_per_day: u32,
}

impl Route {
    /// An open route of 1000 km at 400 per ton, six rakes a day.
    pub fn new(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            destination: destination.into(),
            distance: 1000.0,
            estimated_time: 20.0,
            cost_per_ton: 400.0,
            is_blocked: false,
            capacity_per_day: 6,
        }
    }

    pub fn distance(mut self, km: f64) -> Self {
        self.distance = km;
        self
    }

    pub fn cost_per_ton(mut self, cost: f64) -> Self {
        self.cost_per_ton = cost;
        self
    }

    pub fn capacity_per_day(mut self, rakes: u32) -> Self {
        self.capacity_per_day = rakes;
        self
    }

    pub fn blocked(mut self) -> Self {
        self.is_blocked = true;
        self
    }
}

/// A proposed train consist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rake {
    pub id: String,
    pub wagon_ids: Vec<String>,
    pub status: RakeStatus,
    pub destination: String,
    pub route_id: String,
    pub dispatch_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_type: Option<MaterialType>,
    pub total_capacity: f64,
    pub current_load: f64,
    pub order_ids: Vec<String>,
    pub estimated_cost: f64,
}

impl Rake {
    pub fn remaining_capacity(&self) -> f64 {
        self.total_capacity - self.current_load
    }

    pub fn utilization(&self) -> f64 {
        if self.total_capacity <= 0.0 {
            return 0.0;
        }
        self.current_load / self.total_capacity
    }
}

/// Siding and route usage already committed outside the planning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    /// Rakes currently forming or loading at the siding.
    #[serde(default)]
    pub loading_rakes: u32,
    /// Rakes already booked per route id on the plan date.
    #[serde(default)]
    pub route_bookings: BTreeMap<String, u32>,
}

impl Occupancy {
    pub fn booked(&self, route_id: &str) -> u32 {
        self.route_bookings.get(route_id).copied().unwrap_or(0)
    }
}

/// Point-in-time view of every store the planner reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub wagons: Vec<Wagon>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub constraints: ConstraintSet,
    #[serde(default)]
    pub occupancy: Occupancy,
}

fn default_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 15).unwrap_or_default()
}
