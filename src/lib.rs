//! rake-planner core
//!
//! Forms rail rakes for pending steel orders from the idle wagon fleet,
//! under toggleable plant constraints, and re-validates proposals before
//! they are committed.

pub mod constraints;
pub mod cost;
pub mod error;
pub mod evaluator;
pub mod model;
pub mod planner;
pub mod report;
pub mod store;
pub mod traits;
pub mod validator;

pub use constraints::{Constraint, ConstraintKind, ConstraintSet, ConstraintValue, PriorityMode};
pub use cost::DistanceCostModel;
pub use error::PlannerError;
pub use model::{MaterialType, Occupancy, Order, OrderStatus, Priority, Rake, RakeStatus, Route, Snapshot, Wagon, WagonStatus};
pub use planner::{plan, plan_from_store, PlanBudget, PlanOptions, PlanResult, UnplacedReason};
pub use store::MemoryStore;
pub use traits::{CommitReceipt, CommitStore, CostModel, PlanningStore};
pub use validator::{validate, StaleReason, ValidationReport};
