//! Planning constraint configuration.
//!
//! Constraints are named, independently toggleable rules in the record shape
//! the constraints page edits: `{id, name, type, value, enabled, description}`.
//! [`ConstraintSet::resolve`] turns the enabled records into typed rules once
//! per planning pass.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PlannerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Minimum wagons per rake.
    RakeSize,
    /// Maximum rakes per route per day.
    RouteCapacity,
    /// Maximum rakes forming or loading at the siding.
    SidingLimit,
    /// One material type per rake.
    MaterialType,
    /// Priority handling mode.
    Priority,
}

impl ConstraintKind {
    fn default_id(self) -> &'static str {
        match self {
            ConstraintKind::RakeSize => "CST-001",
            ConstraintKind::RouteCapacity => "CST-002",
            ConstraintKind::SidingLimit => "CST-003",
            ConstraintKind::Priority => "CST-004",
            ConstraintKind::MaterialType => "CST-005",
        }
    }

    fn default_name(self) -> &'static str {
        match self {
            ConstraintKind::RakeSize => "Minimum Rake Size",
            ConstraintKind::RouteCapacity => "Route Capacity Limit",
            ConstraintKind::SidingLimit => "Siding Loading Capacity",
            ConstraintKind::Priority => "Priority Order First",
            ConstraintKind::MaterialType => "Material Segregation",
        }
    }
}

/// Raw constraint parameter: a count or an enum label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Count(u32),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityMode {
    /// Critical orders must be planned before any other priority level.
    Strict,
    /// Priority ordering without the priority-first rule.
    Balanced,
    /// Cost and packing before priority.
    Flexible,
}

impl PriorityMode {
    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "strict" | "enabled" => Some(PriorityMode::Strict),
            "balanced" => Some(PriorityMode::Balanced),
            "flexible" => Some(PriorityMode::Flexible),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PriorityMode::Strict => "strict",
            PriorityMode::Balanced => "balanced",
            PriorityMode::Flexible => "flexible",
        }
    }
}

impl fmt::Display for PriorityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constraint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    pub value: ConstraintValue,
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

/// An enabled rule with the id of the record it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule<T> {
    pub id: String,
    pub value: T,
}

/// A record whose value does not fit its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintIssue {
    pub constraint_id: String,
    pub detail: String,
}

/// Typed view over the enabled constraints of a set.
///
/// When several enabled records share a type, the first one in list order
/// wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveConstraints {
    pub min_rake_size: Option<Rule<u32>>,
    pub max_rakes_per_route: Option<Rule<u32>>,
    pub siding_limit: Option<Rule<u32>>,
    pub material_segregation: Option<Rule<String>>,
    pub priority: Option<Rule<PriorityMode>>,
    pub issues: Vec<ConstraintIssue>,
}

impl ActiveConstraints {
    /// Mode used for ordering and rake choice. Without an enabled priority
    /// rule the planner behaves as `Balanced`.
    pub fn priority_mode(&self) -> PriorityMode {
        self.priority
            .as_ref()
            .map_or(PriorityMode::Balanced, |rule| rule.value)
    }

    /// Id of the priority-first rule when it is enforced.
    pub fn strict_priority(&self) -> Option<&str> {
        self.priority
            .as_ref()
            .filter(|rule| rule.value == PriorityMode::Strict)
            .map(|rule| rule.id.as_str())
    }

    pub fn min_wagons(&self) -> usize {
        self.min_rake_size
            .as_ref()
            .map_or(1, |rule| (rule.value as usize).max(1))
    }

    /// Effective daily rake limit for a route with its own `capacity_per_day`.
    pub fn route_limit(&self, capacity_per_day: u32) -> u32 {
        match &self.max_rakes_per_route {
            Some(rule) => capacity_per_day.min(rule.value),
            None => capacity_per_day,
        }
    }
}

/// Ordered list of constraint records. Serializes as a plain JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl Default for ConstraintSet {
    /// Plant defaults: 8 wagons minimum, 6 rakes per route per day,
    /// 3 rakes at the siding, strict priority.
    fn default() -> Self {
        Self::empty()
            .min_rake_size(8)
            .route_capacity(6)
            .siding_limit(3)
            .priority(PriorityMode::Strict)
    }
}

impl ConstraintSet {
    pub fn new(constraints: Vec<Constraint>) -> Self {
        Self { constraints }
    }

    /// No constraints at all.
    pub fn empty() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Parses a JSON array of constraint records, rejecting values that do
    /// not match their type.
    pub fn from_json_str(json: &str) -> Result<Self, PlannerError> {
        let set: ConstraintSet = serde_json::from_str(json)?;
        set.check()?;
        Ok(set)
    }

    pub fn check(&self) -> Result<(), PlannerError> {
        match self.resolve().issues.into_iter().next() {
            Some(issue) => Err(PlannerError::InvalidConstraint {
                id: issue.constraint_id,
                reason: issue.detail,
            }),
            None => Ok(()),
        }
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn get(&self, id: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.id == id)
    }

    pub fn enabled_count(&self) -> usize {
        self.constraints.iter().filter(|c| c.enabled).count()
    }

    /// Toggles a constraint by id. Returns false when the id is unknown.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.constraints.iter_mut().find(|c| c.id == id) {
            Some(constraint) => {
                constraint.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn min_rake_size(self, wagons: u32) -> Self {
        self.upsert(ConstraintKind::RakeSize, ConstraintValue::Count(wagons))
    }

    pub fn route_capacity(self, rakes_per_day: u32) -> Self {
        self.upsert(ConstraintKind::RouteCapacity, ConstraintValue::Count(rakes_per_day))
    }

    pub fn siding_limit(self, rakes: u32) -> Self {
        self.upsert(ConstraintKind::SidingLimit, ConstraintValue::Count(rakes))
    }

    pub fn priority(self, mode: PriorityMode) -> Self {
        self.upsert(ConstraintKind::Priority, ConstraintValue::Text(mode.label().to_string()))
    }

    pub fn segregate_materials(self) -> Self {
        self.upsert(ConstraintKind::MaterialType, ConstraintValue::Text("segregate".to_string()))
    }

    /// Disables every record of the given type.
    pub fn disable(mut self, kind: ConstraintKind) -> Self {
        for constraint in self.constraints.iter_mut().filter(|c| c.kind == kind) {
            constraint.enabled = false;
        }
        self
    }

    fn upsert(mut self, kind: ConstraintKind, value: ConstraintValue) -> Self {
        if let Some(existing) = self.constraints.iter_mut().find(|c| c.kind == kind) {
            existing.value = value;
            existing.enabled = true;
        } else {
            self.constraints.push(Constraint {
                id: kind.default_id().to_string(),
                name: kind.default_name().to_string(),
                kind,
                value,
                enabled: true,
                description: String::new(),
            });
        }
        self
    }

    pub fn resolve(&self) -> ActiveConstraints {
        let mut active = ActiveConstraints::default();

        for constraint in self.constraints.iter().filter(|c| c.enabled) {
            let id = constraint.id.clone();
            match (constraint.kind, &constraint.value) {
                (ConstraintKind::RakeSize, ConstraintValue::Count(n)) => {
                    active.min_rake_size.get_or_insert(Rule { id, value: *n });
                }
                (ConstraintKind::RouteCapacity, ConstraintValue::Count(n)) => {
                    active.max_rakes_per_route.get_or_insert(Rule { id, value: *n });
                }
                (ConstraintKind::SidingLimit, ConstraintValue::Count(n)) => {
                    active.siding_limit.get_or_insert(Rule { id, value: *n });
                }
                (ConstraintKind::MaterialType, value) => {
                    let label = match value {
                        ConstraintValue::Text(text) => text.clone(),
                        ConstraintValue::Count(n) => n.to_string(),
                    };
                    active.material_segregation.get_or_insert(Rule { id, value: label });
                }
                (ConstraintKind::Priority, ConstraintValue::Text(label)) => match PriorityMode::parse(label) {
                    Some(mode) => {
                        active.priority.get_or_insert(Rule { id, value: mode });
                    }
                    None => active.issues.push(ConstraintIssue {
                        constraint_id: id,
                        detail: format!("unknown priority mode '{label}'"),
                    }),
                },
                (kind, value) => active.issues.push(ConstraintIssue {
                    constraint_id: id,
                    detail: format!("value {value:?} does not fit constraint type {kind:?}"),
                }),
            }
        }

        active
    }
}
