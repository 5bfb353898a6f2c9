//! Rake formation planner (greedy construction with local repair).
//!
//! Orders are taken in priority order and placed into forming rakes heading
//! to the same destination, opening a new rake when none has room. Every
//! placement is checked by the [`Evaluator`]; a violation is repaired by
//! evicting the least valuable orders of that rake or the placement is rolled
//! back. Evicted and deferred orders are retried in later passes. A bounded
//! improvement phase dissolves rakes whose orders fit elsewhere and trims
//! surplus wagons.
//!
//! The pass is deterministic: inputs are sorted with full tie-breaks and
//! only ordered collections are iterated.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::constraints::{ActiveConstraints, ConstraintIssue, ConstraintSet, PriorityMode};
use crate::evaluator::{Candidate, Evaluation, Evaluator, RouteTable, Violation, ViolationKind};
use crate::model::{MaterialType, Occupancy, Order, OrderStatus, Priority, Rake, RakeStatus, Route, Wagon};
use crate::report::PlanSummary;
use crate::traits::{CostModel, PlanningStore};

/// Caps on the work a planning pass may do.
#[derive(Debug, Clone, Default)]
pub struct PlanBudget {
    /// Maximum placement attempts across all passes.
    pub max_iterations: Option<usize>,
    /// Wall-clock limit. Results are only reproducible without it.
    pub time_limit: Option<Duration>,
}

impl PlanBudget {
    pub fn iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations: Some(max_iterations),
            time_limit: None,
        }
    }

    fn exhausted(&self, iterations: usize, started: Instant) -> bool {
        if self.max_iterations.is_some_and(|max| iterations >= max) {
            return true;
        }
        self.time_limit.is_some_and(|limit| started.elapsed() >= limit)
    }
}

#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Day the rakes are planned for; route capacity is per route per day.
    pub plan_date: NaiveDate,
    pub budget: PlanBudget,
    /// Siding and route usage already committed for `plan_date`.
    pub occupancy: Occupancy,
    /// Proposals are numbered `{prefix}-001`, `{prefix}-002`, ...
    pub rake_id_prefix: String,
    /// Rounds of dissolve/trim improvement after construction.
    pub improvement_iterations: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            plan_date: Utc::now().date_naive(),
            budget: PlanBudget::default(),
            occupancy: Occupancy::default(),
            rake_id_prefix: "RK".to_string(),
            improvement_iterations: 10,
        }
    }
}

/// Why an order was left out of every rake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnplacedReason {
    NotPending,
    InvalidQuantity,
    DuplicateOrder,
    NoRoute,
    RouteBlocked,
    RouteCapacity,
    SidingLimit,
    InsufficientWagons,
    /// Held back while a critical order could still use the capacity.
    PriorityHeld,
    ConstraintViolation(String),
    /// The pass stopped before this order was tried.
    BudgetExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnplacedOrder {
    pub order_id: String,
    pub priority: Priority,
    pub reason: UnplacedReason,
}

/// Rejected placements grouped by the rule that rejected them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolatedConstraint {
    pub constraint_id: String,
    pub occurrences: usize,
    pub order_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostic {
    /// The configuration cannot be met by the supplied snapshot.
    InfeasibleInput { detail: String },
    InvalidConstraint { constraint_id: String, detail: String },
    DuplicateWagon { wagon_id: String },
    BudgetExceeded { processed: usize, remaining: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub proposed_rakes: Vec<Rake>,
    pub unplaced_orders: Vec<UnplacedOrder>,
    pub violated_constraints: Vec<ViolatedConstraint>,
    pub diagnostics: Vec<Diagnostic>,
    pub summary: PlanSummary,
    pub iterations: usize,
}

impl PlanResult {
    pub fn unplaced_ids(&self) -> Vec<&str> {
        self.unplaced_orders.iter().map(|u| u.order_id.as_str()).collect()
    }

    pub fn unplaced_reason(&self, order_id: &str) -> Option<&UnplacedReason> {
        self.unplaced_orders
            .iter()
            .find(|u| u.order_id == order_id)
            .map(|u| &u.reason)
    }

    pub fn rake_for_order(&self, order_id: &str) -> Option<&Rake> {
        self.proposed_rakes
            .iter()
            .find(|rake| rake.order_ids.iter().any(|id| id == order_id))
    }

    pub fn budget_exceeded(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::BudgetExceeded { .. }))
    }
}

/// Plans rakes from a consistent snapshot of the stores.
///
/// Never fails: orders that cannot be placed are reported with a reason,
/// configuration problems as diagnostics.
#[instrument(skip_all, fields(
    orders = orders.len(),
    wagons = wagons.len(),
    routes = routes.len(),
    plan_date = %options.plan_date
))]
pub fn plan<C>(
    orders: &[Order],
    wagons: &[Wagon],
    routes: &[Route],
    constraints: &ConstraintSet,
    cost_model: &C,
    options: PlanOptions,
) -> PlanResult
where
    C: CostModel,
{
    let active = constraints.resolve();
    let table = RouteTable::new(routes);
    let mut pass = Pass::new(&active, &table, cost_model, &options);

    for issue in &active.issues {
        warn!(constraint = %issue.constraint_id, detail = %issue.detail, "ignoring invalid constraint");
        pass.diagnostics.push(invalid_constraint(issue));
    }

    pass.load_wagons(wagons);
    let queue = pass.screen_orders(orders);
    pass.check_feasibility(&queue);

    let mut deferred = pass.run_passes(queue);
    for _ in 0..options.improvement_iterations {
        if !pass.improve() {
            break;
        }
        if deferred.is_empty() || pass.budget_hit {
            continue;
        }
        let retry = deferred.into_iter().map(|d| d.order).collect();
        deferred = pass.run_passes(retry);
    }

    pass.finish(orders, deferred)
}

/// Plans from the current contents of a store.
pub fn plan_from_store<S, C>(store: &S, cost_model: &C, mut options: PlanOptions) -> PlanResult
where
    S: PlanningStore,
    C: CostModel,
{
    let orders = store.list_orders();
    let wagons = store.list_idle_wagons();
    let routes = store.list_routes();
    let constraints = store.constraints();
    options.occupancy = store.occupancy();
    plan(&orders, &wagons, &routes, &constraints, cost_model, options)
}

fn invalid_constraint(issue: &ConstraintIssue) -> Diagnostic {
    Diagnostic::InvalidConstraint {
        constraint_id: issue.constraint_id.clone(),
        detail: issue.detail.clone(),
    }
}

/// Placement order for a priority mode.
fn placement_order(mode: PriorityMode, a: &Order, b: &Order) -> Ordering {
    let by_priority = || {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.due_date.cmp(&b.due_date))
            .then_with(|| b.quantity.total_cmp(&a.quantity))
    };
    let ordering = match mode {
        PriorityMode::Strict | PriorityMode::Balanced => by_priority(),
        PriorityMode::Flexible => b.quantity.total_cmp(&a.quantity).then_with(by_priority),
    };
    ordering.then_with(|| a.id.cmp(&b.id))
}

/// Lower keys are less valuable: lowest priority, then latest due date.
fn value_key(order: &Order) -> (Priority, Reverse<NaiveDate>, Reverse<&str>) {
    (order.priority, Reverse(order.due_date), Reverse(order.id.as_str()))
}

fn by_capacity_desc(a: &&Wagon, b: &&Wagon) -> Ordering {
    b.capacity.total_cmp(&a.capacity).then_with(|| a.id.cmp(&b.id))
}

/// Picks wagons from `pool` (sorted by capacity, largest first) for a rake
/// carrying `quantity` tons with at least `min_count` wagons.
///
/// Uses the fewest wagons that can carry the load, raised to `min_count`,
/// and of that size the smallest combination that still covers the load.
/// Returns pool indices in ascending order.
fn select_wagons(pool: &[&Wagon], quantity: f64, min_count: usize) -> Option<Vec<usize>> {
    let mut covered = 0.0;
    let mut fewest = None;
    for (i, wagon) in pool.iter().enumerate() {
        covered += wagon.capacity;
        if covered >= quantity {
            fewest = Some(i + 1);
            break;
        }
    }

    let count = fewest?.max(min_count);
    if count > pool.len() {
        return None;
    }

    // Start from the `count` smallest wagons and swap the smallest pick for
    // the largest free wagon until the load is covered.
    let len = pool.len();
    let max_swaps = count.min(len - count);
    for swaps in 0..=max_swaps {
        let picks: Vec<usize> = (0..swaps).chain((len - count)..(len - swaps)).collect();
        let total: f64 = picks.iter().map(|&i| pool[i].capacity).sum();
        if total >= quantity {
            return Some(picks);
        }
    }
    Some((0..count).collect())
}

/// A rake under construction.
struct Forming<'a> {
    id: String,
    route: &'a Route,
    material: Option<MaterialType>,
    wagons: Vec<&'a Wagon>,
    orders: Vec<&'a Order>,
}

impl<'a> Forming<'a> {
    fn capacity(&self) -> f64 {
        self.wagons.iter().map(|w| w.capacity).sum()
    }

    fn load(&self) -> f64 {
        self.orders.iter().map(|o| o.quantity).sum()
    }

    fn remaining(&self) -> f64 {
        self.capacity() - self.load()
    }

    fn accepts(&self, order: &Order) -> bool {
        order.destination == self.route.destination
            && self.material.is_none_or(|m| m == order.material_type)
    }

    /// Load held by orders less valuable than `order`.
    fn displaceable_load(&self, order: &Order) -> f64 {
        let key = value_key(order);
        self.orders
            .iter()
            .filter(|o| value_key(o) < key)
            .map(|o| o.quantity)
            .sum()
    }

    fn to_rake<C: CostModel>(&self, plan_date: NaiveDate, status: RakeStatus, cost_model: &C) -> Rake {
        let total_capacity = self.capacity();
        Rake {
            id: self.id.clone(),
            wagon_ids: self.wagons.iter().map(|w| w.id.clone()).collect(),
            status,
            destination: self.route.destination.clone(),
            route_id: self.route.id.clone(),
            dispatch_date: plan_date,
            material_type: self.material,
            total_capacity,
            current_load: self.load(),
            order_ids: self.orders.iter().map(|o| o.id.clone()).collect(),
            estimated_cost: cost_model.rake_cost(total_capacity, self.route),
        }
    }
}

struct Deferred<'a> {
    order: &'a Order,
    reason: UnplacedReason,
}

struct Pass<'p, 'a, C> {
    active: &'p ActiveConstraints,
    routes: &'p RouteTable<'a>,
    cost_model: &'p C,
    options: &'p PlanOptions,
    started: Instant,
    pool: Vec<&'a Wagon>,
    rakes: Vec<Forming<'a>>,
    route_usage: BTreeMap<String, u32>,
    unplaced: Vec<(&'a Order, UnplacedReason)>,
    rejections: BTreeMap<String, BTreeSet<String>>,
    rejection_counts: BTreeMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
    iterations: usize,
    next_seq: usize,
    budget_hit: bool,
}

impl<'p, 'a, C> Pass<'p, 'a, C>
where
    C: CostModel,
{
    fn new(
        active: &'p ActiveConstraints,
        routes: &'p RouteTable<'a>,
        cost_model: &'p C,
        options: &'p PlanOptions,
    ) -> Self {
        Self {
            active,
            routes,
            cost_model,
            options,
            started: Instant::now(),
            pool: Vec::new(),
            rakes: Vec::new(),
            route_usage: options.occupancy.route_bookings.clone(),
            unplaced: Vec::new(),
            rejections: BTreeMap::new(),
            rejection_counts: BTreeMap::new(),
            diagnostics: Vec::new(),
            iterations: 0,
            next_seq: 0,
            budget_hit: false,
        }
    }

    fn load_wagons(&mut self, wagons: &'a [Wagon]) {
        let mut seen = BTreeSet::new();
        for wagon in wagons {
            if !seen.insert(wagon.id.as_str()) {
                self.diagnostics.push(Diagnostic::DuplicateWagon {
                    wagon_id: wagon.id.clone(),
                });
                continue;
            }
            if wagon.is_idle() && wagon.capacity > 0.0 {
                self.pool.push(wagon);
            }
        }
        self.pool.sort_by(by_capacity_desc);
    }

    /// Splits off orders that cannot enter planning and sorts the rest.
    fn screen_orders(&mut self, orders: &'a [Order]) -> Vec<&'a Order> {
        let mut seen = BTreeSet::new();
        let mut queue = Vec::new();
        for order in orders {
            if !seen.insert(order.id.as_str()) {
                self.unplaced.push((order, UnplacedReason::DuplicateOrder));
            } else if order.status != OrderStatus::Pending {
                self.unplaced.push((order, UnplacedReason::NotPending));
            } else if !(order.quantity.is_finite() && order.quantity > 0.0) {
                self.unplaced.push((order, UnplacedReason::InvalidQuantity));
            } else {
                queue.push(order);
            }
        }
        let mode = self.active.priority_mode();
        queue.sort_by(|a, b| placement_order(mode, a, b));
        queue
    }

    fn check_feasibility(&mut self, queue: &[&'a Order]) {
        if queue.is_empty() {
            return;
        }

        let min_wagons = self.active.min_wagons();
        if min_wagons > self.pool.len() {
            let detail = format!(
                "minimum rake size {min_wagons} exceeds the {} idle wagons",
                self.pool.len()
            );
            warn!(%detail, "infeasible input");
            self.diagnostics.push(Diagnostic::InfeasibleInput { detail });
        }

        let destinations: BTreeSet<&str> = queue.iter().map(|o| o.destination.as_str()).collect();
        for destination in destinations {
            if self.routes.serving(destination).iter().all(|r| r.is_blocked) {
                let detail = format!("no open route serves {destination}");
                warn!(%detail, "infeasible input");
                self.diagnostics.push(Diagnostic::InfeasibleInput { detail });
            }
        }
    }

    /// Runs placement passes until one places nothing. Returns the orders
    /// still unassigned with their last reason.
    fn run_passes(&mut self, mut queue: Vec<&'a Order>) -> Vec<Deferred<'a>> {
        let mode = self.active.priority_mode();
        let mut deferred: Vec<Deferred<'a>> = Vec::new();

        while !queue.is_empty() {
            let mut placed_any = false;
            let mut evicted: Vec<&'a Order> = Vec::new();
            deferred.clear();

            for (position, &order) in queue.iter().enumerate() {
                if self.options.budget.exhausted(self.iterations, self.started) {
                    self.stop_for_budget(&queue[position..], &evicted, &mut deferred);
                    return deferred;
                }
                self.iterations += 1;

                let waiting = waiting_critical(&deferred, &evicted);
                match self.place(order, &waiting) {
                    Ok(mut displaced) => {
                        placed_any = true;
                        evicted.append(&mut displaced);
                    }
                    Err(reason) => {
                        debug!(order = %order.id, priority = %order.priority, ?reason, "order deferred");
                        deferred.push(Deferred { order, reason });
                    }
                }
            }

            if !placed_any && evicted.is_empty() {
                break;
            }

            queue = deferred
                .iter()
                .map(|d| d.order)
                .chain(evicted)
                .collect();
            queue.sort_by(|a, b| placement_order(mode, a, b));
        }

        deferred
    }

    fn stop_for_budget(&mut self, rest: &[&'a Order], evicted: &[&'a Order], deferred: &mut Vec<Deferred<'a>>) {
        let remaining = rest.len() + evicted.len();
        warn!(processed = self.iterations, remaining, "planning budget exhausted");
        self.budget_hit = true;
        self.diagnostics.push(Diagnostic::BudgetExceeded {
            processed: self.iterations,
            remaining,
        });
        for &order in rest.iter().chain(evicted) {
            deferred.push(Deferred {
                order,
                reason: UnplacedReason::BudgetExceeded,
            });
        }
    }

    /// Places one order. On success returns orders evicted to make room.
    fn place(&mut self, order: &'a Order, waiting: &[&'a Order]) -> Result<Vec<&'a Order>, UnplacedReason> {
        let strict = self.active.strict_priority().is_some();
        let preempt = strict && order.priority == Priority::Critical;

        let mut direct: Vec<usize> = Vec::new();
        let mut displacing: Vec<usize> = Vec::new();
        for (index, rake) in self.rakes.iter().enumerate() {
            if !rake.accepts(order) {
                continue;
            }
            let remaining = rake.remaining();
            if remaining >= order.quantity {
                direct.push(index);
            } else if preempt && remaining + rake.displaceable_load(order) >= order.quantity {
                displacing.push(index);
            }
        }

        if self.active.priority_mode() == PriorityMode::Flexible {
            // Best fit: tightest remaining capacity first.
            direct.sort_by(|&a, &b| {
                self.rakes[a]
                    .remaining()
                    .total_cmp(&self.rakes[b].remaining())
                    .then_with(|| a.cmp(&b))
            });
        }

        let mut last_reason = None;
        for index in direct.into_iter().chain(displacing) {
            match self.try_join(index, order, waiting) {
                Ok(evicted) => return Ok(evicted),
                Err(reason) => last_reason = Some(reason),
            }
        }

        match self.try_open(order, waiting) {
            Ok(()) => Ok(Vec::new()),
            Err(reason) => Err(match (reason, last_reason) {
                (UnplacedReason::InsufficientWagons, Some(joined)) => joined,
                (reason, _) => reason,
            }),
        }
    }

    fn try_join(&mut self, index: usize, order: &'a Order, waiting: &[&'a Order]) -> Result<Vec<&'a Order>, UnplacedReason> {
        self.rakes[index].orders.push(order);
        // (slot, order) in removal order so a rollback can restore the rake.
        let mut evicted: Vec<(usize, &'a Order)> = Vec::new();

        loop {
            let evaluation = self.evaluate(index, waiting);
            if evaluation.valid {
                if !evicted.is_empty() {
                    debug!(
                        order = %order.id,
                        rake = %self.rakes[index].id,
                        evicted = evicted.len(),
                        "repaired placement by eviction"
                    );
                }
                debug!(
                    order = %order.id,
                    priority = %order.priority,
                    rake = %self.rakes[index].id,
                    "order joined rake"
                );
                return Ok(evicted.into_iter().map(|(_, o)| o).collect());
            }

            let rake = &mut self.rakes[index];
            let least = rake
                .orders
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| value_key(a).cmp(&value_key(b)))
                .map(|(i, _)| i);

            match least {
                Some(i) if rake.orders[i].id != order.id => {
                    evicted.push((i, rake.orders.remove(i)));
                }
                _ => {
                    rake.orders.pop();
                    for (slot, restored) in evicted.into_iter().rev() {
                        rake.orders.insert(slot, restored);
                    }
                    self.record_rejection(order, &evaluation);
                    return Err(reason_for(&evaluation));
                }
            }
        }
    }

    fn try_open(&mut self, order: &'a Order, waiting: &[&'a Order]) -> Result<(), UnplacedReason> {
        let serving = self.routes.serving(&order.destination);
        if serving.is_empty() {
            return Err(UnplacedReason::NoRoute);
        }
        let open: Vec<&'a Route> = serving.iter().copied().filter(|r| !r.is_blocked).collect();
        if open.is_empty() {
            return Err(UnplacedReason::RouteBlocked);
        }

        let picks = select_wagons(&self.pool, order.quantity, self.active.min_wagons())
            .ok_or(UnplacedReason::InsufficientWagons)?;
        let capacity: f64 = picks.iter().map(|&i| self.pool[i].capacity).sum();

        let route = open
            .into_iter()
            .filter(|r| self.usage(&r.id) < self.active.route_limit(r.capacity_per_day))
            .map(|r| (self.cost_model.rake_cost(capacity, r), r))
            .min_by(|(ca, ra), (cb, rb)| ca.total_cmp(cb).then_with(|| ra.id.cmp(&rb.id)))
            .map(|(_, r)| r)
            .ok_or(UnplacedReason::RouteCapacity)?;

        if let Some(rule) = &self.active.siding_limit {
            if self.siding_occupancy() + 1 > rule.value {
                return Err(UnplacedReason::SidingLimit);
            }
        }

        let mut wagons = Vec::with_capacity(picks.len());
        for &i in picks.iter().rev() {
            wagons.push(self.pool.remove(i));
        }
        wagons.sort_by(by_capacity_desc);

        self.next_seq += 1;
        let material = self
            .active
            .material_segregation
            .as_ref()
            .map(|_| order.material_type);
        self.rakes.push(Forming {
            id: format!("{}-{:03}", self.options.rake_id_prefix, self.next_seq),
            route,
            material,
            wagons,
            orders: vec![order],
        });
        *self.route_usage.entry(route.id.clone()).or_insert(0) += 1;

        let index = self.rakes.len() - 1;
        let evaluation = self.evaluate(index, waiting);
        if evaluation.valid {
            debug!(order = %order.id, rake = %self.rakes[index].id, route = %route.id, "opened rake");
            return Ok(());
        }

        self.dissolve(index);
        self.record_rejection(order, &evaluation);
        Err(reason_for(&evaluation))
    }

    /// Removes a rake, returning its wagons and route slot. Its orders are
    /// dropped; callers decide what happens to them.
    fn dissolve(&mut self, index: usize) -> Forming<'a> {
        let rake = self.rakes.remove(index);
        if let Some(used) = self.route_usage.get_mut(&rake.route.id) {
            *used = used.saturating_sub(1);
        }
        self.pool.extend(rake.wagons.iter().copied());
        self.pool.sort_by(by_capacity_desc);
        rake
    }

    fn usage(&self, route_id: &str) -> u32 {
        self.route_usage.get(route_id).copied().unwrap_or(0)
    }

    fn siding_occupancy(&self) -> u32 {
        self.options.occupancy.loading_rakes + self.rakes.len() as u32
    }

    fn evaluate(&self, index: usize, waiting: &[&'a Order]) -> Evaluation {
        let forming = &self.rakes[index];
        let rake = forming.to_rake(self.options.plan_date, RakeStatus::Forming, self.cost_model);
        let candidate = Candidate {
            rake: &rake,
            orders: &forming.orders,
            route_usage: self.usage(&forming.route.id).saturating_sub(1),
            siding_occupancy: self.siding_occupancy().saturating_sub(1),
            waiting_critical: waiting,
        };
        Evaluator::new(self.active, self.routes).evaluate(&candidate)
    }

    fn record_rejection(&mut self, order: &Order, evaluation: &Evaluation) {
        for violation in &evaluation.violations {
            *self
                .rejection_counts
                .entry(violation.constraint_id.clone())
                .or_insert(0) += 1;
            self.rejections
                .entry(violation.constraint_id.clone())
                .or_default()
                .insert(order.id.clone());
        }
    }

    /// One improvement round. Returns true when anything changed.
    fn improve(&mut self) -> bool {
        let dissolved = self.relocate_and_dissolve();
        let trimmed = self.trim_wagons();
        dissolved || trimmed
    }

    /// Moves every order of one rake into other rakes with room, then
    /// drops the emptied rake. Tries the most recently opened rakes first.
    fn relocate_and_dissolve(&mut self) -> bool {
        for source in (0..self.rakes.len()).rev() {
            let mut free: Vec<f64> = self.rakes.iter().map(Forming::remaining).collect();
            let mut moves: Vec<(usize, usize)> = Vec::new();

            let fits_all = self.rakes[source].orders.iter().enumerate().all(|(slot, order)| {
                let target = (0..self.rakes.len()).find(|&t| {
                    t != source && self.rakes[t].accepts(order) && free[t] >= order.quantity
                });
                match target {
                    Some(t) => {
                        free[t] -= order.quantity;
                        moves.push((slot, t));
                        true
                    }
                    None => false,
                }
            });

            if !fits_all || moves.is_empty() {
                continue;
            }

            for &(slot, target) in &moves {
                let order = self.rakes[source].orders[slot];
                self.rakes[target].orders.push(order);
            }
            let emptied = self.dissolve(source);
            info!(rake = %emptied.id, orders = moves.len(), "dissolved rake into other rakes");
            return true;
        }
        false
    }

    /// Releases wagons a rake does not need, largest first.
    fn trim_wagons(&mut self) -> bool {
        let min_wagons = self.active.min_wagons();
        let mut released: Vec<&'a Wagon> = Vec::new();

        for rake in &mut self.rakes {
            loop {
                if rake.wagons.len() <= min_wagons {
                    break;
                }
                let load = rake.load();
                let capacity = rake.capacity();
                let spare = rake
                    .wagons
                    .iter()
                    .position(|w| capacity - w.capacity >= load);
                match spare {
                    Some(i) => released.push(rake.wagons.remove(i)),
                    None => break,
                }
            }
        }

        if released.is_empty() {
            return false;
        }
        debug!(wagons = released.len(), "released surplus wagons");
        self.pool.extend(released);
        self.pool.sort_by(by_capacity_desc);
        true
    }

    fn finish(mut self, orders: &'a [Order], deferred: Vec<Deferred<'a>>) -> PlanResult {
        let mut waiting: Vec<&'a Order> = deferred
            .iter()
            .filter(|d| d.order.priority == Priority::Critical && d.reason != UnplacedReason::BudgetExceeded)
            .map(|d| d.order)
            .collect();
        self.unplaced.extend(deferred.into_iter().map(|d| (d.order, d.reason)));

        // Final gate: anything still violating a rule is broken up. Criticals
        // released by a broken rake wait too, so the scan restarts.
        let mut index = 0;
        while index < self.rakes.len() {
            let evaluation = self.evaluate(index, &waiting);
            if evaluation.valid {
                index += 1;
                continue;
            }
            let broken = self.dissolve(index);
            warn!(rake = %broken.id, violations = evaluation.violations.len(), "dropping rake that fails final check");
            let reason = reason_for(&evaluation);
            for order in broken.orders {
                self.record_rejection(order, &evaluation);
                if order.priority == Priority::Critical {
                    waiting.push(order);
                }
                self.unplaced.push((order, reason.clone()));
            }
            index = 0;
        }

        let proposed_rakes: Vec<Rake> = self
            .rakes
            .iter()
            .enumerate()
            .map(|(i, forming)| {
                let mut rake = forming.to_rake(self.options.plan_date, RakeStatus::Ready, self.cost_model);
                rake.id = format!("{}-{:03}", self.options.rake_id_prefix, i + 1);
                debug!(rake = %rake.id, route = %rake.route_id, utilization = rake.utilization(), "rake proposed");
                rake
            })
            .collect();

        let position: BTreeMap<&str, usize> = orders
            .iter()
            .enumerate()
            .rev()
            .map(|(i, o)| (o.id.as_str(), i))
            .collect();
        self.unplaced.sort_by_key(|(order, _)| {
            (
                position.get(order.id.as_str()).copied().unwrap_or(usize::MAX),
                order.id.clone(),
            )
        });
        let unplaced_orders: Vec<UnplacedOrder> = self
            .unplaced
            .iter()
            .map(|(order, reason)| UnplacedOrder {
                order_id: order.id.clone(),
                priority: order.priority,
                reason: reason.clone(),
            })
            .collect();

        let violated_constraints = self
            .rejections
            .into_iter()
            .map(|(constraint_id, order_ids)| ViolatedConstraint {
                occurrences: self.rejection_counts.get(&constraint_id).copied().unwrap_or(0),
                constraint_id,
                order_ids: order_ids.into_iter().collect(),
            })
            .collect();

        let summary = PlanSummary::from_plan(&proposed_rakes, &unplaced_orders, self.pool.len());
        info!(
            rakes = proposed_rakes.len(),
            unplaced = unplaced_orders.len(),
            iterations = self.iterations,
            "planning pass finished"
        );

        PlanResult {
            proposed_rakes,
            unplaced_orders,
            violated_constraints,
            diagnostics: self.diagnostics,
            summary,
            iterations: self.iterations,
        }
    }
}

fn waiting_critical<'a>(deferred: &[Deferred<'a>], evicted: &[&'a Order]) -> Vec<&'a Order> {
    deferred
        .iter()
        .map(|d| d.order)
        .chain(evicted.iter().copied())
        .filter(|o| o.priority == Priority::Critical)
        .collect()
}

fn reason_for(evaluation: &Evaluation) -> UnplacedReason {
    evaluation
        .violations
        .first()
        .map(reason_for_violation)
        .unwrap_or(UnplacedReason::ConstraintViolation(String::new()))
}

fn reason_for_violation(violation: &Violation) -> UnplacedReason {
    match &violation.kind {
        ViolationKind::PriorityPrecedence { .. } => UnplacedReason::PriorityHeld,
        ViolationKind::SidingLimit { .. } => UnplacedReason::SidingLimit,
        ViolationKind::RouteCapacity { .. } => UnplacedReason::RouteCapacity,
        ViolationKind::RouteBlocked { .. } => UnplacedReason::RouteBlocked,
        ViolationKind::RouteMissing { .. } => UnplacedReason::NoRoute,
        ViolationKind::BelowMinimumSize { .. } => UnplacedReason::InsufficientWagons,
        _ => UnplacedReason::ConstraintViolation(violation.constraint_id.clone()),
    }
}
