//! Dependency graph over lifecycle phases and middlewares.

use crate::core::LifecyclePhase;
use crate::errors::{AlreadyRegisteredError, CycleDetectedError, GenflowError};
use crate::middleware::MiddlewareDefinition;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A graph vertex. Phase markers and middlewares live in separate
/// namespaces so a middleware can never shadow a phase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    Phase(LifecyclePhase),
    Middleware(String),
}

impl NodeKey {
    fn from_target(target: &str) -> Self {
        target
            .parse::<LifecyclePhase>()
            .map_or_else(|_| Self::Middleware(target.to_string()), Self::Phase)
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phase(phase) => f.write_str(phase.as_str()),
            Self::Middleware(name) => f.write_str(name),
        }
    }
}

/// An ordered sequence of levels.
///
/// Every member of level *k* finishes before any member of level *k + 1*
/// starts. Members of one level carry no ordering guarantee between them.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    levels: Vec<Vec<Arc<MiddlewareDefinition>>>,
    generation: u64,
}

impl ExecutionPlan {
    /// Returns the levels.
    #[must_use]
    pub fn levels(&self) -> &[Vec<Arc<MiddlewareDefinition>>] {
        &self.levels
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns true if there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Returns the graph generation this plan was built from.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the index of the level containing `name`.
    #[must_use]
    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|d| d.name == name))
    }

    /// Returns the middleware names of each level.
    #[must_use]
    pub fn names(&self) -> Vec<Vec<String>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|d| d.name.clone()).collect())
            .collect()
    }

    /// Returns the total number of middlewares in the plan.
    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Default)]
struct GraphState {
    definitions: HashMap<String, Arc<MiddlewareDefinition>>,
    order: Vec<String>,
    generation: u64,
}

/// Maintains the legal partial order over phases and middlewares.
///
/// Reads (`build`, `get`, `has`) may run concurrently from many requests.
/// Every mutation bumps the generation and drops the cached plan under the
/// same write lock.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    state: RwLock<GraphState>,
    cache: RwLock<Option<Arc<ExecutionPlan>>>,
}

impl DependencyGraph {
    /// Creates an empty graph holding only the lifecycle phases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a middleware.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDefinition` for a malformed definition or
    /// `AlreadyRegistered` if the name is taken. The graph is unchanged on error.
    pub fn register(&self, definition: MiddlewareDefinition) -> Result<(), GenflowError> {
        definition.validate()?;

        let mut state = self.state.write();
        if state.definitions.contains_key(&definition.name) {
            return Err(AlreadyRegisteredError::new(&definition.name).into());
        }

        debug!(
            middleware = %definition.name,
            phase = %definition.phase,
            "Registering middleware"
        );

        state.order.push(definition.name.clone());
        state
            .definitions
            .insert(definition.name.clone(), Arc::new(definition));
        self.invalidate(&mut state);
        Ok(())
    }

    /// Removes a middleware and every edge touching it.
    ///
    /// Returns true if something was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let mut state = self.state.write();
        if state.definitions.remove(name).is_none() {
            return false;
        }

        debug!(middleware = %name, "Unregistering middleware");
        state.order.retain(|n| n != name);
        self.invalidate(&mut state);
        true
    }

    /// Removes every middleware. The lifecycle phases remain.
    ///
    /// Returns the removed names in registration order.
    pub fn clear(&self) -> Vec<String> {
        let mut state = self.state.write();
        state.definitions.clear();
        let removed = std::mem::take(&mut state.order);
        self.invalidate(&mut state);
        removed
    }

    /// Returns the definition registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<MiddlewareDefinition>> {
        self.state.read().definitions.get(name).cloned()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.state.read().definitions.contains_key(name)
    }

    /// Returns all definitions in registration order.
    #[must_use]
    pub fn middlewares(&self) -> Vec<Arc<MiddlewareDefinition>> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|name| state.definitions.get(name).cloned())
            .collect()
    }

    /// Returns the number of registered middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().definitions.len()
    }

    /// Returns true if no middleware is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().definitions.is_empty()
    }

    /// Returns the mutation counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Returns the execution plan, rebuilding it if the graph changed.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetectedError` naming one concrete cycle.
    pub fn build(&self) -> Result<Arc<ExecutionPlan>, CycleDetectedError> {
        // Holding the state read lock keeps writers out until the fresh plan
        // is cached, so a stale plan is never stored.
        let state = self.state.read();

        if let Some(plan) = self.cache.read().as_ref() {
            if plan.generation == state.generation {
                return Ok(Arc::clone(plan));
            }
        }

        let plan = Arc::new(compute_plan(&state)?);
        debug!(
            levels = plan.len(),
            middlewares = plan.middleware_count(),
            generation = plan.generation,
            "Built execution plan"
        );

        *self.cache.write() = Some(Arc::clone(&plan));
        Ok(plan)
    }

    fn invalidate(&self, state: &mut GraphState) {
        state.generation += 1;
        *self.cache.write() = None;
    }
}

struct Edges {
    nodes: Vec<NodeKey>,
    successors: HashMap<NodeKey, Vec<NodeKey>>,
}

impl Edges {
    fn add(&mut self, from: NodeKey, to: NodeKey) {
        let targets = self.successors.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
    }

    fn successors(&self, node: &NodeKey) -> &[NodeKey] {
        self.successors.get(node).map_or(&[][..], Vec::as_slice)
    }
}

fn collect_edges(state: &GraphState) -> Edges {
    let mut nodes: Vec<NodeKey> = LifecyclePhase::ALL.into_iter().map(NodeKey::Phase).collect();
    nodes.extend(state.order.iter().cloned().map(NodeKey::Middleware));

    let mut edges = Edges {
        nodes,
        successors: HashMap::new(),
    };

    for phase in LifecyclePhase::ALL {
        if let Some(next) = phase.next() {
            edges.add(NodeKey::Phase(phase), NodeKey::Phase(next));
        }
    }

    // Targets that name no registered middleware are ignored.
    let exists = |key: &NodeKey| match key {
        NodeKey::Phase(_) => true,
        NodeKey::Middleware(name) => state.definitions.contains_key(name),
    };

    for name in &state.order {
        let Some(def) = state.definitions.get(name) else {
            continue;
        };
        let node = NodeKey::Middleware(name.clone());

        edges.add(NodeKey::Phase(def.phase), node.clone());
        if let Some(next) = def.phase.next() {
            edges.add(node.clone(), NodeKey::Phase(next));
        }

        for target in def.before.iter().map(|t| NodeKey::from_target(t)) {
            if exists(&target) {
                edges.add(node.clone(), target);
            }
        }
        for target in def.after.iter().map(|t| NodeKey::from_target(t)) {
            if exists(&target) {
                edges.add(target, node.clone());
            }
        }
    }

    edges
}

fn compute_plan(state: &GraphState) -> Result<ExecutionPlan, CycleDetectedError> {
    let edges = collect_edges(state);

    let mut in_degree: HashMap<&NodeKey, usize> = edges.nodes.iter().map(|n| (n, 0)).collect();
    for node in &edges.nodes {
        for succ in edges.successors(node) {
            if let Some(count) = in_degree.get_mut(succ) {
                *count += 1;
            }
        }
    }

    let mut frontier: Vec<&NodeKey> = edges
        .nodes
        .iter()
        .filter(|n| in_degree.get(n).copied() == Some(0))
        .collect();

    let mut levels = Vec::new();
    let mut processed = 0;

    while !frontier.is_empty() {
        processed += frontier.len();

        let members: Vec<Arc<MiddlewareDefinition>> = frontier
            .iter()
            .filter_map(|node| match node {
                NodeKey::Middleware(name) => state.definitions.get(name).cloned(),
                NodeKey::Phase(_) => None,
            })
            .collect();
        if !members.is_empty() {
            levels.push(members);
        }

        let mut next = Vec::new();
        for node in &frontier {
            for succ in edges.successors(node) {
                if let Some(count) = in_degree.get_mut(succ) {
                    *count -= 1;
                    if *count == 0 {
                        next.push(succ);
                    }
                }
            }
        }
        frontier = next;
    }

    if processed < edges.nodes.len() {
        let stuck: Vec<&NodeKey> = edges
            .nodes
            .iter()
            .filter(|n| in_degree.get(n).copied().unwrap_or(0) > 0)
            .collect();
        return Err(report_cycle(&edges, &stuck));
    }

    Ok(ExecutionPlan {
        levels,
        generation: state.generation,
    })
}

fn report_cycle(edges: &Edges, stuck: &[&NodeKey]) -> CycleDetectedError {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for node in stuck {
        if !visited.contains(*node) {
            if let Some(cycle) = dfs_cycle(edges, node, &mut visited, &mut rec_stack, &mut path) {
                return CycleDetectedError::new(cycle.iter().map(ToString::to_string).collect());
            }
        }
    }

    // Unreachable for a graph Kahn's algorithm could not drain.
    CycleDetectedError::new(stuck.iter().map(ToString::to_string).collect())
}

fn dfs_cycle<'a>(
    edges: &'a Edges,
    node: &'a NodeKey,
    visited: &mut HashSet<&'a NodeKey>,
    rec_stack: &mut HashSet<&'a NodeKey>,
    path: &mut Vec<&'a NodeKey>,
) -> Option<Vec<&'a NodeKey>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for succ in edges.successors(node) {
        if !visited.contains(succ) {
            if let Some(cycle) = dfs_cycle(edges, succ, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(succ) {
            let start = path.iter().position(|n| *n == succ).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(succ);
            return Some(cycle);
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::PassThrough;
    use pretty_assertions::assert_eq;

    fn mw(name: &str, phase: LifecyclePhase) -> MiddlewareDefinition {
        MiddlewareDefinition::new(name, Arc::new(PassThrough)).with_phase(phase)
    }

    fn names(levels: &[&[&str]]) -> Vec<Vec<String>> {
        levels
            .iter()
            .map(|l| l.iter().map(|s| (*s).to_string()).collect())
            .collect()
    }

    fn sorted(plan: &ExecutionPlan) -> Vec<Vec<String>> {
        plan.names()
            .into_iter()
            .map(|mut level| {
                level.sort();
                level
            })
            .collect()
    }

    #[test]
    fn test_empty_graph_builds_empty_plan() {
        let graph = DependencyGraph::new();
        let plan = graph.build().unwrap();
        assert!(plan.is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_scenario_levels() {
        let graph = DependencyGraph::new();
        graph.register(mw("A", LifecyclePhase::Prepare)).unwrap();
        graph
            .register(mw("B", LifecyclePhase::Prepare).after("A"))
            .unwrap();
        graph.register(mw("C", LifecyclePhase::Finalize)).unwrap();

        let plan = graph.build().unwrap();
        assert_eq!(plan.names(), names(&[&["A"], &["B"], &["C"]]));
    }

    #[test]
    fn test_phases_order_levels() {
        let graph = DependencyGraph::new();
        // Register out of phase order.
        graph.register(mw("upload", LifecyclePhase::PostRequest)).unwrap();
        graph.register(mw("connector", LifecyclePhase::Request)).unwrap();
        graph.register(mw("billing", LifecyclePhase::Prepare)).unwrap();
        graph.register(mw("preset", LifecyclePhase::PreRequest)).unwrap();
        graph.register(mw("task", LifecyclePhase::Prepare)).unwrap();
        graph.register(mw("record", LifecyclePhase::Finalize)).unwrap();

        let plan = graph.build().unwrap();
        assert_eq!(
            sorted(&plan),
            names(&[
                &["billing", "task"],
                &["preset"],
                &["connector"],
                &["upload"],
                &["record"],
            ])
        );
    }

    #[test]
    fn test_before_is_honored() {
        let graph = DependencyGraph::new();
        graph.register(mw("b", LifecyclePhase::Request)).unwrap();
        graph
            .register(mw("a", LifecyclePhase::Request).before("b"))
            .unwrap();
        graph.register(mw("c", LifecyclePhase::Request)).unwrap();

        let plan = graph.build().unwrap();
        let a = plan.level_of("a").unwrap();
        let b = plan.level_of("b").unwrap();
        assert!(a < b);
        // No relation: shares a level with `a`.
        assert_eq!(plan.level_of("c"), Some(a));
    }

    #[test]
    fn test_before_and_after_on_phase_targets() {
        let graph = DependencyGraph::new();
        graph.register(mw("fetch", LifecyclePhase::Request)).unwrap();
        graph
            .register(mw("late", LifecyclePhase::Prepare).after("lifecycle-prepare"))
            .unwrap();

        let plan = graph.build().unwrap();
        assert!(plan.level_of("late").unwrap() < plan.level_of("fetch").unwrap());
    }

    #[test]
    fn test_two_way_cycle_reports_both() {
        let graph = DependencyGraph::new();
        graph.register(mw("A", LifecyclePhase::Request).after("B")).unwrap();
        graph.register(mw("B", LifecyclePhase::Request).after("A")).unwrap();

        let err = graph.build().unwrap_err();
        assert!(err.involves("A"));
        assert!(err.involves("B"));
        assert_eq!(err.cycle_path.first(), err.cycle_path.last());
        assert!(err.to_string().starts_with("Circular dependency detected:"));
    }

    #[test]
    fn test_transitive_cycle() {
        let graph = DependencyGraph::new();
        graph.register(mw("a", LifecyclePhase::Request).before("b")).unwrap();
        graph.register(mw("b", LifecyclePhase::Request).before("c")).unwrap();
        graph.register(mw("c", LifecyclePhase::Request).before("a")).unwrap();

        let err = graph.build().unwrap_err();
        for name in ["a", "b", "c"] {
            assert!(err.involves(name), "cycle should include {name}: {err}");
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let graph = DependencyGraph::new();
        graph.register(mw("loop", LifecyclePhase::Request).after("loop")).unwrap();

        let err = graph.build().unwrap_err();
        assert_eq!(err.cycle_path, vec!["loop".to_string(), "loop".to_string()]);
    }

    #[test]
    fn test_phase_conflict_is_cycle() {
        let graph = DependencyGraph::new();
        graph
            .register(mw("early", LifecyclePhase::Prepare).after("late"))
            .unwrap();
        graph.register(mw("late", LifecyclePhase::PostRequest)).unwrap();

        let err = graph.build().unwrap_err();
        assert!(err.involves("early"));
        assert!(err.involves("late"));
    }

    #[test]
    fn test_duplicate_registration_keeps_original() {
        let graph = DependencyGraph::new();
        graph.register(mw("cache", LifecyclePhase::PreRequest)).unwrap();

        let err = graph
            .register(mw("cache", LifecyclePhase::Finalize))
            .unwrap_err();
        assert!(matches!(err, GenflowError::AlreadyRegistered(_)));
        assert_eq!(err.to_string(), "Middleware \"cache\" is already registered");

        let plan = graph.build().unwrap();
        assert_eq!(plan.names(), names(&[&["cache"]]));
        assert_eq!(graph.get("cache").unwrap().phase, LifecyclePhase::PreRequest);
    }

    #[test]
    fn test_invalid_definition_rejected() {
        let graph = DependencyGraph::new();
        let err = graph
            .register(mw("lifecycle-request", LifecyclePhase::Request))
            .unwrap_err();
        assert!(matches!(err, GenflowError::InvalidDefinition(_)));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_dangling_targets_ignored() {
        let graph = DependencyGraph::new();
        graph
            .register(mw("a", LifecyclePhase::Request).after("ghost").before("phantom"))
            .unwrap();

        let plan = graph.build().unwrap();
        assert_eq!(plan.names(), names(&[&["a"]]));
    }

    #[test]
    fn test_unregister_removes_edges_and_reregister_restores() {
        let graph = DependencyGraph::new();
        graph.register(mw("a", LifecyclePhase::Request)).unwrap();
        graph.register(mw("b", LifecyclePhase::Request).after("a")).unwrap();
        assert_eq!(graph.build().unwrap().len(), 2);

        assert!(graph.unregister("a"));
        assert!(!graph.unregister("a"));
        assert_eq!(graph.build().unwrap().names(), names(&[&["b"]]));

        graph.register(mw("a", LifecyclePhase::Request)).unwrap();
        assert_eq!(graph.build().unwrap().names(), names(&[&["a"], &["b"]]));
    }

    #[test]
    fn test_unregister_breaks_cycle() {
        let graph = DependencyGraph::new();
        graph.register(mw("A", LifecyclePhase::Request).after("B")).unwrap();
        graph.register(mw("B", LifecyclePhase::Request).after("A")).unwrap();
        assert!(graph.build().is_err());

        graph.unregister("B");
        assert_eq!(graph.build().unwrap().names(), names(&[&["A"]]));
    }

    #[test]
    fn test_clear_keeps_phases() {
        let graph = DependencyGraph::new();
        graph.register(mw("a", LifecyclePhase::Prepare)).unwrap();
        graph.register(mw("b", LifecyclePhase::Finalize)).unwrap();

        assert_eq!(graph.clear(), vec!["a", "b"]);
        assert!(graph.is_empty());
        assert!(graph.clear().is_empty());
        assert!(graph.build().unwrap().is_empty());

        graph.register(mw("a", LifecyclePhase::Request)).unwrap();
        assert_eq!(graph.build().unwrap().names(), names(&[&["a"]]));
    }

    #[test]
    fn test_plan_is_cached_until_mutation() {
        let graph = DependencyGraph::new();
        graph.register(mw("a", LifecyclePhase::Request)).unwrap();

        let first = graph.build().unwrap();
        let second = graph.build().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        graph.register(mw("b", LifecyclePhase::Request)).unwrap();
        let third = graph.build().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(third.generation() > first.generation());
        assert_eq!(third.generation(), graph.generation());
    }

    #[test]
    fn test_middlewares_in_registration_order() {
        let graph = DependencyGraph::new();
        for name in ["z", "a", "m"] {
            graph.register(mw(name, LifecyclePhase::Request)).unwrap();
        }
        let order: Vec<String> = graph.middlewares().iter().map(|d| d.name.clone()).collect();
        assert_eq!(order, vec!["z", "a", "m"]);
        assert_eq!(graph.len(), 3);
        assert!(graph.has("m"));
    }

    #[test]
    fn test_concurrent_build_and_register() {
        let graph = Arc::new(DependencyGraph::new());
        for i in 0..10 {
            graph
                .register(mw(&format!("base-{i}"), LifecyclePhase::Request))
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let graph = Arc::clone(&graph);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        if t == 0 {
                            graph
                                .register(mw(&format!("extra-{i}"), LifecyclePhase::Prepare))
                                .unwrap();
                        }
                        let plan = graph.build().unwrap();
                        assert!(plan.middleware_count() >= 10);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let plan = graph.build().unwrap();
        assert_eq!(plan.middleware_count(), 30);
        assert_eq!(plan.generation(), graph.generation());
    }
}
