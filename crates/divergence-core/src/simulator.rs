//! Session simulator
//!
//! Drives a [`MindMapEngine`] against an [`InMemoryCollaborator`] with seeded
//! random operations and injected remote failures, and checks after every
//! settled operation that:
//! - the client tree is well formed
//! - client and server hold the same nodes and edges
//! - guarded fields (`isMarked`) agree with the server
//! - the marked-only view is edge-induced
//! - positions agree with the server when no failures are injected

use crate::config::EngineConfig;
use crate::engine::MindMapEngine;
use crate::error::EngineError;
use crate::memory::InMemoryCollaborator;
use crate::store::GraphStore;
use crate::types::{NodeId, Position};
use crate::validate::TreeValidator;
use crate::view::ViewMode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Total operations to execute
    pub total_operations: u64,
    /// Probability that any remote call fails
    pub failure_rate: f64,
    /// Growth operations stop once the map holds this many nodes
    pub max_nodes: usize,
    /// Stop on the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            total_operations: 1_000,
            failure_rate: 0.1,
            max_nodes: 200,
            stop_on_first_violation: true,
        }
    }
}

/// Operations the simulator can generate
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedOperation {
    /// Expand a node
    Diverge(NodeId),
    /// Add a manual child
    AddChild(NodeId),
    /// Drag a node by a delta over two frames
    Drag { node: NodeId, delta: Position },
    /// Toggle the marked flag
    ToggleMark(NodeId),
    /// Rename a node
    EditContent(NodeId),
    /// Delete a non-root node
    Delete(NodeId),
    /// Try to delete the root
    DeleteRoot(NodeId),
    /// Derive the marked-only view
    FilterMarked,
}

impl SimulatedOperation {
    fn name(&self) -> &'static str {
        match self {
            Self::Diverge(_) => "Diverge",
            Self::AddChild(_) => "AddChild",
            Self::Drag { .. } => "Drag",
            Self::ToggleMark(_) => "ToggleMark",
            Self::EditContent(_) => "EditContent",
            Self::Delete(_) => "Delete",
            Self::DeleteRoot(_) => "DeleteRoot",
            Self::FilterMarked => "FilterMarked",
        }
    }
}

/// Expected result classification for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedResult {
    /// Must succeed
    ShouldSucceed,
    /// Must be rejected
    ShouldFail,
    /// May fail because of an injected remote failure
    MayFail,
}

/// Types of invariant checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantCheck {
    /// Client tree passes the validator
    TreeIsWellFormed,
    /// Same node ids and edges on both sides
    ClientMatchesServer,
    /// Marked flags agree
    GuardedFieldsAgree,
    /// Marked-only view is edge-induced
    ViewIsEdgeInduced,
    /// Positions agree (no injected failures)
    PositionsAgree,
}

/// A specific invariant violation
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Failed check
    pub check: InvariantCheck,
    /// What differed
    pub details: String,
}

/// A violation detected during simulation
#[derive(Debug, Clone)]
pub enum Violation {
    /// Operation outcome didn't match expectation
    UnexpectedOutcome {
        operation_index: u64,
        operation: SimulatedOperation,
        expected: ExpectedResult,
        actual: Result<String, String>,
    },
    /// Invariant was violated
    Invariant {
        operation_index: u64,
        violation: InvariantViolation,
    },
}

/// Statistics collected during simulation
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    /// Operations executed
    pub total_operations: u64,
    /// Operations that returned `Ok`
    pub successful_operations: u64,
    /// Operations that returned `Err`
    pub failed_operations: u64,
    /// Count per operation kind
    pub operations_by_type: HashMap<&'static str, u64>,
}

impl OperationStats {
    fn record(&mut self, operation: &SimulatedOperation, result: &Result<String, String>) {
        self.total_operations += 1;
        *self.operations_by_type.entry(operation.name()).or_insert(0) += 1;
        match result {
            Ok(_) => self.successful_operations += 1,
            Err(_) => self.failed_operations += 1,
        }
    }
}

/// Final report from the simulator
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Operation statistics
    pub stats: OperationStats,
    /// Everything that went wrong
    pub violations: Vec<Violation>,
    /// Nodes on the client at the end
    pub final_node_count: usize,
}

impl SimulatorReport {
    /// Check if simulation passed all criteria
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Generate a text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Divergence Simulator Report ===\n\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Failure rate: {}", self.config.failure_rate);
        let _ = writeln!(report, "Total Operations: {}", self.stats.total_operations);
        let _ = writeln!(report, "Successful: {}", self.stats.successful_operations);
        let _ = writeln!(report, "Failed: {}", self.stats.failed_operations);
        let _ = writeln!(report, "Violations: {}", self.violations.len());
        let _ = writeln!(report, "Final Nodes: {}", self.final_node_count);

        let mut kinds: Vec<_> = self.stats.operations_by_type.iter().collect();
        kinds.sort();
        report.push_str("\n=== Operations ===\n");
        for (kind, count) in kinds {
            let _ = writeln!(report, "{kind}: {count}");
        }

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {:?}", i + 1, v);
            }
        }

        let _ = write!(
            report,
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Run the simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let server = Arc::new(InMemoryCollaborator::with_seed(config.seed));
    let engine = MindMapEngine::new(
        Arc::clone(&server),
        EngineConfig::default().with_validation(false),
    );
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut stats = OperationStats::default();
    let mut violations = Vec::new();

    let map_id = match engine.open("simulated-topic", "Simulated topic").await {
        Ok(map_id) => map_id,
        Err(err) => {
            violations.push(Violation::UnexpectedOutcome {
                operation_index: 0,
                operation: SimulatedOperation::FilterMarked,
                expected: ExpectedResult::ShouldSucceed,
                actual: Err(err.to_string()),
            });
            return SimulatorReport {
                config,
                stats,
                violations,
                final_node_count: 0,
            };
        }
    };
    server.set_failure_rate(config.failure_rate);

    for i in 0..config.total_operations {
        let client = engine.snapshot();
        let operation = generate_operation(&mut rng, &client, config.max_nodes);
        let expected = classify_expected_result(&operation, config.failure_rate);

        let actual: Result<String, String> = execute_operation(&engine, &operation)
            .await
            .map_err(|e| e.to_string());

        let outcome_matches = matches!(
            (expected, &actual),
            (ExpectedResult::ShouldSucceed, Ok(_))
                | (ExpectedResult::ShouldFail, Err(_))
                | (ExpectedResult::MayFail, _)
        );
        stats.record(&operation, &actual);

        if !outcome_matches {
            violations.push(Violation::UnexpectedOutcome {
                operation_index: i,
                operation,
                expected,
                actual,
            });
            if config.stop_on_first_violation {
                break;
            }
        }

        let server_store = server.snapshot(&map_id).unwrap_or_default();
        let found = check_invariants(&engine.snapshot(), &server_store, config.failure_rate <= 0.0);
        if !found.is_empty() {
            violations.extend(found.into_iter().map(|violation| Violation::Invariant {
                operation_index: i,
                violation,
            }));
            if config.stop_on_first_violation {
                break;
            }
        }
    }

    SimulatorReport {
        config,
        stats,
        violations,
        final_node_count: engine.snapshot().len(),
    }
}

fn generate_operation(rng: &mut StdRng, store: &GraphStore, max_nodes: usize) -> SimulatedOperation {
    let nodes: Vec<&NodeId> = store.nodes().map(|n| &n.id).collect();
    let root = store.root().map(|n| n.id.clone()).unwrap_or_else(|| NodeId::new("missing-root"));
    let pick = |rng: &mut StdRng| -> NodeId {
        if nodes.is_empty() {
            root.clone()
        } else {
            nodes[rng.random_range(0..nodes.len())].clone()
        }
    };
    let can_grow = store.len() < max_nodes;

    match rng.random_range(0..100u32) {
        0..=19 if can_grow => SimulatedOperation::Diverge(pick(rng)),
        20..=34 if can_grow => SimulatedOperation::AddChild(pick(rng)),
        35..=54 => SimulatedOperation::Drag {
            node: pick(rng),
            delta: Position::new(
                rng.random_range(-50.0..50.0_f64).round(),
                rng.random_range(-50.0..50.0_f64).round(),
            ),
        },
        70..=79 => SimulatedOperation::EditContent(pick(rng)),
        80..=89 => {
            let candidates: Vec<&NodeId> = nodes.iter().copied().filter(|id| **id != root).collect();
            if candidates.is_empty() {
                SimulatedOperation::FilterMarked
            } else {
                SimulatedOperation::Delete(candidates[rng.random_range(0..candidates.len())].clone())
            }
        }
        90..=94 => SimulatedOperation::DeleteRoot(root),
        95..=99 => SimulatedOperation::FilterMarked,
        _ => SimulatedOperation::ToggleMark(pick(rng)),
    }
}

fn classify_expected_result(operation: &SimulatedOperation, failure_rate: f64) -> ExpectedResult {
    match operation {
        SimulatedOperation::DeleteRoot(_) => ExpectedResult::ShouldFail,
        SimulatedOperation::FilterMarked => ExpectedResult::ShouldSucceed,
        _ if failure_rate > 0.0 => ExpectedResult::MayFail,
        _ => ExpectedResult::ShouldSucceed,
    }
}

async fn execute_operation(
    engine: &MindMapEngine<InMemoryCollaborator>,
    operation: &SimulatedOperation,
) -> Result<String, EngineError> {
    match operation {
        SimulatedOperation::Diverge(id) => {
            let merged = engine.diverge(id).await?;
            Ok(format!("added {}", merged.added.len()))
        }
        SimulatedOperation::AddChild(id) => {
            let node = engine.add_child(id, "manual idea").await?;
            Ok(format!("added {}", node.id))
        }
        SimulatedOperation::Drag { node, delta } => {
            let origin = engine
                .node(node)
                .map(|n| n.position)
                .ok_or_else(|| EngineError::NodeNotFound(node.clone()))?;
            let halfway = Position::new(delta.x / 2.0, delta.y / 2.0);
            engine.begin_drag(node)?;
            engine.drag_to(origin + halfway)?;
            engine.drag_to(origin + *delta)?;
            let report = engine.end_drag()?.settled().await;
            if report.failed.is_empty() {
                Ok(format!("persisted {}", report.persisted.len()))
            } else {
                Err(EngineError::TaskFailed(format!(
                    "{} of {} position writes failed",
                    report.failed.len(),
                    report.failed.len() + report.persisted.len()
                )))
            }
        }
        SimulatedOperation::ToggleMark(id) => {
            engine.toggle_mark(id)?.settled().await?;
            Ok("toggled".into())
        }
        SimulatedOperation::EditContent(id) => {
            engine.edit_content(id, format!("edited {id}"))?.settled().await?;
            Ok("edited".into())
        }
        SimulatedOperation::Delete(id) | SimulatedOperation::DeleteRoot(id) => {
            let plan = engine.plan_deletion(id)?;
            let removed = engine.delete(plan).await?;
            Ok(format!("removed {}", removed.len()))
        }
        SimulatedOperation::FilterMarked => {
            let view = engine.view(ViewMode::MarkedOnly);
            Ok(format!("{} visible", view.nodes.len()))
        }
    }
}

fn check_invariants(
    client: &GraphStore,
    server: &GraphStore,
    positions_must_agree: bool,
) -> Vec<InvariantViolation> {
    let mut found = Vec::new();

    let report = TreeValidator::new().check(client);
    if !report.is_valid() {
        found.push(InvariantViolation {
            check: InvariantCheck::TreeIsWellFormed,
            details: format!("{:?}", report.violations),
        });
    }

    let client_ids: HashSet<&NodeId> = client.nodes().map(|n| &n.id).collect();
    let server_ids: HashSet<&NodeId> = server.nodes().map(|n| &n.id).collect();
    let client_edges: HashSet<_> = client.edges().iter().collect();
    let server_edges: HashSet<_> = server.edges().iter().collect();
    if client_ids != server_ids || client_edges != server_edges {
        found.push(InvariantViolation {
            check: InvariantCheck::ClientMatchesServer,
            details: format!(
                "client {} nodes / {} edges, server {} nodes / {} edges",
                client_ids.len(),
                client_edges.len(),
                server_ids.len(),
                server_edges.len()
            ),
        });
    }

    for node in client.nodes() {
        let Some(remote) = server.node(&node.id) else { continue };
        if node.is_marked != remote.is_marked {
            found.push(InvariantViolation {
                check: InvariantCheck::GuardedFieldsAgree,
                details: format!("{}: client {} server {}", node.id, node.is_marked, remote.is_marked),
            });
        }
        if positions_must_agree && node.position != remote.position {
            found.push(InvariantViolation {
                check: InvariantCheck::PositionsAgree,
                details: format!("{}: client {:?} server {:?}", node.id, node.position, remote.position),
            });
        }
    }

    let view = crate::view::filter_mode(client, ViewMode::MarkedOnly);
    let visible = view.node_ids();
    let expected: Vec<_> = client
        .edges()
        .iter()
        .filter(|e| visible.contains(&e.source) && visible.contains(&e.target))
        .cloned()
        .collect();
    if view.edges != expected {
        found.push(InvariantViolation {
            check: InvariantCheck::ViewIsEdgeInduced,
            details: format!("{} edges shown, {} expected", view.edges.len(), expected.len()),
        });
    }

    found
}
