use divergence_core::simulator::{run_simulator, SimulatorConfig};

#[tokio::test]
async fn seeded_sessions_hold_invariants() {
    for seed in [1, 2, 3] {
        let report = run_simulator(SimulatorConfig {
            seed,
            total_operations: 500,
            failure_rate: 0.2,
            ..SimulatorConfig::default()
        })
        .await;
        assert!(report.passed(), "{}", report.generate_text());
    }
}

#[tokio::test]
async fn growth_is_capped() {
    let report = run_simulator(SimulatorConfig {
        total_operations: 400,
        failure_rate: 0.0,
        max_nodes: 20,
        ..SimulatorConfig::default()
    })
    .await;
    assert!(report.passed(), "{}", report.generate_text());
    // one divergence can overshoot by a batch
    assert!(report.final_node_count < 20 + 3);
}
