//! Bandwidth allocation measured through full simulation runs.

use hier_sched::SchedulerConfig;
use hier_sim::{ScenarioConfig, SimReport, Simulation};

fn run(config: &str, scenario: &str) -> SimReport {
    let config = SchedulerConfig::from_toml_str(config).unwrap();
    let scenario = ScenarioConfig::from_toml_str(scenario).unwrap();
    Simulation::new(&config, scenario).unwrap().run()
}

fn saturating_flows(flows: &[u32], rank: u32, duration_ms: u64) -> String {
    let mut out = format!("seed = 1\nduration_ms = {duration_ms}\n");
    for flow in flows {
        out.push_str(&format!(
            "\n[[flows]]\nflow_id = {flow}\nrank = {rank}\ninterval_ms = 1\n"
        ));
    }
    out
}

#[test]
fn wrr_allocation_tracks_quantums() {
    let report = run(
        "[wrr]\nquantums = [20000, 10000, 2000]",
        &saturating_flows(&[0, 1, 2], 1_500, 3_000),
    );

    // Per round: 13, 6 and 1 MTU-sized packets.
    let shares: Vec<f64> = report.flows.iter().map(|f| f.share_pct).collect();
    for (share, target) in shares.iter().zip([65.0, 30.0, 5.0]) {
        assert!((share - target).abs() < 1.0, "shares {shares:?}");
    }

    let expected: Vec<f64> = report.flows.iter().filter_map(|f| f.expected_pct).collect();
    assert_eq!(expected, vec![62.5, 31.25, 6.25]);
    for flow in &report.flows {
        let expected = flow.expected_pct.unwrap();
        assert!((flow.share_pct - expected).abs() < 3.5);
        assert!(flow.backlog > 0, "flow {} should stay saturated", flow.flow_id);
    }
    assert_eq!(report.counts.dequeued, report.stats.total_released());
}

#[test]
fn runtime_quantum_change_shifts_service() {
    let mut scenario = saturating_flows(&[0, 1], 1_000, 4_000);
    scenario.push_str(
        "\n[[events]]\nat_ms = 2000\nqueue = 1\nquantum = 40000\nreset_quota = true\n",
    );
    let report = run("[wrr]\nquantums = [10000, 10000]", &scenario);

    // 50/50 for the first half, 20/80 for the second.
    let flow1 = report.flow(1).unwrap();
    assert!(flow1.share_pct > 60.0 && flow1.share_pct < 70.0, "{report}");
    assert_eq!(report.final_quantums, Some(vec![10_000, 40_000]));
    assert_eq!(flow1.expected_pct, Some(80.0));
}

#[test]
fn fixed_wrr_ignores_quantum_events() {
    let mut scenario = saturating_flows(&[0, 1], 1_000, 1_000);
    scenario.push_str("\n[[events]]\nat_ms = 10\nqueue = 1\nquantum = 40000\n");
    let report = run(
        "policy = \"wrr-fixed\"\n[wrr]\nquantums = [10000, 10000]",
        &scenario,
    );
    assert_eq!(report.final_quantums, Some(vec![10_000, 10_000]));
    let flow1 = report.flow(1).unwrap();
    assert!((flow1.share_pct - 50.0).abs() < 1.0);
}

#[test]
fn credit_buckets_drain_in_order_until_refill() {
    let report = run(
        "policy = \"credit\"\n[credit]\nactivation_ms = 100",
        &saturating_flows(&[0, 1], 1_500, 1_000),
    );

    // 125 000 / 1 500 and 250 000 / 1 500, the last charge saturating at zero.
    assert_eq!(report.flow(0).unwrap().delivered, 84);
    assert_eq!(report.flow(1).unwrap().delivered, 167);
    assert!(report.flow(0).unwrap().max_latency_ms >= 99);
    assert!(report.flows.iter().all(|f| f.expected_pct.is_none()));
    assert!(report.stats.idle_attempts > 0);
}

#[test]
fn deadline_offset_shows_up_as_latency() {
    let report = run("", include_str!("../scenarios/shaped.toml"));
    let shaped = report.flow(1).unwrap();
    assert!(shaped.delivered > 0);
    assert!(shaped.mean_latency_ms >= 50.0, "{report}");
    assert!(report.stats.flow(1).withheld > 0);
    assert!(report.flow(0).unwrap().mean_latency_ms < 50.0);
}

#[test]
fn simulation_refuses_zero_step() {
    let mut scenario = ScenarioConfig::from_toml_str(&saturating_flows(&[0], 1_500, 10)).unwrap();
    scenario.step_ms = 0;
    let err = Simulation::new(&SchedulerConfig::default(), scenario)
        .err()
        .unwrap();
    assert!(err.to_string().contains("step_ms"), "{err}");
}

#[test]
fn same_seed_same_report() {
    let scenario = include_str!("../scenarios/quantum_change.toml");
    let a = run("[wrr]\nquantums = [10000, 10000]", scenario);
    let b = run("[wrr]\nquantums = [10000, 10000]", scenario);
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());

    let json: serde_json::Value = serde_json::from_str(&a.to_json().unwrap()).unwrap();
    assert_eq!(json["policy"], "wrr");
    assert_eq!(json["flows"].as_array().unwrap().len(), 2);
}
