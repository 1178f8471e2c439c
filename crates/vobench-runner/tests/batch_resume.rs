use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vobench_runner::{
    run_benchmark_with_launcher, Algorithm, BenchConfig, BenchError, CommandLine, Dataset,
    DatasetSelector, ManagedProcess, MissingArtifactPolicy, PlanRequest, ProcessLauncher, Timing,
};

/// Stands in for roscore / rosrun / rosbag. The VINS node "writes" its
/// trajectory when spawned, ROVIOLI when run.
#[derive(Default)]
struct FakeRos {
    calls: Mutex<Vec<String>>,
    stops: Arc<Mutex<usize>>,
}

struct FakeChild {
    stops: Arc<Mutex<usize>>,
}

impl ManagedProcess for FakeChild {
    fn id(&self) -> Option<u32> {
        None
    }

    fn terminate(&mut self, _grace: Duration) -> vobench_runner::Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }
}

impl FakeRos {
    fn record(&self, command: &CommandLine) {
        self.calls.lock().unwrap().push(command.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

fn write_raw(command: &CommandLine) {
    let raw = Path::new(command.args.last().unwrap());
    if command.args[0] == "rovioli" {
        let header = (0..16).map(|i| format!("h{}", i)).collect::<Vec<_>>().join(",");
        let row = (0..16).map(|i| format!("{}", i)).collect::<Vec<_>>().join(",");
        fs::write(raw, format!("{}\n{}\n{}\n", header, row, row)).unwrap();
    } else {
        fs::write(raw, "1.0 0 0 0 0 0 0 1\n2.0 0.1 0 0 0 0 0 1\n").unwrap();
    }
}

impl ProcessLauncher for FakeRos {
    fn spawn(&self, command: &CommandLine) -> vobench_runner::Result<Box<dyn ManagedProcess>> {
        self.record(command);
        if command.program == "rosrun" {
            write_raw(command);
        }
        Ok(Box::new(FakeChild {
            stops: self.stops.clone(),
        }))
    }

    fn run(&self, command: &CommandLine) -> vobench_runner::Result<Option<i32>> {
        self.record(command);
        if command.program == "rosrun" {
            write_raw(command);
        }
        Ok(Some(0))
    }
}

struct Workspace {
    root: PathBuf,
    config: BenchConfig,
}

impl Workspace {
    fn new(tag: &str, euroc_bags: &[&str]) -> Self {
        let root = std::env::temp_dir().join(format!(
            "vobench_it_{}_{}_{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        let mut abbrevs = BTreeMap::new();
        abbrevs.insert("seqX.bag".to_string(), "seqX".to_string());
        let config = BenchConfig {
            data_root: root.join("dataset"),
            output_root: root.join("output"),
            vins_config_dir: root.join("vins_config"),
            broker_command: vec!["roscore".to_string()],
            timing: Timing::immediate(),
            sequence_abbrevs: abbrevs,
        };
        let bags = Dataset::EurocMav.recordings_dir(&config.data_root);
        fs::create_dir_all(&bags).unwrap();
        fs::create_dir_all(&config.output_root).unwrap();
        fs::create_dir_all(&config.vins_config_dir).unwrap();
        for bag in euroc_bags {
            fs::write(bags.join(bag), b"").unwrap();
        }
        Self { root, config }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn euroc_request(algorithm: Algorithm, reps: usize) -> PlanRequest {
    PlanRequest {
        algorithm,
        selector: DatasetSelector::One(Dataset::EurocMav),
        num_repetitions: reps,
        sequence_index: None,
    }
}

#[test]
fn second_invocation_skips_every_completed_run() {
    let ws = Workspace::new("resume", &["seqX.bag"]);
    let request = euroc_request(Algorithm::Rovioli, 2);

    let ros = FakeRos::default();
    let first = run_benchmark_with_launcher(&ws.config, &request, MissingArtifactPolicy::Abort, &ros)
        .expect("first batch");
    assert_eq!(first.plan.total_runs, 2);
    assert_eq!(first.report.executed, 2);
    assert_eq!(first.report.skipped, 0);

    let names: Vec<_> = first
        .plan
        .plan
        .runs()
        .iter()
        .map(|r| (r.repetition_index, r.output_path.clone()))
        .collect();
    let out_dir = ws.config.output_root.join("euroc_mav");
    assert_eq!(
        names,
        vec![
            (0, out_dir.join("rovioli_mvio_seqX_0.txt")),
            (1, out_dir.join("rovioli_mvio_seqX_1.txt")),
        ]
    );
    for (_, path) in &names {
        let text = fs::read_to_string(path).expect("canonical output");
        assert_eq!(text.lines().count(), 2);
        assert_eq!(
            text.lines().next().unwrap(),
            "0.000000 8.000000 9.000000 10.000000 11.000000 12.000000 13.000000 14.000000"
        );
    }
    assert!(!ws.config.output_root.join("rovioli_mvio_temp.csv").exists());
    assert_eq!(ros.stops(), 1, "broker torn down once");

    let ros = FakeRos::default();
    let second = run_benchmark_with_launcher(&ws.config, &request, MissingArtifactPolicy::Abort, &ros)
        .expect("second batch");
    assert_eq!(second.report.planned, 2);
    assert_eq!(second.report.skipped, 2);
    assert_eq!(second.report.executed, 0);
    assert_eq!(second.plan.pending_runs, 0);
    assert!(ros.calls().is_empty(), "nothing may be launched on a complete batch");
}

#[test]
fn interrupted_batch_resumes_where_it_stopped() {
    let ws = Workspace::new("partial", &["MH_01_easy.bag", "V1_01_easy.bag"]);
    let request = euroc_request(Algorithm::VinsFusion, 1);

    // pretend an earlier batch finished the first two runs
    let done_dir = ws.config.output_root.join("euroc_mav");
    fs::create_dir_all(&done_dir).unwrap();
    fs::write(done_dir.join("vinsfs_mvio_MH01_0.txt"), "1.000000\n").unwrap();
    fs::write(done_dir.join("vinsfs_mvio_V101_0.txt"), "1.000000\n").unwrap();

    let ros = FakeRos::default();
    let summary = run_benchmark_with_launcher(&ws.config, &request, MissingArtifactPolicy::Abort, &ros)
        .expect("batch");
    assert_eq!(summary.report.planned, 6);
    assert_eq!(summary.report.skipped, 2);
    assert_eq!(summary.report.executed, 4);

    let calls = ros.calls();
    assert_eq!(calls[0], "roscore");
    assert!(calls[1].starts_with("rosrun vins vins_node "), "{}", calls[1]);
    assert!(calls[1].contains("euroc_stereo_config.yaml"), "{}", calls[1]);
    assert!(calls[2].starts_with("rosbag play "), "{}", calls[2]);
    assert_eq!(calls.len(), 1 + 4 * 2);
    // four nodes plus the broker
    assert_eq!(ros.stops(), 5);
    for entry in fs::read_dir(&done_dir).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().to_string();
        assert!(!name.starts_with('.'), "temp file left behind: {}", name);
    }
}

#[test]
fn missing_base_directory_fails_before_any_launch() {
    let ws = Workspace::new("nobase", &["MH_01_easy.bag"]);
    let mut config = ws.config.clone();
    config.vins_config_dir = ws.root.join("absent");

    let ros = FakeRos::default();
    let err = run_benchmark_with_launcher(
        &config,
        &euroc_request(Algorithm::VinsFusion, 1),
        MissingArtifactPolicy::Abort,
        &ros,
    )
    .err()
    .expect("must fail");
    assert!(matches!(err, BenchError::Configuration(_)), "{:?}", err);
    assert!(ros.calls().is_empty());

    // ROVIOLI does not need the VINS config directory
    run_benchmark_with_launcher(
        &config,
        &euroc_request(Algorithm::Rovioli, 1),
        MissingArtifactPolicy::Abort,
        &ros,
    )
    .expect("rovioli runs without vins config");
}
