use crate::config::Timing;
use crate::error::{BenchError, Result};
use crate::normalize::normalize_trajectory;
use crate::output::{is_complete, prepare_output_dir};
use crate::plan::{BatchPlan, RunDescriptor};
use crate::process::{drive_run, normalize_permissions, BrokerGuard, CommandLine, ProcessLauncher};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What happens when a run finishes without producing its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingArtifactPolicy {
    /// Halt the batch. A missing artifact usually means a broken invocation
    /// that would fail the same way for every remaining run.
    #[default]
    Abort,
    /// Log, count as failed, continue with the next run.
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub planned: usize,
    pub skipped: usize,
    pub executed: usize,
    pub failed: usize,
}

pub struct BatchExecutor<'a> {
    launcher: &'a dyn ProcessLauncher,
    broker_command: CommandLine,
    output_root: PathBuf,
    timing: Timing,
    policy: MissingArtifactPolicy,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(
        launcher: &'a dyn ProcessLauncher,
        broker_command: CommandLine,
        output_root: impl Into<PathBuf>,
        timing: Timing,
    ) -> Self {
        Self {
            launcher,
            broker_command,
            output_root: output_root.into(),
            timing,
            policy: MissingArtifactPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MissingArtifactPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs every incomplete descriptor of `plan` in order. The broker is
    /// started before the first run that actually executes and is torn down
    /// when this returns, on success and on error alike.
    pub fn execute(&self, plan: &BatchPlan) -> Result<BatchReport> {
        let mut report = BatchReport {
            planned: plan.len(),
            ..BatchReport::default()
        };
        let mut broker: Option<BrokerGuard> = None;

        for (idx, run) in plan.runs().iter().enumerate() {
            info!(
                "===== RUN {} {}/{} config: {} cmd: {}",
                run.algorithm,
                idx + 1,
                plan.len(),
                run.config_json(),
                run.invocation
            );
            prepare_output_dir(&run.output_path)?;
            if is_complete(&run.output_path) {
                info!(output = %run.output_path.display(), "This config has already executed, skip it");
                report.skipped += 1;
                continue;
            }

            if broker.is_none() {
                broker = Some(BrokerGuard::start(
                    self.launcher,
                    &self.broker_command,
                    &self.timing,
                )?);
            }

            report.executed += 1;
            match self.execute_one(run) {
                Ok(()) => {}
                Err(err @ BenchError::RunIncomplete { .. })
                    if self.policy == MissingArtifactPolicy::Continue =>
                {
                    error!("{}", err);
                    report.failed += 1;
                }
                Err(err) => {
                    error!(
                        config = %run.config_json(),
                        cmd = %run.invocation,
                        "batch aborted: {}",
                        err
                    );
                    return Err(err);
                }
            }
        }

        drop(broker);
        info!(
            planned = report.planned,
            skipped = report.skipped,
            executed = report.executed,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }

    fn execute_one(&self, run: &RunDescriptor) -> Result<()> {
        if run.raw_output_path.exists() {
            warn!(raw = %run.raw_output_path.display(), "removing stale raw output from an earlier attempt");
            fs::remove_file(&run.raw_output_path)?;
        }

        let driven = drive_run(self.launcher, &run.invocation, &self.timing);
        let normalized = match driven {
            Ok(()) if run.raw_output_path.exists() => {
                normalize_trajectory(&run.raw_output_path, &run.output_path, &run.raw_schema())
                    .map(|_| ())
            }
            other => other,
        };
        normalize_permissions(&self.output_root);
        normalized?;

        if !is_complete(&run.output_path) {
            return Err(BenchError::RunIncomplete {
                path: run.output_path.clone(),
                config: run.config_json().to_string(),
                command: run.invocation.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Algorithm;
    use crate::config::BenchConfig;
    use crate::dataset::{Dataset, DatasetSelector};
    use crate::plan::{generate_plan, PlanRequest};
    use crate::process::ManagedProcess;
    use crate::sequence::SequenceRegistry;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::path::Path;
    use std::time::Duration;

    /// Writes a well-formed raw file for every algorithm run unless told to
    /// misbehave.
    struct ScriptedLauncher {
        mode: Mode,
        log: Rc<RefCell<Vec<String>>>,
    }

    #[derive(Clone, Copy)]
    enum Mode {
        Good,
        NoOutput,
        WrongColumns,
    }

    struct Recorded {
        name: String,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ManagedProcess for Recorded {
        fn id(&self) -> Option<u32> {
            None
        }
        fn terminate(&mut self, _grace: Duration) -> Result<()> {
            self.log.borrow_mut().push(format!("stop {}", self.name));
            Ok(())
        }
    }

    impl ScriptedLauncher {
        fn new(mode: Mode) -> Self {
            Self {
                mode,
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn emit(&self, command: &CommandLine) {
            if command.program != "rosrun" {
                return;
            }
            let raw = Path::new(command.args.last().unwrap());
            let cols = match self.mode {
                Mode::Good => 16,
                Mode::WrongColumns => 12,
                Mode::NoOutput => return,
            };
            let header = (0..cols).map(|i| format!("c{}", i)).collect::<Vec<_>>().join(",");
            let row = (0..cols).map(|i| format!("{}.5", i)).collect::<Vec<_>>().join(",");
            fs::write(raw, format!("{}\n{}\n", header, row)).unwrap();
        }
    }

    impl ProcessLauncher for ScriptedLauncher {
        fn spawn(&self, command: &CommandLine) -> Result<Box<dyn ManagedProcess>> {
            self.log.borrow_mut().push(format!("spawn {}", command.program));
            Ok(Box::new(Recorded {
                name: command.program.clone(),
                log: self.log.clone(),
            }))
        }

        fn run(&self, command: &CommandLine) -> Result<Option<i32>> {
            self.log.borrow_mut().push(format!("run {}", command.program));
            self.emit(command);
            Ok(Some(0))
        }
    }

    fn setup(tag: &str, bags: &[&str]) -> (PathBuf, BenchConfig) {
        let root = std::env::temp_dir().join(format!(
            "vobench_exec_{}_{}_{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_micros()
        ));
        let config = BenchConfig {
            data_root: root.join("data"),
            output_root: root.join("out"),
            ..BenchConfig::default()
        };
        let dir = Dataset::EurocMav.recordings_dir(&config.data_root);
        fs::create_dir_all(&dir).unwrap();
        fs::create_dir_all(&config.output_root).unwrap();
        for b in bags {
            fs::write(dir.join(b), b"").unwrap();
        }
        (root, config)
    }

    fn rovioli_plan(config: &BenchConfig, reps: usize) -> BatchPlan {
        generate_plan(
            config,
            &SequenceRegistry::default(),
            &PlanRequest {
                algorithm: Algorithm::Rovioli,
                selector: DatasetSelector::One(Dataset::EurocMav),
                num_repetitions: reps,
                sequence_index: None,
            },
        )
        .unwrap()
    }

    fn executor<'a>(launcher: &'a ScriptedLauncher, config: &BenchConfig) -> BatchExecutor<'a> {
        BatchExecutor::new(
            launcher,
            CommandLine::new("roscore", Vec::new()),
            &config.output_root,
            Timing::immediate(),
        )
    }

    #[test]
    fn executes_then_skips_on_rerun_without_starting_broker() {
        let (root, config) = setup("rerun", &["MH_01_easy.bag"]);
        let plan = rovioli_plan(&config, 2);

        let launcher = ScriptedLauncher::new(Mode::Good);
        let report = executor(&launcher, &config).execute(&plan).expect("first");
        assert_eq!(
            report,
            BatchReport { planned: 2, skipped: 0, executed: 2, failed: 0 }
        );
        assert_eq!(
            *launcher.log.borrow(),
            vec!["spawn roscore", "run rosrun", "run rosrun", "stop roscore"]
        );
        assert!(!plan.runs()[0].raw_output_path.exists());

        let launcher = ScriptedLauncher::new(Mode::Good);
        let report = executor(&launcher, &config).execute(&plan).expect("second");
        assert_eq!(report.skipped, 2);
        assert_eq!(report.executed, 0);
        assert!(launcher.log.borrow().is_empty());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_artifact_aborts_by_default() {
        let (root, config) = setup("abort", &["MH_01_easy.bag", "MH_02_easy.bag"]);
        let plan = rovioli_plan(&config, 1);
        let launcher = ScriptedLauncher::new(Mode::NoOutput);
        let err = executor(&launcher, &config).execute(&plan).expect_err("abort");
        match &err {
            BenchError::RunIncomplete { path, command, .. } => {
                assert!(path.ends_with("rovioli_mvio_MH01_0.txt"));
                assert!(command.contains("rosrun rovioli"), "{}", command);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            *launcher.log.borrow(),
            vec!["spawn roscore", "run rosrun", "stop roscore"],
            "second run must not start and the broker must be stopped"
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_artifact_continues_under_continue_policy() {
        let (root, config) = setup("cont", &["MH_01_easy.bag", "MH_02_easy.bag"]);
        let plan = rovioli_plan(&config, 1);
        let launcher = ScriptedLauncher::new(Mode::NoOutput);
        let report = executor(&launcher, &config)
            .with_policy(MissingArtifactPolicy::Continue)
            .execute(&plan)
            .expect("continue");
        assert_eq!(report.executed, 2);
        assert_eq!(report.failed, 2);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn format_error_is_fatal_even_when_continuing() {
        let (root, config) = setup("fmt", &["MH_01_easy.bag", "MH_02_easy.bag"]);
        let plan = rovioli_plan(&config, 1);
        let launcher = ScriptedLauncher::new(Mode::WrongColumns);
        let err = executor(&launcher, &config)
            .with_policy(MissingArtifactPolicy::Continue)
            .execute(&plan)
            .expect_err("format");
        assert_eq!(err.code(), "format_error");
        assert!(!plan.runs()[0].output_path.exists());
        assert_eq!(
            *launcher.log.borrow(),
            vec!["spawn roscore", "run rosrun", "stop roscore"]
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn stale_raw_file_is_discarded_before_a_run() {
        let (root, config) = setup("stale", &["MH_01_easy.bag"]);
        let plan = rovioli_plan(&config, 1);
        fs::write(&plan.runs()[0].raw_output_path, "garbage").unwrap();
        let launcher = ScriptedLauncher::new(Mode::NoOutput);
        let err = executor(&launcher, &config).execute(&plan).expect_err("no output");
        assert_eq!(err.code(), "run_incomplete");
        assert!(!plan.runs()[0].raw_output_path.exists());
        let _ = fs::remove_dir_all(root);
    }
}
