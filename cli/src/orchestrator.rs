use log::{error, info};
use prds_client::{
    Client, Config as ClientConfig, DatasetFullName, DeleteContents, Error as ClientError,
    Location, NewDataset, ServiceAccountKey,
};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io,
    path::PathBuf,
};
use thiserror::Error;

use crate::{
    logging::log_error_chain,
    process::ProcessRunner,
    steps::{StepCommand, TransformStep},
};

/// The warehouse operations the orchestrator depends on. Both are idempotent.
pub trait DatasetStore {
    fn create_dataset(
        &self,
        dataset: &DatasetFullName,
        location: &Location,
    ) -> prds_client::Result<()>;

    /// Deletes the dataset and everything in it.
    fn delete_dataset(&self, dataset: &DatasetFullName) -> prds_client::Result<()>;
}

impl DatasetStore for Client {
    fn create_dataset(
        &self,
        dataset: &DatasetFullName,
        location: &Location,
    ) -> prds_client::Result<()> {
        Client::create_dataset(
            self,
            dataset,
            NewDataset {
                location: Some(location),
                description: None,
            },
        )
        .map(|_| ())
    }

    fn delete_dataset(&self, dataset: &DatasetFullName) -> prds_client::Result<()> {
        Client::delete_dataset(self, dataset, DeleteContents::Yes)
    }
}

/// One invocation's worth of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub dataset: DatasetFullName,
    pub location: Location,
    pub working_dir: PathBuf,
    pub target: String,
    pub executable: String,
    pub cleanup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Cleanup mode: the dataset was removed and nothing else ran.
    CleanedUp,
    /// Every step succeeded. The dataset is left in place.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetOperation {
    Create,
    Delete,
}

impl Display for DatasetOperation {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str(match self {
            DatasetOperation::Create => "create",
            DatasetOperation::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("Command `{command}` exited with {}", describe_exit(.exit_code))]
    Exited {
        step: TransformStep,
        command: StepCommand,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Could not start command `{command}`")]
    Spawn {
        step: TransformStep,
        command: StepCommand,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    pub fn step(&self) -> TransformStep {
        match self {
            StepError::Exited { step, .. } | StepError::Spawn { step, .. } => *step,
        }
    }
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by a signal)".to_owned(),
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Could not authenticate with BigQuery")]
    Authentication(#[source] ClientError),

    #[error("Operation to {operation} dataset `{dataset}` has failed")]
    DatasetOperation {
        operation: DatasetOperation,
        dataset: DatasetFullName,
        #[source]
        source: ClientError,
    },

    #[error("The dbt {} step failed", .0.step())]
    Step(#[from] StepError),
}

/// Parse the service account key and exchange it for an authenticated client.
pub fn authenticate(credentials_json: &str, config: ClientConfig) -> Result<Client, RunError> {
    let key: ServiceAccountKey = credentials_json.parse().map_err(RunError::Authentication)?;
    Client::new(config, &key).map_err(RunError::Authentication)
}

pub struct Orchestrator<StoreT, RunnerT> {
    store: StoreT,
    runner: RunnerT,
}

impl<StoreT, RunnerT> Orchestrator<StoreT, RunnerT>
where
    StoreT: DatasetStore,
    RunnerT: ProcessRunner,
{
    pub fn new(store: StoreT, runner: RunnerT) -> Self {
        Self { store, runner }
    }

    pub fn run(&self, job: &Job) -> Result<Outcome, RunError> {
        if job.cleanup {
            self.remove_dataset(&job.dataset)?;
            return Ok(Outcome::CleanedUp);
        }

        let ephemeral = job.dataset.is_ephemeral();
        if ephemeral {
            info!("DATASET ID: {}", job.dataset);
            self.ensure_dataset(&job.dataset, &job.location)?;
        }

        match self.run_steps(job) {
            Ok(()) => Ok(Outcome::Completed),
            Err(step_error) => {
                error!("{step_error}");
                if ephemeral {
                    error!("Cleaning up PR dataset `{}` due to failure.", job.dataset);
                    // The step failure is what gets reported; a failed cleanup is only logged.
                    if let Err(cleanup_error) = self.remove_dataset(&job.dataset) {
                        log_error_chain(&cleanup_error);
                    }
                }
                Err(RunError::Step(step_error))
            }
        }
    }

    fn ensure_dataset(
        &self,
        dataset: &DatasetFullName,
        location: &Location,
    ) -> Result<(), RunError> {
        self.store
            .create_dataset(dataset, location)
            .map_err(|source| RunError::DatasetOperation {
                operation: DatasetOperation::Create,
                dataset: dataset.clone(),
                source,
            })?;
        info!("Created dataset {}", dataset.dataset);
        Ok(())
    }

    fn remove_dataset(&self, dataset: &DatasetFullName) -> Result<(), RunError> {
        self.store
            .delete_dataset(dataset)
            .map_err(|source| RunError::DatasetOperation {
                operation: DatasetOperation::Delete,
                dataset: dataset.clone(),
                source,
            })?;
        info!("Deleted dataset {}", dataset);
        Ok(())
    }

    fn run_steps(&self, job: &Job) -> Result<(), StepError> {
        for step in TransformStep::SEQUENCE {
            self.run_step(step, job)?;
        }
        Ok(())
    }

    fn run_step(&self, step: TransformStep, job: &Job) -> Result<(), StepError> {
        let command = step.command(&job.executable, &job.target);
        let output = match self.runner.run(&command, &job.working_dir) {
            Ok(output) => output,
            Err(source) => {
                error!("Command failed: {command}");
                return Err(StepError::Spawn {
                    step,
                    command,
                    source,
                });
            }
        };

        if !output.success() {
            error!("Command failed: {command}");
            error!("{}", output.stderr);
            error!("STDOUT: {}", output.stdout);
            return Err(StepError::Exited {
                step,
                command,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        info!("{}", output.stdout);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::StepOutput;
    use pretty_assertions::assert_eq;
    use prds_client::StatusCode;
    use std::{cell::RefCell, path::Path, rc::Rc};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Create(String),
        Delete(String),
        Step(&'static str),
    }

    type Journal = Rc<RefCell<Vec<Event>>>;

    struct FakeStore {
        journal: Journal,
        fail_create: bool,
        fail_delete: bool,
    }

    fn warehouse_error() -> ClientError {
        ClientError::Api {
            status_code: StatusCode::FORBIDDEN,
            message: "PERMISSION_DENIED: Access Denied".to_owned(),
        }
    }

    impl DatasetStore for FakeStore {
        fn create_dataset(
            &self,
            dataset: &DatasetFullName,
            location: &Location,
        ) -> prds_client::Result<()> {
            assert_eq!(location.0, "us-central1");
            self.journal
                .borrow_mut()
                .push(Event::Create(dataset.to_string()));
            if self.fail_create {
                Err(warehouse_error())
            } else {
                Ok(())
            }
        }

        fn delete_dataset(&self, dataset: &DatasetFullName) -> prds_client::Result<()> {
            self.journal
                .borrow_mut()
                .push(Event::Delete(dataset.to_string()));
            if self.fail_delete {
                Err(warehouse_error())
            } else {
                Ok(())
            }
        }
    }

    struct FakeRunner {
        journal: Journal,
        fail_on: Option<TransformStep>,
        spawn_error: bool,
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, command: &StepCommand, working_dir: &Path) -> io::Result<StepOutput> {
            assert_eq!(working_dir, Path::new("/srv/dbt"));
            assert_eq!(command.program, "dbt");
            let step = TransformStep::SEQUENCE
                .into_iter()
                .find(|step| step.subcommand() == command.args[0])
                .expect("known subcommand");
            self.journal
                .borrow_mut()
                .push(Event::Step(step.subcommand()));

            if self.fail_on == Some(step) {
                if self.spawn_error {
                    return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
                }
                return Ok(StepOutput {
                    exit_code: Some(1),
                    stdout: "1 of 3 FAIL".to_owned(),
                    stderr: "Failure in test not_null_orders_id".to_owned(),
                });
            }
            Ok(StepOutput {
                exit_code: Some(0),
                stdout: format!("{} ok", step.subcommand()),
                stderr: String::new(),
            })
        }
    }

    struct Harness {
        journal: Journal,
        orchestrator: Orchestrator<FakeStore, FakeRunner>,
    }

    #[derive(Default)]
    struct Faults {
        fail_on: Option<TransformStep>,
        spawn_error: bool,
        fail_create: bool,
        fail_delete: bool,
    }

    fn setup(faults: Faults) -> Harness {
        let journal = Journal::default();
        let orchestrator = Orchestrator::new(
            FakeStore {
                journal: journal.clone(),
                fail_create: faults.fail_create,
                fail_delete: faults.fail_delete,
            },
            FakeRunner {
                journal: journal.clone(),
                fail_on: faults.fail_on,
                spawn_error: faults.spawn_error,
            },
        );
        Harness {
            journal,
            orchestrator,
        }
    }

    fn job(dataset: &str, cleanup: bool) -> Job {
        Job {
            dataset: format!("my-project.{dataset}").parse().unwrap(),
            location: Location("us-central1".to_owned()),
            working_dir: PathBuf::from("/srv/dbt"),
            target: "ci".to_owned(),
            executable: "dbt".to_owned(),
            cleanup,
        }
    }

    fn events(harness: &Harness) -> Vec<Event> {
        harness.journal.borrow().clone()
    }

    const ALL_STEPS: [Event; 4] = [
        Event::Step("deps"),
        Event::Step("debug"),
        Event::Step("test"),
        Event::Step("run"),
    ];

    #[test]
    fn ephemeral_success_keeps_dataset() {
        let harness = setup(Faults::default());
        let outcome = harness.orchestrator.run(&job("PD_pr123", false)).unwrap();

        assert_eq!(outcome, Outcome::Completed);
        let mut expected = vec![Event::Create("my-project.PD_pr123".to_owned())];
        expected.extend(ALL_STEPS);
        assert_eq!(events(&harness), expected);
    }

    #[test]
    fn ephemeral_failure_deletes_dataset_once() {
        let harness = setup(Faults {
            fail_on: Some(TransformStep::Test),
            ..Default::default()
        });
        let error = harness
            .orchestrator
            .run(&job("PD_pr123", false))
            .unwrap_err();

        match &error {
            RunError::Step(StepError::Exited {
                step,
                exit_code,
                stdout,
                stderr,
                ..
            }) => {
                assert_eq!(*step, TransformStep::Test);
                assert_eq!(*exit_code, Some(1));
                assert_eq!(stdout, "1 of 3 FAIL");
                assert_eq!(stderr, "Failure in test not_null_orders_id");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(error.to_string(), "The dbt validation step failed");
        assert_eq!(
            events(&harness),
            [
                Event::Create("my-project.PD_pr123".to_owned()),
                Event::Step("deps"),
                Event::Step("debug"),
                Event::Step("test"),
                Event::Delete("my-project.PD_pr123".to_owned()),
            ]
        );
    }

    #[test]
    fn failure_at_each_step_stops_the_sequence() {
        for (index, failing) in TransformStep::SEQUENCE.into_iter().enumerate() {
            let harness = setup(Faults {
                fail_on: Some(failing),
                ..Default::default()
            });
            let error = harness
                .orchestrator
                .run(&job("PD_pr123", false))
                .unwrap_err();
            assert!(matches!(error, RunError::Step(ref step_error) if step_error.step() == failing));

            let mut expected = vec![Event::Create("my-project.PD_pr123".to_owned())];
            expected.extend(ALL_STEPS[..=index].iter().cloned());
            expected.push(Event::Delete("my-project.PD_pr123".to_owned()));
            assert_eq!(events(&harness), expected);
        }
    }

    #[test]
    fn persistent_dataset_is_never_created_or_deleted() {
        let harness = setup(Faults::default());
        assert_eq!(
            harness.orchestrator.run(&job("nightly_run", false)).unwrap(),
            Outcome::Completed
        );
        assert_eq!(events(&harness), ALL_STEPS);

        let harness = setup(Faults {
            fail_on: Some(TransformStep::Debug),
            ..Default::default()
        });
        let error = harness
            .orchestrator
            .run(&job("nightly_run", false))
            .unwrap_err();
        assert!(matches!(error, RunError::Step(_)));
        assert_eq!(
            events(&harness),
            [Event::Step("deps"), Event::Step("debug")]
        );
    }

    #[test]
    fn cleanup_only_deletes() {
        for dataset in ["PD_pr123", "nightly_run"] {
            let harness = setup(Faults::default());
            assert_eq!(
                harness.orchestrator.run(&job(dataset, true)).unwrap(),
                Outcome::CleanedUp
            );
            assert_eq!(
                events(&harness),
                [Event::Delete(format!("my-project.{dataset}"))]
            );
        }
    }

    #[test]
    fn cleanup_delete_failure_is_reported() {
        let harness = setup(Faults {
            fail_delete: true,
            ..Default::default()
        });
        let error = harness.orchestrator.run(&job("PD_pr123", true)).unwrap_err();
        assert!(matches!(
            error,
            RunError::DatasetOperation {
                operation: DatasetOperation::Delete,
                ..
            }
        ));
        assert_eq!(
            error.to_string(),
            "Operation to delete dataset `my-project.PD_pr123` has failed"
        );
    }

    #[test]
    fn failed_cleanup_does_not_mask_step_failure() {
        let harness = setup(Faults {
            fail_on: Some(TransformStep::Run),
            fail_delete: true,
            ..Default::default()
        });
        let error = harness
            .orchestrator
            .run(&job("PD_pr123", false))
            .unwrap_err();
        assert!(matches!(
            error,
            RunError::Step(ref step_error) if step_error.step() == TransformStep::Run
        ));
        assert_eq!(
            events(&harness).last(),
            Some(&Event::Delete("my-project.PD_pr123".to_owned()))
        );
    }

    #[test]
    fn create_failure_runs_no_steps() {
        let harness = setup(Faults {
            fail_create: true,
            ..Default::default()
        });
        let error = harness
            .orchestrator
            .run(&job("PD_pr123", false))
            .unwrap_err();
        assert!(matches!(
            error,
            RunError::DatasetOperation {
                operation: DatasetOperation::Create,
                ..
            }
        ));
        assert_eq!(
            events(&harness),
            [Event::Create("my-project.PD_pr123".to_owned())]
        );
    }

    #[test]
    fn spawn_failure_is_a_step_failure() {
        let harness = setup(Faults {
            fail_on: Some(TransformStep::Deps),
            spawn_error: true,
            ..Default::default()
        });
        let error = harness
            .orchestrator
            .run(&job("PD_pr123", false))
            .unwrap_err();
        match error {
            RunError::Step(StepError::Spawn { step, command, .. }) => {
                assert_eq!(step, TransformStep::Deps);
                assert_eq!(command.to_string(), "dbt deps");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            events(&harness),
            [
                Event::Create("my-project.PD_pr123".to_owned()),
                Event::Step("deps"),
                Event::Delete("my-project.PD_pr123".to_owned()),
            ]
        );
    }

    #[test]
    fn malformed_credentials_fail_authentication() {
        let error = authenticate("{not json", ClientConfig::default()).unwrap_err();
        assert!(matches!(
            error,
            RunError::Authentication(ClientError::BadCredentials { .. })
        ));
    }

    #[test]
    fn exit_description() {
        assert_eq!(describe_exit(&Some(2)), "status 2");
        assert_eq!(
            describe_exit(&None),
            "no status (terminated by a signal)"
        );
    }
}
