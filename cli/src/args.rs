use prds_client::{DatasetName, Location, ProjectId};
use std::path::PathBuf;
use structopt::StructOpt;
use url::Url;

/// prds provisions a PR-scoped BigQuery dataset, runs dbt against it and removes the
/// dataset again if any dbt step fails.
#[derive(Debug, StructOpt)]
#[structopt(
    name = "prds",
    global_settings = &[structopt::clap::AppSettings::ColoredHelp]
)]
pub struct Args {
    #[structopt(long = "project-id", alias = "project_id", env = "PRDS_PROJECT_ID")]
    /// GCP project the dataset lives in.
    pub project_id: ProjectId,

    #[structopt(long = "dataset-id", alias = "dataset_id", env = "PRDS_DATASET_ID")]
    /// BigQuery dataset name. Names containing `PD_` are created on start and dropped on
    /// failure.
    pub dataset_id: DatasetName,

    #[structopt(
        long = "credentials-json",
        alias = "credentials_json",
        env = "PRDS_CREDENTIALS_JSON",
        hide_env_values = true
    )]
    /// Service account key, as JSON.
    pub credentials_json: Option<String>,

    #[structopt(
        long = "credentials-file",
        env = "PRDS_CREDENTIALS_FILE",
        parse(from_os_str),
        conflicts_with = "credentials-json"
    )]
    /// Path to a service account key file. Alternative to `--credentials-json`.
    pub credentials_file: Option<PathBuf>,

    #[structopt(
        long = "dbt-path",
        alias = "dbt_path",
        env = "PRDS_DBT_PATH",
        parse(from_os_str)
    )]
    /// Path to the dbt project. Every dbt command runs in this directory.
    pub dbt_path: PathBuf,

    #[structopt(long = "dbt-target", alias = "dbt_target", env = "PRDS_DBT_TARGET")]
    /// dbt target to run against.
    pub dbt_target: String,

    #[structopt(long = "cleanup")]
    /// Only delete the dataset, without running dbt.
    pub cleanup: bool,

    #[structopt(long = "location", env = "PRDS_LOCATION", default_value = "us-central1")]
    /// Location of newly created datasets.
    pub location: Location,

    #[structopt(long = "dbt-executable", env = "PRDS_DBT_EXECUTABLE", default_value = "dbt")]
    /// dbt executable to invoke.
    pub dbt_executable: String,

    #[structopt(long = "endpoint", env = "PRDS_ENDPOINT", parse(try_from_str))]
    /// BigQuery API endpoint. Defaults to the public Google endpoint.
    pub endpoint: Option<Url>,

    #[structopt(short = "v", long = "verbose")]
    /// Enable more verbose logging.
    pub verbose: bool,
}
