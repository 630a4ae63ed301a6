use anyhow::{anyhow, Context, Result};
use log::debug;
use prds_client::{Config as ClientConfig, DatasetFullName};
use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use crate::{args::Args, orchestrator::Job};

/// Where the service account key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Inline(String),
    File(PathBuf),
}

impl CredentialSource {
    pub fn load(&self) -> Result<String> {
        match self {
            CredentialSource::Inline(json) => Ok(json.clone()),
            CredentialSource::File(path) => read_credentials_file(path),
        }
    }
}

/// Everything one invocation needs, validated from the command line.
#[derive(Debug)]
pub struct RunConfig {
    pub job: Job,
    pub credentials: CredentialSource,
    pub client: ClientConfig,
}

impl RunConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let credentials = match (&args.credentials_json, &args.credentials_file) {
            (Some(json), None) => CredentialSource::Inline(json.clone()),
            (None, Some(path)) => CredentialSource::File(path.clone()),
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "Only one of `--credentials-json` and `--credentials-file` may be given."
                ))
            }
            (None, None) => {
                return Err(anyhow!(
                    "Service account credentials are required, pass `--credentials-json` or `--credentials-file`."
                ))
            }
        };

        let job = Job {
            dataset: DatasetFullName::new(args.project_id.clone(), args.dataset_id.clone()),
            location: args.location.clone(),
            working_dir: args.dbt_path.clone(),
            target: args.dbt_target.clone(),
            executable: args.dbt_executable.clone(),
            cleanup: args.cleanup,
        };

        let mut client = ClientConfig {
            project: Some(args.project_id.clone()),
            ..Default::default()
        };
        if let Some(endpoint) = &args.endpoint {
            client.endpoint = endpoint.clone();
        }

        Ok(RunConfig {
            job,
            credentials,
            client,
        })
    }
}

fn read_credentials_file(path: impl AsRef<Path>) -> Result<String> {
    debug!(
        "Reading credentials file at `{}`",
        path.as_ref().display()
    );
    let file = File::open(&path).with_context(|| {
        format!(
            "Could not open credentials file `{}`",
            path.as_ref().display()
        )
    })?;
    let mut contents = String::new();
    BufReader::new(file)
        .read_to_string(&mut contents)
        .with_context(|| {
            format!(
                "Could not read credentials file `{}`",
                path.as_ref().display()
            )
        })?;
    Ok(contents)
}
