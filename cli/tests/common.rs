use once_cell::sync::Lazy;
use std::{
    ffi::OsStr,
    path::PathBuf,
    process::{Command, Output},
};

/// RSA key used to sign assertions in tests; the mock token endpoint does not verify them.
pub const TEST_PRIVATE_KEY: &str = include_str!("../../api/testdata/test_key.pem");

const INHERITED_ENV_VARIABLES: [&str; 9] = [
    "PRDS_PROJECT_ID",
    "PRDS_DATASET_ID",
    "PRDS_CREDENTIALS_JSON",
    "PRDS_CREDENTIALS_FILE",
    "PRDS_DBT_PATH",
    "PRDS_DBT_TARGET",
    "PRDS_LOCATION",
    "PRDS_DBT_EXECUTABLE",
    "PRDS_ENDPOINT",
];

pub struct TestCli {
    cli_path: PathBuf,
}

impl TestCli {
    pub fn get() -> &'static Self {
        static TEST_CLI: Lazy<TestCli> = Lazy::new(|| TestCli {
            cli_path: PathBuf::from(env!("CARGO_BIN_EXE_prds")),
        });

        &TEST_CLI
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.cli_path);
        for name in INHERITED_ENV_VARIABLES {
            command.env_remove(name);
        }
        command.env_remove("RUST_LOG").env("NO_COLOR", "1");
        command
    }

    /// Run to completion and return the log output, panicking if the command failed.
    pub fn run(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> String {
        let output = self.output(args);

        if !output.status.success() {
            panic!(
                "failed to run command:\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        String::from_utf8(output.stderr).unwrap()
    }

    /// Run to completion and return the log output, panicking if the command succeeded.
    pub fn run_and_error(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> String {
        let output = self.output(args);

        if output.status.success() {
            panic!(
                "succeeded running command (expected failure):\n{}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        assert_eq!(output.status.code(), Some(1));

        String::from_utf8(output.stderr).unwrap()
    }

    pub fn output(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Output {
        self.command().args(args).output().unwrap()
    }
}
