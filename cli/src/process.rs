use log::debug;
use std::{
    io,
    path::Path,
    process::{Command, Output, Stdio},
};

use crate::steps::StepCommand;

/// What a finished command left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutput {
    /// `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl From<Output> for StepOutput {
    fn from(output: Output) -> Self {
        StepOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

pub trait ProcessRunner {
    /// Run `command` in `working_dir` to completion, capturing its output.
    fn run(&self, command: &StepCommand, working_dir: &Path) -> io::Result<StepOutput>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &StepCommand, working_dir: &Path) -> io::Result<StepOutput> {
        debug!("Running `{}` in `{}`", command, working_dir.display());
        Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .output()
            .map(StepOutput::from)
    }
}
