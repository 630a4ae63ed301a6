use std::fmt::{Display, Formatter, Result as FmtResult};

/// Profiles are looked up in the dbt project itself.
const PROFILES_DIR: &str = ".";

/// One stage of the dbt run, in the order they have to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformStep {
    Deps,
    Debug,
    Test,
    Run,
}

impl TransformStep {
    pub const SEQUENCE: [TransformStep; 4] = [
        TransformStep::Deps,
        TransformStep::Debug,
        TransformStep::Test,
        TransformStep::Run,
    ];

    pub fn subcommand(self) -> &'static str {
        match self {
            TransformStep::Deps => "deps",
            TransformStep::Debug => "debug",
            TransformStep::Test => "test",
            TransformStep::Run => "run",
        }
    }

    /// `dbt deps` only fetches packages and does not need a connection profile.
    fn uses_target(self) -> bool {
        !matches!(self, TransformStep::Deps)
    }

    pub fn command(self, executable: &str, target: &str) -> StepCommand {
        let mut args = vec![self.subcommand().to_owned()];
        if self.uses_target() {
            args.extend([
                "--profiles-dir".to_owned(),
                PROFILES_DIR.to_owned(),
                "--target".to_owned(),
                target.to_owned(),
            ]);
        }
        StepCommand {
            program: executable.to_owned(),
            args,
        }
    }
}

impl Display for TransformStep {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str(match self {
            TransformStep::Deps => "dependency resolution",
            TransformStep::Debug => "connectivity check",
            TransformStep::Test => "validation",
            TransformStep::Run => "execution",
        })
    }
}

/// A program and its arguments. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Display for StepCommand {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}", quoted(&self.program))?;
        for arg in &self.args {
            write!(formatter, " {}", quoted(arg))?;
        }
        Ok(())
    }
}

fn quoted(word: &str) -> String {
    let is_plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@+,".contains(c));
    if is_plain {
        word.to_owned()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
