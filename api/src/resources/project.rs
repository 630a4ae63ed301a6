use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::{Error, Result};

static RX_PROJECT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z0-9][A-Za-z0-9_:-]{0,127}$").expect("Project regex is valid"));

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct ProjectId(pub String);

impl FromStr for ProjectId {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        if RX_PROJECT_ID.is_match(string) {
            Ok(ProjectId(string.to_owned()))
        } else {
            Err(Error::BadProjectId {
                identifier: string.to_owned(),
            })
        }
    }
}

impl Display for ProjectId {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}", self.0)
    }
}
