use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::{
    error::{Error, Result},
    resources::project::ProjectId,
};

/// Datasets whose name contains this marker are scoped to a single pull request.
pub const EPHEMERAL_MARKER: &str = "PD_";

static RX_DATASET_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z0-9_]{1,1024}$").expect("Dataset name regex is valid"));

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub id: Option<String>,
    pub dataset_reference: Reference,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub last_modified_time: Option<String>,
}

impl Dataset {
    pub fn full_name(&self) -> FullName {
        FullName {
            project: self.dataset_reference.project_id.clone(),
            dataset: self.dataset_reference.dataset_id.clone(),
        }
    }

    /// Creation time; the API reports it as milliseconds since the epoch in a string.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_time
            .as_deref()
            .and_then(|millis| millis.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub project_id: ProjectId,
    pub dataset_id: Name,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Name {
    pub fn is_ephemeral(&self) -> bool {
        self.0.contains(EPHEMERAL_MARKER)
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        if RX_DATASET_NAME.is_match(string) {
            Ok(Name(string.into()))
        } else {
            Err(Error::BadDatasetName {
                identifier: string.into(),
            })
        }
    }
}

impl Display for Name {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}", self.0)
    }
}

/// A dataset qualified by its project, `<project>.<dataset>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullName {
    pub project: ProjectId,
    pub dataset: Name,
}

impl FullName {
    pub fn new(project: ProjectId, dataset: Name) -> Self {
        Self { project, dataset }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.dataset.is_ephemeral()
    }
}

impl FromStr for FullName {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        let bad_name = || Error::BadDatasetName {
            identifier: string.into(),
        };
        let (project, dataset) = string.split_once('.').ok_or_else(bad_name)?;
        Ok(FullName {
            project: project.parse().map_err(|_| bad_name())?,
            dataset: dataset.parse().map_err(|_| bad_name())?,
        })
    }
}

impl Display for FullName {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}.{}", self.project, self.dataset)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct Location(pub String);

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for Location {
    type Err = std::convert::Infallible;

    fn from_str(string: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Location(string.to_owned()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDataset<'request> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<&'request Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'request str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateRequest<'request> {
    pub dataset_reference: &'request Reference,
    #[serde(flatten)]
    pub dataset: NewDataset<'request>,
}

/// Whether deleting a dataset also drops the tables it contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteContents {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteQuery {
    pub delete_contents: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn full_name_splits_on_first_dot() {
        let name: FullName = "my-project.PD_pr123".parse().unwrap();
        assert_eq!(name.project, ProjectId("my-project".to_owned()));
        assert_eq!(name.dataset, Name("PD_pr123".to_owned()));
        assert_eq!(name.to_string(), "my-project.PD_pr123");
    }

    #[test]
    fn full_name_rejects_malformed() {
        for bad in ["no-dot", ".dataset", "project.", "project.with-dash", "p.a.b"] {
            assert!(
                matches!(
                    bad.parse::<FullName>(),
                    Err(Error::BadDatasetName { ref identifier }) if identifier == bad
                ),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn ephemeral_names_contain_marker() {
        assert!(Name("PD_pr123".to_owned()).is_ephemeral());
        assert!(Name("analytics_PD_42".to_owned()).is_ephemeral());
        assert!(!Name("nightly_run".to_owned()).is_ephemeral());
        assert!(!Name("pd_lowercase".to_owned()).is_ephemeral());
    }

    #[test]
    fn create_request_wire_format() {
        let reference = Reference {
            project_id: ProjectId("proj".to_owned()),
            dataset_id: Name("PD_pr123".to_owned()),
        };
        let location = Location("us-central1".to_owned());
        let request = CreateRequest {
            dataset_reference: &reference,
            dataset: NewDataset {
                location: Some(&location),
                description: None,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "datasetReference": { "projectId": "proj", "datasetId": "PD_pr123" },
                "location": "us-central1",
            })
        );
    }

    #[test]
    fn dataset_creation_time_is_parsed() {
        let dataset: Dataset = serde_json::from_value(json!({
            "kind": "bigquery#dataset",
            "id": "proj:PD_pr123",
            "datasetReference": { "projectId": "proj", "datasetId": "PD_pr123" },
            "location": "us-central1",
            "creationTime": "1690000000000",
        }))
        .unwrap();
        assert_eq!(dataset.full_name().to_string(), "proj.PD_pr123");
        assert_eq!(
            dataset.created_at(),
            Some(Utc.timestamp_opt(1_690_000_000, 0).unwrap())
        );
    }
}
