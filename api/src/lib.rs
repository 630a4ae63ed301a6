#![deny(clippy::all)]
pub mod auth;
mod error;
pub mod resources;

use log::debug;
use once_cell::sync::Lazy;
use reqwest::{
    blocking::{Client as HttpClient, Response as HttpResponse},
    header::{self, HeaderMap, HeaderValue},
    Method, Proxy,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::resources::{
    api_error,
    dataset::{CreateRequest as CreateDatasetRequest, DeleteQuery as DeleteDatasetQuery},
};

pub use reqwest::StatusCode;

pub use crate::{
    auth::{ServiceAccountKey, Token, BIGQUERY_SCOPE},
    error::{Error, Result},
    resources::{
        dataset::{
            Dataset, DeleteContents, FullName as DatasetFullName, Location, Name as DatasetName,
            NewDataset, Reference as DatasetReference, EPHEMERAL_MARKER,
        },
        project::ProjectId,
    },
};

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: Url,
    /// Project the client is bound to. Falls back to the `project_id` of the service account key.
    pub project: Option<ProjectId>,
    pub accept_invalid_certificates: bool,
    pub proxy: Option<Url>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            endpoint: DEFAULT_ENDPOINT.clone(),
            project: None,
            accept_invalid_certificates: false,
            proxy: None,
        }
    }
}

#[derive(Debug)]
pub struct Client {
    endpoints: Endpoints,
    http_client: HttpClient,
    headers: HeaderMap,
    project: ProjectId,
}

impl Client {
    /// Authenticate with a service account key and create a client bound to a project.
    ///
    /// The key is exchanged for an access token straight away, so rejected credentials are
    /// reported here rather than on the first dataset operation.
    pub fn new(config: Config, credentials: &ServiceAccountKey) -> Result<Client> {
        let http_client = build_http_client(&config)?;
        let project = config
            .project
            .or_else(|| credentials.project_id.clone())
            .ok_or_else(|| Error::BadCredentials {
                message: "no project given and the key has no `project_id`".to_owned(),
            })?;
        let token = credentials.fetch_token(&http_client, BIGQUERY_SCOPE)?;
        Self::with_token(config.endpoint, http_client, project, &token)
    }

    fn with_token(
        endpoint: Url,
        http_client: HttpClient,
        project: ProjectId,
        token: &Token,
    ) -> Result<Client> {
        let headers = build_headers(token)?;
        let endpoints = Endpoints::new(endpoint)?;
        Ok(Client {
            endpoints,
            http_client,
            headers,
            project,
        })
    }

    /// Get the base url for the client
    pub fn base_url(&self) -> &Url {
        &self.endpoints.base
    }

    /// The project this client was authenticated for.
    pub fn project(&self) -> &ProjectId {
        &self.project
    }

    pub fn get_dataset(&self, dataset_name: &DatasetFullName) -> Result<Dataset> {
        self.get(self.endpoints.dataset(dataset_name)?)
    }

    /// Create a dataset. An existing dataset with the same name is returned as is.
    pub fn create_dataset(
        &self,
        dataset_name: &DatasetFullName,
        options: NewDataset<'_>,
    ) -> Result<Dataset> {
        let reference = DatasetReference {
            project_id: dataset_name.project.clone(),
            dataset_id: dataset_name.dataset.clone(),
        };
        let result = self.post(
            self.endpoints.datasets(&dataset_name.project)?,
            CreateDatasetRequest {
                dataset_reference: &reference,
                dataset: options,
            },
        );
        match result {
            Err(Error::Api { status_code, .. }) if status_code == StatusCode::CONFLICT => {
                debug!("Dataset `{}` already exists", dataset_name);
                self.get_dataset(dataset_name)
            }
            result => result,
        }
    }

    /// Delete a dataset. Deleting a dataset which does not exist is not an error.
    pub fn delete_dataset(
        &self,
        dataset_name: &DatasetFullName,
        delete_contents: DeleteContents,
    ) -> Result<()> {
        let query = DeleteDatasetQuery {
            delete_contents: delete_contents == DeleteContents::Yes,
        };
        match self.delete_query(self.endpoints.dataset(dataset_name)?, Some(&query)) {
            Err(Error::Api { status_code, .. }) if status_code == StatusCode::NOT_FOUND => {
                debug!("Dataset `{}` does not exist", dataset_name);
                Ok(())
            }
            result => result,
        }
    }

    fn get<SuccessT>(&self, url: Url) -> Result<SuccessT>
    where
        for<'de> SuccessT: Deserialize<'de>,
    {
        self.request(Method::GET, url, None::<&()>, None::<&()>)
    }

    fn post<RequestT, SuccessT>(&self, url: Url, request: RequestT) -> Result<SuccessT>
    where
        RequestT: Serialize,
        for<'de> SuccessT: Deserialize<'de>,
    {
        self.request(Method::POST, url, Some(&request), None::<&()>)
    }

    fn delete_query<QueryT>(&self, url: Url, query: Option<&QueryT>) -> Result<()>
    where
        QueryT: Serialize,
    {
        let http_response = self.raw_request(Method::DELETE, url, None::<&()>, query)?;
        if http_response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(http_response))
        }
    }

    fn raw_request<RequestT, QueryT>(
        &self,
        method: Method,
        url: Url,
        body: Option<&RequestT>,
        query: Option<&QueryT>,
    ) -> Result<HttpResponse>
    where
        RequestT: Serialize,
        QueryT: Serialize,
    {
        debug!("Attempting {} `{}`", method, url);
        let request = self
            .http_client
            .request(method.clone(), url)
            .headers(self.headers.clone());
        let request = match query {
            Some(query) => request.query(query),
            None => request,
        };
        let request = match body {
            Some(body) => request.json(body),
            None => request,
        };
        request.send().map_err(|source| Error::ReqwestError {
            source,
            message: format!("{method} operation failed."),
        })
    }

    fn request<RequestT, QueryT, SuccessT>(
        &self,
        method: Method,
        url: Url,
        body: Option<&RequestT>,
        query: Option<&QueryT>,
    ) -> Result<SuccessT>
    where
        RequestT: Serialize,
        QueryT: Serialize,
        for<'de> SuccessT: Deserialize<'de>,
    {
        let http_response = self.raw_request(method, url, body, query)?;
        if !http_response.status().is_success() {
            return Err(api_error(http_response));
        }
        http_response
            .json::<SuccessT>()
            .map_err(Error::BadJsonResponse)
    }
}

#[derive(Debug)]
struct Endpoints {
    base: Url,
}

fn construct_endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut endpoint = base.clone();

    let mut endpoint_segments = endpoint
        .path_segments_mut()
        .map_err(|_| Error::BadEndpoint {
            endpoint: base.clone(),
        })?;

    endpoint_segments.pop_if_empty();
    for segment in segments {
        endpoint_segments.push(segment);
    }

    drop(endpoint_segments);

    Ok(endpoint)
}

impl Endpoints {
    pub fn new(base: Url) -> Result<Self> {
        // Fail early on bases such as `mailto:` which cannot take path segments.
        construct_endpoint(&base, &[])?;
        Ok(Endpoints { base })
    }

    fn datasets(&self, project: &ProjectId) -> Result<Url> {
        construct_endpoint(&self.base, &["projects", &project.0, "datasets"])
    }

    fn dataset(&self, dataset_name: &DatasetFullName) -> Result<Url> {
        construct_endpoint(
            &self.base,
            &[
                "projects",
                &dataset_name.project.0,
                "datasets",
                &dataset_name.dataset.0,
            ],
        )
    }
}

const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 120;

fn build_http_client(config: &Config) -> Result<HttpClient> {
    let mut builder = HttpClient::builder()
        .gzip(true)
        .danger_accept_invalid_certs(config.accept_invalid_certificates)
        .timeout(Some(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS)));

    if let Some(proxy) = config.proxy.clone() {
        builder = builder.proxy(Proxy::all(proxy).map_err(Error::BuildHttpClient)?);
    }
    builder.build().map_err(Error::BuildHttpClient)
}

fn build_headers(token: &Token) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut authorization =
        HeaderValue::from_str(&format!("Bearer {}", &token.0)).map_err(|_| Error::BadToken {
            token: token.0.clone(),
        })?;
    authorization.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, authorization);
    Ok(headers)
}

pub static DEFAULT_ENDPOINT: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://bigquery.googleapis.com/bigquery/v2").expect("Default URL is well-formed")
});
