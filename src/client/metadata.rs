/// Client for the MTD metadata web service
///
/// Fetches XML exports by instance, by user or by framework UUID and hands
/// them to the XML parser.
use crate::{
    config::MetadataServiceConfig,
    error::{SyncError, SyncResult},
    xml::{DatasetRecord, FrameworkRecord, MtdXmlParser},
};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const AF_BY_INSTANCE_PATH: &str = "/mtd/cadre/export/xml/GetRecordsByInstanceId";
const DS_BY_INSTANCE_PATH: &str = "/mtd/cadre/jdd/export/xml/GetRecordsByInstanceId";
const AF_BY_USER_PATH: &str = "/mtd/cadre/export/xml/GetRecordsByUserId";
const DS_BY_USER_PATH: &str = "/mtd/cadre/jdd/export/xml/GetRecordsByUserId";
const SINGLE_AF_PATH: &str = "/mtd/cadre/export/xml/GetRecordById";

/// Remote metadata service client
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http_client: Client,
    api_endpoint: Url,
    parser: MtdXmlParser,
}

impl MetadataClient {
    /// Create a new client from the metadata service configuration
    pub fn new(config: &MetadataServiceConfig) -> SyncResult<Self> {
        let api_endpoint = Url::parse(&config.api_endpoint).map_err(|e| {
            SyncError::Validation(format!(
                "Invalid metadata endpoint {}: {}",
                config.api_endpoint, e
            ))
        })?;

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_endpoint,
            parser: MtdXmlParser::from_config(config),
        })
    }

    /// Frameworks of a metadata instance
    pub async fn get_af_list(&self, id_instance: u32) -> SyncResult<Vec<FrameworkRecord>> {
        let url = self.url(AF_BY_INSTANCE_PATH, &id_instance.to_string())?;
        let body = self.fetch(url, false).await?.unwrap_or_default();
        self.parser.parse_frameworks(&body)
    }

    /// Datasets of a metadata instance
    pub async fn get_ds_list(&self, id_instance: u32) -> SyncResult<Vec<DatasetRecord>> {
        let url = self.url(DS_BY_INSTANCE_PATH, &id_instance.to_string())?;
        let body = self.fetch(url, false).await?.unwrap_or_default();
        self.parser.parse_datasets(&body)
    }

    /// Frameworks a user is an actor of; empty when the service knows no
    /// such user
    pub async fn get_af_user_list(&self, id_role: i64) -> SyncResult<Vec<FrameworkRecord>> {
        let url = self.url(AF_BY_USER_PATH, &id_role.to_string())?;
        match self.fetch(url, true).await? {
            Some(body) => self.parser.parse_frameworks(&body),
            None => Ok(Vec::new()),
        }
    }

    /// Datasets a user is an actor of; empty when the service knows no
    /// such user
    pub async fn get_ds_user_list(&self, id_role: i64) -> SyncResult<Vec<DatasetRecord>> {
        let url = self.url(DS_BY_USER_PATH, &id_role.to_string())?;
        match self.fetch(url, true).await? {
            Some(body) => self.parser.parse_datasets(&body),
            None => Ok(Vec::new()),
        }
    }

    /// A single framework by UUID
    pub async fn get_single_af(&self, uuid: Uuid) -> SyncResult<Option<FrameworkRecord>> {
        let url = self.url(SINGLE_AF_PATH, &uuid.to_string().to_uppercase())?;
        let body = self.fetch(url, false).await?.unwrap_or_default();
        self.parser.parse_single_framework(&body)
    }

    fn url(&self, path: &str, id: &str) -> SyncResult<Url> {
        let mut url = self
            .api_endpoint
            .join(path)
            .map_err(|e| SyncError::Internal(format!("Invalid request path {}: {}", path, e)))?;
        url.query_pairs_mut().append_pair("id", id);
        Ok(url)
    }

    /// GET a document. `Ok(None)` only for a 404 on a user-scoped query.
    async fn fetch(&self, url: Url, user_scoped: bool) -> SyncResult<Option<Vec<u8>>> {
        debug!("GET {}", url);

        let response = self.http_client.get(url.clone()).send().await?;
        let status = response.status();

        if user_scoped && status == StatusCode::NOT_FOUND {
            warn!("No metadata found for user query {}", url);
            return Ok(None);
        }

        if !status.is_success() {
            return Err(SyncError::Transport(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        Ok(Some(response.bytes().await?.to_vec()))
    }
}
