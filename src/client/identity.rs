/// Client for the identity lookup service (user records by numeric id)
use crate::{
    config::IdentityServiceConfig,
    error::{SyncError, SyncResult},
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// User record as returned by the identity service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteUser {
    pub id: Option<i64>,
    pub login: Option<String>,
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub email: Option<String>,
    /// Organism id, sent either as a number or a numeric string
    pub code_organisme: Option<serde_json::Value>,
    pub libelle_long_organisme: Option<String>,
}

impl RemoteUser {
    /// Numeric organism id, if any
    pub fn organism_id(&self) -> Option<i64> {
        match self.code_organisme.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Identity lookup client
#[derive(Debug, Clone)]
pub struct IdentityClient {
    http_client: Client,
    base_url: String,
    user: String,
    password: String,
}

impl IdentityClient {
    pub fn new(config: &IdentityServiceConfig, timeout_secs: u64) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    /// Fetch a user by id. Any answer but 200 means "unknown user".
    pub async fn get_user(&self, id: i64) -> SyncResult<Option<RemoteUser>> {
        if self.base_url.is_empty() {
            warn!("Identity service not configured, cannot look up user {}", id);
            return Ok(None);
        }

        let url = format!("{}/rechercheParId/{}", self.base_url, id);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            warn!("Identity service returned {} for user {}", response.status(), id);
            return Ok(None);
        }

        Ok(Some(response.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::{header::AUTHORIZATION, HeaderMap, StatusCode as HttpStatus},
        routing::get,
        Json, Router,
    };

    async fn spawn_mock() -> String {
        let app = Router::new().route(
            "/cas/rechercheParId/:id",
            get(|Path(id): Path<i64>, headers: HeaderMap| async move {
                // "mtd:secret"
                let authorized = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    == Some("Basic bXRkOnNlY3JldA==");
                if !authorized {
                    return Err(HttpStatus::UNAUTHORIZED);
                }
                if id != 1001 {
                    return Err(HttpStatus::NOT_FOUND);
                }
                Ok(Json(serde_json::json!({
                    "id": 1001,
                    "login": "mdupont",
                    "nom": "DUPONT",
                    "prenom": "Marie",
                    "email": "marie.dupont@example.org",
                    "codeOrganisme": "12",
                    "libelleLongOrganisme": "Conservatoire des espaces naturels"
                })))
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/cas/", addr)
    }

    fn client(base_url: String, password: &str) -> IdentityClient {
        let config = IdentityServiceConfig {
            base_url,
            user: "mtd".to_string(),
            password: password.to_string(),
        };
        IdentityClient::new(&config, 5).unwrap()
    }

    #[tokio::test]
    async fn test_get_user() {
        let client = client(spawn_mock().await, "secret");
        let user = client.get_user(1001).await.unwrap().unwrap();
        assert_eq!(user.login.as_deref(), Some("mdupont"));
        assert_eq!(user.organism_id(), Some(12));
    }

    #[tokio::test]
    async fn test_unknown_or_unauthorized_user_is_none() {
        let base_url = spawn_mock().await;
        assert!(client(base_url.clone(), "secret")
            .get_user(7)
            .await
            .unwrap()
            .is_none());
        assert!(client(base_url, "wrong")
            .get_user(1001)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_service() {
        assert!(client(String::new(), "secret")
            .get_user(1001)
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_organism_id_forms() {
        let mut user = RemoteUser {
            code_organisme: Some(serde_json::json!(5)),
            ..Default::default()
        };
        assert_eq!(user.organism_id(), Some(5));
        user.code_organisme = Some(serde_json::Value::Null);
        assert_eq!(user.organism_id(), None);
        user.code_organisme = None;
        assert_eq!(user.organism_id(), None);
    }
}
