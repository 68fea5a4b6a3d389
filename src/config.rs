/// Configuration management for MTD synchronization
use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default element namespace of the MTD XML exports
pub const DEFAULT_XML_NAMESPACE: &str = "http://inpn.mnhn.fr/mtd";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub metadata: MetadataServiceConfig,
    pub identity: IdentityServiceConfig,
    pub provisioning: ProvisioningConfig,
    /// Module codes a newly created dataset is attached to
    pub dataset_module_codes: Vec<String>,
    pub storage: StorageConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
}

/// Remote metadata (XML) service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataServiceConfig {
    pub api_endpoint: String,
    /// Namespace URI, without Clark-notation braces
    pub xml_namespace: String,
    /// Only records carrying this ID_INSTANCE are kept
    pub id_instance_filter: Option<u32>,
    pub request_timeout_secs: u64,
}

/// Auxiliary identity lookup service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityServiceConfig {
    pub base_url: String,
    pub user: String,
    pub password: String,
}

/// User provisioning policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    pub id_provider: String,
    pub users_can_see_organism_data: bool,
    /// Default group for users without organism visibility
    pub id_user_socle_1: i64,
    /// Default group for users seeing their organism's data
    pub id_user_socle_2: i64,
    /// Reserved role standing in for a missing framework main contact
    pub orphan_actor_id: i64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

/// Trigger server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            metadata: MetadataServiceConfig {
                api_endpoint: "https://preprod-inpn.mnhn.fr/mtd".to_string(),
                xml_namespace: DEFAULT_XML_NAMESPACE.to_string(),
                id_instance_filter: None,
                request_timeout_secs: 60,
            },
            identity: IdentityServiceConfig {
                base_url: String::new(),
                user: String::new(),
                password: String::new(),
            },
            provisioning: ProvisioningConfig {
                id_provider: "cas_inpn".to_string(),
                users_can_see_organism_data: false,
                id_user_socle_1: 1,
                id_user_socle_2: 2,
                orphan_actor_id: 0,
            },
            dataset_module_codes: vec!["OCCTAX".to_string(), "OCCHAB".to_string()],
            storage: StorageConfig {
                database_path: PathBuf::from("./data/mtd.sqlite"),
            },
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8090,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> SyncResult<Self> {
        dotenv::dotenv().ok();

        let defaults = Self::default();

        let api_endpoint =
            env::var("MTD_API_ENDPOINT").unwrap_or(defaults.metadata.api_endpoint);
        let xml_namespace = env::var("MTD_XML_NAMESPACE")
            .map(|ns| normalize_namespace(&ns))
            .unwrap_or(defaults.metadata.xml_namespace);
        let id_instance_filter = parse_instance_filter(env::var("MTD_ID_INSTANCE_FILTER").ok())?;
        let request_timeout_secs = env::var("MTD_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| SyncError::Validation("Invalid request timeout".to_string()))?;

        let base_url = env::var("MTD_BASE_URL").unwrap_or_default();
        let user = env::var("MTD_USER").unwrap_or_default();
        let password = env::var("MTD_PASSWORD").unwrap_or_default();

        let id_provider = env::var("MTD_ID_PROVIDER").unwrap_or(defaults.provisioning.id_provider);
        let users_can_see_organism_data = env::var("MTD_USERS_CAN_SEE_ORGANISM_DATA")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);
        let id_user_socle_1 = env::var("MTD_ID_USER_SOCLE_1")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .map_err(|_| SyncError::Validation("Invalid MTD_ID_USER_SOCLE_1".to_string()))?;
        let id_user_socle_2 = env::var("MTD_ID_USER_SOCLE_2")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .map_err(|_| SyncError::Validation("Invalid MTD_ID_USER_SOCLE_2".to_string()))?;
        let orphan_actor_id = env::var("MTD_ORPHAN_ACTOR_ID")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|_| SyncError::Validation("Invalid MTD_ORPHAN_ACTOR_ID".to_string()))?;

        let dataset_module_codes = env::var("MTD_JDD_MODULE_CODE_ASSOCIATION")
            .map(|codes| parse_list(&codes))
            .unwrap_or(defaults.dataset_module_codes);

        let database_path = env::var("MTD_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.database_path);

        let hostname = env::var("MTD_HOST").unwrap_or(defaults.service.hostname);
        let port = env::var("MTD_PORT")
            .unwrap_or_else(|_| "8090".to_string())
            .parse()
            .map_err(|_| SyncError::Validation("Invalid port number".to_string()))?;

        let level = env::var("MTD_SYNC_LOG_LEVEL")
            .map(|l| l.to_lowercase())
            .unwrap_or(defaults.logging.level);

        Ok(SyncConfig {
            metadata: MetadataServiceConfig {
                api_endpoint,
                xml_namespace,
                id_instance_filter,
                request_timeout_secs,
            },
            identity: IdentityServiceConfig {
                base_url,
                user,
                password,
            },
            provisioning: ProvisioningConfig {
                id_provider,
                users_can_see_organism_data,
                id_user_socle_1,
                id_user_socle_2,
                orphan_actor_id,
            },
            dataset_module_codes,
            storage: StorageConfig { database_path },
            service: ServiceConfig { hostname, port },
            logging: LoggingConfig { level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> SyncResult<()> {
        reqwest::Url::parse(&self.metadata.api_endpoint).map_err(|e| {
            SyncError::Validation(format!(
                "Invalid metadata endpoint {}: {}",
                self.metadata.api_endpoint, e
            ))
        })?;

        if self.metadata.xml_namespace.is_empty() {
            return Err(SyncError::Validation(
                "XML namespace cannot be empty".to_string(),
            ));
        }

        if self.provisioning.id_user_socle_1 == self.provisioning.id_user_socle_2 {
            return Err(SyncError::Validation(
                "Default groups socle 1 and socle 2 must differ".to_string(),
            ));
        }

        Ok(())
    }
}

/// Accept both `{uri}` (Clark notation) and a bare URI
pub fn normalize_namespace(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .to_string()
}

/// An unset, empty or zero filter disables instance filtering
fn parse_instance_filter(raw: Option<String>) -> SyncResult<Option<u32>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            let id: u32 = value.parse().map_err(|_| {
                SyncError::Validation(format!("Invalid MTD_ID_INSTANCE_FILTER: {}", value))
            })?;
            Ok((id != 0).then_some(id))
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_namespace() {
        assert_eq!(
            normalize_namespace("{http://inpn.mnhn.fr/mtd}"),
            "http://inpn.mnhn.fr/mtd"
        );
        assert_eq!(
            normalize_namespace(" http://inpn.mnhn.fr/mtd "),
            "http://inpn.mnhn.fr/mtd"
        );
    }

    #[test]
    fn test_instance_filter_parsing() {
        assert_eq!(parse_instance_filter(None).unwrap(), None);
        assert_eq!(parse_instance_filter(Some("".into())).unwrap(), None);
        assert_eq!(parse_instance_filter(Some("0".into())).unwrap(), None);
        assert_eq!(parse_instance_filter(Some(" 14 ".into())).unwrap(), Some(14));
        assert!(parse_instance_filter(Some("abc".into())).is_err());
    }

    #[test]
    fn test_parse_module_codes() {
        assert_eq!(parse_list("OCCTAX, OCCHAB,,"), vec!["OCCTAX", "OCCHAB"]);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provisioning.orphan_actor_id, 0);
        assert_eq!(config.dataset_module_codes, vec!["OCCTAX", "OCCHAB"]);
    }

    #[test]
    fn test_validate_rejects_identical_groups() {
        let mut config = SyncConfig::default();
        config.provisioning.id_user_socle_2 = config.provisioning.id_user_socle_1;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.metadata.api_endpoint = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
