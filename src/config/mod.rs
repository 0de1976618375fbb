use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite connection string for the task store
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// File holding the progress ledger record
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Root directory of local blob storage
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// URL prefix under which the local storage root is served
    #[serde(default = "default_static_prefix")]
    pub static_prefix: String,

    /// Maximum accepted upload, in kilobytes
    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: usize,

    /// Age after which an in-flight ledger entry is reclaimed
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,

    /// S3 bucket name. Remote storage is disabled when absent.
    pub s3_bucket: Option<String>,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// Custom S3-compatible endpoint URL (MinIO, R2, ...)
    pub s3_endpoint: Option<String>,

    pub s3_access_key: Option<String>,

    pub s3_secret_key: Option<String>,

    /// Public base URL used to build links to remote blobs
    pub s3_public_url: Option<String>,

    #[serde(default)]
    pub s3_path_style: bool,

    /// Base URL of a remote inference service. The bundled engine is used when absent.
    pub restore_endpoint: Option<String>,

    /// HS256 signing secret. Authentication is disabled when absent.
    pub auth_secret: Option<String>,

    pub auth_username: Option<String>,

    pub auth_password: Option<String>,

    #[serde(default = "default_token_expire_mins")]
    pub token_expire_mins: i64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite://restormer.db".to_string()
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("storage")
}

fn default_static_prefix() -> String {
    "/static".to_string()
}

fn default_max_file_size_kb() -> usize {
    250
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_watchdog_interval_secs() -> u64 {
    15
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_token_expire_mins() -> i64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn max_file_size_bytes(&self) -> usize {
        self.max_file_size_kb * 1024
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs.max(1))
    }

    pub fn remote_storage_enabled(&self) -> bool {
        self.s3_bucket.is_some()
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_secret.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config: AppConfig = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.max_file_size_bytes(), 250 * 1024);
        assert_eq!(config.static_prefix, "/static");
        assert!(!config.remote_storage_enabled());
        assert!(!config.auth_enabled());
    }

    #[test]
    fn test_remote_storage_enabled_by_bucket() {
        let config: AppConfig = envy::from_iter(vec![
            ("S3_BUCKET".to_string(), "restored".to_string()),
            ("S3_PATH_STYLE".to_string(), "true".to_string()),
            ("MAX_FILE_SIZE_KB".to_string(), "512".to_string()),
        ])
        .unwrap();
        assert!(config.remote_storage_enabled());
        assert!(config.s3_path_style);
        assert_eq!(config.max_file_size_bytes(), 512 * 1024);
    }
}
