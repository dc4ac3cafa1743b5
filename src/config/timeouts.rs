use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeout families applied at each outbound call site, per the
/// concurrency/resource model's timeout table: generic HTTP calls, file
/// downloads (longer, since files can be large), destination bulk writes,
/// and database queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_http_seconds")]
    pub http_seconds: u64,

    #[serde(default = "default_file_connect_seconds")]
    pub file_connect_seconds: u64,

    #[serde(default = "default_file_read_seconds")]
    pub file_read_seconds: u64,

    #[serde(default = "default_destination_bulk_seconds")]
    pub destination_bulk_seconds: u64,

    #[serde(default = "default_db_query_seconds")]
    pub db_query_seconds: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            http_seconds: default_http_seconds(),
            file_connect_seconds: default_file_connect_seconds(),
            file_read_seconds: default_file_read_seconds(),
            destination_bulk_seconds: default_destination_bulk_seconds(),
            db_query_seconds: default_db_query_seconds(),
        }
    }
}

impl TimeoutsConfig {
    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http_seconds)
    }

    pub fn file_connect(&self) -> Duration {
        Duration::from_secs(self.file_connect_seconds)
    }

    pub fn file_read(&self) -> Duration {
        Duration::from_secs(self.file_read_seconds)
    }

    pub fn destination_bulk(&self) -> Duration {
        Duration::from_secs(self.destination_bulk_seconds)
    }

    pub fn db_query(&self) -> Duration {
        Duration::from_secs(self.db_query_seconds)
    }
}

fn default_http_seconds() -> u64 {
    30
}

fn default_file_connect_seconds() -> u64 {
    180
}

fn default_file_read_seconds() -> u64 {
    540
}

fn default_destination_bulk_seconds() -> u64 {
    60
}

fn default_db_query_seconds() -> u64 {
    30
}
