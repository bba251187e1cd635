use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Total bind attempts, the initial one included, before retries stop.
///
/// With the default of 3 a bind is retried at most twice. A later explicit
/// `connect()` still gets one more attempt.
pub const MAX_RETRY_COUNT: u32 = 3;
/// Delay between bind retries
pub const RETRY_INTERVAL: Duration = Duration::from_millis(3000);

pub const DEFAULT_SERVICE_ACTION: &str = "com.usdk.apiservice";
pub const DEFAULT_SERVICE_PACKAGE: &str = "com.usdk.apiservice";

/// Well-known identifier of the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub action: String,
    pub package: String,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            action: DEFAULT_SERVICE_ACTION.to_string(),
            package: DEFAULT_SERVICE_PACKAGE.to_string(),
        }
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.package, self.action)
    }
}

/// Retry policy and target of a connection supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    pub endpoint: ServiceEndpoint,
    pub max_retry_count: u32,
    pub retry_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            endpoint: ServiceEndpoint::default(),
            max_retry_count: MAX_RETRY_COUNT,
            retry_interval: RETRY_INTERVAL,
        }
    }
}
