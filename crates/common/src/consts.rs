pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:9092";
pub const DEFAULT_CONFIG_PATH: &str = "./convoscope_config.yaml";

pub const CONVERSATIONS_PATH: &str = "/api/conversations";
pub const ANALYZE_PATH: &str = "/api/analyze";
pub const REPORTS_PATH: &str = "/api/reports";
pub const JOBS_PATH: &str = "/api/jobs";
pub const HEALTHZ_PATH: &str = "/healthz";

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub const DEFAULT_ANALYSIS_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_JOB_RETENTION_SECONDS: u64 = 86_400;
/// Longest accepted sweep interval or job retention (one year)
pub const MAX_INTERVAL_SECONDS: u64 = 365 * 86_400;
