use serde::Deserialize;

/// Main configuration structure for Opinion-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub forum: ForumConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub keywords: KeywordConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Where the forum lives and how its pages are recognized
#[derive(Debug, Clone, Deserialize)]
pub struct ForumConfig {
    /// Root URL of the forum, e.g. "https://polwro.com/"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Login page, relative to the base URL
    #[serde(rename = "login-path", default = "default_login_path")]
    pub login_path: String,

    /// Value sent in the "login" form field
    #[serde(rename = "login-submit-label", default = "default_login_submit_label")]
    pub login_submit_label: String,

    /// Substring of the post-login URL that proves the login worked
    #[serde(rename = "landing-marker", default = "default_landing_marker")]
    pub landing_marker: String,

    /// Page listing the opinion forum sections, relative to the base URL
    #[serde(rename = "opinions-path", default = "default_opinions_path")]
    pub opinions_path: String,

    /// Topic listing script; the forum id is passed as `?f=<id>`
    #[serde(rename = "forum-path", default = "default_forum_path")]
    pub forum_path: String,

    /// Substring identifying forum section links on the opinions page
    #[serde(rename = "forum-link-marker", default = "default_forum_link_marker")]
    pub forum_link_marker: String,

    /// Prefix identifying topic links on a forum page
    #[serde(rename = "topic-link-marker", default = "default_topic_link_marker")]
    pub topic_link_marker: String,
}

/// Politeness and concurrency settings
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of requests in flight against the forum
    #[serde(rename = "max-concurrent-requests", default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: u32,

    /// Minimum delay between requests during incremental scans (milliseconds)
    #[serde(rename = "download-delay", default = "default_download_delay")]
    pub download_delay: u64,

    /// Minimum delay between requests during full scans (milliseconds)
    #[serde(rename = "full-scan-delay", default = "default_full_scan_delay")]
    pub full_scan_delay: u64,

    /// Initial auto-throttle delay (milliseconds)
    #[serde(rename = "autothrottle-start-delay", default = "default_autothrottle_start_delay")]
    pub autothrottle_start_delay: u64,

    /// Upper bound for the auto-throttle delay (milliseconds)
    #[serde(rename = "autothrottle-max-delay", default = "default_autothrottle_max_delay")]
    pub autothrottle_max_delay: u64,

    /// Average number of requests the throttle aims to keep in flight
    #[serde(
        rename = "autothrottle-target-concurrency",
        default = "default_autothrottle_target_concurrency"
    )]
    pub autothrottle_target_concurrency: f64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent_requests(),
            download_delay: default_download_delay(),
            full_scan_delay: default_full_scan_delay(),
            autothrottle_start_delay: default_autothrottle_start_delay(),
            autothrottle_max_delay: default_autothrottle_max_delay(),
            autothrottle_target_concurrency: default_autothrottle_target_concurrency(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Keyword sets deciding which forum and topic links are visited
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeywordConfig {
    /// A link containing any of these is never followed
    #[serde(default)]
    pub excluded: Vec<String>,

    /// When non-empty, forum links must contain at least one of these
    #[serde(default)]
    pub included: Vec<String>,
}

/// What happens to records whose language is not the target language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PersistPolicy {
    /// Only target-language records are vectorized and stored
    #[default]
    TargetLanguageOnly,

    /// Other languages are stored too, with an empty vector
    AllLanguages,
}

/// Enrichment pipeline settings
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// ISO 639-1 code of the language that gets vectorized
    #[serde(rename = "target-language", default = "default_target_language")]
    pub target_language: String,

    #[serde(rename = "persist-policy", default)]
    pub persist_policy: PersistPolicy,

    /// Number of parallel pipeline workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Review text is cut to this many tokens before embedding
    #[serde(rename = "max-tokens", default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Inference service; without it records are stored with empty vectors
    #[serde(rename = "inference-url", default)]
    pub inference_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_language: default_target_language(),
            persist_policy: PersistPolicy::default(),
            workers: default_workers(),
            max_tokens: default_max_tokens(),
            inference_url: None,
        }
    }
}

/// Run-level retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// How many times a failed crawl run is retried
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay (seconds), doubled on every retry
    #[serde(rename = "base-delay", default = "default_base_delay")]
    pub base_delay: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional JSON-lines export of every extracted record
    #[serde(rename = "feed-path", default)]
    pub feed_path: Option<String>,
}

/// Names of the environment variables holding the forum login
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(rename = "login-env", default = "default_login_env")]
    pub login_env: String,

    #[serde(rename = "password-env", default = "default_password_env")]
    pub password_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            login_env: default_login_env(),
            password_env: default_password_env(),
        }
    }
}

fn default_login_path() -> String {
    "login.php".to_string()
}

fn default_login_submit_label() -> String {
    "Zaloguj".to_string()
}

fn default_landing_marker() -> String {
    "index.php".to_string()
}

fn default_opinions_path() -> String {
    "opinie-o-prowadzacych".to_string()
}

fn default_forum_path() -> String {
    "viewforum.php".to_string()
}

fn default_forum_link_marker() -> String {
    "/f,".to_string()
}

fn default_topic_link_marker() -> String {
    "t,".to_string()
}

fn default_max_concurrent_requests() -> u32 {
    8
}

fn default_download_delay() -> u64 {
    1000
}

fn default_full_scan_delay() -> u64 {
    2000
}

fn default_autothrottle_start_delay() -> u64 {
    1000
}

fn default_autothrottle_max_delay() -> u64 {
    10_000
}

fn default_autothrottle_target_concurrency() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    30
}

fn default_target_language() -> String {
    "pl".to_string()
}

fn default_workers() -> u32 {
    4
}

fn default_max_tokens() -> usize {
    512
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    60
}

fn default_login_env() -> String {
    "POLWRO_USERNAME".to_string()
}

fn default_password_env() -> String {
    "POLWRO_PASSWORD".to_string()
}
