use std::str::FromStr;
use std::time::Duration;
use std::{env, fs};

use chrono_tz::Tz;
use log::warn;

pub fn init_logging() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
}

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_LOG_SHEET: &str = "Logs";
pub const DEFAULT_LOG_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_STATIC_DIR: &str = "./static";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_POLL_MAX_INTERVAL_MS: u64 = 4_000;
const DEFAULT_POLL_BACKOFF: f64 = 1.5;
const MAX_POLL_BACKOFF: f64 = 10.0;
const DEFAULT_RUN_TIMEOUT_SECS: u64 = 120;

/// Cookie signing keys shorter than this are rejected by actix.
const MIN_SESSION_KEY_LEN: usize = 64;

/// Preset questions shown as quick-prompt buttons on an empty chat.
pub const QUICK_PROMPTS: [&str; 3] = [
    "What classes should I take as a History major?",
    "What classes can I take to fulfill WAYS A-II?",
    "What are some afternoon classes I can take?",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Credentials error: {0}")]
    Credentials(String),
}

/// Whether a conversation thread lives for one query or for a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPolicy {
    #[default]
    PerQuery,
    PerSession,
}

impl FromStr for ThreadPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per_query" | "query" => Ok(ThreadPolicy::PerQuery),
            "per_session" | "session" => Ok(ThreadPolicy::PerSession),
            _ => Err(ConfigError::Invalid {
                key: "THREAD_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

/// Bounded wait applied while an assistant run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff: f64,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            initial_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_interval: Duration::from_millis(DEFAULT_POLL_MAX_INTERVAL_MS),
            backoff: DEFAULT_POLL_BACKOFF,
            timeout: Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
        }
    }
}

impl PollPolicy {
    /// The interval to wait after `current`, grown by the backoff factor and capped.
    pub fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// The assistants this deployment talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantSet {
    /// A labeler picks between the scheduler and the informational assistant.
    Routed {
        labeler: String,
        scheduler: String,
        informational: String,
    },
    /// Every query goes to one assistant.
    Single { assistant: String },
}

impl AssistantSet {
    /// Role name and id of every configured assistant.
    pub fn roles(&self) -> Vec<(&'static str, &str)> {
        match self {
            AssistantSet::Routed {
                labeler,
                scheduler,
                informational,
            } => vec![
                ("labeler", labeler.as_str()),
                ("course scheduler", scheduler.as_str()),
                ("admin info", informational.as_str()),
            ],
            AssistantSet::Single { assistant } => vec![("assistant", assistant.as_str())],
        }
    }
}

#[derive(Clone)]
pub struct SheetsConfig {
    pub service_account_json: String,
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub base_url: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub assistants: AssistantSet,
    pub run_instructions: Option<String>,
    pub thread_policy: ThreadPolicy,
    pub poll: PollPolicy,
    pub sheets: Option<SheetsConfig>,
    pub log_timezone: Tz,
    pub bind_addr: String,
    pub static_dir: String,
    pub session_key: Option<Vec<u8>>,
}

impl AppConfig {
    /// Loads `.env` (if present) and reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openai_api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let openai_base_url = get("OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let assistants = match (get("LABELER_ID"), get("COURSE_SCHEDULER_ID"), get("ADMIN_INFO_ID")) {
            (Some(labeler), Some(scheduler), Some(informational)) => AssistantSet::Routed {
                labeler,
                scheduler,
                informational,
            },
            _ => match get("ASSISTANT_ID").or_else(|| get("ASSISTANT_KEY")) {
                Some(assistant) => AssistantSet::Single { assistant },
                None => return Err(ConfigError::Missing("LABELER_ID/COURSE_SCHEDULER_ID/ADMIN_INFO_ID or ASSISTANT_ID")),
            },
        };

        let thread_policy = match get("THREAD_POLICY") {
            Some(value) => value.parse()?,
            None => ThreadPolicy::default(),
        };

        let defaults = PollPolicy::default();
        let poll = PollPolicy {
            initial_interval: parse_or(&get, "RUN_POLL_INTERVAL_MS", defaults.initial_interval, |v| {
                v.parse::<u64>().ok().filter(|ms| *ms > 0).map(Duration::from_millis)
            })?,
            max_interval: parse_or(&get, "RUN_POLL_MAX_INTERVAL_MS", defaults.max_interval, |v| {
                v.parse::<u64>().ok().filter(|ms| *ms > 0).map(Duration::from_millis)
            })?,
            backoff: parse_or(&get, "RUN_POLL_BACKOFF", defaults.backoff, |v| {
                v.parse::<f64>().ok().filter(|f| (1.0..=MAX_POLL_BACKOFF).contains(f))
            })?,
            timeout: parse_or(&get, "RUN_TIMEOUT_SECS", defaults.timeout, |v| {
                v.parse::<u64>().ok().filter(|s| *s > 0).map(Duration::from_secs)
            })?,
        };
        if poll.max_interval < poll.initial_interval {
            return Err(ConfigError::Invalid {
                key: "RUN_POLL_MAX_INTERVAL_MS",
                value: format!("{} (below the initial interval)", poll.max_interval.as_millis()),
            });
        }

        let log_timezone = parse_or(&get, "LOG_TIMEZONE", DEFAULT_LOG_TIMEZONE, |v| v.parse::<Tz>().ok())?;

        let sheets = match (read_service_account(&get)?, get("SPREADSHEET_ID")) {
            (Some(service_account_json), Some(spreadsheet_id)) => Some(SheetsConfig {
                service_account_json,
                spreadsheet_id,
                sheet_name: get("LOG_SHEET_NAME").unwrap_or_else(|| DEFAULT_LOG_SHEET.to_string()),
                base_url: get("SHEETS_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_SHEETS_BASE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            }),
            _ => {
                warn!("Spreadsheet logging is not configured; interactions will not be recorded");
                None
            }
        };

        let session_key = match get("SESSION_KEY") {
            Some(key) if key.len() < MIN_SESSION_KEY_LEN => {
                return Err(ConfigError::Invalid {
                    key: "SESSION_KEY",
                    value: format!("must be at least {} bytes", MIN_SESSION_KEY_LEN),
                })
            }
            Some(key) => Some(key.into_bytes()),
            None => None,
        };

        Ok(AppConfig {
            openai_api_key,
            openai_base_url,
            assistants,
            run_instructions: get("RUN_INSTRUCTIONS"),
            thread_policy,
            poll,
            sheets,
            log_timezone,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
            session_key,
        })
    }
}

fn parse_or<G, T, P>(get: &G, key: &'static str, default: T, parse: P) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    match get(key) {
        Some(value) => parse(&value).ok_or(ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// Service-account key JSON, given inline or as a path to a key file.
fn read_service_account<G>(get: &G) -> Result<Option<String>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(inline) = get("GCP_SERVICE_ACCOUNT") {
        return Ok(Some(inline));
    }
    match get("GCP_SERVICE_ACCOUNT_FILE") {
        Some(path) => fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ConfigError::Credentials(format!("cannot read {}: {}", path, e))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn routed_mode_when_all_three_ids_present() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("LABELER_ID", "asst_label"),
            ("COURSE_SCHEDULER_ID", "asst_sched"),
            ("ADMIN_INFO_ID", "asst_admin"),
        ]))
        .unwrap();

        assert_eq!(
            config.assistants,
            AssistantSet::Routed {
                labeler: "asst_label".into(),
                scheduler: "asst_sched".into(),
                informational: "asst_admin".into(),
            }
        );
        assert_eq!(config.thread_policy, ThreadPolicy::PerQuery);
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.log_timezone, chrono_tz::America::Los_Angeles);
        assert!(config.sheets.is_none());
    }

    #[test]
    fn single_mode_accepts_legacy_key_name() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ASSISTANT_KEY", "asst_only"),
            ("LABELER_ID", "asst_label"),
        ]))
        .unwrap();
        assert_eq!(config.assistants, AssistantSet::Single { assistant: "asst_only".into() });
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("ASSISTANT_ID", "asst")])).err().unwrap();
        assert!(matches!(err, ConfigError::Missing("OPENAI_API_KEY")));
    }

    #[test]
    fn missing_assistants_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk")])).err().unwrap();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn poll_settings_are_parsed_and_validated() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("THREAD_POLICY", "per_session"),
            ("RUN_POLL_INTERVAL_MS", "250"),
            ("RUN_POLL_MAX_INTERVAL_MS", "1000"),
            ("RUN_POLL_BACKOFF", "2"),
            ("RUN_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.thread_policy, ThreadPolicy::PerSession);
        assert_eq!(config.poll.initial_interval, Duration::from_millis(250));
        assert_eq!(config.poll.timeout, Duration::from_secs(30));

        let err = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("RUN_POLL_BACKOFF", "0.5"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "RUN_POLL_BACKOFF", .. }));
    }

    #[test]
    fn sheets_enabled_only_with_credentials_and_spreadsheet() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("GCP_SERVICE_ACCOUNT", "{}"),
            ("SPREADSHEET_ID", "sheet-123"),
        ]))
        .unwrap();
        let sheets = config.sheets.unwrap();
        assert_eq!(sheets.spreadsheet_id, "sheet-123");
        assert_eq!(sheets.sheet_name, "Logs");
    }

    #[test]
    fn short_session_key_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("SESSION_KEY", "too-short"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "SESSION_KEY", .. }));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = PollPolicy::default();
        let mut interval = policy.initial_interval;
        for _ in 0..20 {
            interval = policy.next_interval(interval);
        }
        assert_eq!(interval, policy.max_interval);
        assert_eq!(policy.next_interval(Duration::from_millis(500)), Duration::from_millis(750));
    }

    #[test]
    fn oversized_backoff_is_rejected_and_never_overflows() {
        let err = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("RUN_POLL_BACKOFF", "1e20"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "RUN_POLL_BACKOFF", .. }));

        let policy = PollPolicy { backoff: 1e20, ..PollPolicy::default() };
        assert_eq!(policy.next_interval(Duration::from_millis(500)), policy.max_interval);
        let policy = PollPolicy { backoff: f64::INFINITY, ..PollPolicy::default() };
        assert_eq!(policy.next_interval(Duration::from_secs(u64::MAX)), policy.max_interval);
    }

    #[test]
    fn unknown_thread_policy_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("THREAD_POLICY", "per_user"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "THREAD_POLICY", ref value } if value == "per_user"));
    }

    #[test]
    fn max_interval_below_initial_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk"),
            ("ASSISTANT_ID", "asst"),
            ("RUN_POLL_INTERVAL_MS", "2000"),
            ("RUN_POLL_MAX_INTERVAL_MS", "1000"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { key: "RUN_POLL_MAX_INTERVAL_MS", .. }));
    }
}
