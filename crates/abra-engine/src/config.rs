use std::env;
use std::time::Duration;

use abra_contracts::{AuthMode, RetryPolicy};

pub const DEFAULT_HOME_URL: &str = "https://www.meta.ai/";
pub const DEFAULT_API_URL: &str = "https://www.meta.ai/api/graphql/";
pub const DEFAULT_GRAPH_URL: &str = "https://graph.meta.ai/graphql?locale=user";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/122.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub auth: AuthMode,
    pub home_url: String,
    pub api_url: String,
    pub graph_url: String,
    pub user_agent: String,
    pub proxy: Option<String>,
    pub conversation_id: Option<String>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub token_settle_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            auth: AuthMode::Guest,
            home_url: DEFAULT_HOME_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            conversation_id: None,
            max_retries: retry.max_retries,
            retry_backoff: retry.backoff,
            token_settle_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from `META_AI_*` environment variables. Unset or blank
    /// variables keep the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auth: non_empty_env("META_AI_ABRA_SESS")
                .map(|abra_sess| AuthMode::Authenticated { abra_sess })
                .unwrap_or(AuthMode::Guest),
            home_url: non_empty_env("META_AI_HOME_URL").unwrap_or(defaults.home_url),
            api_url: non_empty_env("META_AI_API_URL").unwrap_or(defaults.api_url),
            graph_url: non_empty_env("META_AI_GRAPH_URL").unwrap_or(defaults.graph_url),
            user_agent: non_empty_env("META_AI_USER_AGENT").unwrap_or(defaults.user_agent),
            proxy: non_empty_env("META_AI_PROXY"),
            conversation_id: non_empty_env("META_AI_CONVERSATION_ID"),
            max_retries: non_empty_env("META_AI_MAX_RETRIES")
                .and_then(|value| value.parse::<u32>().ok())
                .map(|value| value.min(10))
                .unwrap_or(defaults.max_retries),
            retry_backoff: seconds_env("META_AI_RETRY_BACKOFF_S", 0.0, 60.0)
                .unwrap_or(defaults.retry_backoff),
            token_settle_delay: seconds_env("META_AI_TOKEN_SETTLE_S", 0.0, 30.0)
                .unwrap_or(defaults.token_settle_delay),
            request_timeout: seconds_env("META_AI_REQUEST_TIMEOUT_S", 5.0, 600.0)
                .unwrap_or(defaults.request_timeout),
        }
    }

    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_abra_sess(self, abra_sess: impl Into<String>) -> Self {
        self.with_auth(AuthMode::Authenticated {
            abra_sess: abra_sess.into(),
        })
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_endpoints(
        mut self,
        home_url: impl Into<String>,
        api_url: impl Into<String>,
        graph_url: impl Into<String>,
    ) -> Self {
        self.home_url = home_url.into();
        self.api_url = api_url.into();
        self.graph_url = graph_url.into();
        self
    }

    pub fn with_retry(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn with_token_settle_delay(mut self, delay: Duration) -> Self {
        self.token_settle_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn seconds_env(key: &str, min: f64, max: f64) -> Option<Duration> {
    non_empty_env(key)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .map(|value| Duration::from_secs_f64(value.clamp(min, max)))
}
