//! Configuration types for papercast
//!
//! The configuration document is JSON. Four keys are required (`model_name`,
//! `system_instruction`, `max_workers`, `podcast_title`); everything else has a
//! default. Durations are expressed in seconds and may be fractional.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keys that must be present in the configuration document
pub const REQUIRED_KEYS: [&str; 4] = [
    "model_name",
    "system_instruction",
    "max_workers",
    "podcast_title",
];

/// Environment variable holding the generative text API key
pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Environment variable holding the text-to-speech API key
pub const ELEVEN_API_KEY_VAR: &str = "ELEVEN_API_KEY";

/// Main configuration document
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Generative model name (e.g., "gemini-1.5-flash")
    pub model_name: String,

    /// System instruction sent with every generation request
    pub system_instruction: String,

    /// Concurrency ceiling for the script generation pipeline
    pub max_workers: usize,

    /// Podcast title used in the combined script framing
    pub podcast_title: String,

    /// Root under which `papers/`, `scripts/` and `audios/` are created (default: ".")
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Remote listing endpoint returning the day's records
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// PDF URL template; `{id}` is replaced with the item identifier
    #[serde(default = "default_pdf_url_template")]
    pub pdf_url_template: String,

    /// Concurrency ceiling for the PDF download pipeline (default: 5)
    #[serde(default = "default_download_workers")]
    pub download_workers: usize,

    /// Per-request timeout applied by the shared HTTP client (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Optional overall deadline after which no new items are dispatched
    #[serde(default, with = "optional_duration_serde")]
    pub run_deadline: Option<Duration>,

    /// Prompt template for per-item generation; `{id}` is replaced with the item identifier
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Base URL of the generative text API
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,

    /// Retry and backoff settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Request pacing for quota-constrained APIs
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Text-to-speech settings
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl Config {
    /// Load and validate the configuration document at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a configuration document from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_str(json).map_err(|e| Error::Config {
            message: format!("invalid JSON: {}", e),
            key: None,
        })?;

        let object = raw.as_object().ok_or_else(|| Error::Config {
            message: "configuration document must be a JSON object".to_string(),
            key: None,
        })?;

        for key in REQUIRED_KEYS {
            if !object.contains_key(key) {
                return Err(Error::config("required key is missing", key));
            }
        }

        let config: Config = serde_json::from_value(raw).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(Error::config("must not be empty", "model_name"));
        }
        if self.max_workers == 0 {
            return Err(Error::config("must be greater than 0", "max_workers"));
        }
        if self.download_workers == 0 {
            return Err(Error::config("must be greater than 0", "download_workers"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("must be greater than 0", "request_timeout"));
        }
        if !self.pdf_url_template.contains("{id}") {
            return Err(Error::config("must contain {id}", "pdf_url_template"));
        }
        if !self.prompt_template.contains("{id}") {
            return Err(Error::config("must contain {id}", "prompt_template"));
        }
        validate_url(&self.listing_url, "listing_url")?;
        validate_url(&self.pdf_url_template.replace("{id}", "0"), "pdf_url_template")?;
        validate_url(&self.gemini_api_base, "gemini_api_base")?;
        validate_url(&self.speech.api_base, "speech.api_base")?;
        self.retry.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }
}

fn validate_url(value: &str, key: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(Error::config(
            format!("unsupported URL scheme '{}'", parsed.scheme()),
            key,
        )),
        Err(e) => Err(Error::config(format!("invalid URL: {}", e), key)),
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempt ceiling, including the first call (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Extra multiplier applied to the delay after a quota rejection (default: 2.0)
    #[serde(default = "default_quota_multiplier")]
    pub quota_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
            quota_multiplier: default_quota_multiplier(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("must be greater than 0", "retry.max_attempts"));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if self.quota_multiplier.is_nan() || self.quota_multiplier < 1.0 {
            return Err(Error::config("must be at least 1.0", "retry.quota_multiplier"));
        }
        if self.max_delay < self.initial_delay {
            return Err(Error::config(
                "must not be smaller than retry.initial_delay",
                "retry.max_delay",
            ));
        }
        Ok(())
    }
}

/// Pacing between successive calls to a quota-constrained API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether throttled pipelines sleep before each call (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower bound of the random delay (default: 1 second)
    #[serde(default = "default_rate_min_delay", with = "duration_serde")]
    pub min_delay: Duration,

    /// Upper bound of the random delay (default: 3 seconds)
    #[serde(default = "default_rate_max_delay", with = "duration_serde")]
    pub max_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_delay: default_rate_min_delay(),
            max_delay: default_rate_max_delay(),
        }
    }
}

impl RateLimitConfig {
    fn validate(&self) -> Result<()> {
        if self.max_delay < self.min_delay {
            return Err(Error::config(
                "must not be smaller than rate_limit.min_delay",
                "rate_limit.max_delay",
            ));
        }
        Ok(())
    }
}

/// Text-to-speech voice and output settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Base URL of the text-to-speech API
    #[serde(default = "default_speech_api_base")]
    pub api_base: String,

    /// Voice identifier
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// Synthesis model identifier
    #[serde(default = "default_speech_model_id")]
    pub model_id: String,

    /// Output encoding, e.g. "mp3_22050_32"
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Voice stability (0.0 - 1.0)
    #[serde(default)]
    pub stability: f32,

    /// Similarity boost (0.0 - 1.0)
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    /// Style exaggeration (0.0 - 1.0)
    #[serde(default)]
    pub style: f32,

    /// Enable speaker boost
    #[serde(default = "default_true")]
    pub use_speaker_boost: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_base: default_speech_api_base(),
            voice_id: default_voice_id(),
            model_id: default_speech_model_id(),
            output_format: default_output_format(),
            stability: 0.0,
            similarity_boost: default_similarity_boost(),
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// API keys read from the process environment
#[derive(Clone)]
pub struct Credentials {
    /// Generative text API key
    pub gemini_api_key: Option<String>,
    /// Text-to-speech API key
    pub eleven_api_key: Option<String>,
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary lookup (used by tests)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            gemini_api_key: non_empty(GEMINI_API_KEY_VAR),
            eleven_api_key: non_empty(ELEVEN_API_KEY_VAR),
        }
    }

    /// Generative text API key, or a fatal error if unset
    pub fn require_gemini(&self) -> Result<&str> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| Error::MissingCredential(GEMINI_API_KEY_VAR.to_string()))
    }

    /// Text-to-speech API key, or a fatal error if unset
    pub fn require_eleven(&self) -> Result<&str> {
        self.eleven_api_key
            .as_deref()
            .ok_or_else(|| Error::MissingCredential(ELEVEN_API_KEY_VAR.to_string()))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("eleven_api_key", &self.eleven_api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_listing_url() -> String {
    "https://huggingface.co/api/daily_papers".to_string()
}

fn default_pdf_url_template() -> String {
    "https://arxiv.org/pdf/{id}".to_string()
}

fn default_download_workers() -> usize {
    5
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_prompt_template() -> String {
    "Present the paper with ID {id}. Focus on the main points and keep it concise, \
     aiming for about 150-200 words. Do not welcome the listeners. Directly introduce \
     the topic of the paper. The introduction must feel like a transition between each \
     paper presented. Do not format the text."
        .to_string()
}

fn default_gemini_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_quota_multiplier() -> f64 {
    2.0
}

fn default_rate_min_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_rate_max_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_speech_api_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "pNInz6obpgDQGcFmaJgB".to_string()
}

fn default_speech_model_id() -> String {
    "eleven_turbo_v2".to_string()
}

fn default_output_format() -> String {
    "mp3_22050_32".to_string()
}

fn default_similarity_boost() -> f32 {
    1.0
}

// Durations are fractional seconds in the document
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<f64>::deserialize(deserializer)? {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}
