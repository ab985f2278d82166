//! Configuration pointing every endpoint at a mock server

use papercast::Credentials;
use papercast::config::{Config, ELEVEN_API_KEY_VAR, GEMINI_API_KEY_VAR};
use serde_json::json;
use std::path::Path;

/// Run date used by every integration test
pub const RUN_DATE: &str = "20241018";

/// Build a configuration whose endpoints all live on `server_uri` and whose
/// output goes under `root`. Retries are fast and pacing is off.
pub fn test_config(server_uri: &str, root: &Path) -> Config {
    let doc = json!({
        "model_name": "gemini-1.5-flash",
        "system_instruction": "You are the single host of a podcast.",
        "max_workers": 3,
        "podcast_title": "Daily Papers",
        "output_root": root,
        "listing_url": format!("{server_uri}/api/daily_papers"),
        "pdf_url_template": format!("{server_uri}/pdf/{{id}}"),
        "download_workers": 4,
        "request_timeout": 5,
        "prompt_template": "Present {id}.",
        "gemini_api_base": server_uri,
        "retry": {
            "max_attempts": 3,
            "initial_delay": 0.001,
            "max_delay": 0.01,
            "jitter": false
        },
        "rate_limit": { "enabled": false },
        "speech": { "api_base": server_uri }
    });
    Config::from_json_str(&doc.to_string()).expect("test config should be valid")
}

/// Credentials with both keys set
pub fn test_credentials() -> Credentials {
    Credentials::from_lookup(|name| match name {
        GEMINI_API_KEY_VAR => Some("gemini-test-key".to_string()),
        ELEVEN_API_KEY_VAR => Some("eleven-test-key".to_string()),
        _ => None,
    })
}

/// Credentials with neither key set
pub fn no_credentials() -> Credentials {
    Credentials::from_lookup(|_| None)
}
