// Runtime configuration: environment defaults plus the on-disk credential file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

// Environment-variable defaults, overridable via .env (loaded in main).
lazy_static::lazy_static! {
    pub static ref OLLAMA_URL: String = env::var("OLLAMA_URL").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    pub static ref OPENAI_URL: String = env::var("VENDO_OPENAI_URL").unwrap_or_else(|_| "https://api.openai.com".to_string());
    pub static ref CHAT_MODEL: String = env::var("VENDO_CHAT_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo-0125".to_string());
    pub static ref GENERATE_MODEL: String = env::var("VENDO_GENERATE_MODEL").unwrap_or_else(|_| "mistral:latest".to_string());
    pub static ref BACKEND_KIND: String = env::var("VENDO_BACKEND").unwrap_or_else(|_| "generate".to_string());
    pub static ref CATALOG_PATH: String = env::var("VENDO_CATALOG").unwrap_or_else(|_| "catalog.json".to_string());
    pub static ref LOG_PATH: String = env::var("VENDO_LOG").unwrap_or_else(|_| "interactions.csv".to_string());
    pub static ref KEY_FILE: String = env::var("VENDO_KEY_FILE").unwrap_or_else(|_| "vendo.key".to_string());
}

/// Which completion wire shape to speak. Selected by `VENDO_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// OpenAI-style `/v1/chat/completions`: the full message history is
    /// resent on every call.
    Chat,
    /// Ollama-style `/api/generate`: latest prompt plus an opaque context
    /// token replayed from the previous call.
    Generate,
}

impl BackendKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "chat" => Ok(BackendKind::Chat),
            "generate" => Ok(BackendKind::Generate),
            other => bail!("unknown backend kind {other:?} (expected \"chat\" or \"generate\")"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,
    /// Base URL of the completion endpoint (no path).
    pub endpoint: String,
    pub model: String,
    /// API key for the chat backend; the generate backend needs none.
    pub api_key: Option<String>,
    pub catalog_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    /// Resolve the full configuration at startup. Errors here are fatal and
    /// must abort before any UI is served.
    pub fn load() -> Result<Self> {
        let backend = BackendKind::parse(&BACKEND_KIND)?;
        let (endpoint, model, api_key) = match backend {
            BackendKind::Chat => {
                let key = read_api_key(Path::new(KEY_FILE.as_str()))
                    .with_context(|| format!("failed to load API key from {}", *KEY_FILE))?;
                (OPENAI_URL.clone(), CHAT_MODEL.clone(), Some(key))
            }
            BackendKind::Generate => (OLLAMA_URL.clone(), GENERATE_MODEL.clone(), None),
        };
        Ok(Config {
            backend,
            endpoint,
            model,
            api_key,
            catalog_path: PathBuf::from(CATALOG_PATH.as_str()),
            log_path: PathBuf::from(LOG_PATH.as_str()),
        })
    }
}

/// Read a credential file containing a single `NAME=value` line.
pub fn read_api_key(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read credential file {}", path.display()))?;
    let line = contents
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .context("credential file is empty")?;
    let (_, value) = line
        .split_once('=')
        .with_context(|| format!("malformed credential line (expected NAME=value): {line:?}"))?;
    let value = value.trim();
    if value.is_empty() {
        bail!("credential file has an empty value");
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_api_key_valid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "OPENAI_API_KEY=sk-test-123").unwrap();
        let key = read_api_key(file.path()).unwrap();
        assert_eq!(key, "sk-test-123");
    }

    #[test]
    fn test_read_api_key_skips_blank_lines() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\n  \nAPI_KEY=abc").unwrap();
        assert_eq!(read_api_key(file.path()).unwrap(), "abc");
    }

    #[test]
    fn test_read_api_key_missing_file() {
        let err = read_api_key(Path::new("/nonexistent/vendo.key")).unwrap_err();
        assert!(err.to_string().contains("could not read credential file"));
    }

    #[test]
    fn test_read_api_key_malformed_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not a key value pair").unwrap();
        let err = read_api_key(file.path()).unwrap_err();
        assert!(err.to_string().contains("malformed credential line"));
    }

    #[test]
    fn test_read_api_key_empty_value() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "API_KEY=").unwrap();
        assert!(read_api_key(file.path()).is_err());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!(BackendKind::parse("chat").unwrap(), BackendKind::Chat);
        assert_eq!(BackendKind::parse("generate").unwrap(), BackendKind::Generate);
        assert!(BackendKind::parse("grpc").is_err());
    }
}
