//! Configuration for scribe.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SCRIBE_HOME, SCRIBE_LLAMA_URL, WHISPER_PATH)
//! 2. Config file (.scribe/config.yaml)
//! 3. Defaults (~/.scribe)
//!
//! Config file discovery:
//! - Searches current directory and parents for .scribe/config.yaml
//! - `paths.home` in the config file is relative to the .scribe/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::progress::ProgressPlan;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub version: String,
    pub paths: PathsConfig,
    pub pipeline: PipelineSettings,
    pub whisper: WhisperSettings,
    pub llama: LlamaSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data directory (relative to .scribe/)
    pub home: Option<String>,
}

/// Tunables for the worker and its stages
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Characters per reformatting chunk
    pub chunk_chars: usize,

    /// Generation cap for each reformatted chunk
    pub chunk_max_tokens: u32,

    /// Characters of formatted text shown to the metadata prompt
    pub metadata_prefix_chars: usize,

    /// Generation cap for the metadata answer
    pub metadata_max_tokens: u32,

    /// Recordings smaller than this are rejected before transcription
    pub min_audio_bytes: u64,

    /// Bounded wait on an empty queue before re-checking for shutdown
    pub poll_interval_ms: u64,

    /// Delete the input audio of failed tasks as well
    pub release_failed_input: bool,

    pub progress: ProgressPlan,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_chars: 2000,
            chunk_max_tokens: 1024,
            metadata_prefix_chars: 2000,
            metadata_max_tokens: 200,
            min_audio_bytes: 100,
            poll_interval_ms: 1000,
            release_failed_input: false,
            progress: ProgressPlan::default(),
        }
    }
}

impl PipelineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_chars == 0 {
            anyhow::bail!("pipeline.chunk_chars must be greater than zero");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("pipeline.poll_interval_ms must be greater than zero");
        }
        self.progress
            .validate()
            .context("Invalid pipeline.progress plan")?;
        Ok(())
    }
}

/// Speech-to-text binary settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WhisperSettings {
    /// whisper-compatible CLI (must support `--output_format json`)
    pub binary: String,
    pub model: String,
    /// Language hint passed to the engine
    pub language: Option<String>,
    /// Voice-activity-detection filter
    pub vad: bool,
    pub timeout_seconds: u64,
}

impl Default for WhisperSettings {
    fn default() -> Self {
        Self {
            binary: "whisper-ctranslate2".to_string(),
            model: "medium".to_string(),
            language: Some("id".to_string()),
            vad: true,
            timeout_seconds: 3600,
        }
    }
}

/// Text-generation server settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LlamaSettings {
    /// llama.cpp server base URL
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for LlamaSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_seconds: 600,
        }
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Data directory holding the stores and uploads
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub pipeline: PipelineSettings,
    pub whisper: WhisperSettings,
    pub llama: LlamaSettings,
}

impl ResolvedConfig {
    /// Task log ($SCRIBE_HOME/tasks.jsonl)
    pub fn tasks_path(&self) -> PathBuf {
        self.home.join("tasks.jsonl")
    }

    /// Result log ($SCRIBE_HOME/results.jsonl)
    pub fn results_path(&self) -> PathBuf {
        self.home.join("results.jsonl")
    }

    /// Saved uploads awaiting processing ($SCRIBE_HOME/uploads)
    pub fn uploads_dir(&self) -> PathBuf {
        self.home.join("uploads")
    }

    /// Single-worker lock ($SCRIBE_HOME/worker.lock)
    pub fn worker_lock_path(&self) -> PathBuf {
        self.home.join("worker.lock")
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".scribe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    Ok(serde_yaml::from_str(content)?)
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge a parsed file with environment overrides
fn resolve(
    file: ConfigFile,
    config_file: Option<PathBuf>,
    default_home: PathBuf,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let home = if let Some(env_home) = env("SCRIBE_HOME") {
        PathBuf::from(env_home)
    } else if let (Some(config_path), Some(home_path)) = (&config_file, &file.paths.home) {
        let scribe_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(scribe_dir, home_path)
    } else {
        default_home
    };

    let mut whisper = file.whisper;
    if let Some(binary) = env("WHISPER_PATH") {
        whisper.binary = binary;
    }

    let mut llama = file.llama;
    if let Some(url) = env("SCRIBE_LLAMA_URL") {
        llama.base_url = url;
    }

    file.pipeline.validate()?;

    Ok(ResolvedConfig {
        home,
        config_file,
        pipeline: file.pipeline,
        whisper,
        llama,
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".scribe");

    let config_file = find_config_file();
    let file = match &config_file {
        Some(path) => load_config_file(path)?,
        None => ConfigFile::default(),
    };

    resolve(file, config_file, default_home, |key| std::env::var(key).ok())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::StageSpan;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(
            ConfigFile::default(),
            None,
            PathBuf::from("/home/test/.scribe"),
            no_env,
        )
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/home/test/.scribe"));
        assert_eq!(config.tasks_path(), PathBuf::from("/home/test/.scribe/tasks.jsonl"));
        assert_eq!(config.worker_lock_path(), PathBuf::from("/home/test/.scribe/worker.lock"));
        assert_eq!(config.pipeline, PipelineSettings::default());
        assert_eq!(config.pipeline.chunk_chars, 2000);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let scribe_dir = temp.path().join(".scribe");
        std::fs::create_dir_all(&scribe_dir).unwrap();

        let config_path = scribe_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./data
pipeline:
  chunk_chars: 1500
  progress:
    reformatting: {{ start: 30, end: 70 }}
    metadata: {{ start: 70, end: 90 }}
whisper:
  model: small
  vad: false
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.pipeline.chunk_chars, 1500);
        assert_eq!(parsed.pipeline.metadata_prefix_chars, 2000);
        assert_eq!(parsed.pipeline.progress.reformatting, StageSpan::new(30, 70));
        assert_eq!(parsed.pipeline.progress.transcription, StageSpan::new(10, 30));
        assert_eq!(parsed.whisper.model, "small");
        assert!(!parsed.whisper.vad);
        assert_eq!(parsed.whisper.binary, "whisper-ctranslate2");

        let resolved = resolve(
            parsed,
            Some(config_path.clone()),
            PathBuf::from("/unused"),
            no_env,
        )
        .unwrap();
        assert_eq!(resolved.home, scribe_dir.join("data"));
        assert_eq!(resolved.config_file, Some(config_path));
    }

    #[test]
    fn test_env_overrides_win() {
        let file = parse_config("paths:\n  home: ./data\n").unwrap();
        let env = |key: &str| match key {
            "SCRIBE_HOME" => Some("/srv/scribe".to_string()),
            "WHISPER_PATH" => Some("/opt/whisper".to_string()),
            "SCRIBE_LLAMA_URL" => Some("http://gpu:9000".to_string()),
            _ => None,
        };

        let resolved = resolve(
            file,
            Some(PathBuf::from("/proj/.scribe/config.yaml")),
            PathBuf::from("/unused"),
            env,
        )
        .unwrap();
        assert_eq!(resolved.home, PathBuf::from("/srv/scribe"));
        assert_eq!(resolved.whisper.binary, "/opt/whisper");
        assert_eq!(resolved.llama.base_url, "http://gpu:9000");
    }

    #[test]
    fn test_invalid_progress_plan_is_rejected() {
        let file = parse_config(
            "pipeline:\n  progress:\n    metadata: { start: 50, end: 90 }\n",
        )
        .unwrap();
        let err = resolve(file, None, PathBuf::from("/tmp"), no_env).unwrap_err();
        assert!(format!("{:#}", err).contains("metadata"));
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let file = parse_config("pipeline:\n  chunk_chars: 0\n").unwrap();
        assert!(resolve(file, None, PathBuf::from("/tmp"), no_env).is_err());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
