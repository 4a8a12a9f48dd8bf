use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODELS: [&str; 3] = ["gemini-1.5-flash", "gemini-1.5-flash-latest", "gemini-2.0-flash"];

/// Limits applied when resolving LLM image inputs.
#[derive(Debug, Clone)]
pub struct ImageLimits {
    pub fetch_timeout: Duration,
    pub max_images: usize,
    pub max_bytes: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
            max_images: 2,
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Settings for the external services node handlers talk to.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Without a key the LLM handler fails with a configuration error.
    pub api_key: Option<String>,
    pub models: Vec<String>,
    /// Merge "flash" models reported by the list endpoint into the candidates.
    pub discover_models: bool,
    pub completion_timeout: Duration,
    /// Upper bound on a single ffmpeg/ffprobe invocation.
    pub media_timeout: Duration,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub work_dir: PathBuf,
    pub images: ImageLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            discover_models: true,
            completion_timeout: Duration::from_secs(60),
            media_timeout: Duration::from_secs(60),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            work_dir: std::env::temp_dir(),
            images: ImageLimits::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let models = get("WEAVE_LLM_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|models| !models.is_empty())
            .unwrap_or(defaults.models);

        let discover_models = get("WEAVE_LLM_DISCOVER")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.discover_models);

        let completion_timeout = get("WEAVE_LLM_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.completion_timeout);

        let media_timeout = get("WEAVE_MEDIA_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.media_timeout);

        Self {
            api_key: get("GOOGLE_AI_API_KEY"),
            models,
            discover_models,
            completion_timeout,
            media_timeout,
            ffmpeg_path: get("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: get("FFPROBE_PATH").map(PathBuf::from).unwrap_or(defaults.ffprobe_path),
            work_dir: get("WEAVE_WORK_DIR").map(PathBuf::from).unwrap_or(defaults.work_dir),
            images: defaults.images,
        }
    }
}
