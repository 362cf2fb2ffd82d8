//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the analysis pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for downloaded source media
    pub work_dir: PathBuf,
    /// Interval between inference media state polls
    pub media_poll_interval: Duration,
    /// Maximum number of media state polls
    pub media_poll_attempts: u32,
    /// Deadline for one detached run (processing, refinement or engagement)
    pub task_deadline: Duration,
    /// Maximum concurrently running detached runs
    pub max_concurrent_tasks: usize,
    /// Lifetime requested for playback references
    pub media_url_ttl: Duration,
    /// Audit log directory; auditing is disabled when unset
    pub audit_dir: Option<PathBuf>,
    /// Maximum cached playback references
    pub url_cache_capacity: usize,
    /// Cached references are not served within this margin of expiry
    pub url_cache_margin: Duration,
    /// How long shutdown waits for in-flight runs
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/lectern"),
            media_poll_interval: Duration::from_secs(5),
            media_poll_attempts: 120,
            task_deadline: Duration::from_secs(1800),
            max_concurrent_tasks: 4,
            media_url_ttl: Duration::from_secs(24 * 3600),
            audit_dir: None,
            url_cache_capacity: 1024,
            url_cache_margin: Duration::from_secs(300),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("PIPELINE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            media_poll_interval: env_parse("PIPELINE_MEDIA_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.media_poll_interval),
            media_poll_attempts: env_parse("PIPELINE_MEDIA_POLL_ATTEMPTS")
                .unwrap_or(defaults.media_poll_attempts),
            task_deadline: env_parse("PIPELINE_TASK_DEADLINE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.task_deadline),
            max_concurrent_tasks: env_parse("PIPELINE_MAX_TASKS")
                .unwrap_or(defaults.max_concurrent_tasks),
            media_url_ttl: env_parse("PIPELINE_MEDIA_URL_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.media_url_ttl),
            audit_dir: std::env::var("PIPELINE_AUDIT_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            url_cache_capacity: env_parse("PIPELINE_URL_CACHE_CAPACITY")
                .unwrap_or(defaults.url_cache_capacity),
            url_cache_margin: env_parse("PIPELINE_URL_CACHE_MARGIN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.url_cache_margin),
            shutdown_timeout: env_parse("PIPELINE_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_env_overrides_and_defaults() {
        std::env::set_var("PIPELINE_MEDIA_POLL_INTERVAL_MS", "250");
        std::env::set_var("PIPELINE_MAX_TASKS", "not-a-number");
        std::env::set_var("PIPELINE_AUDIT_DIR", "/var/lib/lectern/audit");

        let config = PipelineConfig::from_env();
        assert_eq!(config.media_poll_interval, Duration::from_millis(250));
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.audit_dir, Some(PathBuf::from("/var/lib/lectern/audit")));

        std::env::remove_var("PIPELINE_MEDIA_POLL_INTERVAL_MS");
        std::env::remove_var("PIPELINE_MAX_TASKS");
        std::env::remove_var("PIPELINE_AUDIT_DIR");
    }

    #[test]
    #[serial]
    fn test_blank_audit_dir_disables_audit() {
        std::env::set_var("PIPELINE_AUDIT_DIR", "  ");
        assert!(PipelineConfig::from_env().audit_dir.is_none());
        std::env::remove_var("PIPELINE_AUDIT_DIR");
    }
}
