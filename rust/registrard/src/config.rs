use std::path::PathBuf;

pub const LOG_ENV: &str = "REGISTRARD_LOG";
pub const WORKSPACE_ENV: &str = "REGISTRARD_WORKSPACE";
const DEFAULT_LOG_FILTER: &str = "registrard=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
}

impl ProcessConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            log_filter: non_blank(LOG_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            workspace: non_blank(WORKSPACE_ENV).map(PathBuf::from),
        }
    }
}
