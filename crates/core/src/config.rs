use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable consulted when `security.jwt-secret` is not set.
pub const JWT_SECRET_ENV: &str = "FORUM_JWT_SECRET";

// ─── Config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,

    // Logging
    pub logging_to_file: bool,
    pub log_dir: Option<String>,

    // Request body size limit (KB)
    pub body_limit_kb: usize,

    pub session: SessionConfig,
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            logging_to_file: false,
            log_dir: None,
            body_limit_kb: 64,
            session: SessionConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a YAML file, sanitize, and validate.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let mut config: Config = serde_yaml_ng::from_str(contents)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(self.port != 0, "port must be non-zero");
        anyhow::ensure!(self.body_limit_kb > 0, "body-limit-kb must be positive");
        let name = &self.session.cookie_name;
        anyhow::ensure!(!name.is_empty(), "session cookie name is empty");
        anyhow::ensure!(
            name.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')),
            "session cookie name '{name}' contains invalid characters"
        );
        Ok(())
    }

    /// Trim usernames, drop empty ones, keep the first entry per username.
    fn sanitize(&mut self) {
        let users = &mut self.security.users;
        for user in users.iter_mut() {
            user.username = user.username.trim().to_string();
        }
        users.retain(|u| !u.username.is_empty());

        let mut seen = HashSet::new();
        users.retain(|u| seen.insert(u.username.clone()));
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "JSESSIONID".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SecurityConfig {
    pub jwt_secret: Option<String>,
    pub jwt_ttl_secs: u64,
    pub users: Vec<UserEntry>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_ttl_secs: 3600,
            users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserEntry {
    pub username: String,
    /// bcrypt hash of the password.
    pub password_hash: String,
}

impl SecurityConfig {
    /// JWT signing secret from config, or from `FORUM_JWT_SECRET`.
    pub fn resolve_jwt_secret(&self) -> Option<String> {
        self.jwt_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(JWT_SECRET_ENV).ok().filter(|s| !s.is_empty()))
    }

    /// Look up a configured user. Ids are the 1-based position in `users`.
    pub fn find_user(&self, username: &str) -> Option<(u64, &UserEntry)> {
        self.users
            .iter()
            .enumerate()
            .find(|(_, u)| u.username == username)
            .map(|(i, u)| (i as u64 + 1, u))
    }
}

// ─── ConfigWatcher ─────────────────────────────────────────────────────────

pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    /// Watch a config file. On changes (debounced 150ms, SHA256 dedup),
    /// reload the config, pass it through `on_reload`, and atomically swap
    /// the result in via ArcSwap.
    pub fn start(
        path: String,
        config: Arc<ArcSwap<Config>>,
        on_reload: impl Fn(Config) -> Config + Send + Sync + 'static,
    ) -> Result<Self, anyhow::Error> {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(16);

        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
            if let Ok(event) = res
                && (event.kind.is_modify() || event.kind.is_create())
            {
                let _ = tx.blocking_send(());
            }
        })?;
        watcher.watch(Path::new(&path), RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            let mut last_hash: Option<[u8; 32]> = None;
            let mut debounce: Option<tokio::time::Instant> = None;

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        if msg.is_none() {
                            break;
                        }
                        debounce = Some(tokio::time::Instant::now() + Duration::from_millis(150));
                    }
                    _ = async {
                        match debounce {
                            Some(deadline) => tokio::time::sleep_until(deadline).await,
                            None => std::future::pending::<()>().await,
                        }
                    } => {
                        debounce = None;
                        match std::fs::read(&path) {
                            Ok(contents) => {
                                let hash: [u8; 32] = sha2::Sha256::digest(&contents).into();
                                if last_hash.as_ref() == Some(&hash) {
                                    continue;
                                }
                                last_hash = Some(hash);

                                match Config::load(&path) {
                                    Ok(new_cfg) => {
                                        tracing::info!(path = %path, "Configuration reloaded");
                                        config.store(Arc::new(on_reload(new_cfg)));
                                    }
                                    Err(e) => {
                                        tracing::error!("Config reload failed: {e}");
                                    }
                                }
                            }
                            Err(e) => tracing::error!("Config file read failed: {e}"),
                        }
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}
