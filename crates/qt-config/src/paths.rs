use std::env;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "quota";
const CONFIG_FILE: &str = "config.toml";
const LOCAL_CONFIG_FILE: &str = "quota.config.toml";

/// Resolves every on-disk location the tool reads or writes.
///
/// Use `QuotaPaths::new()` for production (resolves the real home, config and
/// cache directories), or `QuotaPaths::with_base()` for tests with an isolated
/// directory.
#[derive(Debug, Clone)]
pub struct QuotaPaths {
    home: PathBuf,
    cache_dir: PathBuf,
    config_candidates: Vec<PathBuf>,
}

impl QuotaPaths {
    /// Create paths for the current user. Returns an error if the home
    /// directory cannot be determined.
    pub fn new() -> anyhow::Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Ok(Self {
            cache_dir: platform_cache_dir(&home),
            config_candidates: platform_config_candidates(&home, &cwd),
            home,
        })
    }

    /// Create paths rooted at a custom base directory (useful for tests).
    /// The base doubles as the home directory.
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            cache_dir: base.join(".cache").join(APP_DIR),
            config_candidates: vec![
                base.join(LOCAL_CONFIG_FILE),
                base.join(".config").join(APP_DIR).join(CONFIG_FILE),
            ],
            home: base,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Config files in priority order; the first one that exists wins.
    pub fn config_candidates(&self) -> &[PathBuf] {
        &self.config_candidates
    }

    /// Expand a leading `~` against this home directory.
    pub fn expand(&self, path: &Path) -> PathBuf {
        expand_home(path, &self.home)
    }

    /// Ensure the cache directory exists with owner-only permissions.
    pub fn ensure_cache_dir(&self) -> anyhow::Result<PathBuf> {
        if !self.cache_dir.exists() {
            std::fs::create_dir_all(&self.cache_dir)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&self.cache_dir, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        Ok(self.cache_dir.clone())
    }
}

/// Expand `~` and `~/...` against `home`. Other paths are returned unchanged.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) if rest.as_os_str().is_empty() => home.to_path_buf(),
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Expand a leading `~` against the current user's home directory.
pub fn expand_path(path: &Path) -> PathBuf {
    match dirs::home_dir() {
        Some(home) => expand_home(path, &home),
        None => path.to_path_buf(),
    }
}

fn platform_cache_dir(home: &Path) -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        home.join("Library").join("Caches").join(APP_DIR)
    }

    #[cfg(target_os = "windows")]
    {
        match env::var_os("LOCALAPPDATA") {
            Some(local) => PathBuf::from(local).join(APP_DIR).join("cache"),
            None => home.join(".cache").join(APP_DIR),
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let xdg = env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .unwrap_or_else(|| home.join(".cache"));
        xdg.join(APP_DIR)
    }
}

fn platform_config_candidates(home: &Path, cwd: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![cwd.join(LOCAL_CONFIG_FILE)];

    let xdg = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(|| home.join(".config"));
    candidates.push(xdg.join(APP_DIR).join(CONFIG_FILE));

    #[cfg(target_os = "macos")]
    candidates.push(
        home.join("Library")
            .join("Application Support")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    );

    #[cfg(target_os = "windows")]
    if let Some(appdata) = env::var_os("APPDATA") {
        candidates.push(PathBuf::from(appdata).join(APP_DIR).join(CONFIG_FILE));
    }

    candidates
}
