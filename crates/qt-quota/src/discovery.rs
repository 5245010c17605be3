//! Finds credential files on disk and turns them into [`DiscoveredAccount`]s.
//!
//! Two sources are scanned: the shared auth directory, where every file is
//! named `{provider}-{identifier}.json`, and a couple of well-known
//! locations owned by other tools (Gemini CLI, the Cursor IDE).

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;
use crate::model::{Credentials, DiscoveredAccount};
use crate::providers::Provider;
use crate::redact::redact;

/// Filename prefix for each provider stored in the auth directory, in match
/// order.
const AUTH_FILE_PREFIXES: &[(&str, Provider)] = &[
    ("codex-", Provider::Codex),
    ("github-copilot-", Provider::Copilot),
    ("claude-", Provider::Claude),
    ("antigravity-", Provider::Antigravity),
];

pub const CURSOR_EMAIL_KEY: &str = "cursorAuth/cachedEmail";
pub const CURSOR_TOKEN_KEY: &str = "cursorAuth/accessToken";

/// Locations outside the auth directory that discovery probes.
#[derive(Debug, Clone, Default)]
pub struct KnownLocations {
    /// Gemini CLI home, normally `~/.gemini`.
    pub gemini_dir: Option<PathBuf>,
    /// Cursor's `state.vscdb`.
    pub cursor_db: Option<PathBuf>,
}

impl KnownLocations {
    pub fn detect() -> Self {
        Self {
            gemini_dir: dirs::home_dir().map(|h| h.join(".gemini")),
            cursor_db: cursor_state_db_path(),
        }
    }

    /// No well-known locations; only the auth directory is scanned.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn gemini_oauth_creds(&self) -> Option<PathBuf> {
        self.gemini_dir.as_ref().map(|d| d.join("oauth_creds.json"))
    }

    pub fn gemini_accounts(&self) -> Option<PathBuf> {
        self.gemini_dir.as_ref().map(|d| d.join("google_accounts.json"))
    }
}

/// Where the Cursor IDE keeps its global state database on this platform.
pub fn cursor_state_db_path() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .map(|h| h.join("Library/Application Support/Cursor/User/globalStorage/state.vscdb"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(|appdata| PathBuf::from(appdata).join("Cursor\\User\\globalStorage\\state.vscdb"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        dirs::home_dir().map(|h| h.join(".config/Cursor/User/globalStorage/state.vscdb"))
    }
}

/// Every account reachable from `auth_dir` and the default known locations.
pub fn discover_all_accounts(auth_dir: &Path) -> Vec<DiscoveredAccount> {
    discover_all_accounts_with(auth_dir, &KnownLocations::detect())
}

pub fn discover_all_accounts_with(
    auth_dir: &Path,
    locations: &KnownLocations,
) -> Vec<DiscoveredAccount> {
    let mut accounts = discover_auth_files(auth_dir);
    if let Some(gemini_dir) = &locations.gemini_dir {
        accounts.extend(discover_gemini_cli(gemini_dir));
    }
    if let Some(db) = &locations.cursor_db {
        accounts.extend(discover_cursor(db));
    }
    tracing::debug!(
        "Discovered {} accounts: {:?}",
        accounts.len(),
        accounts
            .iter()
            .map(|a| format!("{}/{}", a.provider, a.account))
            .collect::<Vec<_>>()
    );
    accounts
}

/// Match an auth-directory filename against the provider patterns.
/// Returns the provider and the identifier captured between prefix and
/// `.json`.
pub fn classify_file_name(name: &str) -> Option<(Provider, &str)> {
    let stem = name.strip_suffix(".json")?;
    AUTH_FILE_PREFIXES.iter().find_map(|(prefix, provider)| {
        stem.strip_prefix(prefix)
            .filter(|id| !id.is_empty())
            .map(|id| (*provider, id))
    })
}

/// Scan the auth directory. A missing or unreadable directory yields no
/// accounts.
pub fn discover_auth_files(auth_dir: &Path) -> Vec<DiscoveredAccount> {
    let entries = match std::fs::read_dir(auth_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Auth directory {} not readable: {}", auth_dir.display(), e);
            return Vec::new();
        }
    };

    let mut accounts = Vec::new();
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some((provider, identifier)) = classify_file_name(name) else {
            continue;
        };
        let path = entry.path();
        let payload = match read_credentials(&path) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let account = account_name(&payload).unwrap_or_else(|| identifier.to_string());
        let redacted = redact(&Value::Object(payload.clone()));
        tracing::debug!("Found {} credentials for {}: {}", provider, account, redacted);
        accounts.push(DiscoveredAccount::new(provider.tag(), account, path, payload));
    }
    accounts
}

/// Gemini CLI is reported when either of its files exists, even if neither
/// parses.
pub fn discover_gemini_cli(gemini_dir: &Path) -> Option<DiscoveredAccount> {
    let creds_path = gemini_dir.join("oauth_creds.json");
    let accounts_path = gemini_dir.join("google_accounts.json");
    if !creds_path.exists() && !accounts_path.exists() {
        return None;
    }

    let payload = if creds_path.exists() {
        read_credentials(&creds_path).unwrap_or_else(|e| {
            tracing::debug!("Failed to read {}: {}", creds_path.display(), e);
            Credentials::new()
        })
    } else {
        Credentials::new()
    };

    let email = if accounts_path.exists() {
        match read_json(&accounts_path) {
            Ok(value) => gemini_email(&value),
            Err(e) => {
                tracing::debug!("Failed to read {}: {}", accounts_path.display(), e);
                None
            }
        }
    } else {
        None
    };

    Some(DiscoveredAccount::new(
        Provider::GeminiCli.tag(),
        email.unwrap_or_else(|| "unknown".to_string()),
        creds_path,
        payload,
    ))
}

fn gemini_email(accounts: &Value) -> Option<String> {
    let pick = |v: &Value, keys: &[&str]| {
        keys.iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
            .map(str::to_string)
    };
    match accounts {
        Value::Array(items) => items.first().and_then(|first| pick(first, &["email", "account"])),
        other => pick(other, &["email"]),
    }
}

/// Read Cursor's login state. Absent database means no account; a database
/// that cannot be read is logged and skipped.
pub fn discover_cursor(db_path: &Path) -> Option<DiscoveredAccount> {
    if !db_path.exists() {
        return None;
    }
    check_permissions(db_path);

    let items = match read_cursor_items(db_path, &[CURSOR_EMAIL_KEY, CURSOR_TOKEN_KEY]) {
        Ok(items) => items,
        Err(e) => {
            tracing::debug!("Failed to read Cursor DB at {}: {}", db_path.display(), e);
            return None;
        }
    };

    let email = items
        .get(CURSOR_EMAIL_KEY)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let mut payload = Credentials::new();
    payload.insert("email".into(), Value::String(email.clone()));
    if let Some(token) = items.get(CURSOR_TOKEN_KEY) {
        payload.insert("accessToken".into(), Value::String(token.clone()));
    }
    payload.insert(
        "dbPath".into(),
        Value::String(db_path.to_string_lossy().into_owned()),
    );

    Some(DiscoveredAccount::new(
        Provider::Cursor.tag(),
        email,
        db_path,
        payload,
    ))
}

/// Look up `keys` in a VS Code style `ItemTable`, opening the database
/// read-only. Keys with empty values are left out. A database without
/// `ItemTable` yields an empty map.
pub fn read_cursor_items(
    db_path: &Path,
    keys: &[&str],
) -> Result<HashMap<String, String>, DiscoveryError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let has_table: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type='table' AND name='ItemTable'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    if has_table.is_none() {
        return Ok(HashMap::new());
    }

    let mut stmt = conn.prepare("SELECT value FROM ItemTable WHERE key = ?1")?;
    let mut items = HashMap::new();
    for key in keys {
        let value: Option<rusqlite::types::Value> = stmt
            .query_row([key], |row| row.get(0))
            .optional()?;
        if let Some(text) = value.and_then(item_text).filter(|s| !s.is_empty()) {
            items.insert((*key).to_string(), text);
        }
    }
    Ok(items)
}

// VS Code stores most values as TEXT but some builds write BLOBs.
fn item_text(value: rusqlite::types::Value) -> Option<String> {
    match value {
        rusqlite::types::Value::Text(s) => Some(s),
        rusqlite::types::Value::Blob(b) => String::from_utf8(b).ok(),
        rusqlite::types::Value::Integer(i) => Some(i.to_string()),
        rusqlite::types::Value::Real(f) => Some(f.to_string()),
        rusqlite::types::Value::Null => None,
    }
}

/// `email`, then `username`.
fn account_name(payload: &Credentials) -> Option<String> {
    ["email", "username"].iter().find_map(|k| {
        payload
            .get(*k)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn read_json(path: &Path) -> Result<Value, DiscoveryError> {
    check_permissions(path);
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn read_credentials(path: &Path) -> Result<Credentials, DiscoveryError> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(DiscoveryError::NotAnObject),
    }
}

/// Warn when a credential file is readable by group or others. Returns the
/// warning so callers like `doctor` can collect it.
pub fn check_permissions(path: &Path) -> Option<String> {
    let warning = permission_warning(path)?;
    tracing::warn!("{}", warning);
    Some(warning)
}

#[cfg(unix)]
pub fn permission_warning(path: &Path) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path).ok()?.permissions().mode();
    if mode & 0o077 == 0 {
        return None;
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Some(format!(
        "Credential file {} is readable by other users (mode {:o}). Consider: chmod 600 {}",
        name,
        mode & 0o777,
        path.display()
    ))
}

#[cfg(not(unix))]
pub fn permission_warning(_path: &Path) -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(path: &Path, value: &Value) {
        std::fs::write(path, serde_json::to_string(value).unwrap()).unwrap();
    }

    #[cfg(unix)]
    fn chmod(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    fn create_cursor_db(path: &Path, items: &[(&str, &str)]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE ItemTable (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);")
            .unwrap();
        for (k, v) in items {
            conn.execute(
                "INSERT INTO ItemTable (key, value) VALUES (?1, ?2)",
                rusqlite::params![k, v],
            )
            .unwrap();
        }
    }

    #[test]
    fn classify_matches_known_patterns() {
        assert_eq!(
            classify_file_name("codex-me@x.com.json"),
            Some((Provider::Codex, "me@x.com"))
        );
        assert_eq!(
            classify_file_name("github-copilot-octo.json"),
            Some((Provider::Copilot, "octo"))
        );
        assert_eq!(
            classify_file_name("claude-a.json"),
            Some((Provider::Claude, "a"))
        );
        assert_eq!(
            classify_file_name("antigravity-g.json"),
            Some((Provider::Antigravity, "g"))
        );
        assert_eq!(classify_file_name("claude-.json"), None);
        assert_eq!(classify_file_name("claude-a.txt"), None);
        assert_eq!(classify_file_name("gemini-a.json"), None);
        assert_eq!(classify_file_name("copilot-a.json"), None);
    }

    #[test]
    fn missing_auth_dir_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_auth_files(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn account_name_precedence() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("claude-file-id.json"),
            &json!({"email": "a@x.com", "username": "alice", "access_token": "t"}),
        );
        write(
            &dir.path().join("codex-file-id.json"),
            &json!({"username": "bob"}),
        );
        write(&dir.path().join("github-copilot-octo.json"), &json!({}));
        write(&dir.path().join("notes.json"), &json!({"email": "ignored"}));

        let mut accounts = discover_auth_files(dir.path());
        accounts.sort_by(|a, b| a.provider.cmp(&b.provider));
        let got: Vec<(&str, &str)> = accounts
            .iter()
            .map(|a| (a.provider.as_str(), a.account.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("claude", "a@x.com"), ("codex", "bob"), ("copilot", "octo")]
        );
        assert_eq!(accounts[0].auth_data["access_token"], "t");
    }

    #[test]
    fn debug_logging_redacts_discovered_credentials() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("claude-a.json"),
            &json!({"email": "a@x.com", "access_token": "secret-token"}),
        );

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let accounts = tracing::subscriber::with_default(subscriber, || {
            discover_auth_files(dir.path())
        });
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].auth_data["access_token"], "secret-token");
    }

    #[test]
    fn unparsable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("claude-broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("codex-array.json"), "[1,2]").unwrap();
        write(&dir.path().join("claude-ok.json"), &json!({"email": "ok@x.com"}));

        let accounts = discover_auth_files(dir.path());
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].account, "ok@x.com");
    }

    #[cfg(unix)]
    #[test]
    fn world_readable_file_warns_but_is_discovered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claude-a.json");
        write(&path, &json!({"email": "a@x.com"}));
        chmod(&path, 0o644);

        let warning = permission_warning(&path).unwrap();
        assert!(warning.contains("chmod 600"));
        assert_eq!(discover_auth_files(dir.path()).len(), 1);

        chmod(&path, 0o600);
        assert!(permission_warning(&path).is_none());
    }

    #[test]
    fn gemini_from_accounts_array() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("oauth_creds.json"),
            &json!({"access_token": "ya29", "expiry_date": 1}),
        );
        write(
            &dir.path().join("google_accounts.json"),
            &json!([{"email": "g@x.com"}, {"email": "other@x.com"}]),
        );

        let account = discover_gemini_cli(dir.path()).unwrap();
        assert_eq!(account.provider, "gemini-cli");
        assert_eq!(account.account, "g@x.com");
        assert_eq!(account.auth_data["access_token"], "ya29");
        assert_eq!(account.file_path, dir.path().join("oauth_creds.json"));
    }

    #[test]
    fn gemini_accounts_only_and_object_form() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("google_accounts.json"),
            &json!({"email": "solo@x.com"}),
        );
        let account = discover_gemini_cli(dir.path()).unwrap();
        assert_eq!(account.account, "solo@x.com");
        assert!(account.auth_data.is_empty());
    }

    #[test]
    fn gemini_absent_or_unparsable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_gemini_cli(dir.path()).is_none());

        std::fs::write(dir.path().join("oauth_creds.json"), "garbage").unwrap();
        let account = discover_gemini_cli(dir.path()).unwrap();
        assert_eq!(account.account, "unknown");
    }

    #[test]
    fn cursor_db_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.vscdb");
        create_cursor_db(
            &db,
            &[
                (CURSOR_EMAIL_KEY, "c@x.com"),
                (CURSOR_TOKEN_KEY, "cursor-token"),
            ],
        );

        let account = discover_cursor(&db).unwrap();
        assert_eq!(account.provider, "cursor");
        assert_eq!(account.account, "c@x.com");
        assert_eq!(account.auth_data["accessToken"], "cursor-token");
        assert_eq!(account.auth_data["dbPath"], db.to_string_lossy().as_ref());
    }

    #[test]
    fn cursor_db_without_login() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.vscdb");
        create_cursor_db(&db, &[]);

        let account = discover_cursor(&db).unwrap();
        assert_eq!(account.account, "unknown");
        assert!(account.auth_data.get("accessToken").is_none());

        assert!(discover_cursor(&dir.path().join("missing.vscdb")).is_none());
    }

    #[test]
    fn cursor_db_not_sqlite_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.vscdb");
        std::fs::write(&db, "definitely not sqlite, but long enough to have a header").unwrap();
        assert!(discover_cursor(&db).is_none());
    }

    #[test]
    fn all_accounts_combines_sources() {
        let auth = tempfile::tempdir().unwrap();
        let gemini = tempfile::tempdir().unwrap();
        let cursor = tempfile::tempdir().unwrap();
        write(&auth.path().join("claude-a.json"), &json!({"email": "a@x.com"}));
        write(&gemini.path().join("google_accounts.json"), &json!({"email": "g@x.com"}));
        let db = cursor.path().join("state.vscdb");
        create_cursor_db(&db, &[(CURSOR_EMAIL_KEY, "c@x.com")]);

        let locations = KnownLocations {
            gemini_dir: Some(gemini.path().to_path_buf()),
            cursor_db: Some(db),
        };
        let mut providers: Vec<String> = discover_all_accounts_with(auth.path(), &locations)
            .into_iter()
            .map(|a| a.provider)
            .collect();
        providers.sort();
        assert_eq!(providers, vec!["claude", "cursor", "gemini-cli"]);

        let only_files = discover_all_accounts_with(auth.path(), &KnownLocations::none());
        assert_eq!(only_files.len(), 1);
    }
}
