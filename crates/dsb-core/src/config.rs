use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, store::MAX_SEARCH_LIMIT, Result};

/// Which [`crate::store::FileStore`] implementation the binary wires up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Transport
    pub telegram_bot_token: String,
    /// Channel whose document posts are ingested. `None` accepts any channel.
    pub channel_id: Option<i64>,
    /// Empty means everyone may use commands.
    pub telegram_allowed_users: Vec<i64>,

    // Storage
    pub store_kind: StoreKind,
    pub database_url: Option<String>,
    pub db_max_connections: u32,

    // Hosting
    pub dropbox_token: Option<String>,

    // Liveness endpoint
    pub port: u16,

    // Ingestion
    pub temp_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub download_timeout: Duration,
    pub folder_max_depth: usize,
    pub folder_max_entries: usize,

    // Search
    pub search_result_limit: usize,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            channel_id: None,
            telegram_allowed_users: Vec::new(),
            store_kind: StoreKind::Postgres,
            database_url: None,
            db_max_connections: 5,
            dropbox_token: None,
            port: 8080,
            temp_dir: PathBuf::from("/tmp/dsb"),
            max_upload_bytes: 50 * 1024 * 1024,
            download_timeout: Duration::from_secs(30),
            folder_max_depth: 8,
            folder_max_entries: 1000,
            search_result_limit: MAX_SEARCH_LIMIT,
            rate_limit_enabled: true,
            rate_limit_requests: 20,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;

        // Scratch buffers live here for the duration of one ingestion/search.
        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build a config from an arbitrary key lookup (the process env in `load`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);
        let defaults = Self::default();

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("BOT_TOKEN"))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let channel_id = match get("CHANNEL_ID") {
            Some(raw) => Some(raw.trim().parse::<i64>().map_err(|_| {
                Error::Config(format!("CHANNEL_ID must be a numeric chat id, got {raw:?}"))
            })?),
            None => None,
        };
        let telegram_allowed_users = parse_csv_i64(get("TELEGRAM_ALLOWED_USERS"));

        let store_kind = match get("DSB_STORE").map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("postgres") => StoreKind::Postgres,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(Error::Config(format!(
                    "DSB_STORE must be 'postgres' or 'memory', got {other:?}"
                )))
            }
        };
        let database_url = get("DATABASE_URL");
        if store_kind == StoreKind::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL environment variable is required".to_string(),
            ));
        }
        let db_max_connections =
            parse_num(get("DB_MAX_CONNECTIONS")).unwrap_or(defaults.db_max_connections);

        let dropbox_token = get("DROPBOX_TOKEN");
        let port = parse_num(get("PORT")).unwrap_or(defaults.port);

        let temp_dir = get("TEMP_DIR").map(PathBuf::from).unwrap_or(defaults.temp_dir);
        let max_upload_bytes =
            parse_num(get("MAX_UPLOAD_BYTES")).unwrap_or(defaults.max_upload_bytes);
        let download_timeout = parse_num(get("DOWNLOAD_TIMEOUT_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.download_timeout);
        let folder_max_depth =
            parse_num(get("FOLDER_MAX_DEPTH")).unwrap_or(defaults.folder_max_depth);
        let folder_max_entries =
            parse_num(get("FOLDER_MAX_ENTRIES")).unwrap_or(defaults.folder_max_entries);

        let search_result_limit = parse_num::<usize>(get("SEARCH_RESULT_LIMIT"))
            .unwrap_or(defaults.search_result_limit)
            .clamp(1, MAX_SEARCH_LIMIT);

        let rate_limit_enabled = get("RATE_LIMIT_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(defaults.rate_limit_enabled);
        let rate_limit_requests =
            parse_num(get("RATE_LIMIT_REQUESTS")).unwrap_or(defaults.rate_limit_requests);
        let rate_limit_window = parse_num(get("RATE_LIMIT_WINDOW"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.rate_limit_window);

        Ok(Self {
            telegram_bot_token,
            channel_id,
            telegram_allowed_users,
            store_kind,
            database_url,
            db_max_connections,
            dropbox_token,
            port,
            temp_dir,
            max_upload_bytes,
            download_timeout,
            folder_max_depth,
            folder_max_entries,
            search_result_limit,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    v.and_then(|s| s.trim().parse::<T>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
