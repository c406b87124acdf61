//! Environment configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::storage::SupabaseConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {name}")]
    Invalid { name: &'static str, value: String },
    #[error("failed to hash APP_PASSWORD: {0}")]
    Password(#[from] bcrypt::BcryptError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("invalid template layout: {0}")]
    Layout(String),
    #[error("failed to prepare output directory: {0}")]
    OutputDir(#[from] std::io::Error),
}

/// Where generated documents are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    Supabase,
    Inline,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "disk" => Ok(Self::Local),
            "supabase" => Ok(Self::Supabase),
            "inline" => Ok(Self::Inline),
            _ => Err(ConfigError::Invalid {
                name: "STORAGE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub template_dir: PathBuf,
    pub word_template: String,
    pub excel_template: String,
    pub output_dir: PathBuf,
    /// URL prefix the output directory is served under.
    pub public_base_url: String,
    pub storage_backend: StorageBackend,
    pub supabase: Option<SupabaseConfig>,
    pub app_password: Option<String>,
    pub app_password_hash: Option<String>,
    pub session_secret: Option<String>,
    pub cookie_secure: bool,
    pub default_field_value: String,
    pub allowed_origins: Vec<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("template_dir", &self.template_dir)
            .field("word_template", &self.word_template)
            .field("excel_template", &self.excel_template)
            .field("output_dir", &self.output_dir)
            .field("public_base_url", &self.public_base_url)
            .field("storage_backend", &self.storage_backend)
            .field("supabase_url", &self.supabase.as_ref().map(|s| &s.supabase_url))
            .field("cookie_secure", &self.cookie_secure)
            .field("default_field_value", &self.default_field_value)
            .field("allowed_origins", &self.allowed_origins)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Read the configuration from the process environment, after loading
    /// `.env` when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let var_or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let port = match var("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => 8080,
        };

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::Local,
        };

        let supabase = if storage_backend == StorageBackend::Supabase {
            Some(SupabaseConfig {
                supabase_url: var("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
                supabase_anon_key: var("SUPABASE_ANON_KEY")
                    .ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?,
                bucket_name: var_or("BUCKET_NAME", "inspection-reports"),
            })
        } else {
            None
        };

        let app_password = var("APP_PASSWORD");
        let app_password_hash = var("APP_PASSWORD_HASH");
        if app_password.is_none() && app_password_hash.is_none() {
            return Err(ConfigError::Missing("APP_PASSWORD or APP_PASSWORD_HASH"));
        }

        let cookie_secure = match var("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                name: "COOKIE_SECURE",
                value: raw,
            })?,
            None => false,
        };

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:8080".to_string(),
                    "http://127.0.0.1:8080".to_string(),
                ]
            });

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port,
            template_dir: PathBuf::from(var_or("TEMPLATE_DIR", "public/templates")),
            word_template: var_or("WORD_TEMPLATE", "template.docx"),
            excel_template: var_or("EXCEL_TEMPLATE", "template.xlsx"),
            output_dir: PathBuf::from(var_or("OUTPUT_DIR", "public/output")),
            public_base_url: var_or("PUBLIC_BASE_URL", "/output"),
            storage_backend,
            supabase,
            app_password,
            app_password_hash,
            session_secret: var("SESSION_SECRET"),
            cookie_secure,
            // Not filtered for blanks: an explicitly empty default is allowed.
            default_field_value: lookup("DEFAULT_FIELD_VALUE").unwrap_or_else(|| "N/A".to_string()),
            allowed_origins,
        })
    }

    /// Path part of `public_base_url` when it is served by this process.
    pub fn served_output_path(&self) -> Option<&str> {
        let base = self.public_base_url.trim_end_matches('/');
        (base.starts_with('/') && base.len() > 1).then_some(base)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
