use anyhow::Result;
use serde::Deserialize;
use anyhow::anyhow;

const SUPPORTED_FORMATS: &[&str] = &["json", "toml"];

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Host data folder; the storage directory is created beneath it.
    #[serde(default)]
    pub data_dir: String,
    #[serde(default = "default_storage_dir_name")]
    pub storage_dir_name: String,
    #[serde(default = "default_format")]
    pub format: String,
    /// Split keys into nested paths on this character, e.g. `"."`.
    #[serde(default)]
    pub key_separator: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            storage_dir_name: default_storage_dir_name(),
            format: default_format(),
            key_separator: None,
        }
    }
}

fn default_storage_dir_name() -> String { "storage".into() }
fn default_format() -> String { "json".into() }
fn default_data_dir() -> String { ".".into() }

pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    if std::path::Path::new(&path).exists() {
        load_from_file(&path)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn load_and_validate() -> Result<Self> {
        let mut cfg = load_default()?;
        cfg.normalize_and_validate()?;
        Ok(cfg)
    }

    pub fn normalize_and_validate(&mut self) -> Result<()> {
        // 数据目录可由环境变量 STORE_DATA_DIR 覆盖空值
        self.storage.normalize_from_env();
        self.storage.normalize();
        self.storage.validate()?;
        Ok(())
    }
}

impl StorageConfig {
    pub fn normalize_from_env(&mut self) {
        if self.data_dir.trim().is_empty() {
            if let Ok(dir) = std::env::var("STORE_DATA_DIR") {
                self.data_dir = dir;
            }
        }
    }

    fn normalize(&mut self) {
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.storage_dir_name.trim().is_empty() {
            self.storage_dir_name = default_storage_dir_name();
        }
        self.format = self.format.trim().to_ascii_lowercase();
        if self.key_separator.as_deref() == Some("") {
            self.key_separator = None;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_FORMATS.contains(&self.format.as_str()) {
            return Err(anyhow!("storage.format must be one of {:?}, got `{}`", SUPPORTED_FORMATS, self.format));
        }
        let name = self.storage_dir_name.as_str();
        if name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(anyhow!("storage.storage_dir_name must be a plain directory name"));
        }
        if let Some(sep) = &self.key_separator {
            let mut chars = sep.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c != '/' && c != '\\' => {}
                _ => return Err(anyhow!("storage.key_separator must be a single non-path character")),
            }
        }
        Ok(())
    }

    /// Separator as a char; only meaningful after `validate`.
    pub fn key_separator_char(&self) -> Option<char> {
        self.key_separator.as_deref().and_then(|s| s.chars().next())
    }
}
