use crate::error::{BookCodeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub max_image_size: u32,
    pub min_call_interval_ms: u64,
    pub timeout_seconds: u64,
    pub ocr_command: String,
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".into(),
            max_image_size: 1024, // Vision API送信前の長辺上限
            min_call_interval_ms: 2000,
            timeout_seconds: 60,
            ocr_command: "tesseract".into(),
            cache_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| BookCodeError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("book-code-rust").join("config.json"))
    }

    /// Visionレスポンスキャッシュの保存先
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }

        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("book-code-rust")
            .join("vision")
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            return Ok(key);
        }

        self.api_key.clone().ok_or(BookCodeError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.model, "gemini-1.5-flash");
        assert_eq!(config.max_image_size, 1024);
        assert_eq!(config.min_call_interval_ms, 2000);
        assert_eq!(config.ocr_command, "tesseract");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_config_deserialization() {
        // 旧バージョンの設定ファイルでも不足分はデフォルトで補う
        let config: Config = serde_json::from_str(r#"{"model": "gemini-2.0-flash"}"#).unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.min_call_interval_ms, 2000);
    }

    #[test]
    fn test_cache_dir_override() {
        let config = Config {
            cache_dir: Some(PathBuf::from("/tmp/custom-cache")),
            ..Default::default()
        };
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/custom-cache"));
    }
}
