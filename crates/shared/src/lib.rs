pub mod chat;
pub mod points;
pub mod storage;

pub mod settings {
    use crate::storage::StorageError;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    fn default_true() -> bool {
        true
    }

    fn default_api_version() -> String {
        "2023-05-15".into()
    }

    fn default_reply_delay_ms() -> u64 {
        500
    }

    fn default_regenerate_delay_ms() -> u64 {
        800
    }

    fn default_share_base_url() -> String {
        "https://aichat.example.com/share".into()
    }

    fn default_display_ms() -> u64 {
        // slide-in 0.3s + hold 1.5s + fade-out 0.5s
        2300
    }

    /// Backend adapter configuration
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BackendSettings {
        /// Use the in-process mock backend instead of the remote service
        #[serde(default = "default_true")]
        pub mock_mode: bool,
        /// Full completions endpoint of the remote deployment
        #[serde(default)]
        pub api_endpoint: String,
        #[serde(default = "default_api_version")]
        pub api_version: String,
        /// Bearer token; falls back to AZURE_OPENAI_API_KEY when unset
        #[serde(default)]
        pub api_key: Option<String>,
        #[serde(default = "default_reply_delay_ms")]
        pub reply_delay_ms: u64,
        #[serde(default = "default_regenerate_delay_ms")]
        pub regenerate_delay_ms: u64,
        /// Prefix for share links (`{base}/{share_id}`)
        #[serde(default = "default_share_base_url")]
        pub share_base_url: String,
    }

    impl Default for BackendSettings {
        fn default() -> Self {
            Self {
                mock_mode: true,
                api_endpoint: String::new(),
                api_version: default_api_version(),
                api_key: None,
                reply_delay_ms: default_reply_delay_ms(),
                regenerate_delay_ms: default_regenerate_delay_ms(),
                share_base_url: default_share_base_url(),
            }
        }
    }

    /// Toast notification timing
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NotificationSettings {
        /// How long one "+N points" toast stays on screen, fade-out included
        #[serde(default = "default_display_ms")]
        pub display_ms: u64,
    }

    impl Default for NotificationSettings {
        fn default() -> Self {
            Self {
                display_ms: default_display_ms(),
            }
        }
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct AppSettings {
        #[serde(default)]
        pub backend: BackendSettings,
        #[serde(default)]
        pub notifications: NotificationSettings,
    }

    impl AppSettings {
        /// Default settings file location (platform config dir)
        pub fn default_path() -> PathBuf {
            directories::ProjectDirs::from("com.local", "Chat Rewards", "ChatRewards")
                .map(|p| p.config_dir().join("settings.json"))
                .unwrap_or_else(|| PathBuf::from("./settings.json"))
        }

        /// Load settings, falling back to defaults when the file does not exist
        pub fn load(path: &Path) -> Result<Self, StorageError> {
            if !path.exists() {
                tracing::debug!(?path, "settings file missing, using defaults");
                return Ok(Self::default());
            }
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }

        pub fn save(&self, path: &Path) -> Result<(), StorageError> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, serde_json::to_string_pretty(self)?)?;
            Ok(())
        }
    }

    /// Light/dark palette
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ThemeMode {
        #[default]
        Light,
        Dark,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ContentWidth {
        Narrow,
        #[default]
        Medium,
        Wide,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ChatFontSize {
        Small,
        #[default]
        Medium,
        Large,
    }

    macro_rules! str_enum {
        ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
            impl $ty {
                pub fn as_str(&self) -> &'static str {
                    match self {
                        $($ty::$variant => $s,)+
                    }
                }

                /// Parse a persisted value; unknown values yield `None`
                pub fn parse(value: &str) -> Option<Self> {
                    match value {
                        $($s => Some($ty::$variant),)+
                        _ => None,
                    }
                }
            }
        };
    }

    str_enum!(ThemeMode { Light => "light", Dark => "dark" });
    str_enum!(ContentWidth { Narrow => "narrow", Medium => "medium", Wide => "wide" });
    str_enum!(ChatFontSize { Small => "small", Medium => "medium", Large => "large" });

    impl ThemeMode {
        pub fn toggled(self) -> Self {
            match self {
                ThemeMode::Light => ThemeMode::Dark,
                ThemeMode::Dark => ThemeMode::Light,
            }
        }
    }

    /// Display preferences persisted across reloads
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct DisplayPreferences {
        pub theme_mode: ThemeMode,
        pub content_width: ContentWidth,
        pub chat_font_size: ChatFontSize,
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_missing_file_yields_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let settings = AppSettings::load(&dir.path().join("nope.json")).unwrap();
            assert!(settings.backend.mock_mode);
            assert_eq!(settings.notifications.display_ms, 2300);
        }

        #[test]
        fn test_partial_file_fills_defaults() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("settings.json");
            std::fs::write(&path, r#"{"backend":{"mock_mode":false,"api_key":"k"}}"#).unwrap();

            let settings = AppSettings::load(&path).unwrap();
            assert!(!settings.backend.mock_mode);
            assert_eq!(settings.backend.api_key.as_deref(), Some("k"));
            assert_eq!(settings.backend.api_version, "2023-05-15");
            assert_eq!(settings.backend.reply_delay_ms, 500);
        }

        #[test]
        fn test_save_then_load() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("settings.json");
            let mut settings = AppSettings::default();
            settings.notifications.display_ms = 1800;
            settings.save(&path).unwrap();

            assert_eq!(AppSettings::load(&path).unwrap().notifications.display_ms, 1800);
        }

        #[test]
        fn test_preference_parsing() {
            assert_eq!(ThemeMode::parse("dark"), Some(ThemeMode::Dark));
            assert_eq!(ContentWidth::parse("huge"), None);
            assert_eq!(ChatFontSize::Large.as_str(), "large");
            assert_eq!(ThemeMode::Dark.toggled(), ThemeMode::Light);
        }
    }
}

pub mod clock {
    /// Current wall-clock time in epoch milliseconds
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
