//! Display preferences and the floating points widget position.

use parking_lot::RwLock;
use shared::points::IndicatorPosition;
use shared::settings::{ChatFontSize, ContentWidth, DisplayPreferences, ThemeMode};
use shared::storage::{self, keys, KeyValueStore};
use std::sync::Arc;

pub struct PreferencesStore {
    prefs: RwLock<DisplayPreferences>,
    indicator: RwLock<IndicatorPosition>,
    store: Arc<dyn KeyValueStore>,
}

/// Stored enum value, or the default when absent or unrecognised
fn load_choice<T: Default>(store: &dyn KeyValueStore, key: &str, parse: fn(&str) -> Option<T>) -> T {
    match store.get(key) {
        Ok(Some(raw)) => parse(&raw).unwrap_or_else(|| {
            tracing::warn!(key, value = %raw, "ignoring unknown preference value");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read preference");
            T::default()
        }
    }
}

impl PreferencesStore {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let prefs = DisplayPreferences {
            theme_mode: load_choice(store.as_ref(), keys::THEME_MODE, ThemeMode::parse),
            content_width: load_choice(store.as_ref(), keys::CONTENT_WIDTH, ContentWidth::parse),
            chat_font_size: load_choice(store.as_ref(), keys::CHAT_FONT_SIZE, ChatFontSize::parse),
        };
        let indicator = storage::load(store.as_ref(), keys::INDICATOR_POSITION).unwrap_or_default();

        Self {
            prefs: RwLock::new(prefs),
            indicator: RwLock::new(indicator),
            store,
        }
    }

    pub fn preferences(&self) -> DisplayPreferences {
        *self.prefs.read()
    }

    pub fn toggle_theme_mode(&self) -> ThemeMode {
        let mode = {
            let mut prefs = self.prefs.write();
            prefs.theme_mode = prefs.theme_mode.toggled();
            prefs.theme_mode
        };
        self.save(keys::THEME_MODE, mode.as_str());
        mode
    }

    pub fn set_content_width(&self, width: ContentWidth) {
        self.prefs.write().content_width = width;
        self.save(keys::CONTENT_WIDTH, width.as_str());
    }

    pub fn set_chat_font_size(&self, size: ChatFontSize) {
        self.prefs.write().chat_font_size = size;
        self.save(keys::CHAT_FONT_SIZE, size.as_str());
    }

    pub fn indicator_position(&self) -> IndicatorPosition {
        *self.indicator.read()
    }

    pub fn update_indicator_position(&self, position: IndicatorPosition) {
        *self.indicator.write() = position;
        storage::mirror(self.store.as_ref(), keys::INDICATOR_POSITION, &position);
    }

    /// Stored position pulled back inside a `viewport` after a resize
    pub fn clamped_indicator_position(&self, viewport: (f64, f64), widget: (f64, f64)) -> IndicatorPosition {
        self.indicator_position().clamped(viewport, widget)
    }

    fn save(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!(key, error = %e, "failed to persist preference");
        }
    }
}
