// Favorites settings management
// Persisted as one JSON document in the app_state table

use serde::{Deserialize, Serialize};

use super::database::{DatabaseManager, StorageResult};

const SETTINGS_KEY: &str = "favorites_settings";

/// Default gap left between neighbouring order keys
pub const DEFAULT_ORDER_SPACING: i64 = 1024;

/// Largest gap honoured between order keys; leaves room for billions of favorites
pub const MAX_ORDER_SPACING: i64 = 1 << 32;

/// Default wait on a locked database before reporting it unavailable
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FavoritesSettings {
    pub order_spacing: i64,
    pub busy_timeout_ms: u64,
}

impl Default for FavoritesSettings {
    fn default() -> Self {
        Self {
            order_spacing: DEFAULT_ORDER_SPACING,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl FavoritesSettings {
    /// Spacing clamped to at least 2 so a midpoint always fits after renumbering,
    /// and at most `MAX_ORDER_SPACING` so appended keys stay far from overflow
    pub fn effective_spacing(&self) -> i64 {
        self.order_spacing.clamp(2, MAX_ORDER_SPACING)
    }
}

impl DatabaseManager {
    /// Get favorites settings, falling back to defaults when missing or unreadable
    pub fn get_favorites_settings(&self) -> StorageResult<FavoritesSettings> {
        let value = self.get_state(SETTINGS_KEY)?;
        let settings = match value {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "unreadable favorites settings, using defaults");
                FavoritesSettings::default()
            }),
            None => FavoritesSettings::default(),
        };
        Ok(settings)
    }

    /// Update favorites settings
    pub fn update_favorites_settings(&self, settings: &FavoritesSettings) -> StorageResult<()> {
        let raw = serde_json::to_string(settings)?;
        self.set_state(SETTINGS_KEY, &raw)?;
        self.set_busy_timeout(std::time::Duration::from_millis(settings.busy_timeout_ms))
    }

    /// Initialize default settings if they don't exist
    pub fn init_default_settings(&self) -> StorageResult<()> {
        if self.get_state(SETTINGS_KEY)?.is_none() {
            self.update_favorites_settings(&FavoritesSettings::default())?;
        }
        Ok(())
    }
}
