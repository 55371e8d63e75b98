//! # Settings Loader / 配置加载器
//!
//! Reads a TOML file into [`Settings`]. Missing sections and keys fall back to
//! the defaults in `sl_core::settings`; nothing here validates values.

use anyhow::Context;
use sl_core::Settings;
use std::path::Path;

/// Load settings from a TOML file
/// 从 TOML 文件加载配置
///
/// # Errors / 错误
///
/// - File cannot be read (I/O error)
/// - Content is not valid TOML or does not map onto [`Settings`]
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

/// Like [`load_settings`], but a missing file yields the defaults.
pub fn load_settings_or_default(path: &Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    load_settings(path)
}
