//! 统一配置系统
//!
//! 提供TOML/JSON配置文件、环境变量覆盖和配置验证

use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod cloth;
pub mod solver;
pub mod window;

pub use cloth::ClothConfig;
pub use solver::SolverConfig;
pub use window::WindowConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 模拟主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 布料配置
    #[serde(default)]
    pub cloth: ClothConfig,

    /// 求解器配置
    #[serde(default)]
    pub solver: SolverConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 保存为JSON文件
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// 用任意键值来源覆盖配置，无法解析的值保持原样
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse_into<T: std::str::FromStr>(value: Option<String>, slot: &mut T) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *slot = parsed;
            }
        }

        // 布料配置
        parse_into(lookup("CLOTH_GRID_WIDTH"), &mut self.cloth.width);
        parse_into(lookup("CLOTH_GRID_HEIGHT"), &mut self.cloth.height);
        parse_into(lookup("CLOTH_ANCHORS_ENABLED"), &mut self.cloth.anchors_enabled);

        // 求解器配置
        parse_into(lookup("CLOTH_SOLVER_DAMPING"), &mut self.solver.damping);
        parse_into(lookup("CLOTH_SOLVER_TIME_STEP"), &mut self.solver.time_step);

        // 窗口配置
        parse_into(lookup("CLOTH_WINDOW_WIDTH"), &mut self.window.width);
        parse_into(lookup("CLOTH_WINDOW_HEIGHT"), &mut self.window.height);
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.window.validate()?;
        self.cloth.validate()?;
        self.solver.validate()?;
        Ok(())
    }

    /// 自动查找并加载配置文件
    ///
    /// 按以下顺序查找：
    /// 1. ./cloth.toml
    /// 2. ./cloth.json
    /// 3. <config_dir>/cloth_sim/config.toml
    /// 4. 使用默认配置
    pub fn load_or_default() -> Self {
        if let Ok(config) = Self::from_toml_file("cloth.toml") {
            tracing::info!(target: "config", "Loaded config from cloth.toml");
            return config;
        }

        if let Ok(config) = Self::from_json_file("cloth.json") {
            tracing::info!(target: "config", "Loaded config from cloth.json");
            return config;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("cloth_sim").join("config.toml");
            if let Ok(config) = Self::from_toml_file(&config_path) {
                tracing::info!(target: "config", "Loaded config from {:?}", config_path);
                return config;
            }
        }

        tracing::info!(target: "config", "Using default configuration");
        Self::default()
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（`RUST_LOG` 未设置时生效）
    pub level: LogLevel,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl LogLevel {
    /// 对应的 `EnvFilter` 指令
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cloth.width, 32);
        assert!(config.cloth.anchors_enabled);
    }

    #[test]
    fn test_toml_serialization() {
        let config = SimConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: SimConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_json_serialization() {
        let config = SimConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed: SimConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(config.solver.gravity, parsed.solver.gravity);
    }

    #[test]
    fn test_partial_toml() {
        let config = SimConfig::from_toml_str(
            r#"
            [cloth]
            width = 16
            height = 8
            pin_columns = [0, 15]
            anchors_enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.cloth.width, 16);
        assert_eq!(config.cloth.pin_columns, Some(vec![0, 15]));
        assert!(!config.cloth.anchors_enabled);
        assert_eq!(config.solver, SolverConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CLOTH_GRID_WIDTH", "12"),
            ("CLOTH_SOLVER_DAMPING", "0.5"),
            ("CLOTH_GRID_HEIGHT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = SimConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.cloth.width, 12);
        assert_eq!(config.cloth.height, 32);
        assert_eq!(config.solver.damping, 0.5);
    }

    #[test]
    fn test_validation_rejects_degenerate_grid() {
        let mut config = SimConfig::default();
        config.cloth.height = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = SimConfig::default();
        config.cloth.pin_columns = Some(vec![40]);
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.solver.time_step = 0.0;
        assert!(config.validate().is_err());
    }
}
