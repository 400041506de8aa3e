use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub markers: MarkerConfig,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            markers: MarkerConfig::default(),
            tolerance: ToleranceConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ZNOTE_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ZNOTE_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 配置中的 (块名, 属性名) 组合，属性值被解析为批注编号。
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BlockAttribute {
    pub block: String,
    pub attribute: String,
}

/// 合格批注来源的筛选配置。
///
/// `leader_styles` 为空表示任何引线样式都可携带编号；
/// `blocks` 为空表示不从块参照提取编号。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkerConfig {
    #[serde(default)]
    pub leader_styles: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<BlockAttribute>,
}

impl MarkerConfig {
    pub fn with_leader_style(style: impl Into<String>) -> Self {
        Self {
            leader_styles: vec![style.into()],
            blocks: Vec::new(),
        }
    }
}

/// 浮点比较容差。全部容差集中于此，避免散落的魔数阈值。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ToleranceConfig {
    /// 坐标分量比较的绝对容差。
    #[serde(default = "ToleranceConfig::default_coordinate")]
    pub coordinate: f64,
    /// 缩放比例比较的相对容差。
    #[serde(default = "ToleranceConfig::default_scale_relative")]
    pub scale_relative: f64,
}

impl ToleranceConfig {
    fn default_coordinate() -> f64 {
        1e-6
    }

    fn default_scale_relative() -> f64 {
        1e-6
    }
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            coordinate: Self::default_coordinate(),
            scale_relative: Self::default_scale_relative(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sensible() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.markers.leader_styles.is_empty());
        assert!(cfg.markers.blocks.is_empty());
        assert!((cfg.tolerance.coordinate - 1e-6).abs() < f64::EPSILON);
        assert!((cfg.tolerance.scale_relative - 1e-6).abs() < f64::EPSILON);
    }

    #[test]
    fn load_from_temp_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"

            [markers]
            leader_styles = ["NOTE_STYLE", "KEYNOTE"]

            [[markers.blocks]]
            block = "NOTE_BUBBLE"
            attribute = "TAGNUMBER"

            [tolerance]
            coordinate = 1e-9
            scale_relative = 1e-7
            "#
        )
        .unwrap();

        let cfg = AppConfig::from_file(file.path()).expect("load config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.markers.leader_styles, vec!["NOTE_STYLE", "KEYNOTE"]);
        assert_eq!(
            cfg.markers.blocks,
            vec![BlockAttribute {
                block: "NOTE_BUBBLE".to_string(),
                attribute: "TAGNUMBER".to_string(),
            }]
        );
        assert!((cfg.tolerance.coordinate - 1e-9).abs() < f64::EPSILON);
        assert!((cfg.tolerance.scale_relative - 1e-7).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_file_reports_io_error() {
        let err = AppConfig::from_file("/no/such/config.toml").expect_err("应返回 IO 错误");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
