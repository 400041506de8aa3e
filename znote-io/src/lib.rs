use std::fs;
use std::path::Path;

use thiserror::Error;
use znote_core::document::Drawing;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid drawing snapshot {path:?}: {source}")]
    InvalidSnapshot {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 从磁盘加载图形文档。Closed 状态的访问策略依赖此接口临时读取未打开的图形。
pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

pub trait DrawingSaver {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError>;
}

/// JSON 快照格式的读写门面。快照即 `Drawing` 的 serde 序列化结果，
/// 保证三种访问状态读到的内容完全一致。
pub struct SnapshotFacade;

impl SnapshotFacade {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SnapshotFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingLoader for SnapshotFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| IoError::InvalidSnapshot {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl DrawingSaver for SnapshotFacade {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError> {
        let serialized =
            serde_json::to_string_pretty(drawing).map_err(|source| IoError::InvalidSnapshot {
                path: path.to_path_buf(),
                source,
            })?;
        fs::write(path, serialized).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}
