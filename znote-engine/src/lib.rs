pub mod access;
pub mod aggregate;
pub mod cache;
pub mod extract;
pub mod filter;
pub mod footprint;

pub mod errors {
    use thiserror::Error;

    /// 批注解析的致命错误。按图纸/图形为失败范围，
    /// 视口级与标记级的失败会降级为部分结果，不在此列。
    #[derive(Debug, Error)]
    pub enum ResolveError {
        /// 请求的布局在图形中不存在。
        #[error("layout {name:?} not found in drawing")]
        LayoutNotFound { name: String },
        /// 解析为 Inactive 的文档在获取访问时已不在打开列表中。
        #[error("document {identity} is no longer open")]
        DocumentVanished { identity: String },
        /// Closed 状态的图形文件缺失或无法读取。
        #[error(transparent)]
        Io(#[from] znote_io::IoError),
    }
}

pub use access::{AccessResolver, DrawingHost, DrawingKey, DrawingState, DrawingView, InMemoryHost};
pub use aggregate::{NoteResolver, QueryMetrics, SheetNotes};
pub use errors::ResolveError;
pub use extract::{ExtractionCache, MarkerSet, MarkerSource, NoteMarker};
pub use footprint::{FootprintCache, FootprintError, Tolerance, ViewportFingerprint};
