use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;
use znote_core::document::Drawing;
use znote_io::DrawingLoader;

use crate::errors::ResolveError;

/// 图形身份：以大小写不敏感的文件路径作为缓存键。
/// 自身不持有任何图形数据。
#[derive(Debug, Clone)]
pub struct DrawingKey {
    path: PathBuf,
    folded: String,
}

impl DrawingKey {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let folded = path.to_string_lossy().to_lowercase();
        Self { path, folded }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PartialEq for DrawingKey {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for DrawingKey {}

impl Hash for DrawingKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Display for DrawingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// 三种可解析的访问状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingState {
    /// 当前前台文档。
    Active,
    /// 已打开但不在前台。
    Inactive,
    /// 未打开，需要从磁盘临时加载。
    Closed,
}

/// 宿主中一份已打开的图形。互斥锁建模文档级独占访问：
/// 快照获取与内容替换都必须先取得锁。
#[derive(Debug)]
pub struct OpenDrawing {
    key: DrawingKey,
    slot: Mutex<Arc<Drawing>>,
}

impl OpenDrawing {
    pub fn new(key: DrawingKey, drawing: Drawing) -> Self {
        Self {
            key,
            slot: Mutex::new(Arc::new(drawing)),
        }
    }

    #[inline]
    pub fn key(&self) -> &DrawingKey {
        &self.key
    }

    /// 在文档锁内克隆当前快照。快照在一次逻辑查询期间保持稳定。
    pub fn snapshot(&self) -> Arc<Drawing> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&slot)
    }

    /// 替换文档内容（建模外部编辑）。
    pub fn replace(&self, drawing: Drawing) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(drawing);
    }
}

/// 图形访问宿主（外部协作者）：报告前台文档与打开文档列表。
pub trait DrawingHost: Send + Sync {
    /// 当前前台文档的身份。
    fn active(&self) -> Option<DrawingKey>;

    /// 按身份查找已打开的文档。
    fn open(&self, key: &DrawingKey) -> Option<Arc<OpenDrawing>>;
}

#[derive(Debug, Default)]
struct HostState {
    active: Option<DrawingKey>,
    open: HashMap<DrawingKey, Arc<OpenDrawing>>,
}

/// 进程内宿主实现，供嵌入方与测试组装文档集合。
#[derive(Debug, Default)]
pub struct InMemoryHost {
    inner: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开一份图形并返回其句柄。重复打开同一身份会替换旧句柄。
    pub fn open_drawing(&self, key: DrawingKey, drawing: Drawing) -> Arc<OpenDrawing> {
        let handle = Arc::new(OpenDrawing::new(key.clone(), drawing));
        let mut inner = self.lock();
        inner.open.insert(key, Arc::clone(&handle));
        handle
    }

    /// 将已打开的图形设为前台，未打开时返回 false。
    pub fn activate(&self, key: &DrawingKey) -> bool {
        let mut inner = self.lock();
        if inner.open.contains_key(key) {
            inner.active = Some(key.clone());
            true
        } else {
            false
        }
    }

    pub fn deactivate(&self) {
        self.lock().active = None;
    }

    /// 关闭图形，若其为前台文档则同时清除前台标记。
    pub fn close_drawing(&self, key: &DrawingKey) -> bool {
        let mut inner = self.lock();
        if inner.active.as_ref() == Some(key) {
            inner.active = None;
        }
        inner.open.remove(key).is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DrawingHost for InMemoryHost {
    fn active(&self) -> Option<DrawingKey> {
        self.lock().active.clone()
    }

    fn open(&self, key: &DrawingKey) -> Option<Arc<OpenDrawing>> {
        self.lock().open.get(key).cloned()
    }
}

/// 一次查询范围内的统一图形视图。三种访问策略汇聚到同一形态，
/// 上层编排不再感知 Active/Inactive/Closed 分支。
/// 视图被丢弃时，Closed 状态临时加载的图形随之确定性释放。
#[derive(Debug)]
pub struct DrawingView {
    state: DrawingState,
    drawing: Arc<Drawing>,
}

impl DrawingView {
    #[inline]
    pub fn state(&self) -> DrawingState {
        self.state
    }

    #[inline]
    pub fn drawing(&self) -> &Drawing {
        &self.drawing
    }

    /// 视口级冻结检查是否可用。临时加载的 Closed 图形缺少
    /// 所需上下文，过滤器将退化为仅全局冻结检查。
    #[inline]
    pub fn supports_viewport_freeze(&self) -> bool {
        self.state != DrawingState::Closed
    }
}

/// 状态解析与访问获取。
pub struct AccessResolver {
    host: Arc<dyn DrawingHost>,
    loader: Box<dyn DrawingLoader + Send + Sync>,
}

impl AccessResolver {
    pub fn new(host: Arc<dyn DrawingHost>, loader: Box<dyn DrawingLoader + Send + Sync>) -> Self {
        Self { host, loader }
    }

    /// 解析顺序：与前台文档比较 → 扫描打开列表 → 默认为 Closed。
    pub fn resolve_state(&self, key: &DrawingKey) -> DrawingState {
        if self.host.active().is_some_and(|active| active == *key) {
            DrawingState::Active
        } else if self.host.open(key).is_some() {
            DrawingState::Inactive
        } else {
            DrawingState::Closed
        }
    }

    /// 获取一次查询范围内的图形视图。
    /// 三种策略对相同内容产出行为一致的只读结果。
    pub fn acquire(&self, key: &DrawingKey) -> Result<DrawingView, ResolveError> {
        let state = self.resolve_state(key);
        let drawing = match state {
            DrawingState::Active | DrawingState::Inactive => {
                let open =
                    self.host
                        .open(key)
                        .ok_or_else(|| ResolveError::DocumentVanished {
                            identity: key.to_string(),
                        })?;
                open.snapshot()
            }
            DrawingState::Closed => {
                debug!(path = %key, "从磁盘临时加载未打开的图形");
                Arc::new(self.loader.load(key.path())?)
            }
        };
        Ok(DrawingView { state, drawing })
    }
}
