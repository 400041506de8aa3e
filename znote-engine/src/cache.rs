use std::sync::Arc;
use std::time::{Duration, Instant};

/// 两级缓存共用的条目形态。负载以 `Arc` 共享，
/// 返回给调用方后即便条目被替换也不会失效。
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    payload: Arc<T>,
    created_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload: Arc::new(payload),
            created_at: Instant::now(),
        }
    }

    #[inline]
    pub fn payload(&self) -> Arc<T> {
        Arc::clone(&self.payload)
    }

    #[inline]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// 缓存查询结果。命中与否由缓存显式返回，绝不依赖耗时推断。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    Hit,
    Miss,
}

impl CacheLookup {
    #[inline]
    pub fn is_hit(self) -> bool {
        matches!(self, CacheLookup::Hit)
    }
}
