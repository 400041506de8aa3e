use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use tracing::debug;
use znote_config::ToleranceConfig;
use znote_core::document::Viewport;
use znote_core::geometry::{Point2, Polygon};

use crate::cache::{CacheEntry, CacheLookup};

/// 浮点比较容差。坐标分量使用绝对容差，缩放使用相对容差，
/// 两个阈值统一由配置给出，不允许散落的魔数。
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    pub coordinate: f64,
    pub scale_relative: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        ToleranceConfig::default().into()
    }
}

impl From<ToleranceConfig> for Tolerance {
    fn from(config: ToleranceConfig) -> Self {
        Self {
            coordinate: config.coordinate,
            scale_relative: config.scale_relative,
        }
    }
}

/// 足迹计算失败（GeometryError）。调用方应跳过该视口并继续。
#[derive(Debug, Error)]
pub enum FootprintError {
    #[error("viewport {id} has non-positive custom scale {scale}")]
    NonPositiveScale { id: u64, scale: f64 },
    #[error("viewport {id} clip boundary has {count} vertices, need at least 3")]
    DegenerateClip { id: u64, count: usize },
}

/// 视口指纹：参与足迹计算的全部视图参数的值快照。
/// 指纹（按容差）相等意味着缓存的足迹仍然有效。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportFingerprint {
    view_center: Point2,
    width: f64,
    height: f64,
    custom_scale: f64,
    twist: f64,
    clip_vertices: usize,
}

impl ViewportFingerprint {
    pub fn of(viewport: &Viewport) -> Self {
        Self {
            view_center: viewport.view_center,
            width: viewport.width,
            height: viewport.height,
            custom_scale: viewport.custom_scale,
            twist: viewport.twist,
            clip_vertices: viewport.clip.as_ref().map_or(0, Vec::len),
        }
    }

    /// 容差化相等比较。
    pub fn matches(&self, other: &Self, tolerance: Tolerance) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance.coordinate;
        let scale_close = (self.custom_scale - other.custom_scale).abs()
            <= tolerance.scale_relative * self.custom_scale.abs().max(other.custom_scale.abs());
        close(self.view_center.x(), other.view_center.x())
            && close(self.view_center.y(), other.view_center.y())
            && close(self.width, other.width)
            && close(self.height, other.height)
            && close(self.twist, other.twist)
            && scale_close
            && self.clip_vertices == other.clip_vertices
    }
}

/// 图纸空间点到设计空间的映射：
/// 相对视口中心平移 → 按 twist 反向旋转 → 除以自定义缩放 → 平移到视图中心。
fn paper_to_design(viewport: &Viewport, point: Point2) -> Point2 {
    let offset = viewport
        .center
        .vector_to(point)
        .rotate(-viewport.twist)
        .scale(1.0 / viewport.custom_scale);
    viewport.view_center.translate(offset)
}

/// 计算视口在设计空间中的可见足迹多边形。
/// 存在非矩形裁剪时映射裁剪边界，否则映射放置矩形的四角。
pub fn compute_footprint(viewport: &Viewport) -> Result<Polygon, FootprintError> {
    if viewport.custom_scale <= 0.0 {
        return Err(FootprintError::NonPositiveScale {
            id: viewport.id,
            scale: viewport.custom_scale,
        });
    }

    let paper_ring: Vec<Point2> = match &viewport.clip {
        Some(clip) => {
            if clip.len() < 3 {
                return Err(FootprintError::DegenerateClip {
                    id: viewport.id,
                    count: clip.len(),
                });
            }
            clip.clone()
        }
        None => {
            let half_width = viewport.width * 0.5;
            let half_height = viewport.height * 0.5;
            let center = viewport.center;
            vec![
                Point2::new(center.x() - half_width, center.y() - half_height),
                Point2::new(center.x() + half_width, center.y() - half_height),
                Point2::new(center.x() + half_width, center.y() + half_height),
                Point2::new(center.x() - half_width, center.y() + half_height),
            ]
        }
    };

    let design_ring: Vec<Point2> = paper_ring
        .into_iter()
        .map(|point| paper_to_design(viewport, point))
        .collect();
    let count = design_ring.len();
    Polygon::new(design_ring).ok_or(FootprintError::DegenerateClip {
        id: viewport.id,
        count,
    })
}

/// 足迹缓存键：布局名（折叠大小写）+ 视口编号。
/// 严格按视口、按布局隔离，即便两个布局的视口在视觉上完全一致
/// 也不共享条目。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FootprintKey {
    layout: String,
    viewport: u64,
}

impl FootprintKey {
    pub fn new(layout: &str, viewport: u64) -> Self {
        Self {
            layout: layout.to_ascii_lowercase(),
            viewport,
        }
    }
}

#[derive(Debug)]
struct FootprintSlot {
    fingerprint: ViewportFingerprint,
    entry: CacheEntry<Polygon>,
}

/// 视口足迹缓存：每个 (布局, 视口) 只保留一个条目，
/// 以指纹判定有效性；指纹失配仅替换该视口自身的条目。
#[derive(Default)]
pub struct FootprintCache {
    entries: RwLock<HashMap<FootprintKey, FootprintSlot>>,
}

impl FootprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取视口足迹，返回负载与显式的命中标记。
    pub fn footprint(
        &self,
        layout: &str,
        viewport: &Viewport,
        tolerance: Tolerance,
    ) -> Result<(Arc<Polygon>, CacheLookup), FootprintError> {
        let key = FootprintKey::new(layout, viewport.id);
        let fingerprint = ViewportFingerprint::of(viewport);

        if let Some(slot) = self.read().get(&key) {
            if slot.fingerprint.matches(&fingerprint, tolerance) {
                return Ok((slot.entry.payload(), CacheLookup::Hit));
            }
        }

        let polygon = compute_footprint(viewport)?;
        debug!(layout, viewport = viewport.id, "重新计算视口足迹");
        let entry = CacheEntry::new(polygon);
        let payload = entry.payload();
        self.write().insert(key, FootprintSlot { fingerprint, entry });
        Ok((payload, CacheLookup::Miss))
    }

    /// 移除指定布局的全部条目，返回移除数量。
    pub fn invalidate_layout(&self, layout: &str) -> usize {
        let folded = layout.to_ascii_lowercase();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|key, _| key.layout != folded);
        before - entries.len()
    }

    /// 移除单个视口的条目，兄弟视口不受影响。
    pub fn invalidate_viewport(&self, layout: &str, viewport: u64) -> bool {
        self.write()
            .remove(&FootprintKey::new(layout, viewport))
            .is_some()
    }

    pub fn clear_all(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<FootprintKey, FootprintSlot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<FootprintKey, FootprintSlot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn viewport(id: u64, scale: f64) -> Viewport {
        Viewport::new(
            id,
            Point2::new(150.0, 100.0),
            100.0,
            80.0,
            Point2::new(40.0, 30.0),
            scale,
        )
    }

    #[test]
    fn rectangle_footprint_maps_scale_and_center() {
        // 缩放 0.5：图纸上 100x80 的窗口看到设计空间 200x160 的区域
        let footprint = compute_footprint(&viewport(1, 0.5)).expect("足迹计算应成功");
        let bounds = footprint.bounds();
        assert!((bounds.min().x() - (40.0 - 100.0)).abs() < EPS);
        assert!((bounds.max().x() - (40.0 + 100.0)).abs() < EPS);
        assert!((bounds.min().y() - (30.0 - 80.0)).abs() < EPS);
        assert!((bounds.max().y() - (30.0 + 80.0)).abs() < EPS);
        assert!(footprint.contains(Point2::new(40.0, 30.0), EPS));
    }

    #[test]
    fn twist_rotates_the_footprint() {
        use std::f64::consts::FRAC_PI_2;

        let mut rotated = viewport(1, 1.0);
        rotated.twist = FRAC_PI_2;
        let footprint = compute_footprint(&rotated).expect("旋转视口足迹应成功");

        // 90° 旋转后宽高互换
        let bounds = footprint.bounds();
        assert!((bounds.max().x() - bounds.min().x() - 80.0).abs() < 1e-9);
        assert!((bounds.max().y() - bounds.min().y() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn clip_boundary_overrides_rectangle() {
        let mut clipped = viewport(1, 1.0);
        clipped.clip = Some(vec![
            Point2::new(100.0, 60.0),
            Point2::new(200.0, 60.0),
            Point2::new(150.0, 140.0),
        ]);
        let footprint = compute_footprint(&clipped).expect("裁剪足迹应成功");
        assert_eq!(footprint.vertices().len(), 3);

        // 三角形顶点 (150, 140) → 设计空间 (40, 70)
        let apex = footprint.vertices()[2];
        assert!((apex.x() - 40.0).abs() < EPS);
        assert!((apex.y() - 70.0).abs() < EPS);
    }

    #[test]
    fn degenerate_clip_is_rejected() {
        let mut broken = viewport(1, 1.0);
        broken.clip = Some(vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)]);
        let err = compute_footprint(&broken).expect_err("退化裁剪应失败");
        assert!(matches!(err, FootprintError::DegenerateClip { count: 2, .. }));
    }

    #[test]
    fn non_positive_scale_is_rejected() {
        let err = compute_footprint(&viewport(1, 0.0)).expect_err("零缩放应失败");
        assert!(matches!(err, FootprintError::NonPositiveScale { .. }));
    }

    #[test]
    fn fingerprint_tolerates_noise_below_epsilon() {
        let tolerance = Tolerance::default();
        let base = ViewportFingerprint::of(&viewport(1, 0.5));

        let mut jittered = viewport(1, 0.5);
        jittered.view_center = Point2::new(40.0 + 1e-9, 30.0 - 1e-9);
        assert!(base.matches(&ViewportFingerprint::of(&jittered), tolerance));

        let mut rescaled = viewport(1, 0.50001);
        rescaled.view_center = Point2::new(40.0, 30.0);
        assert!(!base.matches(&ViewportFingerprint::of(&rescaled), tolerance));
    }

    #[test]
    fn cache_hit_requires_matching_fingerprint() {
        let cache = FootprintCache::new();
        let tolerance = Tolerance::default();

        let (_, lookup) = cache
            .footprint("101", &viewport(2, 0.5), tolerance)
            .expect("首次计算应成功");
        assert_eq!(lookup, CacheLookup::Miss);

        let (_, lookup) = cache
            .footprint("101", &viewport(2, 0.5), tolerance)
            .expect("重复查询应命中");
        assert_eq!(lookup, CacheLookup::Hit);

        // 缩放变化只替换该视口的条目
        let (_, lookup) = cache
            .footprint("101", &viewport(2, 0.25), tolerance)
            .expect("指纹失配应重算");
        assert_eq!(lookup, CacheLookup::Miss);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn no_cross_layout_sharing() {
        let cache = FootprintCache::new();
        let tolerance = Tolerance::default();

        cache
            .footprint("101", &viewport(2, 0.5), tolerance)
            .expect("101 足迹应成功");
        let (_, lookup) = cache
            .footprint("102", &viewport(2, 0.5), tolerance)
            .expect("102 足迹应成功");
        // 同一视口参数、不同布局，不共享条目
        assert_eq!(lookup, CacheLookup::Miss);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn targeted_invalidation() {
        let cache = FootprintCache::new();
        let tolerance = Tolerance::default();
        cache
            .footprint("101", &viewport(2, 0.5), tolerance)
            .expect("填充 101/2");
        cache
            .footprint("101", &viewport(3, 0.5), tolerance)
            .expect("填充 101/3");
        cache
            .footprint("102", &viewport(2, 0.5), tolerance)
            .expect("填充 102/2");

        assert!(cache.invalidate_viewport("101", 2));
        assert!(!cache.invalidate_viewport("101", 2));
        assert_eq!(cache.len(), 2);

        let (_, lookup) = cache
            .footprint("101", &viewport(3, 0.5), tolerance)
            .expect("兄弟视口应仍然命中");
        assert_eq!(lookup, CacheLookup::Hit);

        assert_eq!(cache.invalidate_layout("101"), 1);
        assert_eq!(cache.len(), 1);
        cache.clear_all();
        assert!(cache.is_empty());
    }
}
