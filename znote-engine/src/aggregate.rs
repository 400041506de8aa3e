use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use znote_config::{MarkerConfig, ToleranceConfig};
use znote_io::DrawingLoader;

use crate::access::{AccessResolver, DrawingHost, DrawingKey, DrawingState};
use crate::errors::ResolveError;
use crate::extract::ExtractionCache;
use crate::filter::filter_visible;
use crate::footprint::{FootprintCache, Tolerance};

/// 每张图纸名到升序去重编号列表的映射。按查询创建，从不持久化。
pub type SheetNotes = BTreeMap<String, Vec<u32>>;

/// 一次多图纸查询的指标。缓存命中与否来自缓存自身返回的
/// 显式标记，耗时字段仅供观测，绝不用于推断命中。
#[derive(Debug, Clone, Default)]
pub struct QueryMetrics {
    pub extraction_hit: bool,
    pub footprint_hits: u32,
    pub footprint_misses: u32,
    pub viewports_analyzed: u32,
    pub viewports_skipped: u32,
    pub markers_scanned: usize,
    /// 任一视口的图层过滤退化为仅全局冻结检查时置位。
    pub viewport_freeze_degraded: bool,
    pub extract_elapsed: Duration,
    pub resolve_elapsed: Duration,
}

/// 顶层编排：组合状态解析、两级缓存与可见性过滤。
/// 缓存由组合根显式构造并持有，不依赖任何进程级单例；
/// 同一图形的 N 张图纸只付一次全量扫描 + N 次廉价包含测试。
pub struct NoteResolver {
    access: AccessResolver,
    extraction: ExtractionCache,
    footprints: FootprintCache,
    tolerance: Tolerance,
}

impl NoteResolver {
    pub fn new(host: Arc<dyn DrawingHost>, loader: Box<dyn DrawingLoader + Send + Sync>) -> Self {
        Self::with_tolerance(host, loader, ToleranceConfig::default().into())
    }

    pub fn with_tolerance(
        host: Arc<dyn DrawingHost>,
        loader: Box<dyn DrawingLoader + Send + Sync>,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            access: AccessResolver::new(host, loader),
            extraction: ExtractionCache::new(),
            footprints: FootprintCache::new(),
            tolerance,
        }
    }

    /// 单图纸查询。
    pub fn notes_for_sheet(
        &self,
        key: &DrawingKey,
        sheet: &str,
        config: &MarkerConfig,
    ) -> Result<Vec<u32>, ResolveError> {
        let (mut mapping, _) = self.notes_for_sheets(key, std::slice::from_ref(&sheet), config)?;
        Ok(mapping.remove(sheet).unwrap_or_default())
    }

    /// 批量查询：访问解析一次、标记提取一次，随后逐图纸
    /// 枚举视口、取足迹并过滤。布局缺失是该图形范围的显式失败，
    /// 绝不以空结果掩盖。
    pub fn notes_for_sheets<S: AsRef<str>>(
        &self,
        key: &DrawingKey,
        sheets: &[S],
        config: &MarkerConfig,
    ) -> Result<(SheetNotes, QueryMetrics), ResolveError> {
        let started = Instant::now();
        let mut metrics = QueryMetrics::default();

        let view = self.access.acquire(key)?;
        let drawing = view.drawing();

        let extract_started = Instant::now();
        let (markers, lookup) = self.extraction.markers(key, drawing, config);
        metrics.extraction_hit = lookup.is_hit();
        metrics.markers_scanned = markers.len();
        metrics.extract_elapsed = extract_started.elapsed();

        let mut mapping = SheetNotes::new();
        for sheet in sheets {
            let sheet = sheet.as_ref();
            let layout = drawing
                .layout(sheet)
                .ok_or_else(|| ResolveError::LayoutNotFound {
                    name: sheet.to_string(),
                })?;

            // 首个视口是图纸空间窗口，无条件排除
            if !layout.viewports().is_empty() {
                metrics.viewports_skipped += 1;
            }

            let mut numbers = BTreeSet::new();
            for viewport in layout.content_viewports() {
                let footprint = match self.footprints.footprint(&layout.name, viewport, self.tolerance)
                {
                    Ok((polygon, lookup)) => {
                        if lookup.is_hit() {
                            metrics.footprint_hits += 1;
                        } else {
                            metrics.footprint_misses += 1;
                        }
                        polygon
                    }
                    Err(err) => {
                        warn!(
                            layout = %layout.name,
                            viewport = viewport.id,
                            error = %err,
                            "足迹计算失败，跳过该视口"
                        );
                        continue;
                    }
                };
                metrics.viewports_analyzed += 1;

                let context = view.supports_viewport_freeze().then_some(viewport);
                let report = filter_visible(
                    drawing,
                    &footprint,
                    markers.iter(),
                    context,
                    self.tolerance.coordinate,
                );
                if !report.viewport_freeze_checked {
                    metrics.viewport_freeze_degraded = true;
                }
                numbers.extend(report.matched);
            }
            mapping.insert(sheet.to_string(), numbers.into_iter().collect());
        }

        metrics.resolve_elapsed = started.elapsed();
        debug!(
            drawing = %key,
            sheets = mapping.len(),
            extraction_hit = metrics.extraction_hit,
            footprint_hits = metrics.footprint_hits,
            footprint_misses = metrics.footprint_misses,
            degraded = metrics.viewport_freeze_degraded,
            "多图纸批注解析完成"
        );
        Ok((mapping, metrics))
    }

    /// 查询图形当前的访问状态（不获取访问）。
    pub fn resolve_state(&self, key: &DrawingKey) -> DrawingState {
        self.access.resolve_state(key)
    }

    /// 使指定图形的提取缓存失效，下次查询将重新扫描。
    pub fn invalidate_drawing(&self, key: &DrawingKey) -> bool {
        self.extraction.invalidate(key)
    }

    #[inline]
    pub fn extraction_cache(&self) -> &ExtractionCache {
        &self.extraction
    }

    #[inline]
    pub fn footprint_cache(&self) -> &FootprintCache {
        &self.footprints
    }

    pub fn clear_caches(&self) {
        self.extraction.clear_all();
        self.footprints.clear_all();
    }
}
