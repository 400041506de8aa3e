use tracing::warn;
use znote_core::document::{Drawing, Viewport};
use znote_core::geometry::Polygon;

use crate::extract::NoteMarker;

/// 一次过滤的结果：落入足迹且未被排除的编号，
/// 以及视口级冻结检查是否真正执行过。
#[derive(Debug, Clone)]
pub struct FilterReport {
    pub matched: Vec<u32>,
    pub viewport_freeze_checked: bool,
}

/// 包含与可见性过滤：标记位置在足迹多边形内（含边界），
/// 且其图层既未全局冻结、也未在该视口内单独冻结。
///
/// `viewport_context` 为 `None` 时（例如临时加载的 Closed 图形），
/// 视口级检查按尽力而为语义退化为仅全局冻结检查，并记录日志，
/// 绝不让整次操作失败。
pub fn filter_visible<'a>(
    drawing: &Drawing,
    footprint: &Polygon,
    markers: impl IntoIterator<Item = &'a NoteMarker>,
    viewport_context: Option<&Viewport>,
    epsilon: f64,
) -> FilterReport {
    let viewport_freeze_checked = viewport_context.is_some();
    if !viewport_freeze_checked {
        warn!("缺少视口上下文，图层过滤退化为仅全局冻结检查");
    }

    let mut matched = Vec::new();
    for marker in markers {
        if drawing.is_layer_frozen(&marker.layer) {
            continue;
        }
        if let Some(viewport) = viewport_context {
            if viewport.is_layer_frozen(&marker.layer) {
                continue;
            }
        }
        if footprint.contains(marker.location, epsilon) {
            matched.push(marker.number);
        }
    }

    FilterReport {
        matched,
        viewport_freeze_checked,
    }
}
