use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use znote_config::MarkerConfig;
use znote_core::document::{Drawing, Entity, EntityId};
use znote_core::geometry::Point2;

use crate::access::DrawingKey;
use crate::cache::{CacheEntry, CacheLookup};

/// 批注标记的来源类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerSource {
    /// 携带编号标签的引线样式实体。
    LeaderStyle { style: String },
    /// 配置的 (块名, 属性名) 组合。
    Block { block: String },
}

/// 单个批注标记。扫描时创建，进入缓存后不可变；
/// 编号恒为正整数，解析失败的候选在扫描期即被剔除。
#[derive(Debug, Clone)]
pub struct NoteMarker {
    pub id: EntityId,
    pub number: u32,
    pub location: Point2,
    pub source: MarkerSource,
    pub layer: String,
}

/// 一次全量扫描的产物：引线来源与块来源分列保存。
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    pub leaders: Vec<NoteMarker>,
    pub blocks: Vec<NoteMarker>,
}

impl MarkerSet {
    pub fn iter(&self) -> impl Iterator<Item = &NoteMarker> {
        self.leaders.iter().chain(self.blocks.iter())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.leaders.len() + self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaders.is_empty() && self.blocks.is_empty()
    }
}

/// 解析批注编号。空白被剪除；非数字或非正整数返回 `None`。
fn parse_note_number(raw: &str) -> Option<u32> {
    match raw.trim().parse::<u32>() {
        Ok(number) if number > 0 => Some(number),
        _ => None,
    }
}

/// 对共享设计空间做一次线性扫描，按配置分类出合格的批注标记。
/// 这一遍扫描是整个解析流程的成本主体，因此其结果按图形身份缓存。
pub fn scan_model_space(drawing: &Drawing, config: &MarkerConfig) -> MarkerSet {
    let mut set = MarkerSet::default();
    for (id, entity) in drawing.entities() {
        match entity {
            Entity::MLeader(mleader) => {
                let style_matches = config.leader_styles.is_empty()
                    || mleader.style_name.as_deref().is_some_and(|style| {
                        config
                            .leader_styles
                            .iter()
                            .any(|wanted| wanted.eq_ignore_ascii_case(style))
                    });
                if !style_matches {
                    continue;
                }
                let Some(raw) = mleader.tag.as_deref() else {
                    continue;
                };
                match parse_note_number(raw) {
                    Some(number) => set.leaders.push(NoteMarker {
                        id,
                        number,
                        location: mleader.location,
                        source: MarkerSource::LeaderStyle {
                            style: mleader.style_name.clone().unwrap_or_default(),
                        },
                        layer: mleader.layer.clone(),
                    }),
                    None => {
                        debug!(entity = id.get(), tag = raw, "引线标签无法解析为正整数，忽略");
                    }
                }
            }
            Entity::BlockReference(reference) => {
                let Some(pair) = config
                    .blocks
                    .iter()
                    .find(|pair| pair.block.eq_ignore_ascii_case(reference.effective_name()))
                else {
                    continue;
                };
                let Some(raw) = reference.attribute_text(&pair.attribute) else {
                    continue;
                };
                match parse_note_number(raw) {
                    Some(number) => set.blocks.push(NoteMarker {
                        id,
                        number,
                        location: reference.insert,
                        source: MarkerSource::Block {
                            block: pair.block.clone(),
                        },
                        layer: reference.layer.clone(),
                    }),
                    None => {
                        debug!(entity = id.get(), tag = raw, "块属性无法解析为正整数，忽略");
                    }
                }
            }
            _ => {}
        }
    }
    set
}

/// 模型空间提取缓存：每个图形身份只做一次全量扫描。
/// 条目随进程存活，直到被显式失效——预期的使用模式是
/// 针对同一图形快照批量查询多张图纸。
#[derive(Default)]
pub struct ExtractionCache {
    entries: RwLock<HashMap<DrawingKey, CacheEntry<MarkerSet>>>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询标记列表，返回负载与显式的命中标记。
    /// 未命中时在读锁之外扫描、再以写锁回填；并发下同一图形
    /// 可能被扫描两次，代价是冗余计算而非错误结果。
    pub fn markers(
        &self,
        key: &DrawingKey,
        drawing: &Drawing,
        config: &MarkerConfig,
    ) -> (Arc<MarkerSet>, CacheLookup) {
        if let Some(entry) = self.read().get(key) {
            return (entry.payload(), CacheLookup::Hit);
        }

        let scanned = scan_model_space(drawing, config);
        debug!(
            drawing = %key,
            leaders = scanned.leaders.len(),
            blocks = scanned.blocks.len(),
            "完成模型空间标记扫描"
        );
        let entry = CacheEntry::new(scanned);
        let payload = entry.payload();
        self.write().insert(key.clone(), entry);
        (payload, CacheLookup::Miss)
    }

    /// 使指定图形的条目失效，返回是否确有条目被移除。
    pub fn invalidate(&self, key: &DrawingKey) -> bool {
        self.write().remove(key).is_some()
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

    fn read(&self) -> RwLockReadGuard<'_, HashMap<DrawingKey, CacheEntry<MarkerSet>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<DrawingKey, CacheEntry<MarkerSet>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
