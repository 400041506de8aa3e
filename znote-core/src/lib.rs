pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 二维点，内部以 `glam::DVec2` 表示，与图形数据库的双精度坐标保持一致。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Point2(pub DVec2);

    impl Point2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_vec(vec: DVec2) -> Self {
            Self(vec)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn translate(self, offset: Vector2) -> Self {
            Self(self.0 + offset.0)
        }

        #[inline]
        pub fn vector_to(self, other: Point2) -> Vector2 {
            Vector2(other.0 - self.0)
        }

        #[inline]
        pub fn distance(self, other: Point2) -> f64 {
            self.0.distance(other.0)
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Point2 {
        fn from(value: DVec2) -> Self {
            Self::from_vec(value)
        }
    }

    /// 二维向量。提供基础运算，供视口坐标变换使用。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Vector2(pub DVec2);

    impl Vector2 {
        #[inline]
        pub fn new(x: f64, y: f64) -> Self {
            Self(DVec2::new(x, y))
        }

        #[inline]
        pub fn from_points(start: Point2, end: Point2) -> Self {
            Self(end.0 - start.0)
        }

        #[inline]
        pub fn length_squared(self) -> f64 {
            self.0.length_squared()
        }

        /// 绕原点旋转指定弧度（数学正方向）。
        #[inline]
        pub fn rotate(self, angle: f64) -> Self {
            let (sin, cos) = angle.sin_cos();
            Self(DVec2::new(
                self.0.x * cos - self.0.y * sin,
                self.0.x * sin + self.0.y * cos,
            ))
        }

        #[inline]
        pub fn scale(self, factor: f64) -> Self {
            Self(self.0 * factor)
        }

        #[inline]
        pub fn x(self) -> f64 {
            self.0.x
        }

        #[inline]
        pub fn y(self) -> f64 {
            self.0.y
        }

        #[inline]
        pub fn as_vec2(self) -> DVec2 {
            self.0
        }
    }

    impl From<DVec2> for Vector2 {
        fn from(value: DVec2) -> Self {
            Self(value)
        }
    }

    /// 轴对齐边界框，用于包含测试前的快速剔除。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Bounds2D {
        min: Point2,
        max: Point2,
    }

    impl Bounds2D {
        #[inline]
        pub fn new(min: Point2, max: Point2) -> Self {
            Self { min, max }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: Point2::new(f64::INFINITY, f64::INFINITY),
                max: Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x() > self.max.x() || self.min.y() > self.max.y()
        }

        #[inline]
        pub fn min(&self) -> Point2 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> Point2 {
            self.max
        }

        pub fn include_point(&mut self, point: Point2) {
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            let min_vec = self.min.as_vec2().min(point.as_vec2());
            let max_vec = self.max.as_vec2().max(point.as_vec2());
            self.min = Point2::from_vec(min_vec);
            self.max = Point2::from_vec(max_vec);
        }

        /// 判断点是否落在边界框内（允许 `epsilon` 外扩）。
        pub fn contains(&self, point: Point2, epsilon: f64) -> bool {
            !self.is_empty()
                && point.x() >= self.min.x() - epsilon
                && point.x() <= self.max.x() + epsilon
                && point.y() >= self.min.y() - epsilon
                && point.y() <= self.max.y() + epsilon
        }
    }

    /// 有序多边形（至少 3 个顶点），顶点按边界顺序存储，支持凹多边形。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Polygon {
        vertices: Vec<Point2>,
    }

    impl Polygon {
        /// 由顶点序列构造多边形。顶点数不足 3 时返回 `None`。
        pub fn new(vertices: Vec<Point2>) -> Option<Self> {
            if vertices.len() < 3 {
                None
            } else {
                Some(Self { vertices })
            }
        }

        #[inline]
        pub fn vertices(&self) -> &[Point2] {
            &self.vertices
        }

        pub fn bounds(&self) -> Bounds2D {
            let mut bounds = Bounds2D::empty();
            for vertex in &self.vertices {
                bounds.include_point(*vertex);
            }
            bounds
        }

        /// 射线法点包含测试，边界上的点视为在内部。
        /// 对凹多边形（裁剪边界）同样正确。
        pub fn contains(&self, point: Point2, epsilon: f64) -> bool {
            if !self.bounds().contains(point, epsilon) {
                return false;
            }

            let count = self.vertices.len();
            let mut previous = count - 1;
            for current in 0..count {
                let start = self.vertices[previous];
                let end = self.vertices[current];
                if distance_to_segment(point, start, end) <= epsilon {
                    return true;
                }
                previous = current;
            }

            let mut inside = false;
            let mut previous = count - 1;
            for current in 0..count {
                let a = self.vertices[current].as_vec2();
                let b = self.vertices[previous].as_vec2();
                if (a.y > point.y()) != (b.y > point.y()) {
                    let t = (point.y() - a.y) / (b.y - a.y);
                    let crossing_x = a.x + t * (b.x - a.x);
                    if point.x() < crossing_x {
                        inside = !inside;
                    }
                }
                previous = current;
            }
            inside
        }
    }

    /// 点到线段的最短距离。
    fn distance_to_segment(point: Point2, start: Point2, end: Point2) -> f64 {
        let segment = end.as_vec2() - start.as_vec2();
        let length_squared = segment.length_squared();
        if length_squared <= f64::EPSILON {
            return point.distance(start);
        }
        let offset = point.as_vec2() - start.as_vec2();
        let t = (offset.dot(segment) / length_squared).clamp(0.0, 1.0);
        let closest = start.as_vec2() + segment * t;
        point.as_vec2().distance(closest)
    }

}

pub mod document {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::geometry::Point2;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntityId(u64);

    impl EntityId {
        #[inline]
        pub fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// 提供原始数值，便于序列化或日志输出。
        #[inline]
        pub fn get(self) -> u64 {
            self.0
        }
    }

    /// 图层。`is_frozen` 表示全局冻结（整图不可见）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layer {
        pub name: String,
        pub is_frozen: bool,
    }

    impl Layer {
        #[inline]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                is_frozen: false,
            }
        }
    }

    /// 模型空间实体。仅建模批注解析所需的类型与少量基础几何。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub enum Entity {
        Line(Line),
        Circle(Circle),
        Text(Text),
        MLeader(MLeader),
        BlockReference(BlockReference),
    }

    impl Entity {
        #[inline]
        pub fn layer_name(&self) -> &str {
            match self {
                Entity::Line(line) => &line.layer,
                Entity::Circle(circle) => &circle.layer,
                Entity::Text(text) => &text.layer,
                Entity::MLeader(mleader) => &mleader.layer,
                Entity::BlockReference(reference) => &reference.layer,
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Line {
        pub start: Point2,
        pub end: Point2,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Circle {
        pub center: Point2,
        pub radius: f64,
        pub layer: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Text {
        pub insert: Point2,
        pub content: String,
        pub height: f64,
        pub rotation: f64,
        pub layer: String,
    }

    /// 多重引线。`tag` 保存批注编号的原始文字，解析由上层负责。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MLeader {
        pub layer: String,
        pub style_name: Option<String>,
        pub location: Point2,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tag: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Attribute {
        pub tag: String,
        pub text: String,
    }

    /// 块参照。动态块以匿名名称插入时，`dynamic_source` 记录其原始块名。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BlockReference {
        pub name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub dynamic_source: Option<String>,
        pub insert: Point2,
        pub rotation: f64,
        pub attributes: Vec<Attribute>,
        pub layer: String,
    }

    impl BlockReference {
        /// 有效块名：动态块返回原始名，其余返回插入名。
        #[inline]
        pub fn effective_name(&self) -> &str {
            self.dynamic_source.as_deref().unwrap_or(&self.name)
        }

        pub fn attribute_text(&self, tag: &str) -> Option<&str> {
            self.attributes
                .iter()
                .find(|attribute| attribute.tag.eq_ignore_ascii_case(tag))
                .map(|attribute| attribute.text.as_str())
        }
    }

    /// 布局内的视口。`center`/`width`/`height` 描述图纸空间中的放置矩形，
    /// `view_center`/`custom_scale`/`twist` 描述其观察的设计空间区域，
    /// `clip` 为可选的非矩形裁剪边界（图纸空间坐标）。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Viewport {
        pub id: u64,
        pub center: Point2,
        pub width: f64,
        pub height: f64,
        pub view_center: Point2,
        pub custom_scale: f64,
        #[serde(default)]
        pub twist: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub clip: Option<Vec<Point2>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub frozen_layers: Vec<String>,
    }

    impl Viewport {
        pub fn new(
            id: u64,
            center: Point2,
            width: f64,
            height: f64,
            view_center: Point2,
            custom_scale: f64,
        ) -> Self {
            Self {
                id,
                center,
                width,
                height,
                view_center,
                custom_scale,
                twist: 0.0,
                clip: None,
                frozen_layers: Vec::new(),
            }
        }

        /// 指定图层是否在该视口内被单独冻结。
        pub fn is_layer_frozen(&self, layer: &str) -> bool {
            self.frozen_layers
                .iter()
                .any(|frozen| frozen.eq_ignore_ascii_case(layer))
        }
    }

    /// 布局（图纸）。视口按存储顺序保存，首个视口是图纸空间窗口本身，
    /// 永远不参与空间分析。
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Layout {
        pub name: String,
        viewports: Vec<Viewport>,
    }

    impl Layout {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                viewports: Vec::new(),
            }
        }

        pub fn push_viewport(&mut self, viewport: Viewport) {
            self.viewports.push(viewport);
        }

        #[inline]
        pub fn viewports(&self) -> &[Viewport] {
            &self.viewports
        }

        /// 内容视口：跳过首个（图纸空间窗口）视口，无论其编号为何。
        #[inline]
        pub fn content_viewports(&self) -> impl Iterator<Item = &Viewport> {
            self.viewports.iter().skip(1)
        }

        pub fn viewport(&self, id: u64) -> Option<&Viewport> {
            self.viewports.iter().find(|viewport| viewport.id == id)
        }

        pub fn viewport_mut(&mut self, id: u64) -> Option<&mut Viewport> {
            self.viewports.iter_mut().find(|viewport| viewport.id == id)
        }
    }

    /// 图形文档：共享的模型空间实体、图层表与若干布局。
    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    pub struct Drawing {
        layers: HashMap<String, Layer>,
        entities: Vec<(EntityId, Entity)>,
        next_entity_id: u64,
        layouts: Vec<Layout>,
    }

    impl Drawing {
        pub fn new() -> Self {
            let mut drawing = Self::default();
            drawing.ensure_layer("0");
            drawing
        }

        pub fn ensure_layer(&mut self, name: impl AsRef<str>) {
            let key = name.as_ref();
            self.layers
                .entry(key.to_string())
                .or_insert_with(|| Layer::new(key));
        }

        pub fn set_layer_frozen(&mut self, name: impl AsRef<str>, frozen: bool) {
            let key = name.as_ref();
            self.ensure_layer(key);
            if let Some(layer) = self.layers.get_mut(key) {
                layer.is_frozen = frozen;
            }
        }

        /// 指定图层是否全局冻结。未知图层按未冻结处理。
        pub fn is_layer_frozen(&self, name: &str) -> bool {
            self.layers
                .values()
                .find(|layer| layer.name.eq_ignore_ascii_case(name))
                .is_some_and(|layer| layer.is_frozen)
        }

        pub fn layer(&self, name: &str) -> Option<&Layer> {
            self.layers
                .values()
                .find(|layer| layer.name.eq_ignore_ascii_case(name))
        }

        #[inline]
        pub fn layers(&self) -> impl Iterator<Item = &Layer> {
            self.layers.values()
        }

        pub fn add_line(
            &mut self,
            start: Point2,
            end: Point2,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            let id = self.next_id();
            self.entities
                .push((id, Entity::Line(Line { start, end, layer })));
            id
        }

        pub fn add_circle(
            &mut self,
            center: Point2,
            radius: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            let id = self.next_id();
            self.entities.push((
                id,
                Entity::Circle(Circle {
                    center,
                    radius,
                    layer,
                }),
            ));
            id
        }

        pub fn add_text(
            &mut self,
            insert: Point2,
            content: impl Into<String>,
            height: f64,
            rotation: f64,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            let id = self.next_id();
            self.entities.push((
                id,
                Entity::Text(Text {
                    insert,
                    content: content.into(),
                    height,
                    rotation,
                    layer,
                }),
            ));
            id
        }

        pub fn add_mleader(
            &mut self,
            location: Point2,
            style_name: Option<String>,
            tag: Option<String>,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            let id = self.next_id();
            self.entities.push((
                id,
                Entity::MLeader(MLeader {
                    layer,
                    style_name,
                    location,
                    tag,
                }),
            ));
            id
        }

        pub fn add_block_reference(
            &mut self,
            name: impl Into<String>,
            insert: Point2,
            rotation: f64,
            attributes: Vec<Attribute>,
            layer: impl Into<String>,
        ) -> EntityId {
            let layer = layer.into();
            self.ensure_layer(&layer);
            let id = self.next_id();
            self.entities.push((
                id,
                Entity::BlockReference(BlockReference {
                    name: name.into(),
                    dynamic_source: None,
                    insert,
                    rotation,
                    attributes,
                    layer,
                }),
            ));
            id
        }

        pub fn add_entity(&mut self, entity: Entity) -> EntityId {
            self.ensure_layer(entity.layer_name().to_string());
            let id = self.next_id();
            self.entities.push((id, entity));
            id
        }

        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.entities
                .iter()
                .find(|(candidate, _)| *candidate == id)
                .map(|(_, entity)| entity)
        }

        #[inline]
        pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
            self.entities.iter().map(|(id, entity)| (*id, entity))
        }

        /// 追加新布局并返回可变引用，便于继续填充视口。
        pub fn add_layout(&mut self, name: impl Into<String>) -> &mut Layout {
            self.layouts.push(Layout::new(name));
            self.layouts
                .last_mut()
                .unwrap_or_else(|| unreachable!("布局刚刚插入"))
        }

        /// 按名称查找布局，名称比较不区分大小写。
        pub fn layout(&self, name: &str) -> Option<&Layout> {
            self.layouts
                .iter()
                .find(|layout| layout.name.eq_ignore_ascii_case(name))
        }

        pub fn layout_mut(&mut self, name: &str) -> Option<&mut Layout> {
            self.layouts
                .iter_mut()
                .find(|layout| layout.name.eq_ignore_ascii_case(name))
        }

        #[inline]
        pub fn layouts(&self) -> impl Iterator<Item = &Layout> {
            self.layouts.iter()
        }

        fn next_id(&mut self) -> EntityId {
            let id = EntityId::new(self.next_entity_id);
            self.next_entity_id += 1;
            id
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn ensure_layer_is_idempotent() {
            let mut drawing = Drawing::new();
            drawing.ensure_layer("ANNOT");
            drawing.ensure_layer("ANNOT");
            assert_eq!(drawing.layers().count(), 2); // "0" + "ANNOT"
        }

        #[test]
        fn frozen_lookup_ignores_case() {
            let mut drawing = Drawing::new();
            drawing.set_layer_frozen("Notes", true);
            assert!(drawing.is_layer_frozen("NOTES"));
            assert!(drawing.is_layer_frozen("notes"));
            assert!(!drawing.is_layer_frozen("0"));
            assert!(!drawing.is_layer_frozen("MISSING"));
        }

        #[test]
        fn layout_lookup_ignores_case() {
            let mut drawing = Drawing::new();
            drawing.add_layout("Sheet-101");
            assert!(drawing.layout("SHEET-101").is_some());
            assert!(drawing.layout("sheet-101").is_some());
            assert!(drawing.layout("Sheet-102").is_none());
        }

        #[test]
        fn content_viewports_skip_paper_space_window() {
            let mut drawing = Drawing::new();
            let layout = drawing.add_layout("101");
            // paper-space window comes first regardless of its id
            layout.push_viewport(Viewport::new(
                7,
                Point2::new(0.0, 0.0),
                420.0,
                297.0,
                Point2::new(0.0, 0.0),
                1.0,
            ));
            layout.push_viewport(Viewport::new(
                3,
                Point2::new(100.0, 100.0),
                200.0,
                150.0,
                Point2::new(50.0, 50.0),
                0.5,
            ));

            let layout = drawing.layout("101").expect("布局应存在");
            let ids: Vec<u64> = layout.content_viewports().map(|vp| vp.id).collect();
            assert_eq!(ids, vec![3]);
            assert_eq!(layout.viewports().len(), 2);
        }

        #[test]
        fn block_reference_effective_name_prefers_dynamic_source() {
            let mut reference = BlockReference {
                name: "*U12".to_string(),
                dynamic_source: Some("NOTE_BUBBLE".to_string()),
                insert: Point2::new(0.0, 0.0),
                rotation: 0.0,
                attributes: vec![Attribute {
                    tag: "TAGNUMBER".to_string(),
                    text: "5".to_string(),
                }],
                layer: "0".to_string(),
            };
            assert_eq!(reference.effective_name(), "NOTE_BUBBLE");
            assert_eq!(reference.attribute_text("tagnumber"), Some("5"));

            reference.dynamic_source = None;
            assert_eq!(reference.effective_name(), "*U12");
        }

        #[test]
        fn entity_ids_are_sequential_and_resolvable() {
            let mut drawing = Drawing::new();
            let line = drawing.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0), "GEOM");
            let note = drawing.add_mleader(
                Point2::new(5.0, 5.0),
                Some("NOTE_STYLE".to_string()),
                Some("12".to_string()),
                "ANNOT",
            );
            assert_ne!(line, note);
            assert!(matches!(drawing.entity(line), Some(Entity::Line(_))));
            assert!(matches!(drawing.entity(note), Some(Entity::MLeader(_))));
            assert_eq!(drawing.entities().count(), 2);
        }
    }
}
