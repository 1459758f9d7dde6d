//! Level-map layout: turns the chapter/level graph into renderable geometry.
//!
//! Nodes march left to right at a fixed segment length. Every chapter opens
//! with a gate on the baseline; level nodes alternate above and below it so
//! the path reads as a wave. Consecutive nodes are joined by cubic Bézier
//! curves whose control points sit 60% of a segment away from each endpoint.
//!
//! Pure and deterministic: the same graph and params always give the same map.

use serde::{Deserialize, Serialize};

use crate::domain::LevelGraph;

/// Horizontal pull of connector control points, as a share of the segment.
const CONTROL_PULL: f64 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    pub segment_length: f64,
    pub baseline_y: f64,
    pub wave_amplitude: f64,
    pub start_x: f64,
    pub margin: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            segment_length: 180.0,
            baseline_y: 200.0,
            wave_amplitude: 60.0,
            start_x: 120.0,
            margin: 120.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Gate,
    Level,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelRef {
    pub chapter_id: String,
    pub level_id: String,
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapNode {
    pub kind: NodeKind,
    pub x: f64,
    pub y: f64,
    pub chapter_id: String,
    /// Chapter title on gates, level title on level nodes.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_ref: Option<LevelRef>,
}

impl MapNode {
    fn point(&self) -> Point {
        Point { x: self.x, y: self.y }
    }
}

/// Cubic Bézier from `from` to `to`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub from: Point,
    pub c1: Point,
    pub c2: Point,
    pub to: Point,
}

impl Curve {
    fn between(from: Point, to: Point) -> Self {
        let pull = (to.x - from.x) * CONTROL_PULL;
        Self {
            from,
            c1: Point { x: from.x + pull, y: from.y },
            c2: Point { x: to.x - pull, y: to.y },
            to,
        }
    }

    /// SVG path data (`M x y C ...`).
    pub fn to_svg_path(&self) -> String {
        format!(
            "M {} {} C {} {}, {} {}, {} {}",
            self.from.x, self.from.y, self.c1.x, self.c1.y, self.c2.x, self.c2.y, self.to.x, self.to.y
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLayout {
    pub nodes: Vec<MapNode>,
    pub connectors: Vec<Curve>,
    pub total_width: f64,
}

pub fn layout(graph: &LevelGraph, params: &LayoutParams) -> MapLayout {
    let mut nodes = Vec::with_capacity(graph.chapters.len() + graph.level_count());

    for (chapter, levels) in graph.ordered() {
        let x = params.start_x + nodes.len() as f64 * params.segment_length;
        nodes.push(MapNode {
            kind: NodeKind::Gate,
            x,
            y: params.baseline_y,
            chapter_id: chapter.id.clone(),
            label: chapter.title.clone(),
            level_ref: None,
        });

        for level in levels {
            let index = nodes.len();
            let x = params.start_x + index as f64 * params.segment_length;
            let offset = if index % 2 == 0 { -params.wave_amplitude } else { params.wave_amplitude };
            nodes.push(MapNode {
                kind: NodeKind::Level,
                x,
                y: params.baseline_y + offset,
                chapter_id: chapter.id.clone(),
                label: level.title.clone(),
                level_ref: Some(LevelRef {
                    chapter_id: chapter.id.clone(),
                    level_id: level.id.clone(),
                    title: level.title.clone(),
                }),
            });
        }
    }

    let connectors = nodes
        .windows(2)
        .map(|pair| Curve::between(pair[0].point(), pair[1].point()))
        .collect();

    let total_width = match nodes.last() {
        Some(last) => last.x + params.margin,
        None => params.start_x + params.margin,
    };

    MapLayout { nodes, connectors, total_width }
}
