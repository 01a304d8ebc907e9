//! Haar cascade classifier
//!
//! Reads OpenCV's XML cascade format (boosted stages over upright Haar
//! features) and scans an image pyramid with it. Windows are variance
//! normalised, so thresholds in stock cascades apply unchanged.

use super::types::Region;
use crate::error::{PipelineError, Result};
use image::{imageops, GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use roxmltree::{Document, Node};
use std::collections::BTreeMap;
use std::path::Path;

/// Relative tolerance used when merging overlapping hits
const GROUP_EPS: f64 = 0.2;

/// Windows with area / sqrt(variance term) at or above this are too flat to classify
const MIN_CONTRAST: f64 = 0.1;

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    left: i32,
    right: i32,
    feature: usize,
    threshold: f32,
}

/// Decision tree; non-positive child indices point into `leaves` (negated)
#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f32>,
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f32,
    classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone, Copy)]
struct WeightedRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f32,
}

#[derive(Debug, Clone)]
struct HaarFeature {
    rects: Vec<WeightedRect>,
}

/// Scan settings for [`HaarCascade::detect_multi_scale`]
#[derive(Debug, Clone)]
pub struct MultiScaleParams {
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
    pub max_size: Option<(u32, u32)>,
}

impl Default for MultiScaleParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 3,
            min_size: (0, 0),
            max_size: None,
        }
    }
}

pub struct HaarCascade {
    window: (u32, u32),
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

impl HaarCascade {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading cascade from {}", path.display());

        let xml = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::cascade(format!("cannot read {}: {}", path.display(), err))
        })?;
        let cascade = Self::parse(&xml)?;

        tracing::info!(
            "Cascade loaded: {} stages, {} features, {}x{} window",
            cascade.stages.len(),
            cascade.features.len(),
            cascade.window.0,
            cascade.window.1
        );
        Ok(cascade)
    }

    pub fn parse(xml: &str) -> Result<Self> {
        let doc = Document::parse(xml)
            .map_err(|err| PipelineError::cascade(format!("invalid XML: {}", err)))?;

        let cascade = elements(doc.root_element())
            .find(|node| child(*node, "stages").is_some())
            .ok_or_else(|| {
                PipelineError::cascade(
                    "no <stages> found; only the current cascade format is supported",
                )
            })?;

        if let Some(stage_type) = child(cascade, "stageType").and_then(|n| n.text()) {
            if stage_type.trim() != "BOOST" {
                return Err(PipelineError::cascade(format!(
                    "unsupported stage type {}",
                    stage_type.trim()
                )));
            }
        }
        if let Some(feature_type) = child(cascade, "featureType").and_then(|n| n.text()) {
            if feature_type.trim() != "HAAR" {
                return Err(PipelineError::cascade(format!(
                    "unsupported feature type {}",
                    feature_type.trim()
                )));
            }
        }

        let width = parse_scalar(text_of(cascade, "width")?, "width")? as u32;
        let height = parse_scalar(text_of(cascade, "height")?, "height")? as u32;
        if width < 3 || height < 3 {
            return Err(PipelineError::cascade(format!("window {}x{} is too small", width, height)));
        }

        let features = elements(required(cascade, "features")?)
            .map(|node| parse_feature(node, width, height))
            .collect::<Result<Vec<_>>>()?;

        let stages = elements(required(cascade, "stages")?)
            .map(|node| parse_stage(node, features.len()))
            .collect::<Result<Vec<_>>>()?;

        if stages.is_empty() {
            return Err(PipelineError::cascade("cascade has no stages"));
        }

        Ok(Self {
            window: (width, height),
            stages,
            features,
        })
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Detect objects of every size between `min_size` and `max_size`
    pub fn detect_multi_scale(&self, gray: &GrayImage, params: &MultiScaleParams) -> Vec<Region> {
        let _span = tracing::debug_span!("cascade_scan").entered();

        let (img_w, img_h) = gray.dimensions();
        let (win_w, win_h) = self.window;
        let step_factor = params.scale_factor.max(1.0001) as f64;

        let mut hits = Vec::new();
        let mut factor = 1.0f64;
        loop {
            let scaled_win_w = (win_w as f64 * factor).round() as u32;
            let scaled_win_h = (win_h as f64 * factor).round() as u32;
            if scaled_win_w > img_w || scaled_win_h > img_h {
                break;
            }
            if let Some((max_w, max_h)) = params.max_size {
                if scaled_win_w > max_w || scaled_win_h > max_h {
                    break;
                }
            }

            if scaled_win_w >= params.min_size.0 && scaled_win_h >= params.min_size.1 {
                hits.extend(self.scan_level(gray, factor, (scaled_win_w, scaled_win_h)));
            }
            factor *= step_factor;
        }

        tracing::debug!("{} raw cascade hits", hits.len());
        group_rectangles(&hits, params.min_neighbors, GROUP_EPS)
    }

    fn scan_level(&self, gray: &GrayImage, factor: f64, reported: (u32, u32)) -> Vec<Region> {
        let (img_w, img_h) = gray.dimensions();
        let (win_w, win_h) = self.window;
        let level_w = (img_w as f64 / factor).round() as u32;
        let level_h = (img_h as f64 / factor).round() as u32;
        if level_w < win_w || level_h < win_h {
            return Vec::new();
        }

        let level = imageops::resize(gray, level_w, level_h, imageops::FilterType::Triangle);
        let sums: Integral = integral_image::<_, u64>(&level);
        let squares: Integral = integral_squared_image::<_, u64>(&level);

        let step = if factor > 2.0 { 1 } else { 2 };
        let mut hits = Vec::new();
        for y in (0..=level_h - win_h).step_by(step) {
            for x in (0..=level_w - win_w).step_by(step) {
                if self.evaluate(&sums, &squares, x, y) {
                    hits.push(Region::new(
                        (x as f64 * factor).round() as i32,
                        (y as f64 * factor).round() as i32,
                        reported.0,
                        reported.1,
                    ));
                }
            }
        }
        hits
    }

    /// Run every stage on the window whose top-left corner is at (x, y)
    ///
    /// Flat and near-flat windows are rejected before any stage runs.
    fn evaluate(&self, sums: &Integral, squares: &Integral, x: u32, y: u32) -> bool {
        let (win_w, win_h) = self.window;
        let (norm_w, norm_h) = (win_w - 2, win_h - 2);
        let area = (norm_w * norm_h) as f64;

        let sum = rect_sum(sums, x + 1, y + 1, norm_w, norm_h);
        let sq_sum = rect_sum(squares, x + 1, y + 1, norm_w, norm_h);
        let spread = area * sq_sum - sum * sum;
        if spread <= 0.0 {
            return false;
        }
        let norm = spread.sqrt();
        if area / norm >= MIN_CONTRAST {
            return false;
        }
        let inv_norm = 1.0 / norm;

        for stage in &self.stages {
            let mut score = 0.0f32;
            for classifier in &stage.classifiers {
                let mut index = 0i32;
                loop {
                    let node = &classifier.nodes[index as usize];
                    let value = (self.feature_value(node.feature, sums, x, y) * inv_norm) as f32;
                    index = if value < node.threshold {
                        node.left
                    } else {
                        node.right
                    };
                    if index <= 0 {
                        break;
                    }
                }
                score += classifier.leaves[(-index) as usize];
            }
            if score < stage.threshold {
                return false;
            }
        }
        true
    }

    fn feature_value(&self, feature: usize, sums: &Integral, x: u32, y: u32) -> f64 {
        self.features[feature]
            .rects
            .iter()
            .map(|r| r.weight as f64 * rect_sum(sums, x + r.x, y + r.y, r.width, r.height))
            .sum()
    }
}

fn rect_sum(integral: &Integral, x: u32, y: u32, width: u32, height: u32) -> f64 {
    let at = |px: u32, py: u32| integral.get_pixel(px, py)[0] as f64;
    at(x + width, y + height) - at(x, y + height) - at(x + width, y) + at(x, y)
}

/// Merge overlapping hits into averaged rectangles
///
/// Clusters need more than `min_neighbors` members to survive, and a surviving
/// cluster nested inside a stronger one is dropped. With `min_neighbors == 0`
/// the hits are returned untouched.
pub fn group_rectangles(rects: &[Region], min_neighbors: u32, eps: f64) -> Vec<Region> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let mut parent: Vec<usize> = (0..rects.len()).collect();
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            if similar(&rects[i], &rects[j], eps) {
                let (a, b) = (find_root(&mut parent, i), find_root(&mut parent, j));
                if a != b {
                    parent[b] = a;
                }
            }
        }
    }

    let mut clusters: BTreeMap<usize, ([f64; 4], u32)> = BTreeMap::new();
    for (i, rect) in rects.iter().enumerate() {
        let root = find_root(&mut parent, i);
        let entry = clusters.entry(root).or_insert(([0.0; 4], 0));
        entry.0[0] += rect.x as f64;
        entry.0[1] += rect.y as f64;
        entry.0[2] += rect.width as f64;
        entry.0[3] += rect.height as f64;
        entry.1 += 1;
    }

    let strong: Vec<(Region, u32)> = clusters
        .into_values()
        .filter(|(_, count)| *count > min_neighbors)
        .map(|(sum, count)| {
            let n = count as f64;
            let region = Region::new(
                (sum[0] / n).round() as i32,
                (sum[1] / n).round() as i32,
                (sum[2] / n).round() as u32,
                (sum[3] / n).round() as u32,
            );
            (region, count)
        })
        .collect();

    strong
        .iter()
        .enumerate()
        .filter(|(i, (inner, inner_count))| {
            !strong.iter().enumerate().any(|(j, (outer, outer_count))| {
                *i != j
                    && nested(inner, outer, eps)
                    && (*outer_count > (*inner_count).max(3) || *inner_count < 3)
            })
        })
        .map(|(_, (region, _))| *region)
        .collect()
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn similar(a: &Region, b: &Region, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

fn nested(inner: &Region, outer: &Region, eps: f64) -> bool {
    let dx = (outer.width as f64 * eps).round() as i32;
    let dy = (outer.height as f64 * eps).round() as i32;
    inner.x >= outer.x - dx
        && inner.y >= outer.y - dy
        && inner.right() <= outer.right() + dx
        && inner.bottom() <= outer.bottom() + dy
}

fn elements<'a, 'i>(node: Node<'a, 'i>) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children().filter(|child| child.is_element())
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    elements(node).find(|child| child.has_tag_name(name))
}

fn required<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Result<Node<'a, 'i>> {
    child(node, name).ok_or_else(|| PipelineError::cascade(format!("missing <{}>", name)))
}

fn text_of<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    required(node, name)?
        .text()
        .ok_or_else(|| PipelineError::cascade(format!("<{}> is empty", name)))
}

fn parse_numbers(text: &str, what: &str) -> Result<Vec<f32>> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<f32>().map_err(|_| {
                PipelineError::cascade(format!("bad number {:?} in <{}>", token, what))
            })
        })
        .collect()
}

fn parse_scalar(text: &str, what: &str) -> Result<f32> {
    match parse_numbers(text, what)?.as_slice() {
        [value] => Ok(*value),
        _ => Err(PipelineError::cascade(format!("<{}> must hold one number", what))),
    }
}

fn parse_feature(node: Node, width: u32, height: u32) -> Result<HaarFeature> {
    if let Some(tilted) = child(node, "tilted").and_then(|n| n.text()) {
        if parse_scalar(tilted, "tilted")? != 0.0 {
            return Err(PipelineError::cascade("tilted Haar features are not supported"));
        }
    }

    let rects = elements(required(node, "rects")?)
        .map(|rect| {
            let values = parse_numbers(rect.text().unwrap_or(""), "rects")?;
            let [x, y, w, h, weight] = values.as_slice() else {
                return Err(PipelineError::cascade("feature rect needs 5 values"));
            };
            let rect = WeightedRect {
                x: *x as u32,
                y: *y as u32,
                width: *w as u32,
                height: *h as u32,
                weight: *weight,
            };
            if rect.x + rect.width > width || rect.y + rect.height > height {
                return Err(PipelineError::cascade("feature rect falls outside the window"));
            }
            Ok(rect)
        })
        .collect::<Result<Vec<_>>>()?;

    if rects.is_empty() {
        return Err(PipelineError::cascade("feature without rects"));
    }
    Ok(HaarFeature { rects })
}

fn parse_stage(node: Node, feature_count: usize) -> Result<Stage> {
    let threshold = parse_scalar(text_of(node, "stageThreshold")?, "stageThreshold")?;

    let classifiers = elements(required(node, "weakClassifiers")?)
        .map(|weak| {
            let raw = parse_numbers(text_of(weak, "internalNodes")?, "internalNodes")?;
            let leaves = parse_numbers(text_of(weak, "leafValues")?, "leafValues")?;
            if raw.is_empty() || raw.len() % 4 != 0 {
                return Err(PipelineError::cascade("internalNodes must come in groups of 4"));
            }

            let nodes: Vec<TreeNode> = raw
                .chunks_exact(4)
                .map(|chunk| TreeNode {
                    left: chunk[0] as i32,
                    right: chunk[1] as i32,
                    feature: chunk[2] as usize,
                    threshold: chunk[3],
                })
                .collect();

            for (position, node) in nodes.iter().enumerate() {
                if node.feature >= feature_count {
                    return Err(PipelineError::cascade(format!(
                        "node references feature {} of {}",
                        node.feature, feature_count
                    )));
                }
                // children come after their parent, so every walk terminates
                for next in [node.left, node.right] {
                    let in_range = if next > 0 {
                        (next as usize) > position && (next as usize) < nodes.len()
                    } else {
                        ((-next) as usize) < leaves.len()
                    };
                    if !in_range {
                        return Err(PipelineError::cascade("tree index out of range"));
                    }
                }
            }

            Ok(WeakClassifier { nodes, leaves })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Stage {
        threshold,
        classifiers,
    })
}
