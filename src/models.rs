use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use ndarray::Array4;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Condition names in the order of the classifier's output units.
pub const CLASS_LABELS: [&str; 9] = [
    "actinic keratosis",
    "basal cell carcinoma",
    "dermatofibroma",
    "melanoma",
    "nevus",
    "pigmented benign keratosis",
    "seborrheic keratosis",
    "squamous cell carcinoma",
    "vascular lesion",
];

pub const NUM_CLASSES: usize = CLASS_LABELS.len();

/// Label reported when no prediction could be made.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Classifier input: (batch=1, height, width, 3), values in [0, 1].
pub type PreprocessedTensor = Array4<f32>;

/// Which backend produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Onnx,
    Rten,
    /// Untrained seeded fallback; output carries no diagnostic value.
    Placeholder,
}

impl ModelKind {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, ModelKind::Placeholder)
    }
}

/// A successful classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub label: &'static str,
    /// Percentage in [0, 100], two decimals.
    pub confidence: f64,
    pub class_index: usize,
    pub probabilities: [f32; NUM_CLASSES],
    pub model: ModelKind,
}

/// Outcome of a single `predict` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Diagnosed(Diagnosis),
    /// Inference failed; the request still gets a valid (empty) result.
    Unknown { error: String },
}

impl Prediction {
    pub fn label(&self) -> &str {
        match self {
            Prediction::Diagnosed(d) => d.label,
            Prediction::Unknown { .. } => UNKNOWN_LABEL,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Prediction::Diagnosed(d) => d.confidence,
            Prediction::Unknown { .. } => 0.0,
        }
    }

    /// Class index, or -1 for an unknown prediction.
    pub fn class_index(&self) -> i32 {
        match self {
            Prediction::Diagnosed(d) => d.class_index as i32,
            Prediction::Unknown { .. } => -1,
        }
    }

    /// Per-class probabilities keyed by label; empty when unknown.
    pub fn probabilities(&self) -> BTreeMap<&'static str, f32> {
        match self {
            Prediction::Diagnosed(d) => CLASS_LABELS
                .iter()
                .copied()
                .zip(d.probabilities.iter().copied())
                .collect(),
            Prediction::Unknown { .. } => BTreeMap::new(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Prediction::Diagnosed(_) => None,
            Prediction::Unknown { error } => Some(error),
        }
    }

    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match self {
            Prediction::Diagnosed(d) => Some(d),
            Prediction::Unknown { .. } => None,
        }
    }
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Prediction", 5)?;
        state.serialize_field("prediction", self.label())?;
        state.serialize_field("confidence", &self.confidence())?;
        state.serialize_field("class_index", &self.class_index())?;
        state.serialize_field("all_probabilities", &self.probabilities())?;
        match self {
            Prediction::Diagnosed(d) => state.serialize_field("model", &d.model)?,
            Prediction::Unknown { error } => state.serialize_field("error", error)?,
        }
        state.end()
    }
}

/// HSV statistics (H in [0,180), S and V in [0,255]).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ColorFeatures {
    pub hue_avg: f64,
    pub saturation_avg: f64,
    pub value_avg: f64,
    pub hue_std: f64,
    pub saturation_std: f64,
    pub value_std: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TextureFeatures {
    /// Standard deviation of grayscale intensities.
    pub contrast: f64,
    /// Mean squared grayscale intensity.
    pub energy: f64,
}

/// Geometry of the largest dark region. All zero when none was found.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ShapeFeatures {
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    pub aspect_ratio: f64,
    pub solidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FeatureSet {
    pub color: ColorFeatures,
    pub texture: TextureFeatures,
    pub shape: ShapeFeatures,
}

/// Outcome of feature extraction. Never an `Err`: failures are carried
/// as data so the surrounding request can continue.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureReport {
    Extracted(FeatureSet),
    Failed { error: String },
}

impl FeatureReport {
    pub fn features(&self) -> Option<&FeatureSet> {
        match self {
            FeatureReport::Extracted(set) => Some(set),
            FeatureReport::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FeatureReport::Extracted(_) => None,
            FeatureReport::Failed { error } => Some(error),
        }
    }
}

/// Serializes as an empty JSON object.
struct EmptyGroup;

impl Serialize for EmptyGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

impl Serialize for FeatureReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FeatureReport::Extracted(set) => set.serialize(serializer),
            FeatureReport::Failed { error } => {
                let mut state = serializer.serialize_struct("FeatureReport", 4)?;
                state.serialize_field("color", &EmptyGroup)?;
                state.serialize_field("texture", &EmptyGroup)?;
                state.serialize_field("shape", &EmptyGroup)?;
                state.serialize_field("error", error)?;
                state.end()
            }
        }
    }
}

/// Outer boundary of a binary region, traced through pixel centres.
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Contour {
    pub fn new(points: Vec<Point<i32>>) -> Self {
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if points.is_empty() {
            (min_x, min_y, max_x, max_y) = (0, 0, -1, -1);
        }
        Self {
            points,
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box width in pixels (inclusive of both edges).
    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x + 1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y + 1).max(0) as u32
    }

    /// Polygon area enclosed by the boundary.
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Length of the closed boundary polyline.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                let dx = f64::from(b.x - a.x);
                let dy = f64::from(b.y - a.y);
                (dx * dx + dy * dy).sqrt()
            })
            .sum()
    }

    /// 4πA/P², 1.0 for a perfect circle.
    pub fn circularity(&self) -> f64 {
        let perimeter = self.perimeter();
        if perimeter == 0.0 {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area() / (perimeter * perimeter)
    }

    pub fn aspect_ratio(&self) -> f64 {
        let h = self.height();
        if h == 0 {
            return 0.0;
        }
        f64::from(self.width()) / f64::from(h)
    }

    pub fn hull_area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        polygon_area(&convex_hull(self.points.as_slice()))
    }

    /// Area over convex hull area, in [0, 1].
    pub fn solidity(&self) -> f64 {
        let hull = self.hull_area();
        if hull == 0.0 {
            return 0.0;
        }
        (self.area() / hull).min(1.0)
    }

    pub fn shape_features(&self) -> ShapeFeatures {
        ShapeFeatures {
            area: self.area(),
            perimeter: self.perimeter(),
            circularity: self.circularity(),
            aspect_ratio: self.aspect_ratio(),
            solidity: self.solidity(),
        }
    }
}

/// Shoelace formula, unsigned.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: i64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y)
        })
        .sum();
    (twice.abs() as f64) / 2.0
}
