/*
 * Data types of the scoring model: the tagged `Node` (dimension, factor or
 * layer), its status indicator, and the fixed-point `Weight` used for every
 * weight the model stores or displays.
 *
 * Nodes own their children inline. Only the tree and the weight engine are
 * allowed to rewire children or touch derived weights, which is why those
 * mutators are crate-private.
 */
use super::weights::WeightError;
use serde_json::{Map, Value};
use std::fmt;

/*
 * Open attribute bag carried by layers. Keys keep their document order so that
 * export reproduces the source layout.
 */
pub type Attributes = Map<String, Value>;

pub const DEFAULT_DIMENSION_NAME: &str = "New Dimension";
pub const DEFAULT_FACTOR_NAME: &str = "New Factor";
pub const DEFAULT_LAYER_NAME: &str = "New Layer";

// Hundredths per unit.
const WEIGHT_SCALE: i64 = 100;
// Anything at or beyond this magnitude would lose precision in f64 hundredths.
const WEIGHT_MAX_MAGNITUDE: f64 = 1.0e13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Dimension,
    Factor,
    Layer,
}

impl NodeKind {
    /// The kind of node this kind may own, or `None` for leaves.
    pub fn child_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Dimension => Some(NodeKind::Factor),
            NodeKind::Factor => Some(NodeKind::Layer),
            NodeKind::Layer => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NodeKind::Dimension => "dimension",
            NodeKind::Factor => "factor",
            NodeKind::Layer => "layer",
        };
        f.write_str(text)
    }
}

/*
 * Validity/processing indicator shown next to a node. The model only ever
 * writes `Valid`/`Invalid` for factors and dimensions; `Processing` belongs to
 * whoever drives per-layer work.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeStatus {
    #[default]
    Unset,
    Valid,
    Invalid,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Balance {
    Balanced,
    Unbalanced,
}

impl Balance {
    pub fn is_balanced(self) -> bool {
        self == Balance::Balanced
    }
}

/*
 * The two layer layouts found in model documents: `{ "layer": name, ... }`
 * (flat) and `{ name: { ... } }` (keyed). Remembered per layer so a save
 * writes each layer back the way it was read.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LayerShape {
    #[default]
    Flat,
    Keyed,
}

/*
 * A weight with exactly two decimals, stored as integer hundredths so sums and
 * the balance comparison are exact. Its `Display` form is the canonical
 * 2-decimal string.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Weight {
    hundredths: i64,
}

impl Weight {
    pub const ZERO: Weight = Weight { hundredths: 0 };
    pub const ONE: Weight = Weight {
        hundredths: WEIGHT_SCALE,
    };

    pub fn from_hundredths(hundredths: i64) -> Self {
        Weight { hundredths }
    }

    pub fn hundredths(self) -> i64 {
        self.hundredths
    }

    /*
     * Rounds a float to two decimals using the same rounding as `{:.2}`
     * formatting, then reads the formatted digits back. Going through the
     * formatted text keeps stored weights identical to what is displayed.
     */
    pub fn from_f64(value: f64) -> Result<Self, WeightError> {
        if !value.is_finite() {
            return Err(WeightError::NotANumber(value.to_string()));
        }
        if value.abs() >= WEIGHT_MAX_MAGNITUDE {
            return Err(WeightError::OutOfRange(value.to_string()));
        }
        let formatted = format!("{value:.2}");
        let negative = formatted.starts_with('-');
        let digits = formatted.trim_start_matches('-');
        let (whole, fraction) = digits
            .split_once('.')
            .ok_or_else(|| WeightError::NotANumber(formatted.clone()))?;
        let whole: i64 = whole
            .parse()
            .map_err(|_| WeightError::NotANumber(formatted.clone()))?;
        let fraction: i64 = fraction
            .parse()
            .map_err(|_| WeightError::NotANumber(formatted.clone()))?;
        let magnitude = whole * WEIGHT_SCALE + fraction;
        Ok(Weight {
            hundredths: if negative { -magnitude } else { magnitude },
        })
    }

    /// Parses user or document text as a floating-point number, then rounds it.
    pub fn parse(raw: &str) -> Result<Self, WeightError> {
        let trimmed = raw.trim();
        let value: f64 = trimmed
            .parse()
            .map_err(|_| WeightError::NotANumber(raw.to_string()))?;
        Weight::from_f64(value)
    }

    pub fn as_f64(self) -> f64 {
        self.hundredths as f64 / WEIGHT_SCALE as f64
    }

    pub fn is_one(self) -> bool {
        self.hundredths == WEIGHT_SCALE
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.hundredths < 0 { "-" } else { "" };
        let magnitude = self.hundredths.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:02}",
            magnitude / WEIGHT_SCALE as u64,
            magnitude % WEIGHT_SCALE as u64
        )
    }
}

/*
 * Saturates instead of overflowing. A saturated total can never be 1.00, so a
 * factor with absurd layer weights is simply unbalanced.
 */
impl std::iter::Sum for Weight {
    fn sum<I: Iterator<Item = Weight>>(iter: I) -> Self {
        iter.fold(Weight::ZERO, |total, weight| {
            Weight::from_hundredths(total.hundredths.saturating_add(weight.hundredths))
        })
    }
}

/*
 * How a layer was laid out in the document it came from: the order of its keys
 * and the raw `weighting` value, if it had one. Layers created in the editor
 * have an empty layout.
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct SourceLayout {
    pub(crate) key_order: Vec<String>,
    pub(crate) weighting: Option<Value>,
}

/*
 * One element of the model tree. The kind is fixed at construction and never
 * inferred from position. Factor weights are derived from their layers and
 * are `None` while a factor has no layers; dimensions never carry a weight.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    name: String,
    status: NodeStatus,
    weight: Option<Weight>,
    balance: Option<Balance>,
    attributes: Attributes,
    layer_shape: LayerShape,
    source_layout: SourceLayout,
    children: Vec<Node>,
}

impl Node {
    fn with_kind(kind: NodeKind, name: String) -> Self {
        Node {
            kind,
            name,
            status: NodeStatus::default(),
            weight: None,
            balance: None,
            attributes: Attributes::new(),
            layer_shape: LayerShape::default(),
            source_layout: SourceLayout::default(),
            children: Vec::new(),
        }
    }

    pub fn dimension(name: impl Into<String>) -> Self {
        Node::with_kind(NodeKind::Dimension, name.into())
    }

    /// A factor starts with no layers and therefore unbalanced.
    pub fn factor(name: impl Into<String>) -> Self {
        let mut node = Node::with_kind(NodeKind::Factor, name.into());
        node.balance = Some(Balance::Unbalanced);
        node.status = NodeStatus::Invalid;
        node
    }

    pub fn layer(
        name: impl Into<String>,
        weight: Weight,
        attributes: Attributes,
        layer_shape: LayerShape,
    ) -> Self {
        let mut node = Node::with_kind(NodeKind::Layer, name.into());
        node.weight = Some(weight);
        node.attributes = attributes;
        node.layer_shape = layer_shape;
        node
    }

    /*
     * Attaches children while building a subtree outside of a tree, as the
     * codec and tests do. The caller is responsible for matching kinds; the
     * tree re-validates kinds when the subtree is inserted.
     */
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub(crate) fn with_source_layout(mut self, source_layout: SourceLayout) -> Self {
        self.source_layout = source_layout;
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn weight(&self) -> Option<Weight> {
        self.weight
    }

    /// Classification of a factor; `None` for dimensions and layers.
    pub fn balance(&self) -> Option<Balance> {
        self.balance
    }

    /// Full, unmodified attribute bag of a layer (empty for other kinds).
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn layer_shape(&self) -> LayerShape {
        self.layer_shape
    }

    pub(crate) fn source_layout(&self) -> &SourceLayout {
        &self.source_layout
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Node> {
        &mut self.children
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub(crate) fn set_weight(&mut self, weight: Option<Weight>) {
        self.weight = weight;
    }

    pub(crate) fn set_balance(&mut self, balance: Option<Balance>) {
        self.balance = balance;
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_from_f64_rounds_like_two_decimal_formatting() {
        assert_eq!(Weight::from_f64(1.0 / 3.0).unwrap().to_string(), "0.33");
        assert_eq!(Weight::from_f64(2.0 / 3.0).unwrap().to_string(), "0.67");
        assert_eq!(Weight::from_f64(0.5).unwrap().to_string(), "0.50");
        assert_eq!(Weight::from_f64(1.0).unwrap(), Weight::ONE);
        assert_eq!(Weight::from_f64(12.345678).unwrap().hundredths(), 1235);
    }

    #[test]
    fn test_weight_negative_values_and_negative_zero() {
        assert_eq!(Weight::from_f64(-0.25).unwrap().to_string(), "-0.25");
        assert_eq!(Weight::from_f64(-0.001).unwrap(), Weight::ZERO);
        assert_eq!(Weight::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_weight_parse_accepts_float_text() {
        assert_eq!(Weight::parse("0.5").unwrap().to_string(), "0.50");
        assert_eq!(Weight::parse(" 1 ").unwrap(), Weight::ONE);
        assert_eq!(Weight::parse("2.5e-1").unwrap().to_string(), "0.25");
    }

    #[test]
    fn test_weight_parse_rejects_garbage_and_non_finite() {
        assert!(matches!(
            Weight::parse("abc"),
            Err(WeightError::NotANumber(_))
        ));
        assert!(matches!(Weight::parse(""), Err(WeightError::NotANumber(_))));
        assert!(matches!(
            Weight::parse("NaN"),
            Err(WeightError::NotANumber(_))
        ));
        assert!(matches!(
            Weight::parse("inf"),
            Err(WeightError::NotANumber(_))
        ));
        assert!(matches!(
            Weight::parse("1e20"),
            Err(WeightError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_weight_sum_is_exact() {
        let total: Weight = [0.33, 0.33, 0.34]
            .iter()
            .map(|v| Weight::from_f64(*v).unwrap())
            .sum();
        assert!(total.is_one());
    }

    #[test]
    fn test_weight_sum_saturates_instead_of_overflowing() {
        // Arrange
        let near_max = Weight::parse("9999999999999").unwrap();

        // Act
        let total: Weight = std::iter::repeat(near_max).take(10_000).sum();

        // Assert
        assert_eq!(total, Weight::from_hundredths(i64::MAX));
        assert!(!total.is_one());
    }

    #[test]
    fn test_node_constructors_set_kind_and_defaults() {
        let dimension = Node::dimension("Education");
        assert_eq!(dimension.kind(), NodeKind::Dimension);
        assert_eq!(dimension.weight(), None);
        assert_eq!(dimension.balance(), None);
        assert_eq!(dimension.status(), NodeStatus::Unset);

        let factor = Node::factor("Water Access");
        assert_eq!(factor.kind(), NodeKind::Factor);
        assert_eq!(factor.weight(), None);
        assert_eq!(factor.balance(), Some(Balance::Unbalanced));

        let layer = Node::layer("Wells", Weight::ONE, Attributes::new(), LayerShape::Keyed);
        assert_eq!(layer.kind(), NodeKind::Layer);
        assert_eq!(layer.weight(), Some(Weight::ONE));
        assert_eq!(layer.layer_shape(), LayerShape::Keyed);
        assert_eq!(layer.child_count(), 0);
    }

    #[test]
    fn test_child_kinds_follow_hierarchy() {
        assert_eq!(NodeKind::Dimension.child_kind(), Some(NodeKind::Factor));
        assert_eq!(NodeKind::Factor.child_kind(), Some(NodeKind::Layer));
        assert_eq!(NodeKind::Layer.child_kind(), None);
    }
}
