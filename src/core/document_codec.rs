/*
 * Maps model documents to and from a `ModelTree`.
 *
 * A document is `{ "dimensions": [ { "name", "factors": [ { "name",
 * "layers": [..] } ] } ] }`. Layers come in two historical layouts, flat
 * `{ "layer": name, ...attributes }` and keyed `{ name: { ...attributes } }`;
 * both decode to the same node and each is written back in its own layout.
 * Layer attributes are passed through untouched, except `weighting`, which
 * the codec owns: it seeds the layer weight on decode. On encode the raw value
 * read from the document is written back as long as decoding it again would
 * give the layer's current weight; otherwise the weight is written as a
 * number. Each layer's keys are written in the order they were read.
 *
 * Decoding either produces a complete tree or an error; nothing partial is
 * ever handed out.
 */
use super::models::{Attributes, LayerShape, Node, NodeKind, SourceLayout, Weight};
use super::tree::ModelTree;
use super::weights;
use serde_json::{Map, Value};
use std::fmt;

const DIMENSIONS_KEY: &str = "dimensions";
const FACTORS_KEY: &str = "factors";
const LAYERS_KEY: &str = "layers";
const NAME_KEY: &str = "name";
const LAYER_NAME_KEY: &str = "layer";
pub const WEIGHTING_KEY: &str = "weighting";

#[derive(Debug)]
pub enum DocumentError {
    MalformedShape { location: String, reason: String },
    Json(serde_json::Error),
}

impl From<serde_json::Error> for DocumentError {
    fn from(err: serde_json::Error) -> Self {
        DocumentError::Json(err)
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentError::MalformedShape { location, reason } => {
                write!(f, "Malformed model document at {location}: {reason}")
            }
            DocumentError::Json(e) => write!(f, "Model document is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DocumentError::Json(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DocumentError>;

fn malformed(location: &str, reason: impl Into<String>) -> DocumentError {
    DocumentError::MalformedShape {
        location: location.to_string(),
        reason: reason.into(),
    }
}

/*
 * Builds a fresh tree from a parsed document. Layers with a usable
 * `weighting` keep it; the others get the plain `1/n` share of their factor.
 */
pub fn decode(document: &Value) -> Result<ModelTree> {
    let root = document
        .as_object()
        .ok_or_else(|| malformed("document", "expected an object"))?;
    let dimensions = array_field(root, DIMENSIONS_KEY, "document")?;

    let mut nodes = Vec::with_capacity(dimensions.len());
    for (index, dimension) in dimensions.iter().enumerate() {
        nodes.push(decode_dimension(
            dimension,
            &format!("{DIMENSIONS_KEY}[{index}]"),
        )?);
    }

    let tree = ModelTree::from_dimensions(nodes);
    log::debug!(
        "DocumentCodec: Decoded {} dimensions, {} factors, {} layers",
        tree.root().len(),
        tree.factor_paths().len(),
        tree.leaves().len()
    );
    Ok(tree)
}

/// Parses raw document bytes (as read from disk) and decodes them.
pub fn decode_slice(bytes: &[u8]) -> Result<ModelTree> {
    let document: Value = serde_json::from_slice(bytes)?;
    decode(&document)
}

fn array_field<'a>(object: &'a Map<String, Value>, key: &str, location: &str) -> Result<&'a [Value]> {
    match object.get(key) {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(malformed(location, format!("'{key}' must be an array"))),
    }
}

fn name_field(object: &Map<String, Value>, location: &str) -> Result<String> {
    match object.get(NAME_KEY) {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(_) => Err(malformed(location, "'name' must be a string")),
        None => Err(malformed(location, "missing 'name'")),
    }
}

fn decode_dimension(value: &Value, location: &str) -> Result<Node> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed(location, "expected a dimension object"))?;
    let name = title_case(&name_field(object, location)?);
    let factors = array_field(object, FACTORS_KEY, location)?;

    let mut children = Vec::with_capacity(factors.len());
    for (index, factor) in factors.iter().enumerate() {
        children.push(decode_factor(
            factor,
            &format!("{location}.{FACTORS_KEY}[{index}]"),
        )?);
    }
    Ok(Node::dimension(name).with_children(children))
}

fn decode_factor(value: &Value, location: &str) -> Result<Node> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed(location, "expected a factor object"))?;
    let name = name_field(object, location)?;
    let layers = array_field(object, LAYERS_KEY, location)?;

    let default_weight = weights::equal_split(layers.len());
    let mut children = Vec::with_capacity(layers.len());
    for (index, layer) in layers.iter().enumerate() {
        children.push(decode_layer(
            layer,
            &format!("{location}.{LAYERS_KEY}[{index}]"),
            default_weight,
        )?);
    }
    Ok(Node::factor(name).with_children(children))
}

fn decode_layer(value: &Value, location: &str, default_weight: Weight) -> Result<Node> {
    let object = value
        .as_object()
        .ok_or_else(|| malformed(location, "expected a layer object"))?;

    if let Some(Value::String(name)) = object.get(LAYER_NAME_KEY) {
        let weight = weight_from_source(object.get(WEIGHTING_KEY), default_weight);
        let attributes = passthrough_attributes(object, Some(LAYER_NAME_KEY));
        return Ok(
            Node::layer(name.clone(), weight, attributes, LayerShape::Flat)
                .with_source_layout(source_layout(object)),
        );
    }

    if object.len() == 1 {
        if let Some((name, Value::Object(inner))) = object.iter().next() {
            let weight = weight_from_source(inner.get(WEIGHTING_KEY), default_weight);
            let attributes = passthrough_attributes(inner, None);
            return Ok(
                Node::layer(name.clone(), weight, attributes, LayerShape::Keyed)
                    .with_source_layout(source_layout(inner)),
            );
        }
    }

    Err(malformed(
        location,
        "layer is neither { \"layer\": name, ... } nor { name: { ... } }",
    ))
}

/*
 * Weight a layer gets from its raw `weighting` value. Missing values and
 * values that are not a usable number fall back to the factor's equal share.
 */
fn weight_from_source(weighting: Option<&Value>, default_weight: Weight) -> Weight {
    let explicit = match weighting {
        Some(Value::Number(number)) => number.as_f64().and_then(|v| Weight::from_f64(v).ok()),
        Some(Value::String(text)) => Weight::parse(text).ok(),
        _ => None,
    };
    explicit.unwrap_or(default_weight)
}

fn source_layout(object: &Map<String, Value>) -> SourceLayout {
    SourceLayout {
        key_order: object.keys().cloned().collect(),
        weighting: object.get(WEIGHTING_KEY).cloned(),
    }
}

fn passthrough_attributes(object: &Map<String, Value>, name_key: Option<&str>) -> Attributes {
    object
        .iter()
        .filter(|(key, _)| key.as_str() != WEIGHTING_KEY && Some(key.as_str()) != name_key)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/*
 * Upper-cases every letter that follows a non-letter and lower-cases the
 * rest, so "urban planning" and "URBAN PLANNING" both read "Urban Planning".
 */
pub fn title_case(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                result.extend(c.to_lowercase());
            } else {
                result.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            result.push(c);
            previous_is_letter = false;
        }
    }
    result
}

/// Rebuilds the document for the current tree.
pub fn encode(tree: &ModelTree) -> Value {
    let dimensions: Vec<Value> = tree.root().iter().map(encode_node).collect();
    let mut document = Map::new();
    document.insert(DIMENSIONS_KEY.to_string(), Value::Array(dimensions));
    Value::Object(document)
}

fn encode_node(node: &Node) -> Value {
    match node.kind() {
        NodeKind::Dimension => {
            let mut object = Map::new();
            object.insert(NAME_KEY.to_string(), Value::from(node.name().to_lowercase()));
            object.insert(
                FACTORS_KEY.to_string(),
                Value::Array(node.children().iter().map(encode_node).collect()),
            );
            Value::Object(object)
        }
        NodeKind::Factor => {
            let mut object = Map::new();
            object.insert(NAME_KEY.to_string(), Value::from(node.name()));
            let equal_share = weights::equal_split(node.child_count());
            object.insert(
                LAYERS_KEY.to_string(),
                Value::Array(
                    node.children()
                        .iter()
                        .map(|layer| encode_layer(layer, equal_share))
                        .collect(),
                ),
            );
            Value::Object(object)
        }
        // Layers are only reachable through their factor.
        NodeKind::Layer => encode_layer(node, Weight::ZERO),
    }
}

/*
 * `equal_share` is what a decoder would assign this layer if it carried no
 * usable `weighting`, given the current number of layers in its factor.
 */
fn encode_layer(layer: &Node, equal_share: Weight) -> Value {
    let layout = layer.source_layout();
    let weight = layer.weight().unwrap_or(Weight::ZERO);
    let weighting = if weight_from_source(layout.weighting.as_ref(), equal_share) == weight {
        layout.weighting.clone()
    } else {
        Some(Value::from(weight.as_f64()))
    };
    let name_key = match layer.layer_shape() {
        LayerShape::Flat => Some(LAYER_NAME_KEY),
        LayerShape::Keyed => None,
    };

    let mut attributes = Map::new();
    if let Some(key) = name_key {
        if !layout.key_order.iter().any(|k| k == key) {
            attributes.insert(key.to_string(), Value::from(layer.name()));
        }
    }
    for key in &layout.key_order {
        if Some(key.as_str()) == name_key {
            attributes.insert(key.clone(), Value::from(layer.name()));
        } else if key == WEIGHTING_KEY {
            if let Some(value) = &weighting {
                attributes.insert(key.clone(), value.clone());
            }
        } else if let Some(value) = layer.attributes().get(key) {
            attributes.insert(key.clone(), value.clone());
        }
    }
    // Keys added since decoding, then a weight the document did not carry.
    for (key, value) in layer.attributes() {
        if key != WEIGHTING_KEY && !attributes.contains_key(key) {
            attributes.insert(key.clone(), value.clone());
        }
    }
    if let Some(value) = weighting {
        attributes.entry(WEIGHTING_KEY).or_insert(value);
    }

    match layer.layer_shape() {
        LayerShape::Flat => Value::Object(attributes),
        LayerShape::Keyed => {
            let mut object = Map::new();
            object.insert(layer.name().to_string(), Value::Object(attributes));
            Value::Object(object)
        }
    }
}

impl ModelTree {
    /*
     * Replaces the whole tree with the content of `document`. The new tree is
     * fully built before the swap; on error the current tree stays in place.
     */
    pub fn load_document(&mut self, document: &Value) -> Result<()> {
        let fresh = decode(document).inspect_err(|e| {
            log::warn!("DocumentCodec: Keeping previous model, document rejected: {e}");
        })?;
        *self = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Balance, NodeStatus};
    use crate::core::tree::NodePath;
    use serde_json::json;

    fn flat_layer(name: &str, source: &str) -> Value {
        json!({
            "layer": name,
            "Text": "",
            "Use Aggregate": "Yes",
            "Rasterise Polygon": "",
            "Default Buffer Distances": 500,
            "source": source,
            "indicator": format!("{name} indicator"),
            "query": "amenity=school"
        })
    }

    fn sample_document() -> Value {
        json!({
            "dimensions": [
                {
                    "name": "contextual",
                    "factors": [
                        {
                            "name": "Water Access",
                            "layers": [
                                flat_layer("Wells", "OSM"),
                                flat_layer("Pipes", "Utility"),
                                flat_layer("Rivers", "Survey")
                            ]
                        }
                    ]
                },
                {
                    "name": "accessibility",
                    "factors": [
                        {
                            "name": "Transport",
                            "layers": [
                                { "Bus Stops": { "source": "GTFS", "query": "", "weighting": 0.4 } },
                                { "Rail": { "source": "GTFS", "weighting": "0.6" } }
                            ]
                        },
                        { "name": "Empty", "layers": [] }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_decode_equal_split_leaves_factor_unbalanced() {
        let tree = decode(&sample_document()).unwrap();
        let water = tree.node_at(&NodePath::new(&[0, 0])).unwrap();
        for layer in water.children() {
            assert_eq!(layer.weight().unwrap().to_string(), "0.33");
        }
        assert_eq!(water.weight().unwrap().to_string(), "0.99");
        assert_eq!(water.balance(), Some(Balance::Unbalanced));
        assert_eq!(water.status(), NodeStatus::Invalid);
    }

    #[test]
    fn test_decode_uses_explicit_weighting() {
        let tree = decode(&sample_document()).unwrap();
        let transport = tree.node_at(&NodePath::new(&[1, 0])).unwrap();
        assert_eq!(transport.children()[0].weight().unwrap().to_string(), "0.40");
        assert_eq!(transport.children()[1].weight().unwrap().to_string(), "0.60");
        assert_eq!(transport.balance(), Some(Balance::Balanced));
        assert!(!transport.children()[0].attributes().contains_key(WEIGHTING_KEY));
    }

    #[test]
    fn test_decode_title_cases_dimensions_and_reads_both_shapes() {
        let tree = decode(&sample_document()).unwrap();
        assert_eq!(tree.root()[0].name(), "Contextual");
        assert_eq!(tree.root()[1].name(), "Accessibility");

        let wells = tree.node_at(&NodePath::new(&[0, 0, 0])).unwrap();
        assert_eq!(wells.name(), "Wells");
        assert_eq!(wells.layer_shape(), LayerShape::Flat);
        assert_eq!(wells.attributes()["source"], json!("OSM"));
        assert!(!wells.attributes().contains_key("layer"));

        let bus = tree.node_at(&NodePath::new(&[1, 0, 0])).unwrap();
        assert_eq!(bus.name(), "Bus Stops");
        assert_eq!(bus.layer_shape(), LayerShape::Keyed);
        assert_eq!(bus.attributes()["source"], json!("GTFS"));
    }

    #[test]
    fn test_decode_empty_factor_has_no_weight() {
        let tree = decode(&sample_document()).unwrap();
        let empty = tree.node_at(&NodePath::new(&[1, 1])).unwrap();
        assert_eq!(empty.weight(), None);
        assert_eq!(empty.balance(), Some(Balance::Unbalanced));
    }

    #[test]
    fn test_decode_tolerates_missing_arrays() {
        let tree = decode(&json!({})).unwrap();
        assert!(tree.is_empty());
        let tree = decode(&json!({ "dimensions": [ { "name": "x" } ] })).unwrap();
        assert_eq!(tree.root()[0].child_count(), 0);
    }

    #[test]
    fn test_decode_rejects_factor_without_name() {
        let document = json!({
            "dimensions": [ { "name": "d", "factors": [ { "layers": [] } ] } ]
        });
        match decode(&document) {
            Err(DocumentError::MalformedShape { location, .. }) => {
                assert_eq!(location, "dimensions[0].factors[0]")
            }
            other => panic!("Expected MalformedShape, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_layer_shape() {
        for layer in [
            json!({ "source": "OSM", "query": "" }),
            json!({ "Only": "a string" }),
            json!(["not", "an", "object"]),
            json!({ "layer": 7 }),
        ] {
            let document = json!({
                "dimensions": [ { "name": "d", "factors": [ { "name": "f", "layers": [layer] } ] } ]
            });
            assert!(matches!(
                decode(&document),
                Err(DocumentError::MalformedShape { .. })
            ));
        }
    }

    #[test]
    fn test_decode_rejects_non_object_document_and_bad_json() {
        assert!(matches!(
            decode(&json!([1, 2])),
            Err(DocumentError::MalformedShape { .. })
        ));
        assert!(matches!(
            decode(&json!({ "dimensions": { "name": "x" } })),
            Err(DocumentError::MalformedShape { .. })
        ));
        assert!(matches!(
            decode_slice(b"{ \"dimensions\": [ "),
            Err(DocumentError::Json(_))
        ));
    }

    #[test]
    fn test_round_trip_preserves_names_attributes_and_order() {
        let document = sample_document();
        let encoded = encode(&decode(&document).unwrap());

        // Text comparison also checks key order, which `Value` equality ignores.
        assert_eq!(encoded.to_string(), document.to_string());
        let wells = &encoded["dimensions"][0]["factors"][0]["layers"][0];
        assert!(wells.get(WEIGHTING_KEY).is_none());
    }

    #[test]
    fn test_round_trip_keeps_untouched_weighting_values_and_key_positions() {
        // Arrange
        let document = json!({
            "dimensions": [ { "name": "contextual", "factors": [ {
                "name": "Water Access",
                "layers": [
                    { "source": "OSM", "layer": "A", "weighting": "" },
                    { "layer": "B", "weighting": "0.5" },
                    { "layer": "C", "weighting": 0.333, "query": "" },
                    { "D": { "weighting": " 0.25 ", "source": "GTFS" } }
                ]
            } ] } ]
        });

        // Act
        let tree = decode(&document).unwrap();
        let encoded = encode(&tree);

        // Assert
        let factor = tree.node_at(&NodePath::new(&[0, 0])).unwrap();
        let weights: Vec<String> = factor
            .children()
            .iter()
            .map(|layer| layer.weight().unwrap().to_string())
            .collect();
        assert_eq!(weights, vec!["0.25", "0.50", "0.33", "0.25"]);
        assert_eq!(encoded.to_string(), document.to_string());
    }

    #[test]
    fn test_encode_rewrites_only_weights_that_changed() {
        // Arrange
        let document = json!({
            "dimensions": [ { "name": "contextual", "factors": [ {
                "name": "Water Access",
                "layers": [
                    { "source": "OSM", "layer": "A", "weighting": "0.5", "query": "" },
                    { "layer": "B", "weighting": 0.333 }
                ]
            } ] } ]
        });
        let mut tree = decode(&document).unwrap();

        // Act
        tree.set_layer_weight(&NodePath::new(&[0, 0, 0]), "0.667")
            .unwrap();
        let encoded = encode(&tree);

        // Assert
        let layers = &encoded["dimensions"][0]["factors"][0]["layers"];
        let first: Vec<&String> = layers[0].as_object().unwrap().keys().collect();
        assert_eq!(first, vec!["source", "layer", "weighting", "query"]);
        assert_eq!(layers[0][WEIGHTING_KEY], json!(0.67));
        assert_eq!(layers[1][WEIGHTING_KEY], json!(0.333));
    }

    #[test]
    fn test_encode_writes_weight_when_equal_share_no_longer_matches() {
        // Arrange
        let mut tree = decode(&sample_document()).unwrap();

        // Act
        tree.remove(&NodePath::new(&[0, 0, 1])).unwrap();
        let encoded = encode(&tree);

        // Assert
        let layers = &encoded["dimensions"][0]["factors"][0]["layers"];
        assert_eq!(layers[0][WEIGHTING_KEY], json!(0.33));
        assert_eq!(layers[1][WEIGHTING_KEY], json!(0.33));
        let reloaded = decode(&encoded).unwrap();
        assert_eq!(
            reloaded.node_at(&NodePath::new(&[0, 0])).unwrap().weight(),
            Some(Weight::from_hundredths(66))
        );
    }

    #[test]
    fn test_encode_new_flat_layer_puts_name_first() {
        let mut tree = decode(&sample_document()).unwrap();
        let mut attributes = Attributes::new();
        attributes.insert("source".to_string(), json!("Census"));
        tree.push(
            &NodePath::new(&[1, 1]),
            Node::layer("Clinics", Weight::ONE, attributes, LayerShape::Flat),
        )
        .unwrap();

        let encoded = encode(&tree);

        let clinics = &encoded["dimensions"][1]["factors"][1]["layers"][0];
        let keys: Vec<&String> = clinics.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["layer", "source"]);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let document = sample_document();
        let once = decode(&document).unwrap();
        let twice = decode(&encode(&once)).unwrap();
        assert_eq!(once, twice);
        assert_eq!(decode(&document).unwrap(), once);
    }

    #[test]
    fn test_load_document_failure_keeps_previous_tree() {
        let mut tree = decode(&sample_document()).unwrap();
        let before = tree.clone();
        let broken = json!({ "dimensions": [ { "factors": [] } ] });
        assert!(tree.load_document(&broken).is_err());
        assert_eq!(tree, before);

        tree.load_document(&json!({ "dimensions": [ { "name": "solo" } ] }))
            .unwrap();
        assert_eq!(tree.root().len(), 1);
        assert_eq!(tree.root()[0].name(), "Solo");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("urban planning"), "Urban Planning");
        assert_eq!(title_case("URBAN-planning"), "Urban-Planning");
        assert_eq!(title_case("3d model"), "3D Model");
        assert_eq!(title_case(""), "");
    }
}
