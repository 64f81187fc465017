/*
 * The weight engine. Layer weights are authoritative; a factor's weight is
 * always the sum of its layers' 2-decimal weights, and the factor is balanced
 * only when that sum reads exactly `1.00`. Every operation here that changes
 * a layer weight recomputes the owning factor and the owning dimension's
 * aggregate status before returning.
 *
 * Failed operations do not write anything: input is parsed and paths are
 * resolved before the first mutation.
 */
use super::models::{Balance, Node, NodeKind, NodeStatus, Weight};
use super::tree::{ModelTree, NodePath, StructuralError};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightError {
    NotANumber(String),
    OutOfRange(String),
    Structure(StructuralError),
}

impl From<StructuralError> for WeightError {
    fn from(err: StructuralError) -> Self {
        WeightError::Structure(err)
    }
}

impl fmt::Display for WeightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightError::NotANumber(raw) => {
                write!(f, "Please enter a valid number for the weighting (got '{raw}')")
            }
            WeightError::OutOfRange(raw) => write!(f, "Weighting '{raw}' is out of range"),
            WeightError::Structure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WeightError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WeightError::Structure(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, WeightError>;

/*
 * Snapshot of a factor after a weight operation, enough for a caller to
 * refresh its presentation without walking the tree again.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorState {
    pub path: NodePath,
    pub weight: Option<Weight>,
    pub balance: Balance,
}

/// Balanced iff the factor has layers and its 2-decimal total is exactly 1.00.
pub fn classify(factor: &Node) -> Balance {
    match factor.weight() {
        Some(total) if factor.child_count() > 0 && total.is_one() => Balance::Balanced,
        _ => Balance::Unbalanced,
    }
}

/*
 * Re-derives a factor's weight from its layers and reclassifies it. A factor
 * without layers has no weight. The factor's status mirrors the result.
 */
pub(crate) fn recompute_factor(factor: &mut Node) -> Balance {
    let total = if factor.child_count() == 0 {
        None
    } else {
        Some(
            factor
                .children()
                .iter()
                .map(|layer| layer.weight().unwrap_or(Weight::ZERO))
                .sum(),
        )
    };
    factor.set_weight(total);
    let balance = classify(factor);
    factor.set_balance(Some(balance));
    factor.set_status(match balance {
        Balance::Balanced => NodeStatus::Valid,
        Balance::Unbalanced => NodeStatus::Invalid,
    });
    balance
}

/*
 * Dimension status is an aggregate of its factors: unset when it has none,
 * valid when every factor is balanced, invalid otherwise.
 */
pub(crate) fn aggregate_dimension_status(dimension: &mut Node) {
    let status = if dimension.child_count() == 0 {
        NodeStatus::Unset
    } else if dimension
        .children()
        .iter()
        .all(|factor| factor.balance() == Some(Balance::Balanced))
    {
        NodeStatus::Valid
    } else {
        NodeStatus::Invalid
    };
    dimension.set_status(status);
}

/// The plain `1/n` share rounded to two decimals, as used when loading.
pub fn equal_split(layer_count: usize) -> Weight {
    if layer_count == 0 {
        return Weight::ZERO;
    }
    Weight::from_f64(1.0 / layer_count as f64).unwrap_or(Weight::ZERO)
}

/*
 * Splits 1.00 across `layer_count` layers so the parts sum to exactly 1.00:
 * every layer gets the floor share in hundredths, and the leftover hundredths
 * are handed out one each to the trailing layers (3 layers: 0.33, 0.33, 0.34).
 */
pub fn distribute_evenly(layer_count: usize) -> Vec<Weight> {
    if layer_count == 0 {
        return Vec::new();
    }
    let total = Weight::ONE.hundredths();
    let count = layer_count as i64;
    let base = total / count;
    let remainder = (total % count) as usize;
    (0..layer_count)
        .map(|index| {
            let bonus = if index >= layer_count - remainder { 1 } else { 0 };
            Weight::from_hundredths(base + bonus)
        })
        .collect()
}

impl ModelTree {
    /// Current weight and classification of the factor at `path`.
    pub fn factor_state(&self, path: &NodePath) -> std::result::Result<FactorState, StructuralError> {
        self.require_kind(path, NodeKind::Factor)?;
        let factor = self
            .node_at(path)
            .ok_or_else(|| StructuralError::InvalidPath(path.clone()))?;
        Ok(FactorState {
            path: path.clone(),
            weight: factor.weight(),
            balance: classify(factor),
        })
    }

    pub fn classify_factor(&self, path: &NodePath) -> std::result::Result<Balance, StructuralError> {
        self.factor_state(path).map(|state| state.balance)
    }

    /*
     * Parses `raw_value` and stores it on the layer at `layer_path`, then
     * re-derives the owning factor. On a parse failure neither the layer nor
     * the factor is touched.
     */
    pub fn set_layer_weight(&mut self, layer_path: &NodePath, raw_value: &str) -> Result<FactorState> {
        self.require_kind(layer_path, NodeKind::Layer)?;
        let weight = Weight::parse(raw_value).inspect_err(|e| {
            log::warn!("WeightEngine: Rejected weight for {layer_path}: {e}");
        })?;
        let layer = self
            .node_at_mut(layer_path)
            .ok_or_else(|| StructuralError::InvalidPath(layer_path.clone()))?;
        log::debug!(
            "WeightEngine: Layer '{}' at {layer_path} weight {} -> {weight}",
            layer.name(),
            layer.weight().unwrap_or_default()
        );
        layer.set_weight(Some(weight));
        self.refresh_around(layer_path);
        let factor_path = layer_path
            .parent()
            .ok_or_else(|| StructuralError::InvalidPath(layer_path.clone()))?;
        Ok(self.factor_state(&factor_path)?)
    }

    /*
     * Rebalances the factor so its layers sum to exactly 1.00, using the
     * remainder rule of `distribute_evenly`. A factor without layers is left
     * as it is.
     */
    pub fn auto_distribute(&mut self, factor_path: &NodePath) -> Result<FactorState> {
        self.require_kind(factor_path, NodeKind::Factor)?;
        let factor = self
            .node_at_mut(factor_path)
            .ok_or_else(|| StructuralError::InvalidPath(factor_path.clone()))?;
        let shares = distribute_evenly(factor.child_count());
        if shares.is_empty() {
            log::debug!("WeightEngine: Factor at {factor_path} has no layers, nothing to distribute");
        } else {
            log::debug!(
                "WeightEngine: Distributing weights across {} layers of '{}'",
                shares.len(),
                factor.name()
            );
        }
        for (layer, share) in factor.children_mut().iter_mut().zip(shares) {
            layer.set_weight(Some(share));
        }
        self.refresh_around(factor_path);
        Ok(self.factor_state(factor_path)?)
    }

    /// Zeroes every layer weight of the factor; the result is always unbalanced.
    pub fn clear_all(&mut self, factor_path: &NodePath) -> Result<FactorState> {
        self.require_kind(factor_path, NodeKind::Factor)?;
        let factor = self
            .node_at_mut(factor_path)
            .ok_or_else(|| StructuralError::InvalidPath(factor_path.clone()))?;
        log::debug!("WeightEngine: Clearing layer weights of '{}'", factor.name());
        for layer in factor.children_mut().iter_mut() {
            layer.set_weight(Some(Weight::ZERO));
        }
        self.refresh_around(factor_path);
        Ok(self.factor_state(factor_path)?)
    }
}
