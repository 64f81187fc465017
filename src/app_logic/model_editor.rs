use crate::core::{
    Attributes, ConfigManagerOperations, DEFAULT_DIMENSION_NAME, DEFAULT_DOCUMENT_FILENAME,
    DEFAULT_FACTOR_NAME, DEFAULT_LAYER_NAME, DocumentError, DocumentFingerprint,
    DocumentStoreOperations, FactorState, LayerShape, ModelTree, Node, NodeKind, NodePath,
    NodeStatus, StoreError, StructuralError, WEIGHTING_KEY, Weight, WeightError, decode_slice,
    encode,
};
use crate::core::checksum_utils::sha256_hex;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const APP_NAME: &str = "ScoringModelEditor";

#[derive(Debug)]
pub enum ModelError {
    Weight(WeightError),
    Structure(StructuralError),
    Document(DocumentError),
    Store(StoreError),
    EmptyName,
    ReservedAttribute(String),
    NoDocumentPath,
}

impl From<WeightError> for ModelError {
    fn from(err: WeightError) -> Self {
        ModelError::Weight(err)
    }
}

impl From<StructuralError> for ModelError {
    fn from(err: StructuralError) -> Self {
        ModelError::Structure(err)
    }
}

impl From<DocumentError> for ModelError {
    fn from(err: DocumentError) -> Self {
        ModelError::Document(err)
    }
}

impl From<StoreError> for ModelError {
    fn from(err: StoreError) -> Self {
        ModelError::Store(err)
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Weight(e) => write!(f, "{e}"),
            ModelError::Structure(e) => write!(f, "{e}"),
            ModelError::Document(e) => write!(f, "{e}"),
            ModelError::Store(e) => write!(f, "{e}"),
            ModelError::EmptyName => write!(f, "Names cannot be empty"),
            ModelError::ReservedAttribute(key) => {
                write!(f, "'{key}' is managed by the weight editor and cannot be set directly")
            }
            ModelError::NoDocumentPath => write!(f, "No document has been opened from disk"),
        }
    }
}

impl std::error::Error for ModelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModelError::Weight(e) => Some(e),
            ModelError::Structure(e) => Some(e),
            ModelError::Document(e) => Some(e),
            ModelError::Store(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

/*
 * Validity of the factor nearest to an edit. Dimension-level edits have no
 * enclosing factor and report `NotApplicable`.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Factor(FactorState),
    NotApplicable,
}

impl Validity {
    pub fn is_balanced(&self) -> bool {
        matches!(self, Validity::Factor(state) if state.balance.is_balanced())
    }
}

/*
 * Result of a successful mutation: where the affected node now lives and the
 * state a caller needs to refresh its indicators.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    pub path: NodePath,
    pub validity: Validity,
}

/*
 * Owns the model tree and applies every edit a presentation layer can ask
 * for. Edits run to completion on the calling thread; callers serialize them
 * (a reload must not interleave with an in-flight edit). A weight edit that
 * the user cancels is simply never sent here, so nothing needs reverting.
 *
 * File access goes through `DocumentStoreOperations` and the last opened
 * document is remembered through `ConfigManagerOperations`, so both can be
 * replaced by in-memory versions in tests.
 */
pub struct ModelEditor {
    pub(crate) tree: ModelTree,
    pub(crate) document_path: Option<PathBuf>,
    pub(crate) fingerprint: DocumentFingerprint,
    pub(crate) config_manager: Arc<dyn ConfigManagerOperations>,
    pub(crate) document_store: Arc<dyn DocumentStoreOperations>,
}

impl ModelEditor {
    pub fn new(
        config_manager: Arc<dyn ConfigManagerOperations>,
        document_store: Arc<dyn DocumentStoreOperations>,
    ) -> Self {
        ModelEditor {
            tree: ModelTree::new(),
            document_path: None,
            fingerprint: DocumentFingerprint::new(),
            config_manager,
            document_store,
        }
    }

    pub fn tree(&self) -> &ModelTree {
        &self.tree
    }

    pub fn document_path(&self) -> Option<&Path> {
        self.document_path.as_deref()
    }

    fn validity_at(&self, path: &NodePath) -> Validity {
        self.tree
            .enclosing_factor(path)
            .and_then(|factor| self.tree.factor_state(&factor).ok())
            .map(Validity::Factor)
            .unwrap_or(Validity::NotApplicable)
    }

    fn outcome(&self, path: NodePath) -> MutationOutcome {
        let validity = self.validity_at(&path);
        MutationOutcome { path, validity }
    }

    fn require(&self, path: &NodePath, kind: NodeKind) -> Result<()> {
        self.tree.require_kind(path, kind)?;
        Ok(())
    }

    // --- Documents ---

    /*
     * Replaces the whole model from an in-memory document; on failure the
     * current model is kept. The model then no longer matches the fingerprint
     * of the opened file, so the next change notification reloads it.
     */
    pub fn load_document(&mut self, document: &Value) -> Result<()> {
        self.tree.load_document(document)?;
        self.fingerprint.clear();
        log::debug!("ModelEditor: Model replaced from document");
        Ok(())
    }

    pub fn load_document_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let fresh = decode_slice(bytes)?;
        self.tree = fresh;
        self.fingerprint.clear();
        log::debug!("ModelEditor: Model replaced from {} bytes", bytes.len());
        Ok(())
    }

    pub fn export_document(&self) -> Value {
        encode(&self.tree)
    }

    /*
     * Reads and decodes the document at `path`, then makes it the current
     * document: the model is replaced, its fingerprint recorded and the path
     * remembered for the next start. Nothing changes if reading or decoding
     * fails.
     *
     * Args:
     *   path: The model document to open.
     *
     * Returns:
     *   `Ok(())` once the new model is installed, or the store or document
     *   error that prevented it.
     */
    pub fn open_document(&mut self, path: &Path) -> Result<()> {
        log::debug!("ModelEditor: Opening document {path:?}");
        let bytes = self.document_store.read_document_bytes(path)?;
        let fresh = decode_slice(&bytes)?;

        self.tree = fresh;
        self.document_path = Some(path.to_path_buf());
        self.fingerprint.record(sha256_hex(&bytes));
        if let Err(e) = self
            .config_manager
            .save_last_document_path(APP_NAME, Some(path))
        {
            log::warn!("ModelEditor: Could not remember last document path: {e}");
        }
        log::info!(
            "ModelEditor: Opened {path:?} ({} dimensions)",
            self.tree.root().len()
        );
        Ok(())
    }

    /*
     * Called when the open document changed on disk. The file is read once;
     * the fingerprint and the new model both come from those bytes. Returns
     * whether the model was replaced.
     */
    pub fn reload_if_changed(&mut self) -> Result<bool> {
        let path = self.document_path.clone().ok_or(ModelError::NoDocumentPath)?;
        let bytes = self.document_store.read_document_bytes(&path)?;
        let checksum = sha256_hex(&bytes);
        if !self.fingerprint.differs_from(&checksum) {
            log::debug!("ModelEditor: {path:?} unchanged, keeping current model");
            return Ok(false);
        }
        let fresh = decode_slice(&bytes).inspect_err(|e| {
            log::warn!("ModelEditor: Keeping current model, {path:?} rejected: {e}");
        })?;
        self.tree = fresh;
        self.fingerprint.record(checksum);
        log::info!("ModelEditor: Reloaded {path:?} after external change");
        Ok(true)
    }

    fn write_model(&self, path: &Path) -> Result<String> {
        let checksum = self
            .document_store
            .write_document(path, &self.export_document())?;
        log::info!("ModelEditor: Wrote model to {path:?}");
        Ok(checksum)
    }

    pub fn export_to(&self, path: &Path) -> Result<()> {
        self.write_model(path)?;
        Ok(())
    }

    /*
     * Writes the model back to the document it was opened from and records the
     * fingerprint of what was written, so the resulting file-change
     * notification is a no-op.
     */
    pub fn save_document(&mut self) -> Result<PathBuf> {
        let path = self.document_path.clone().ok_or(ModelError::NoDocumentPath)?;
        let checksum = self.write_model(&path)?;
        self.fingerprint.record(checksum);
        Ok(path)
    }

    /*
     * Picks the document to open on start: an explicit path wins, then the
     * last document remembered in the config, then `model.json` in
     * `working_dir`.
     */
    pub fn resolve_document_path(&self, explicit: Option<PathBuf>, working_dir: &Path) -> PathBuf {
        if let Some(path) = explicit {
            return path;
        }
        match self.config_manager.load_last_document_path(APP_NAME) {
            Ok(Some(path)) => {
                log::debug!("ModelEditor: Using last document path {path:?}");
                return path;
            }
            Ok(None) => {}
            Err(e) => log::warn!("ModelEditor: Could not read last document path: {e}"),
        }
        working_dir.join(DEFAULT_DOCUMENT_FILENAME)
    }

    // --- Structure ---

    pub fn add_dimension(&mut self, name: Option<&str>) -> Result<MutationOutcome> {
        let name = name.unwrap_or(DEFAULT_DIMENSION_NAME);
        let path = self.tree.push(&NodePath::root(), Node::dimension(name))?;
        Ok(self.outcome(path))
    }

    pub fn add_factor(&mut self, dimension: &NodePath) -> Result<MutationOutcome> {
        self.require(dimension, NodeKind::Dimension)?;
        let path = self.tree.push(dimension, Node::factor(DEFAULT_FACTOR_NAME))?;
        Ok(self.outcome(path))
    }

    /// New layers start at 1.00 with no attributes.
    pub fn add_layer(&mut self, factor: &NodePath) -> Result<MutationOutcome> {
        self.require(factor, NodeKind::Factor)?;
        let layer = Node::layer(
            DEFAULT_LAYER_NAME,
            Weight::ONE,
            Attributes::new(),
            LayerShape::Flat,
        );
        let path = self.tree.push(factor, layer)?;
        Ok(self.outcome(path))
    }

    /*
     * Removes the node and its subtree. The reported path is the parent, and
     * the validity is that of the factor that lost a layer, if any.
     */
    pub fn remove_node(&mut self, path: &NodePath) -> Result<MutationOutcome> {
        let removed = self.tree.remove(path)?;
        log::debug!(
            "ModelEditor: Removed {} '{}'",
            removed.kind(),
            removed.name()
        );
        let parent = path.parent().unwrap_or_default();
        Ok(self.outcome(parent))
    }

    pub fn rename_node(&mut self, path: &NodePath, new_name: &str) -> Result<MutationOutcome> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            log::warn!("ModelEditor: Rejected empty name for {path}");
            return Err(ModelError::EmptyName);
        }
        self.tree.rename(path, trimmed.to_string())?;
        Ok(self.outcome(path.clone()))
    }

    /// Drag-and-drop reordering of top-level dimensions.
    pub fn move_dimension(&mut self, from: usize, to: usize) -> Result<MutationOutcome> {
        let path = self
            .tree
            .move_node(&NodePath::new(&[from]), &NodePath::root(), to)?;
        Ok(self.outcome(path))
    }

    // --- Weights ---

    /*
     * Commits a weight typed by the user.
     *
     * Args:
     *   layer: Path of the layer being edited.
     *   raw_value: The text as entered; it must parse as a number.
     *
     * Returns:
     *   The layer path and the owning factor's new total and classification,
     *   or `ModelError::Weight` with the model untouched.
     */
    pub fn edit_layer_weight(&mut self, layer: &NodePath, raw_value: &str) -> Result<MutationOutcome> {
        let state = self.tree.set_layer_weight(layer, raw_value)?;
        Ok(MutationOutcome {
            path: layer.clone(),
            validity: Validity::Factor(state),
        })
    }

    pub fn auto_distribute(&mut self, factor: &NodePath) -> Result<MutationOutcome> {
        let state = self.tree.auto_distribute(factor)?;
        Ok(MutationOutcome {
            path: factor.clone(),
            validity: Validity::Factor(state),
        })
    }

    pub fn clear_weights(&mut self, factor: &NodePath) -> Result<MutationOutcome> {
        let state = self.tree.clear_all(factor)?;
        Ok(MutationOutcome {
            path: factor.clone(),
            validity: Validity::Factor(state),
        })
    }

    // --- Layer details and status ---

    /// Read-only view of a layer's attributes for a details dialog.
    pub fn layer_attributes(&self, layer: &NodePath) -> Result<&Attributes> {
        self.require(layer, NodeKind::Layer)?;
        let node = self
            .tree
            .node_at(layer)
            .ok_or_else(|| StructuralError::InvalidPath(layer.clone()))?;
        Ok(node.attributes())
    }

    /*
     * Applies an edit made in a details dialog. `weighting` is refused: layer
     * weights only change through `edit_layer_weight`.
     */
    pub fn set_layer_attribute(
        &mut self,
        layer: &NodePath,
        key: &str,
        value: Value,
    ) -> Result<MutationOutcome> {
        if key == WEIGHTING_KEY {
            log::warn!("ModelEditor: Refused direct edit of '{key}' on {layer}");
            return Err(ModelError::ReservedAttribute(key.to_string()));
        }
        self.tree.set_attribute(layer, key.to_string(), value)?;
        Ok(self.outcome(layer.clone()))
    }

    /*
     * Sets the processing/validity indicator of any node. The engine rewrites
     * factor and dimension status on the next weight change, so this is meant
     * for layers.
     */
    pub fn set_status(&mut self, path: &NodePath, status: NodeStatus) -> Result<MutationOutcome> {
        self.tree.set_status(path, status)?;
        Ok(self.outcome(path.clone()))
    }

    /// Every layer in document order, for collaborators that process leaves.
    pub fn leaf_paths(&self) -> Vec<NodePath> {
        self.tree.leaves()
    }

    /*
     * One line per factor, "Dimension / Factor: total (balanced|unbalanced)",
     * in document order. Factors without layers show "-" as their total.
     */
    pub fn balance_report(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for dimension in self.tree.root() {
            for factor in dimension.children() {
                let total = factor
                    .weight()
                    .map(|w| w.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let label = match factor.balance() {
                    Some(balance) if balance.is_balanced() => "balanced",
                    _ => "unbalanced",
                };
                lines.push(format!(
                    "{} / {}: {total} ({label})",
                    dimension.name(),
                    factor.name()
                ));
            }
        }
        lines
    }
}
