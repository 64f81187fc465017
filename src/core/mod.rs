/*
 * This module consolidates the platform-agnostic core of the scoring model
 * editor: the node and weight types, the dimension/factor/layer tree, the
 * weight engine that keeps factor totals and balance classifications in step
 * with layer edits, and the codec that maps model documents to and from the
 * tree. Alongside the model it carries the small I/O helpers its collaborators
 * use: document persistence with change fingerprints, and the per-user config.
 */
pub mod checksum_utils;
pub mod config;
pub mod document_codec;
pub mod document_store;
pub mod models;
pub mod path_utils;
pub mod tree;
pub mod weights;

// Re-export key structures and enums
pub use models::{
    Attributes, Balance, DEFAULT_DIMENSION_NAME, DEFAULT_FACTOR_NAME, DEFAULT_LAYER_NAME,
    LayerShape, Node, NodeKind, NodeStatus, Weight,
};

pub use tree::{ModelTree, NodePath, StructuralError};

pub use weights::{FactorState, WeightError};

pub use document_codec::{DocumentError, WEIGHTING_KEY, decode, decode_slice, encode};

pub use document_store::{
    CoreDocumentStore, DEFAULT_DOCUMENT_FILENAME, DEFAULT_EXPORT_FILENAME, DocumentFingerprint,
    DocumentStoreOperations, StoreError,
};

pub use config::{ConfigError, ConfigManagerOperations, CoreConfigManager};
