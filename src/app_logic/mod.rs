/*
 * The application logic layer. `ModelEditor` owns the model tree and exposes
 * the operations a presentation layer binds to (menus, inline edits, drag and
 * drop, open/save/reload). Unit tests for `ModelEditor` are in
 * `model_editor_tests.rs`.
 */
pub mod model_editor;


pub use model_editor::{APP_NAME, ModelEditor, ModelError, MutationOutcome, Validity};
