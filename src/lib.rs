/*
 * Editor core for hierarchical scoring models: dimensions own factors, factors
 * own weighted layers, and each factor's layer weights should add up to 1.00.
 *
 * `core` holds the model, its weight engine and the document codec;
 * `app_logic` exposes the mutation operations a presentation layer binds to.
 */
pub mod app_logic;
pub mod core;
