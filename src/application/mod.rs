// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer turns names into components and hands a fully
// resolved experiment to the right run loop.
//
// Rules for this layer:
//   - No tensor math here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - Only lookup, validation and workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Ordered static namespaces and first-match resolution
pub mod registry;

/// Named experiment configurations
pub mod config_registry;

/// Request → resolved components
pub mod experiment;

/// Stage → run loop
pub mod dispatcher;
