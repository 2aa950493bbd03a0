//! Downstream tool seam. Handlers receive the authorization context and, when
//! they ask for it, a request-scoped `ClientFactory`. They never see the token.

pub mod handlers;
pub mod registry;

pub use registry::{ToolError, ToolHandler, ToolRegistry};
