/*!
 * Authorization context extractor
 *
 * Responsibility:
 * - Hand the request's AuthorizationContext (built by the access middleware) to handlers
 * - axum glue lives in core, the type in types
 *
 * Public API:
 * - AuthCtx
 * - AuthCtxExtractor
 */

mod core;
mod types;

pub use core::AuthCtxExtractor;
pub use types::AuthCtx;
