pub mod access_jwt;
pub mod claims;
pub mod context;
pub mod factory;
pub mod mint;
pub mod pipeline;
pub mod schema;

pub use access_jwt::{KeyMaterial, SignatureValidator};
pub use context::{AuthorizationContext, CredentialHandle};
pub use factory::build_auth_pipeline;
pub use pipeline::{AuthPipeline, AuthStage, Rejection};
