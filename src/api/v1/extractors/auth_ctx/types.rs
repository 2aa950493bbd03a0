/*
 * Responsibility
 * - The authenticated context as handlers see it
 * - The middleware validates and stores it in request extensions; handlers only take this type
 *
 * Notes
 * - Token decoding/verification belongs to the middleware and services
 * - One per request; dropped with the request
 */
use std::ops::Deref;
use std::sync::Arc;

use crate::services::auth::AuthorizationContext;

#[derive(Debug, Clone)]
pub struct AuthCtx(pub Arc<AuthorizationContext>);

impl AuthCtx {
    pub fn new(ctx: AuthorizationContext) -> Self {
        Self(Arc::new(ctx))
    }
}

impl Deref for AuthCtx {
    type Target = AuthorizationContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
