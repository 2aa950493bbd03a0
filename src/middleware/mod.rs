/*
 * Responsibility
 * - Public surface of the middleware layer
 * - auth::access (bearer pipeline + audit), http (transport concerns)
 */
pub mod auth;
pub mod http;
