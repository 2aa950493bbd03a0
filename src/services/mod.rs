pub mod audit;
pub mod auth;
pub mod authz;
pub mod credentials;
pub mod tools;
