//! SeaORM entities for the credential store.

pub mod authz_history;
pub mod client;
pub mod session;
pub mod user;
