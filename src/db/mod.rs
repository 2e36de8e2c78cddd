//! Database layer: MongoDB client, typed collections and document schemas

pub mod mongo;
pub mod schemas;
