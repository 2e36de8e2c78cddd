//! HTTP routes

pub mod auth_routes;
pub mod health;
pub mod helpers;
pub mod nodes;
pub mod projects;
pub mod tests;

pub use auth_routes::handle_auth_request;
pub use health::{health_check, version_info};
pub use nodes::handle_nodes_request;
pub use projects::handle_projects_request;
pub use tests::handle_tests_request;
