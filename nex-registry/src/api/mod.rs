pub mod auth;
pub mod extract;
pub mod handlers;
pub mod response;
pub mod reviews;
pub mod routes;

pub use routes::create_router;
