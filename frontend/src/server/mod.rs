pub mod routes;
pub mod runtime;

pub use routes::{Storefront, create_router};
pub use runtime::start_server;
