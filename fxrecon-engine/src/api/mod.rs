//! HTTP surface

pub mod events;
pub mod health;
pub mod tasks;
pub mod upload;

pub use events::event_stream;
pub use health::health_routes;
pub use tasks::task_routes;
pub use upload::upload_routes;
