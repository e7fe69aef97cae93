pub mod model;
pub mod server;

pub use model::config::AppConfig;
