pub mod config;
pub mod database;
pub mod entities;
pub mod error;
pub mod http;
pub mod seed;
pub mod surface;
pub mod tags;

pub use config::ServiceConfig;
pub use database::Database;
pub use entities::Record;
pub use error::{OperationError, StoreError};
pub use http::{router, AppState};
pub use seed::populate_sample_data;
pub use surface::execute;
