pub mod error_logging;
pub mod request_id;

pub use error_logging::error_logging_middleware;
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
