//! # HTTP 中间件

pub mod csrf;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use csrf::csrf_middleware;
pub use rate_limit::{apply_rate_limit_headers, rate_limit_middleware};
pub use request_id::{RequestId, request_id_middleware};
pub use session::session_auth_middleware;
