pub mod error;
pub mod numeric;

pub use error::{ApiError, ApiResult};
pub use numeric::{sanitize_f64, sanitize_value};
