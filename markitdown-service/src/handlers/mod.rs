pub mod convert;
pub mod health;
pub mod metrics;

pub use convert::process_file;
pub use health::{health_check, read_root};
pub use metrics::metrics_endpoint;
