pub mod converter;
pub mod metrics;
pub mod temp_file;
pub mod upload;

pub use converter::{CommandConverter, ConversionError, Converter};
pub use metrics::{get_metrics, init_metrics};
pub use temp_file::ScopedTempFile;
pub use upload::{AcceptedUpload, UploadError, UploadPolicy};
