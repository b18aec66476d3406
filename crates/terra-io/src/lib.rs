//! I/O surfaces of the terra engine: versioned project documents and the
//! newline-delimited streaming output protocol.

pub mod error;
pub mod project;
pub mod stream;

pub use error::{IoError, Result};
pub use project::{PROJECT_VERSION, Project};
pub use stream::{Message, NdjsonWriter, parse_stream};
