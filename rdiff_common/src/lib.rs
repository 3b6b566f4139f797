pub mod config;
pub mod error;
pub mod options;
pub mod types;

pub use config::*;
pub use error::*;
pub use options::*;
pub use types::*;
