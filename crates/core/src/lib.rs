pub mod alert;
pub mod config;
pub mod error;
pub mod run;
pub mod schedule;
pub mod target;

pub use alert::*;
pub use config::Config;
pub use error::*;
pub use run::*;
pub use schedule::*;
pub use target::*;
