pub mod aggregate;
pub mod macros;
pub mod query;
pub mod sample;
pub mod time;

pub use aggregate::*;
pub use query::*;
pub use sample::*;
pub use time::*;
