mod aggregate;
mod donation;

pub use aggregate::*;
pub use donation::*;
