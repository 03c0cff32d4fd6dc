pub mod generator;
pub mod pair;

pub use pair::{RotateError, TokenPair};
