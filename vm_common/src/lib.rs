//! Value types shared by the vending pipeline crates.
mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError};
pub use secret::Secret;
