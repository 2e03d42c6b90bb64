mod token_amount;

pub mod helpers;

pub use token_amount::{AmountParseError, TokenAmount};
