pub mod quote;
pub mod instrument;
