pub mod provider;
pub mod types;
pub mod yahoo;
