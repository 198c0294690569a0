pub mod horizon;
pub mod recommendation;
pub mod ticker;
