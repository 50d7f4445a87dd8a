pub mod admin;
pub mod donations;
pub mod proofs;
pub mod receivers;
pub mod stats;
