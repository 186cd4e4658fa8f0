pub mod metadata;
pub mod naming;
