pub mod availability;
pub mod filters;
pub mod library;
pub mod parser;
pub mod reconcile;
