//! Pipeline stage services

pub mod csv_codec;
pub mod fragment_loader;
pub mod ledger;
pub mod projector;
pub mod promoter;
