pub mod artifact;
pub mod config;
pub mod error;
pub mod importer;
pub mod logging;
pub mod registry;
pub mod store;
pub mod version;
