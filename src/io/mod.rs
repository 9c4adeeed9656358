pub mod csv_import;
pub mod file;
pub mod snapshot;

pub use file::JsonFileBackend;
