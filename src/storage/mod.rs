pub mod error;
pub mod fs;
pub mod index;
pub mod integrity;
pub mod report;
