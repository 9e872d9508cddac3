pub mod catalog;
pub mod error;
pub mod http;
pub mod playlist;
