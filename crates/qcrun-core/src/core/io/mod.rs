pub mod capture;
pub mod files;
pub mod monitor;
pub mod process;
pub mod scratch;
