pub mod save_file;

pub use save_file::{StagedFile, is_staging_name};
