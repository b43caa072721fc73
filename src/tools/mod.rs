pub mod find;
pub mod read;

pub use find::{FindResult, find_file};
pub use read::{FileFragment, read_fragment};
