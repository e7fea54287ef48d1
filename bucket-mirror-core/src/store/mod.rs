//! Concrete [`ObjectStore`](crate::contract::ObjectStore) bindings.

pub mod fs;
pub mod s3;

pub use fs::FsStore;
pub use s3::S3Store;
