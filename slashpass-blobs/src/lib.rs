mod memory;
mod s3_store;
mod secrets;
mod store;

pub use memory::MemoryBlobStore;
pub use s3_store::S3BlobStore;
pub use secrets::{SecretStore, SecretStoreError};
pub use store::{BlobStore, BlobStoreError};

pub type ObjectKey = String;

pub type BucketName = String;
