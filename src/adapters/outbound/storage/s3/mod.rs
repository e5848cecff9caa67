mod client;
mod xml;

pub use client::{S3Config, S3VersionedStore};
