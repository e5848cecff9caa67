use thiserror::Error;

/// Validation errors for domain value objects
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    // ObjectKey
    #[error("object key cannot be empty")]
    EmptyObjectKey,
    #[error("object key too long: {actual} bytes (max {max})")]
    ObjectKeyTooLong { actual: usize, max: usize },
    #[error("invalid character in object key: {0:?}")]
    InvalidObjectKeyCharacter(char),
    #[error("object key cannot start with '/'")]
    ObjectKeyStartsWithSlash,

    // BucketName
    #[error("bucket name must be between 3 and 63 characters, got {0}")]
    BucketNameLength(usize),
    #[error("bucket name must start and end with a lowercase letter or digit")]
    BucketNameInvalidBoundary,
    #[error("invalid character in bucket name: {0:?}")]
    BucketNameInvalidCharacter(char),
    #[error("bucket name cannot contain consecutive hyphens")]
    BucketNameConsecutiveHyphens,

    // VersionId
    #[error("version id cannot be empty")]
    EmptyVersionId,
    #[error("version id too long: {actual} bytes (max {max})")]
    VersionIdTooLong { actual: usize, max: usize },
    #[error("version id contains control characters")]
    VersionIdControlCharacter,
}
