use thiserror::Error;

/// Manifest payload is malformed. Fatal: the attach routine writes the
/// numeric tag to the internal-error file and aborts the injection.
#[derive(Debug, Error)]
pub enum ManifestDecodeError {
    #[error("manifest payload truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("manifest magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("manifest string at offset {offset} is not valid UTF-16")]
    InvalidString { offset: usize },
    #[error("manifest policy tree is malformed: {0}")]
    MalformedTree(String),
    #[error("manifest version {found} is unsupported (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },
}

impl ManifestDecodeError {
    /// The numeric tag written to the internal-error file, stable across
    /// versions so the controller can classify failures without parsing
    /// the message text.
    pub fn tag(&self) -> u32 {
        match self {
            ManifestDecodeError::Truncated { .. } => 1,
            ManifestDecodeError::BadMagic { .. } => 2,
            ManifestDecodeError::InvalidString { .. } => 3,
            ManifestDecodeError::MalformedTree(_) => 4,
            ManifestDecodeError::UnsupportedVersion { .. } => 5,
        }
    }
}

/// Failure inside the reparse-point resolver. Non-fatal: handlers log the
/// error verbosely and fall through to the real API with the original path.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("reparse chain exceeded the maximum hop count")]
    ChainTooLong,
    #[error("reparse target could not be read: {0}")]
    TargetUnreadable(String),
    #[error("cache entry for {path} is inconsistent")]
    CacheInconsistent { path: String },
}

/// Failure writing a record to the report channel.
#[derive(Debug, Error)]
pub enum ReportChannelError {
    #[error("report sink write failed: {0}")]
    SinkWrite(String),
    #[error("report channel has been torn down after repeated failures")]
    TornDown,
    #[error("report record failed to serialize: {0}")]
    Serialize(String),
}

/// Umbrella error for the CLI / DLL bootstrap layer, where callers want a
/// single `?`-friendly type rather than matching on the subsystem.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Manifest(#[from] ManifestDecodeError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Report(#[from] ReportChannelError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
