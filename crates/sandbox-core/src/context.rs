use crate::canonical_path::CanonicalPath;
use crate::ids::{CorrelationId, OperationId};

/// Everything a detour handler knows about the call it is intercepting,
/// before any policy lookup happens.
#[derive(Debug, Clone)]
pub struct FileOperationContext {
    pub operation_name: &'static str,
    pub desired_access: u32,
    pub share_mode: u32,
    pub creation_disposition: u32,
    pub flags_and_attributes: u32,
    /// The attributes the real call ultimately opened the object with, once
    /// known; `None` before the real API has been invoked.
    pub opened_attributes: Option<u32>,
    pub raw_path: CanonicalPath,
    pub id: OperationId,
    pub correlation_id: CorrelationId,
}

impl FileOperationContext {
    pub fn new(operation_name: &'static str, raw_path: CanonicalPath) -> Self {
        Self {
            operation_name,
            desired_access: 0,
            share_mode: 0,
            creation_disposition: 0,
            flags_and_attributes: 0,
            opened_attributes: None,
            raw_path,
            id: OperationId::next(),
            correlation_id: CorrelationId::next(),
        }
    }
}

/// What the filesystem probe that precedes a policy decision found out
/// about the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Existent,
    Nonexistent,
    InvalidPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReadContext {
    pub existence: Existence,
    pub opened_directory: bool,
}

impl FileReadContext {
    pub fn new(existence: Existence, opened_directory: bool) -> Self {
        Self {
            existence,
            opened_directory,
        }
    }
}
