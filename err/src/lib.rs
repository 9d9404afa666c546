#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Not implemented")]
    Unimplemented,
    #[error("IO: {0}")]
    Io(IoError),
    #[error("FS: {0}")]
    Fs(FsError),
}

#[derive(thiserror::Error, Debug)]
pub enum IoError {
    #[error("Read-only")]
    ReadOnly,
    #[error("Device failed")]
    DeviceFailed,
    #[error("Device busy")]
    Busy,
    #[error("Exhausted bounded busy retries")]
    BusyExhausted,
}

#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("Inconsistent")]
    Inconsistent,
    #[error("Index")]
    Index,
    #[error("Null argument")]
    NullArgument,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Invalid path")]
    InvalidPath,
    #[error("Not found")]
    NotFound,
    #[error("Already open")]
    AlreadyOpen,
    #[error("Is a directory")]
    IsDirectory,
    #[error("Read-only file")]
    ReadOnlyFile,
    #[error("No free space")]
    NoFreeSpace,
    #[error("Directory not empty")]
    NotEmpty,
    #[error("Invalid position")]
    InvalidPosition,
}

pub type Result<T> = core::result::Result<T, Error>;
