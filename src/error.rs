use crate::api::{Status, STATUS_OK};
use crate::Result;



pub(crate) fn status_to_result(call: &'static str, status: Status) -> Result<()> {
    if status == STATUS_OK { Ok(()) }
    else { Err(Error::NativeCallFailure { call, status }) }
}



#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected before any native call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("exactly one available camera expected, got {found}")]
    AmbiguousDevice { found: usize },

    #[error("unknown property {0:?}")]
    UnknownProperty(String),

    #[error("{name:?} expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str
    },

    /// The native status code is opaque to this crate and is carried as is.
    #[error("{call} failed with status {status:#06x}")]
    NativeCallFailure { call: &'static str, status: Status },

    #[error("the camera is already working")]
    AlreadyWorking,

    #[error("the camera is not working")]
    NotWorking,

    #[error("at most one stream can be opened at a time")]
    StreamBusy,

    #[error("no stream opened")]
    NoStream,

    #[error("all {0} callback slots are in use")]
    TooManyCallbacks(usize),

    #[error("acquisition interrupted")]
    Interrupted,
}

impl From<std::ffi::NulError> for Error {
    fn from(e: std::ffi::NulError) -> Self {
        Error::InvalidArgument(format!("string has an interior NUL at byte {}", e.nul_position()))
    }
}
