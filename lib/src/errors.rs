use crate::jvm;
use crate::settings::SettingsError;
use std::fmt;

/// Error from running a re-encoding end to end
#[derive(Debug)]
pub enum Error {
    /// Decoding or encoding the class failed
    Class(jvm::Error),

    /// Bad configuration
    Settings(SettingsError),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Class(err)
    }
}

impl From<SettingsError> for Error {
    fn from(err: SettingsError) -> Error {
        Error::Settings(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Class(jvm::Error::IoError(err))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Class(err) => err.fmt(f),
            Error::Settings(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Class(err) => Some(err),
            Error::Settings(err) => Some(err),
        }
    }
}
