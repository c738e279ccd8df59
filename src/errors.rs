use std::error::Error;
use std::io::{self, ErrorKind};

use http::StatusCode;

use crate::fs::FsError;
use crate::locator::LocatorError;

pub(crate) type DavResult<T> = Result<T, DavError>;

#[derive(Debug)]
pub(crate) enum DavError {
    XmlParseError, // error interpreting xml
    InvalidPath,   // error parsing path
    IllegalPath,   // path not under prefix
    UnknownDavMethod,
    Status(StatusCode),
    StatusClose(StatusCode),
    FsError(FsError),
    IoError(io::Error),
    XmlReaderError(xmltree::ParseError),
    XmlWriterError(xml::writer::Error),
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::FsError(e) => Some(e),
            DavError::IoError(e) => Some(e),
            DavError::XmlReaderError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlReaderError(_) => write!(f, "XML parse error"),
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            DavError::FsError(e) => write!(f, "filesystem error: {e}"),
            _ => write!(f, "{self:?}"),
        }
    }
}

impl From<FsError> for DavError {
    fn from(e: FsError) -> Self {
        DavError::FsError(e)
    }
}

impl From<io::Error> for DavError {
    fn from(e: io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(e: StatusCode) -> Self {
        DavError::Status(e)
    }
}

impl From<xmltree::ParseError> for DavError {
    fn from(e: xmltree::ParseError) -> Self {
        DavError::XmlReaderError(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<LocatorError> for DavError {
    fn from(_: LocatorError) -> Self {
        DavError::InvalidPath
    }
}

fn fserror_to_status(e: &FsError) -> StatusCode {
    match e {
        FsError::NotFound => StatusCode::NOT_FOUND,
        FsError::Exists => StatusCode::METHOD_NOT_ALLOWED,
        FsError::PathTooLong => StatusCode::URI_TOO_LONG,
        FsError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ioerror_to_status(e: &io::Error) -> StatusCode {
    match e.kind() {
        // the client went away or sent a short body.
        ErrorKind::UnexpectedEof => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::BAD_GATEWAY,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::Status(e) => *e,
            DavError::StatusClose(e) => *e,
            DavError::FsError(e) => fserror_to_status(e),
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::XmlReaderError(_) => StatusCode::BAD_REQUEST,
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        match self {
            DavError::StatusClose(_) | DavError::UnknownDavMethod => true,
            // the request body may be half read.
            DavError::IoError(e) => e.kind() == ErrorKind::UnexpectedEof,
            _ => false,
        }
    }

    /// Failures of the filesystem while writing to a destination (MOVE/COPY).
    ///
    /// An over-long name is the client's fault, everything else is ours.
    pub(crate) fn from_destination(e: FsError) -> DavError {
        match e {
            FsError::PathTooLong => DavError::Status(StatusCode::BAD_REQUEST),
            FsError::Io(e) => DavError::IoError(e),
            other => DavError::IoError(other.into()),
        }
    }
}
