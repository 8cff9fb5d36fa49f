use std::{error::Error as StdError, io};

pub use gpg_error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type user callbacks may return.
///
/// Any error is accepted. A [`gpgme_bridge::Error`](Error) keeps its code, an
/// [`io::Error`] is mapped through its errno, and everything else becomes a
/// general error when it is handed back to the engine.
pub type CallbackError = Box<dyn StdError + Send + Sync + 'static>;
pub type CallbackResult = Result<(), CallbackError>;

/// An operation failure that still carries whatever result the engine
/// produced before failing.
///
/// Operations such as decryption or verification can fail after partially
/// completing; the partial result describes, for example, which recipients
/// were invalid.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct OpError<R> {
    #[source]
    pub error: Error,
    pub result: Option<R>,
}

impl<R> OpError<R> {
    #[inline]
    pub fn new(error: Error, result: Option<R>) -> Self {
        Self { error, result }
    }

    #[inline]
    pub fn error(&self) -> Error {
        self.error
    }

    #[inline]
    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    #[inline]
    pub fn into_result(self) -> Option<R> {
        self.result
    }
}

impl<R> From<Error> for OpError<R> {
    #[inline]
    fn from(error: Error) -> Self {
        Self::new(error, None)
    }
}

impl<R> From<OpError<R>> for Error {
    #[inline]
    fn from(err: OpError<R>) -> Self {
        err.error
    }
}

/// Turns a raw engine error into `None` on success.
#[inline]
pub(crate) fn check(raw: ffi::gpgme_error_t) -> Option<Error> {
    let err = Error::new(raw);
    if err.code() == 0 {
        None
    } else {
        Some(err)
    }
}

/// Builds an error from an error source and an error code.
#[inline]
pub fn make_error(source: ffi::gpgme_err_source_t, code: ffi::gpgme_err_code_t) -> Error {
    #[allow(unused_unsafe)]
    let raw = unsafe { ffi::gpgme_err_make(source, code) };
    Error::new(raw)
}

/// The error handed to the engine when a callback fails in a way that has no
/// more specific code.
#[inline]
pub(crate) fn general() -> Error {
    make_error(ffi::GPG_ERR_SOURCE_GPGME, ffi::GPG_ERR_GENERAL)
}

/// Returns the raw error source component of `err`.
#[inline]
pub fn source_of(err: &Error) -> ffi::gpgme_err_source_t {
    #[allow(unused_unsafe)]
    unsafe {
        ffi::gpgme_err_source(err.raw())
    }
}

/// Maps an I/O error to the engine's error space through its errno.
pub fn from_io_error(err: &io::Error) -> Error {
    let errno = err.raw_os_error().unwrap_or(libc::EIO);
    make_error(ffi::GPG_ERR_SOURCE_GPGME, unsafe {
        ffi::gpgme_err_code_from_errno(errno)
    })
}

/// Maps an arbitrary error returned from a callback to an engine error.
///
/// The source chain is searched for a native error or an I/O error; any other
/// error becomes `GPG_ERR_GENERAL`.
pub fn to_native(err: &(dyn StdError + 'static)) -> Error {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(err) = err.downcast_ref::<Error>() {
            return *err;
        }
        if let Some(err) = err.downcast_ref::<io::Error>() {
            return from_io_error(err);
        }
        current = err.source();
    }
    general()
}

/// Completes an operation by pairing its return code with the snapshot of its
/// result.
///
/// A failed conversion of the result is reported only if the operation itself
/// succeeded.
pub(crate) fn complete<R: Default>(
    raw: ffi::gpgme_error_t, result: Result<Option<R>>,
) -> Result<R, OpError<R>> {
    match (check(raw), result) {
        (Some(error), result) => Err(OpError::new(error, result.ok().flatten())),
        (None, Ok(result)) => Ok(result.unwrap_or_default()),
        (None, Err(error)) => Err(OpError::new(error, None)),
    }
}
