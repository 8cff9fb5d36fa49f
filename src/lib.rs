//! A safe object bridge over [GPGME](https://www.gnupg.org/software/gpgme/index.html).
//!
//! Every cryptographic decision is delegated to the engine. This crate maps the
//! engine's sessions, keys and results onto owned Rust values, marshals
//! arguments across the boundary and turns engine error codes into
//! [`Error`] values, optionally enriched with the partial result of a failed
//! operation ([`OpError`]).
//!
//! ```no_run
//! use gpgme_bridge::{Context, Protocol};
//!
//! let gpgme = gpgme_bridge::init();
//! println!("linked against GPGME {}", gpgme.version());
//!
//! let mut ctx = Context::from_protocol(Protocol::OpenPgp)?;
//! for key in ctx.keylist(None::<&str>, false)? {
//!     let key = key?;
//!     println!("{}", key.fingerprint().unwrap_or("?"));
//! }
//! # Ok::<(), gpgme_bridge::Error>(())
//! ```
use std::{
    ffi::CStr,
    fmt, ptr,
    sync::{OnceLock, PoisonError, RwLock},
};

use self::utils::CStrArgument;
pub use self::{
    callbacks::{
        EditInteractionStatus, EditInteractor, PassphraseProvider, PassphraseRequest,
        ProgressInfo, ProgressReporter,
    },
    context::{Context, Keys},
    data::{Data, IntoData, WrappedError},
    engine::EngineInfo,
    error::{CallbackError, CallbackResult, Error, OpError, Result},
    flags::*,
    keys::{Key, KeySignature, Subkey, UserId},
    notation::SignatureNotation,
    results::{
        DecryptResult, DecryptVerifyResult, EncryptResult, EncryptSignResult, GenkeyResult,
        ImportResult, ImportStatus, InvalidKey, NewSignature, SignResult, Signature,
        VerifyResult,
    },
};
pub use ffi;

#[macro_use]
mod utils;
mod callbacks;
mod context;
mod data;
pub mod edit;
mod engine;
pub mod error;
mod flags;
mod keys;
mod notation;
mod results;

pub(crate) use self::utils::NonNull;

/// Lets the engine choose how many certificates to include in a signature.
pub const INCLUDE_CERTS_DEFAULT: i32 = ffi::GPGME_INCLUDE_CERTS_DEFAULT;

ffi_enum_wrapper! {
    /// A cryptographic protocol that may be used with the library.
    ///
    /// Each protocol is implemented by an engine that the library communicates with
    /// to perform various operations.
    ///
    /// Upstream documentation:
    /// [`gpgme_protocol_t`](https://www.gnupg.org/documentation/manuals/gpgme/Protocols-and-Engines.html#index-enum-gpgme_005fprotocol_005ft)
    pub enum Protocol: ffi::gpgme_protocol_t {
        OpenPgp = ffi::GPGME_PROTOCOL_OpenPGP,
        Cms = ffi::GPGME_PROTOCOL_CMS,
        GpgConf = ffi::GPGME_PROTOCOL_GPGCONF,
        Assuan = ffi::GPGME_PROTOCOL_ASSUAN,
        G13 = ffi::GPGME_PROTOCOL_G13,
        UiServer = ffi::GPGME_PROTOCOL_UISERVER,
        Spawn = ffi::GPGME_PROTOCOL_SPAWN,
        Default = ffi::GPGME_PROTOCOL_DEFAULT,
        Unknown = ffi::GPGME_PROTOCOL_UNKNOWN,
    }
}

impl Protocol {
    #[inline]
    pub fn name(&self) -> std::result::Result<&'static str, Option<std::str::Utf8Error>> {
        self.name_raw()
            .map_or(Err(None), |s| s.to_str().map_err(Some))
    }

    #[inline]
    pub fn name_raw(&self) -> Option<&'static CStr> {
        unsafe {
            ffi::gpgme_get_protocol_name(self.raw())
                .as_ref()
                .map(|s| CStr::from_ptr(s))
        }
    }
}

impl fmt::Display for Protocol {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("Unknown"))
    }
}

ffi_enum_wrapper! {
    /// Upstream documentation:
    /// [`gpgme_validity_t`](https://www.gnupg.org/documentation/manuals/gpgme/Information-About-Keys.html#index-gpgme_005fvalidity_005ft)
    pub enum Validity: ffi::gpgme_validity_t {
        Unknown = ffi::GPGME_VALIDITY_UNKNOWN,
        Undefined = ffi::GPGME_VALIDITY_UNDEFINED,
        Never = ffi::GPGME_VALIDITY_NEVER,
        Marginal = ffi::GPGME_VALIDITY_MARGINAL,
        Full = ffi::GPGME_VALIDITY_FULL,
        Ultimate = ffi::GPGME_VALIDITY_ULTIMATE,
    }
}

impl fmt::Display for Validity {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Validity::Undefined => write!(f, "q"),
            Validity::Never => write!(f, "n"),
            Validity::Marginal => write!(f, "m"),
            Validity::Full => write!(f, "f"),
            Validity::Ultimate => write!(f, "u"),
            _ => write!(f, "?"),
        }
    }
}

static ENGINE_INFO: RwLock<()> = RwLock::new(());

/// A handle to the process-wide library state.
///
/// Obtained through [`init`]. The library version check runs exactly once per
/// process no matter how many handles are created.
#[derive(Debug, Clone)]
pub struct Gpgme {
    version: &'static str,
}

/// Initializes the library and returns a handle to its global state.
///
/// ```no_run
/// let gpgme = gpgme_bridge::init();
/// assert!(gpgme.check_version("1.4.0"));
/// ```
pub fn init() -> Gpgme {
    static TOKEN: OnceLock<Gpgme> = OnceLock::new();
    TOKEN
        .get_or_init(|| {
            let version = unsafe { ffi::gpgme_check_version(ptr::null()).as_ref() }
                .and_then(|s| unsafe { CStr::from_ptr(s) }.to_str().ok())
                .unwrap_or("");
            log::trace!("initialized GPGME {}", version);
            Gpgme { version }
        })
        .clone()
}

/// Initializes the library, failing unless the linked version is at least
/// `required`.
pub fn init_checked(required: impl CStrArgument) -> Result<Gpgme> {
    let gpgme = init();
    if gpgme.check_version(required) {
        Ok(gpgme)
    } else {
        Err(error::make_error(
            ffi::GPG_ERR_SOURCE_GPGME,
            ffi::GPG_ERR_NOT_SUPPORTED,
        ))
    }
}

impl Gpgme {
    /// Returns the version string of the linked library.
    #[inline]
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Checks that the linked version of the library is at least the
    /// specified version.
    ///
    /// `false` is returned if `version` is not in the format `MAJOR.MINOR.MICRO`.
    pub fn check_version(&self, version: impl CStrArgument) -> bool {
        let Ok(version) = utils::to_cstr(version) else {
            return false;
        };
        unsafe { !ffi::gpgme_check_version(version.as_ref().as_ptr()).is_null() }
    }

    /// Changes the default executable and home directory of the engine
    /// implementing `proto` for all sessions created afterwards.
    ///
    /// Upstream documentation:
    /// [`gpgme_set_engine_info`](https://www.gnupg.org/documentation/manuals/gpgme/Engine-Configuration.html#index-gpgme_005fset_005fengine_005finfo)
    pub fn set_engine_info(
        &self, proto: Protocol, path: Option<impl CStrArgument>,
        home_dir: Option<impl CStrArgument>,
    ) -> Result<()> {
        let path = utils::to_opt_cstr(path)?;
        let home_dir = utils::to_opt_cstr(home_dir)?;
        let _lock = ENGINE_INFO.write().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            return_err!(ffi::gpgme_set_engine_info(
                proto.raw(),
                utils::opt_ptr(path.as_ref()),
                utils::opt_ptr(home_dir.as_ref()),
            ));
        }
        Ok(())
    }

    /// Returns a snapshot of the global engine configuration.
    ///
    /// Upstream documentation:
    /// [`gpgme_get_engine_info`](https://www.gnupg.org/documentation/manuals/gpgme/Engine-Information.html#index-gpgme_005fget_005fengine_005finfo)
    pub fn engine_info(&self) -> Result<Vec<EngineInfo>> {
        let _lock = ENGINE_INFO.read().unwrap_or_else(PoisonError::into_inner);
        unsafe {
            let mut info = ptr::null_mut();
            return_err!(ffi::gpgme_get_engine_info(&mut info));
            EngineInfo::collect(info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_display() {
        assert_eq!(Validity::Ultimate.to_string(), "u");
        assert_eq!(Validity::Full.to_string(), "f");
        assert_eq!(Validity::Unknown.to_string(), "?");
        assert_eq!(unsafe { Validity::from_raw(77) }.to_string(), "?");
    }

    #[test]
    fn include_certs_default_matches_engine() {
        assert_eq!(INCLUDE_CERTS_DEFAULT, -256);
    }
}
