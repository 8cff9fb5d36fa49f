//! Status codes and prompt keywords seen by key edit interactors.
//!
//! During [`Context::edit`](crate::Context::edit) the engine reports every
//! status line to the interactor. Lines with a [`StatusCode::GetBool`],
//! [`StatusCode::GetLine`] or [`StatusCode::GetHidden`] code are prompts; the
//! interactor answers them by writing one line to the supplied writer.
#![allow(non_camel_case_types)]
use crate::{Error, Result};

ffi_enum_wrapper! {
    /// Upstream documentation:
    /// [`gpgme_status_code_t`](https://www.gnupg.org/documentation/manuals/gpgme/Deprecated-Functions.html#index-gpgme_005fstatus_005fcode_005ft)
    pub enum StatusCode: ffi::gpgme_status_code_t {
        Eof = ffi::GPGME_STATUS_EOF,
        Enter = ffi::GPGME_STATUS_ENTER,
        Leave = ffi::GPGME_STATUS_LEAVE,
        Abort = ffi::GPGME_STATUS_ABORT,
        GoodSig = ffi::GPGME_STATUS_GOODSIG,
        BadSig = ffi::GPGME_STATUS_BADSIG,
        ErrSig = ffi::GPGME_STATUS_ERRSIG,
        KeyExpired = ffi::GPGME_STATUS_KEYEXPIRED,
        KeyRevoked = ffi::GPGME_STATUS_KEYREVOKED,
        NeedPassphrase = ffi::GPGME_STATUS_NEED_PASSPHRASE,
        ValidSig = ffi::GPGME_STATUS_VALIDSIG,
        NoData = ffi::GPGME_STATUS_NODATA,
        BadPassphrase = ffi::GPGME_STATUS_BAD_PASSPHRASE,
        NoPubKey = ffi::GPGME_STATUS_NO_PUBKEY,
        NoSecKey = ffi::GPGME_STATUS_NO_SECKEY,
        NeedPassphraseSym = ffi::GPGME_STATUS_NEED_PASSPHRASE_SYM,
        MissingPassphrase = ffi::GPGME_STATUS_MISSING_PASSPHRASE,
        GoodPassphrase = ffi::GPGME_STATUS_GOOD_PASSPHRASE,
        DeleteProblem = ffi::GPGME_STATUS_DELETE_PROBLEM,
        GetBool = ffi::GPGME_STATUS_GET_BOOL,
        GetLine = ffi::GPGME_STATUS_GET_LINE,
        GetHidden = ffi::GPGME_STATUS_GET_HIDDEN,
        GotIt = ffi::GPGME_STATUS_GOT_IT,
        Progress = ffi::GPGME_STATUS_PROGRESS,
        SigCreated = ffi::GPGME_STATUS_SIG_CREATED,
        KeyCreated = ffi::GPGME_STATUS_KEY_CREATED,
        UserIdHint = ffi::GPGME_STATUS_USERID_HINT,
        Unexpected = ffi::GPGME_STATUS_UNEXPECTED,
        InvRecp = ffi::GPGME_STATUS_INV_RECP,
        NoRecp = ffi::GPGME_STATUS_NO_RECP,
        AlreadySigned = ffi::GPGME_STATUS_ALREADY_SIGNED,
        SigExpired = ffi::GPGME_STATUS_SIGEXPIRED,
        Error = ffi::GPGME_STATUS_ERROR,
        NeedPassphrasePin = ffi::GPGME_STATUS_NEED_PASSPHRASE_PIN,
        ScOpFailure = ffi::GPGME_STATUS_SC_OP_FAILURE,
        ScOpSuccess = ffi::GPGME_STATUS_SC_OP_SUCCESS,
        CardCtrl = ffi::GPGME_STATUS_CARDCTRL,
        InvSgnr = ffi::GPGME_STATUS_INV_SGNR,
        NoSgnr = ffi::GPGME_STATUS_NO_SGNR,
        Success = ffi::GPGME_STATUS_SUCCESS,
        PinentryLaunched = ffi::GPGME_STATUS_PINENTRY_LAUNCHED,
        KeyNotCreated = ffi::GPGME_STATUS_KEY_NOT_CREATED,
        Failure = ffi::GPGME_STATUS_FAILURE,
        KeyConsidered = ffi::GPGME_STATUS_KEY_CONSIDERED,
    }
}

impl StatusCode {
    /// Returns `true` if the engine is waiting for a reply to this status.
    #[inline]
    pub fn is_prompt(self) -> bool {
        matches!(
            self,
            StatusCode::GetBool | StatusCode::GetLine | StatusCode::GetHidden
        )
    }

    /// Maps statuses that always end an edit session to the matching error.
    pub fn into_result(self) -> Result<()> {
        match self {
            StatusCode::MissingPassphrase => Err(Error::NO_PASSPHRASE),
            StatusCode::SigExpired => Err(Error::SIG_EXPIRED),
            _ => Ok(()),
        }
    }
}

// Replies
pub const QUIT: &str = "quit";
pub const YES: &str = "Y";

// Prompt keywords
pub const PROMPT: &str = "keyedit.prompt";
pub const OWNER_TRUST: &str = "edit_ownertrust.value";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_are_recognized() {
        assert!(StatusCode::GetLine.is_prompt());
        assert!(StatusCode::GetBool.is_prompt());
        assert!(!StatusCode::GotIt.is_prompt());
        assert!(!unsafe { StatusCode::from_raw(9999) }.is_prompt());
    }

    #[test]
    fn terminal_statuses_map_to_errors() {
        assert_eq!(
            StatusCode::MissingPassphrase.into_result(),
            Err(Error::NO_PASSPHRASE)
        );
        assert!(StatusCode::KeyConsidered.into_result().is_ok());
    }
}
