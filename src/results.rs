//! Owned snapshots of operation results.
//!
//! The engine's result structures only live until the next operation on the
//! same context, so everything here is copied out immediately after an
//! operation returns.
use std::time::SystemTime;

use conv::{UnwrapOrSaturate, ValueInto};

use crate::{
    error, utils, Error, HashAlgorithm, ImportFlags, KeyAlgorithm, Result, SignMode,
    SignatureNotation, SignatureSummary, Validity,
};

/// A result type that can be read back from a context after an operation.
pub(crate) trait OpResult: Sized {
    /// Copies the most recent result of this kind out of `ctx`.
    ///
    /// `Ok(None)` means the engine produced no result structure.
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>>;
}

unsafe fn collect<P, T>(
    mut raw: *mut P, next: impl Fn(&P) -> *mut P, mut copy: impl FnMut(&P) -> Result<T>,
) -> Result<Vec<T>> {
    let mut items = Vec::new();
    while let Some(item) = raw.as_ref() {
        items.push(copy(item)?);
        raw = next(item);
    }
    Ok(items)
}

/// A key the engine refused to use for an operation.
///
/// Upstream documentation:
/// [`gpgme_invalid_key_t`](https://www.gnupg.org/documentation/manuals/gpgme/Crypto-Operations.html#index-gpgme_005finvalid_005fkey_005ft)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidKey {
    pub fingerprint: Option<String>,
    pub reason: Option<Error>,
}

impl InvalidKey {
    unsafe fn collect(raw: ffi::gpgme_invalid_key_t) -> Result<Vec<InvalidKey>> {
        collect(
            raw,
            |k| k.next,
            |k| {
                Ok(InvalidKey {
                    fingerprint: utils::copy_str(k.fpr)?,
                    reason: error::check(k.reason),
                })
            },
        )
    }
}

/// Upstream documentation:
/// [`gpgme_encrypt_result_t`](https://www.gnupg.org/documentation/manuals/gpgme/Encrypting-a-Plaintext.html#index-gpgme_005fencrypt_005fresult_005ft)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptResult {
    pub invalid_recipients: Vec<InvalidKey>,
}

impl OpResult for EncryptResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        ffi::gpgme_op_encrypt_result(ctx)
            .as_ref()
            .map(|r| {
                Ok(EncryptResult {
                    invalid_recipients: InvalidKey::collect(r.invalid_recipients)?,
                })
            })
            .transpose()
    }
}

/// Upstream documentation:
/// [`gpgme_decrypt_result_t`](https://www.gnupg.org/documentation/manuals/gpgme/Decrypt.html#index-gpgme_005fdecrypt_005fresult_005ft)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptResult {
    pub unsupported_algorithm: Option<String>,
    pub wrong_key_usage: bool,
}

impl OpResult for DecryptResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        ffi::gpgme_op_decrypt_result(ctx)
            .as_ref()
            .map(|r| {
                Ok(DecryptResult {
                    unsupported_algorithm: utils::copy_str(r.unsupported_algorithm)?,
                    wrong_key_usage: r.wrong_key_usage(),
                })
            })
            .transpose()
    }
}

/// A signature created by a signing operation.
///
/// Upstream documentation:
/// [`gpgme_new_signature_t`](https://www.gnupg.org/documentation/manuals/gpgme/Creating-a-Signature.html#index-gpgme_005fnew_005fsignature_005ft)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSignature {
    pub mode: SignMode,
    pub key_algorithm: KeyAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    pub signature_class: u32,
    pub creation_time: Option<SystemTime>,
    pub fingerprint: Option<String>,
}

impl NewSignature {
    unsafe fn collect(raw: ffi::gpgme_new_signature_t) -> Result<Vec<NewSignature>> {
        collect(
            raw,
            |s| s.next,
            |s| {
                Ok(NewSignature {
                    mode: SignMode::from_raw(s.typ),
                    key_algorithm: KeyAlgorithm::from_raw(s.pubkey_algo),
                    hash_algorithm: HashAlgorithm::from_raw(s.hash_algo),
                    signature_class: s.sig_class,
                    creation_time: utils::to_system_time(s.timestamp),
                    fingerprint: utils::copy_str(s.fpr)?,
                })
            },
        )
    }
}

/// Upstream documentation:
/// [`gpgme_sign_result_t`](https://www.gnupg.org/documentation/manuals/gpgme/Creating-a-Signature.html#index-gpgme_005fsign_005fresult_005ft)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignResult {
    pub invalid_signers: Vec<InvalidKey>,
    pub signatures: Vec<NewSignature>,
}

impl OpResult for SignResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        ffi::gpgme_op_sign_result(ctx)
            .as_ref()
            .map(|r| {
                Ok(SignResult {
                    invalid_signers: InvalidKey::collect(r.invalid_signers)?,
                    signatures: NewSignature::collect(r.signatures)?,
                })
            })
            .transpose()
    }
}

/// A signature checked by a verifying operation.
///
/// Upstream documentation:
/// [`gpgme_signature_t`](https://www.gnupg.org/documentation/manuals/gpgme/Verify.html#index-gpgme_005fsignature_005ft)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub summary: SignatureSummary,
    pub fingerprint: Option<String>,
    /// `None` if the signature is good.
    pub status: Option<Error>,
    pub creation_time: Option<SystemTime>,
    pub expiration_time: Option<SystemTime>,
    pub wrong_key_usage: bool,
    pub validity: Validity,
    pub validity_reason: Option<Error>,
    pub key_algorithm: KeyAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    pub notations: Vec<SignatureNotation>,
}

impl Signature {
    /// Returns `true` if the engine found no problem with the signature.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_none() && !self.summary.contains(SignatureSummary::RED)
    }

    unsafe fn collect(raw: ffi::gpgme_signature_t) -> Result<Vec<Signature>> {
        collect(
            raw,
            |s| s.next,
            |s| {
                Ok(Signature {
                    summary: SignatureSummary::from_bits_retain(s.summary),
                    fingerprint: utils::copy_str(s.fpr)?,
                    status: error::check(s.status),
                    creation_time: utils::to_system_time(s.timestamp),
                    expiration_time: utils::to_system_time(s.exp_timestamp),
                    wrong_key_usage: s.wrong_key_usage(),
                    validity: Validity::from_raw(s.validity),
                    validity_reason: error::check(s.validity_reason),
                    key_algorithm: KeyAlgorithm::from_raw(s.pubkey_algo),
                    hash_algorithm: HashAlgorithm::from_raw(s.hash_algo),
                    notations: SignatureNotation::collect(s.notations)?,
                })
            },
        )
    }
}

/// Upstream documentation:
/// [`gpgme_verify_result_t`](https://www.gnupg.org/documentation/manuals/gpgme/Verify.html#index-gpgme_005fverify_005fresult_005ft)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyResult {
    pub signatures: Vec<Signature>,
}

impl OpResult for VerifyResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        ffi::gpgme_op_verify_result(ctx)
            .as_ref()
            .map(|r| {
                Ok(VerifyResult {
                    signatures: Signature::collect(r.signatures)?,
                })
            })
            .transpose()
    }
}

/// The outcome for a single key seen by an import.
///
/// Upstream documentation:
/// [`gpgme_import_status_t`](https://www.gnupg.org/documentation/manuals/gpgme/Importing-Keys.html#index-gpgme_005fimport_005fstatus_005ft)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStatus {
    pub fingerprint: Option<String>,
    pub result: Option<Error>,
    pub status: ImportFlags,
}

/// Upstream documentation:
/// [`gpgme_import_result_t`](https://www.gnupg.org/documentation/manuals/gpgme/Importing-Keys.html#index-gpgme_005fimport_005fresult_005ft)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub considered: u32,
    pub no_user_id: u32,
    pub imported: u32,
    pub imported_rsa: u32,
    pub unchanged: u32,
    pub new_user_ids: u32,
    pub new_sub_keys: u32,
    pub new_signatures: u32,
    pub new_revocations: u32,
    pub secret_read: u32,
    pub secret_imported: u32,
    pub secret_unchanged: u32,
    pub skipped_new_keys: u32,
    pub not_imported: u32,
    pub imports: Vec<ImportStatus>,
}

impl OpResult for ImportResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        let Some(r) = ffi::gpgme_op_import_result(ctx).as_ref() else {
            return Ok(None);
        };
        let imports = collect(
            r.imports,
            |i| i.next,
            |i| {
                Ok(ImportStatus {
                    fingerprint: utils::copy_str(i.fpr)?,
                    result: error::check(i.result),
                    status: ImportFlags::from_bits_retain(i.status),
                })
            },
        )?;
        Ok(Some(ImportResult {
            considered: r.considered.value_into().unwrap_or_saturate(),
            no_user_id: r.no_user_id.value_into().unwrap_or_saturate(),
            imported: r.imported.value_into().unwrap_or_saturate(),
            imported_rsa: r.imported_rsa.value_into().unwrap_or_saturate(),
            unchanged: r.unchanged.value_into().unwrap_or_saturate(),
            new_user_ids: r.new_user_ids.value_into().unwrap_or_saturate(),
            new_sub_keys: r.new_sub_keys.value_into().unwrap_or_saturate(),
            new_signatures: r.new_signatures.value_into().unwrap_or_saturate(),
            new_revocations: r.new_revocations.value_into().unwrap_or_saturate(),
            secret_read: r.secret_read.value_into().unwrap_or_saturate(),
            secret_imported: r.secret_imported.value_into().unwrap_or_saturate(),
            secret_unchanged: r.secret_unchanged.value_into().unwrap_or_saturate(),
            skipped_new_keys: r.skipped_new_keys.value_into().unwrap_or_saturate(),
            not_imported: r.not_imported.value_into().unwrap_or_saturate(),
            imports,
        }))
    }
}

/// Upstream documentation:
/// [`gpgme_genkey_result_t`](https://www.gnupg.org/documentation/manuals/gpgme/Generating-Keys.html#index-gpgme_005fgenkey_005fresult_005ft)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenkeyResult {
    /// A primary key was generated.
    pub primary: bool,
    /// A subkey was generated.
    pub sub: bool,
    pub fingerprint: Option<String>,
}

impl OpResult for GenkeyResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        ffi::gpgme_op_genkey_result(ctx)
            .as_ref()
            .map(|r| {
                Ok(GenkeyResult {
                    primary: r.primary(),
                    sub: r.sub(),
                    fingerprint: utils::copy_str(r.fpr)?,
                })
            })
            .transpose()
    }
}

/// The combined result of [`Context::encrypt_sign`](crate::Context::encrypt_sign).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptSignResult {
    pub invalid_recipients: Vec<InvalidKey>,
    pub invalid_signers: Vec<InvalidKey>,
    pub signatures: Vec<NewSignature>,
}

impl OpResult for EncryptSignResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        let encrypt = EncryptResult::from_context(ctx)?;
        let sign = SignResult::from_context(ctx)?;
        if encrypt.is_none() && sign.is_none() {
            return Ok(None);
        }
        let encrypt = encrypt.unwrap_or_default();
        let sign = sign.unwrap_or_default();
        Ok(Some(EncryptSignResult {
            invalid_recipients: encrypt.invalid_recipients,
            invalid_signers: sign.invalid_signers,
            signatures: sign.signatures,
        }))
    }
}

/// The combined result of
/// [`Context::decrypt_verify`](crate::Context::decrypt_verify).
///
/// The signatures are kept even when the decryption step failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptVerifyResult {
    pub unsupported_algorithm: Option<String>,
    pub wrong_key_usage: bool,
    pub signatures: Vec<Signature>,
}

impl OpResult for DecryptVerifyResult {
    unsafe fn from_context(ctx: ffi::gpgme_ctx_t) -> Result<Option<Self>> {
        let decrypt = DecryptResult::from_context(ctx)?;
        let verify = VerifyResult::from_context(ctx)?;
        if decrypt.is_none() && verify.is_none() {
            return Ok(None);
        }
        let decrypt = decrypt.unwrap_or_default();
        Ok(Some(DecryptVerifyResult {
            unsupported_algorithm: decrypt.unsupported_algorithm,
            wrong_key_usage: decrypt.wrong_key_usage,
            signatures: verify.unwrap_or_default().signatures,
        }))
    }
}
