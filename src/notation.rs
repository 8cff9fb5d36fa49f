use std::{ffi::CStr, slice};

use crate::{Error, Result, SignatureNotationFlags};

/// A notation or policy URL attached to a signature.
///
/// Upstream documentation:
/// [`gpgme_sig_notation_t`](https://www.gnupg.org/documentation/manuals/gpgme/Verify.html#index-gpgme_005fsig_005fnotation_005ft)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureNotation {
    /// `None` for a policy URL.
    pub name: Option<String>,
    pub value: Vec<u8>,
    pub flags: SignatureNotationFlags,
}

impl SignatureNotation {
    #[inline]
    pub fn is_policy_url(&self) -> bool {
        self.name.is_none()
    }

    #[inline]
    pub fn is_human_readable(&self) -> bool {
        self.flags.contains(SignatureNotationFlags::HUMAN_READABLE)
    }

    #[inline]
    pub fn is_critical(&self) -> bool {
        self.flags.contains(SignatureNotationFlags::CRITICAL)
    }

    /// The value as text, if it is valid UTF-8.
    #[inline]
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    unsafe fn from_raw(raw: ffi::gpgme_sig_notation_t) -> Result<Self> {
        let notation = &*raw;
        let name = if notation.name.is_null() {
            None
        } else {
            let bytes = bytes_of(notation.name, notation.name_len)?;
            Some(
                String::from_utf8(bytes.to_vec())
                    .map_err(|_| Error::INV_VALUE)?,
            )
        };
        let value = if notation.value.is_null() {
            Vec::new()
        } else if notation.name.is_null() {
            // Policy URLs carry no length.
            CStr::from_ptr(notation.value).to_bytes().to_vec()
        } else {
            bytes_of(notation.value, notation.value_len)?.to_vec()
        };
        Ok(SignatureNotation {
            name,
            value,
            flags: SignatureNotationFlags::from_bits_retain(notation.flags),
        })
    }

    /// Copies a whole notation list.
    ///
    /// A single entry that cannot be converted fails the entire list.
    pub(crate) unsafe fn collect(mut raw: ffi::gpgme_sig_notation_t) -> Result<Vec<Self>> {
        let mut notations = Vec::new();
        while !raw.is_null() {
            notations.push(SignatureNotation::from_raw(raw)?);
            raw = (*raw).next;
        }
        Ok(notations)
    }
}

unsafe fn bytes_of<'a>(ptr: *const libc::c_char, len: libc::c_int) -> Result<&'a [u8]> {
    let len = usize::try_from(len).map_err(|_| Error::INV_VALUE)?;
    Ok(slice::from_raw_parts(ptr.cast(), len))
}
