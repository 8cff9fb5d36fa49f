use std::{ffi::CStr, fmt, marker::PhantomData, str::Utf8Error, time::SystemTime};

use crate::{error, utils, Error, KeyAlgorithm, KeyListMode, NonNull, Protocol, Validity};

macro_rules! bit_accessors {
    ($($name:ident => $bit:ident),+ $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self) -> bool {
                unsafe { (*self.as_raw()).$bit() }
            }
        )+
    };
}

macro_rules! str_accessors {
    ($Lt:lifetime; $($name:ident, $name_raw:ident => $field:ident),+ $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self) -> Result<&$Lt str, Option<Utf8Error>> {
                self.$name_raw()
                    .map_or(Err(None), |s| s.to_str().map_err(Some))
            }

            #[inline]
            pub fn $name_raw(&self) -> Option<&$Lt CStr> {
                unsafe { utils::borrow_cstr((*self.as_raw()).$field) }
            }
        )+
    };
}

/// Walks a native singly linked list, wrapping every node.
unsafe fn collect_list<P, T>(
    mut raw: *mut P, next: impl Fn(&P) -> *mut P, wrap: impl Fn(*mut P) -> T,
) -> Vec<T> {
    let mut items = Vec::new();
    while !raw.is_null() {
        items.push(wrap(raw));
        raw = next(&*raw);
    }
    items
}

/// A shared handle to an engine key.
///
/// Cloning takes another engine reference and dropping releases it, so the
/// native key lives exactly as long as its last `Key`.
///
/// Upstream documentation:
/// [`gpgme_key_t`](https://www.gnupg.org/documentation/manuals/gpgme/Key-objects.html#index-gpgme_005fkey_005ft)
pub struct Key(NonNull<ffi::gpgme_key_t>);

unsafe impl Send for Key {}
unsafe impl Sync for Key {}

impl Drop for Key {
    #[inline]
    fn drop(&mut self) {
        unsafe { ffi::gpgme_key_unref(self.as_raw()) }
    }
}

impl Clone for Key {
    #[inline]
    fn clone(&self) -> Key {
        unsafe {
            ffi::gpgme_key_ref(self.as_raw());
            Key(self.0)
        }
    }
}

impl Key {
    impl_wrapper!(ffi::gpgme_key_t);

    bit_accessors! {
        is_revoked => revoked,
        is_expired => expired,
        is_disabled => disabled,
        is_invalid => invalid,
        can_encrypt => can_encrypt,
        can_sign => can_sign,
        can_certify => can_certify,
        can_authenticate => can_authenticate,
        has_secret => secret,
    }

    str_accessors! {
        '_;
        issuer_serial, issuer_serial_raw => issuer_serial,
        issuer_name, issuer_name_raw => issuer_name,
        chain_id, chain_id_raw => chain_id,
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        unsafe { Protocol::from_raw((*self.as_raw()).protocol) }
    }

    #[inline]
    pub fn owner_trust(&self) -> Validity {
        unsafe { Validity::from_raw((*self.as_raw()).owner_trust) }
    }

    /// The listing mode that was active when this key was retrieved.
    #[inline]
    pub fn key_list_mode(&self) -> KeyListMode {
        unsafe { KeyListMode::from_bits_retain((*self.as_raw()).keylist_mode) }
    }

    /// The key id of the primary subkey.
    #[inline]
    pub fn id(&self) -> Result<&str, Option<Utf8Error>> {
        self.primary_key().map_or(Err(None), |k| k.id())
    }

    #[inline]
    pub fn id_raw(&self) -> Option<&CStr> {
        self.primary_key()?.id_raw()
    }

    #[inline]
    pub fn fingerprint(&self) -> Result<&str, Option<Utf8Error>> {
        self.fingerprint_raw()
            .map_or(Err(None), |s| s.to_str().map_err(Some))
    }

    /// The key's fingerprint, falling back to the primary subkey's for engines
    /// that leave the top-level field unset.
    #[inline]
    pub fn fingerprint_raw(&self) -> Option<&CStr> {
        unsafe { utils::borrow_cstr((*self.as_raw()).fpr) }
            .or_else(|| self.primary_key()?.fingerprint_raw())
    }

    #[inline]
    pub fn primary_key(&self) -> Option<Subkey<'_>> {
        unsafe {
            (*self.as_raw())
                .subkeys
                .as_mut()
                .map(|raw| Subkey::from_raw(raw))
        }
    }

    /// Returns the subkeys in engine order, the primary key first.
    pub fn subkeys(&self) -> Vec<Subkey<'_>> {
        unsafe {
            collect_list(
                (*self.as_raw()).subkeys,
                |s| s.next,
                |raw| Subkey::from_raw(raw),
            )
        }
    }

    pub fn user_ids(&self) -> Vec<UserId<'_>> {
        unsafe {
            collect_list(
                (*self.as_raw()).uids,
                |u| u.next,
                |raw| UserId::from_raw(raw),
            )
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("raw", &self.as_raw())
            .field("fingerprint", &self.fingerprint_raw())
            .field("protocol", &self.protocol())
            .field("owner_trust", &self.owner_trust())
            .field("revoked", &self.is_revoked())
            .field("expired", &self.is_expired())
            .field("disabled", &self.is_disabled())
            .field("invalid", &self.is_invalid())
            .field("has_secret", &self.has_secret())
            .field("subkeys", &self.subkeys())
            .field("user_ids", &self.user_ids())
            .finish()
    }
}

/// A subkey borrowed from its [`Key`].
///
/// Views only lend out their pointer; ownership stays with the key.
///
/// ```compile_fail
/// fn take(subkey: gpgme_bridge::Subkey<'_>) -> gpgme_bridge::ffi::gpgme_subkey_t {
///     subkey.into_raw()
/// }
/// ```
///
/// Upstream documentation:
/// [`gpgme_subkey_t`](https://www.gnupg.org/documentation/manuals/gpgme/Key-objects.html#index-gpgme_005fsubkey_005ft)
#[derive(Copy, Clone)]
pub struct Subkey<'key>(NonNull<ffi::gpgme_subkey_t>, PhantomData<&'key Key>);

unsafe impl Send for Subkey<'_> {}
unsafe impl Sync for Subkey<'_> {}

impl<'key> Subkey<'key> {
    impl_wrapper!(@borrowed ffi::gpgme_subkey_t, PhantomData);

    bit_accessors! {
        is_revoked => revoked,
        is_expired => expired,
        is_disabled => disabled,
        is_invalid => invalid,
        can_encrypt => can_encrypt,
        can_sign => can_sign,
        can_certify => can_certify,
        can_authenticate => can_authenticate,
        is_secret => secret,
        is_card_key => is_cardkey,
    }

    str_accessors! {
        'key;
        id, id_raw => keyid,
        fingerprint, fingerprint_raw => fpr,
    }

    #[inline]
    pub fn algorithm(&self) -> KeyAlgorithm {
        unsafe { KeyAlgorithm::from_raw((*self.as_raw()).pubkey_algo) }
    }

    /// Key size in bits.
    #[inline]
    pub fn length(&self) -> usize {
        unsafe { (*self.as_raw()).length as usize }
    }

    #[inline]
    pub fn creation_time(&self) -> Option<SystemTime> {
        utils::to_system_time(unsafe { (*self.as_raw()).timestamp })
    }

    /// `None` if the subkey never expires.
    #[inline]
    pub fn expiration_time(&self) -> Option<SystemTime> {
        utils::to_system_time(unsafe { (*self.as_raw()).expires })
    }
}

impl fmt::Debug for Subkey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subkey")
            .field("raw", &self.as_raw())
            .field("fingerprint", &self.fingerprint_raw())
            .field("algorithm", &self.algorithm())
            .field("length", &self.length())
            .field("creation_time", &self.creation_time())
            .field("expiration_time", &self.expiration_time())
            .field("revoked", &self.is_revoked())
            .field("expired", &self.is_expired())
            .field("secret", &self.is_secret())
            .finish()
    }
}

/// Upstream documentation:
/// [`gpgme_user_id_t`](https://www.gnupg.org/documentation/manuals/gpgme/Key-objects.html#index-gpgme_005fuser_005fid_005ft)
#[derive(Copy, Clone)]
pub struct UserId<'key>(NonNull<ffi::gpgme_user_id_t>, PhantomData<&'key Key>);

unsafe impl Send for UserId<'_> {}
unsafe impl Sync for UserId<'_> {}

impl<'key> UserId<'key> {
    impl_wrapper!(@borrowed ffi::gpgme_user_id_t, PhantomData);

    bit_accessors! {
        is_revoked => revoked,
        is_invalid => invalid,
    }

    str_accessors! {
        'key;
        id, id_raw => uid,
        name, name_raw => name,
        email, email_raw => email,
        comment, comment_raw => comment,
    }

    #[inline]
    pub fn validity(&self) -> Validity {
        unsafe { Validity::from_raw((*self.as_raw()).validity) }
    }

    /// Returns the certifications on this user id.
    ///
    /// The list is only populated when the key was listed with
    /// [`KeyListMode::SIGS`].
    pub fn signatures(&self) -> Vec<KeySignature<'key>> {
        unsafe {
            collect_list(
                (*self.as_raw()).signatures,
                |s| s.next,
                |raw| KeySignature::from_raw(raw),
            )
        }
    }
}

impl fmt::Debug for UserId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserId")
            .field("raw", &self.as_raw())
            .field("id", &self.id_raw())
            .field("validity", &self.validity())
            .field("revoked", &self.is_revoked())
            .field("invalid", &self.is_invalid())
            .field("signatures", &self.signatures())
            .finish()
    }
}

impl fmt::Display for UserId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self
            .id_raw()
            .map(|s| s.to_string_lossy())
            .unwrap_or_default();
        f.write_str(&id)
    }
}

/// A certification made over a user id.
///
/// Upstream documentation:
/// [`gpgme_key_sig_t`](https://www.gnupg.org/documentation/manuals/gpgme/Key-objects.html#index-gpgme_005fkey_005fsig_005ft)
#[derive(Copy, Clone)]
pub struct KeySignature<'key>(NonNull<ffi::gpgme_key_sig_t>, PhantomData<&'key Key>);

unsafe impl Send for KeySignature<'_> {}
unsafe impl Sync for KeySignature<'_> {}

impl<'key> KeySignature<'key> {
    impl_wrapper!(@borrowed ffi::gpgme_key_sig_t, PhantomData);

    bit_accessors! {
        is_revocation => revoked,
        is_expired => expired,
        is_invalid => invalid,
        is_exportable => exportable,
    }

    str_accessors! {
        'key;
        signer_key_id, signer_key_id_raw => keyid,
        signer_user_id, signer_user_id_raw => uid,
        signer_name, signer_name_raw => name,
        signer_email, signer_email_raw => email,
        signer_comment, signer_comment_raw => comment,
    }

    #[inline]
    pub fn algorithm(&self) -> KeyAlgorithm {
        unsafe { KeyAlgorithm::from_raw((*self.as_raw()).pubkey_algo) }
    }

    #[inline]
    pub fn creation_time(&self) -> Option<SystemTime> {
        utils::to_system_time(unsafe { (*self.as_raw()).timestamp })
    }

    #[inline]
    pub fn expiration_time(&self) -> Option<SystemTime> {
        utils::to_system_time(unsafe { (*self.as_raw()).expires })
    }

    /// The engine's verdict on this certification.
    #[inline]
    pub fn status(&self) -> Result<(), Error> {
        match error::check(unsafe { (*self.as_raw()).status }) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn signature_class(&self) -> u32 {
        unsafe { (*self.as_raw()).sig_class }
    }
}

impl fmt::Debug for KeySignature<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySignature")
            .field("raw", &self.as_raw())
            .field("signer_key_id", &self.signer_key_id_raw())
            .field("signer_user_id", &self.signer_user_id_raw())
            .field("algorithm", &self.algorithm())
            .field("creation_time", &self.creation_time())
            .field("expiration_time", &self.expiration_time())
            .field("signature_class", &self.signature_class())
            .field("status", &self.status())
            .field("revocation", &self.is_revocation())
            .field("exportable", &self.is_exportable())
            .finish()
    }
}
