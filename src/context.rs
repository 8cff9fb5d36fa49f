use std::{borrow::BorrowMut, fmt, panic, ptr};

use crate::{
    callbacks::{self, Hook, HookSlot},
    error::{self, OpError},
    results::OpResult,
    utils::{self, CStrArgument, SmallVec},
    Data, DecryptResult, DecryptVerifyResult, EditInteractor, EncryptFlags, EncryptResult,
    EncryptSignResult, EngineInfo, Error, ExportMode, GenkeyResult, ImportResult, IntoData, Key,
    KeyListMode, NonNull, PassphraseProvider, PinentryMode, ProgressReporter, Protocol, Result,
    SignMode, SignResult, VerifyResult,
};

/// A session with a crypto engine.
///
/// Every operation borrows the context mutably, so a single context never runs
/// two operations at once. A context can be moved to another thread but not
/// shared between threads.
///
/// Upstream documentation:
/// [`gpgme_ctx_t`](https://www.gnupg.org/documentation/manuals/gpgme/Contexts.html#Contexts)
pub struct Context {
    raw: NonNull<ffi::gpgme_ctx_t>,
    passphrase_hook: Option<HookSlot>,
    progress_hook: Option<HookSlot>,
}

unsafe impl Send for Context {}

impl Drop for Context {
    fn drop(&mut self) {
        log::trace!("releasing context {:p}", self.as_raw());
        // The hooks are dropped afterwards, once the engine can no longer call them.
        unsafe { ffi::gpgme_release(self.as_raw()) }
    }
}

impl Context {
    /// Creates a session with the engine's default settings.
    ///
    /// Upstream documentation:
    /// [`gpgme_new`](https://www.gnupg.org/documentation/manuals/gpgme/Creating-Contexts.html#index-gpgme_005fnew)
    pub fn new() -> Result<Self> {
        crate::init();
        unsafe {
            let mut ctx = ptr::null_mut();
            return_err!(ffi::gpgme_new(&mut ctx));
            log::trace!("created context {:p}", ctx);
            Ok(Context {
                raw: NonNull::<ffi::gpgme_ctx_t>::new_unchecked(ctx),
                passphrase_hook: None,
                progress_hook: None,
            })
        }
    }

    pub fn from_protocol(proto: Protocol) -> Result<Self> {
        let mut ctx = Self::new()?;
        ctx.set_protocol(proto)?;
        Ok(ctx)
    }

    #[inline]
    pub fn as_raw(&self) -> ffi::gpgme_ctx_t {
        self.raw.as_ptr()
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        unsafe { Protocol::from_raw(ffi::gpgme_get_protocol(self.as_raw())) }
    }

    #[inline]
    pub fn set_protocol(&mut self, proto: Protocol) -> Result<()> {
        unsafe {
            return_err!(ffi::gpgme_set_protocol(self.as_raw(), proto.raw()));
        }
        Ok(())
    }

    #[inline]
    pub fn armor(&self) -> bool {
        unsafe { ffi::gpgme_get_armor(self.as_raw()) != 0 }
    }

    #[inline]
    pub fn set_armor(&mut self, enabled: bool) {
        unsafe { ffi::gpgme_set_armor(self.as_raw(), enabled.into()) }
    }

    #[inline]
    pub fn text_mode(&self) -> bool {
        unsafe { ffi::gpgme_get_textmode(self.as_raw()) != 0 }
    }

    #[inline]
    pub fn set_text_mode(&mut self, enabled: bool) {
        unsafe { ffi::gpgme_set_textmode(self.as_raw(), enabled.into()) }
    }

    #[inline]
    pub fn include_certs(&self) -> i32 {
        unsafe { ffi::gpgme_get_include_certs(self.as_raw()) }
    }

    /// Sets how many certificates are included in a CMS signature.
    ///
    /// Pass [`INCLUDE_CERTS_DEFAULT`](crate::INCLUDE_CERTS_DEFAULT) to let the
    /// engine decide.
    #[inline]
    pub fn set_include_certs(&mut self, certs: i32) {
        unsafe { ffi::gpgme_set_include_certs(self.as_raw(), certs) }
    }

    #[inline]
    pub fn key_list_mode(&self) -> KeyListMode {
        unsafe { KeyListMode::from_bits_retain(ffi::gpgme_get_keylist_mode(self.as_raw())) }
    }

    #[inline]
    pub fn set_key_list_mode(&mut self, mode: KeyListMode) -> Result<()> {
        unsafe {
            return_err!(ffi::gpgme_set_keylist_mode(self.as_raw(), mode.bits()));
        }
        Ok(())
    }

    #[inline]
    pub fn pinentry_mode(&self) -> PinentryMode {
        unsafe { PinentryMode::from_raw(ffi::gpgme_get_pinentry_mode(self.as_raw())) }
    }

    #[inline]
    pub fn set_pinentry_mode(&mut self, mode: PinentryMode) -> Result<()> {
        unsafe {
            return_err!(ffi::gpgme_set_pinentry_mode(self.as_raw(), mode.raw()));
        }
        Ok(())
    }

    /// Sets the locale category (e.g. `libc::LC_CTYPE`) passed to the engine,
    /// or restores the engine default when `value` is `None`.
    ///
    /// Upstream documentation:
    /// [`gpgme_set_locale`](https://www.gnupg.org/documentation/manuals/gpgme/Locale.html#index-gpgme_005fset_005flocale)
    pub fn set_locale(
        &mut self, category: libc::c_int, value: Option<impl CStrArgument>,
    ) -> Result<()> {
        let value = utils::to_opt_cstr(value)?;
        unsafe {
            return_err!(ffi::gpgme_set_locale(
                self.as_raw(),
                category,
                utils::opt_ptr(value.as_ref()),
            ));
        }
        Ok(())
    }

    /// Returns a snapshot of the engines configured for this session.
    pub fn engine_info(&self) -> Result<Vec<EngineInfo>> {
        unsafe { EngineInfo::collect(ffi::gpgme_ctx_get_engine_info(self.as_raw())) }
    }

    /// Changes the executable and home directory used by this session only.
    ///
    /// Upstream documentation:
    /// [`gpgme_ctx_set_engine_info`](https://www.gnupg.org/documentation/manuals/gpgme/Crypto-Engine.html#index-gpgme_005fctx_005fset_005fengine_005finfo)
    pub fn set_engine_info(
        &mut self, proto: Protocol, path: Option<impl CStrArgument>,
        home_dir: Option<impl CStrArgument>,
    ) -> Result<()> {
        let path = utils::to_opt_cstr(path)?;
        let home_dir = utils::to_opt_cstr(home_dir)?;
        unsafe {
            return_err!(ffi::gpgme_ctx_set_engine_info(
                self.as_raw(),
                proto.raw(),
                utils::opt_ptr(path.as_ref()),
                utils::opt_ptr(home_dir.as_ref()),
            ));
        }
        Ok(())
    }

    /// Returns the keys currently used for signing, in the order they were
    /// added.
    pub fn signers(&self) -> Vec<Key> {
        let mut keys = Vec::new();
        for seq in 0.. {
            match unsafe { ffi::gpgme_signers_enum(self.as_raw(), seq).as_mut() } {
                Some(key) => keys.push(unsafe { Key::from_raw(key) }),
                None => break,
            }
        }
        keys
    }

    #[inline]
    pub fn add_signer(&mut self, key: &Key) -> Result<()> {
        unsafe {
            return_err!(ffi::gpgme_signers_add(self.as_raw(), key.as_raw()));
        }
        Ok(())
    }

    #[inline]
    pub fn clear_signers(&mut self) {
        unsafe { ffi::gpgme_signers_clear(self.as_raw()) }
    }

    /// Replaces the signer list with `keys`.
    pub fn set_signers<'k>(&mut self, keys: impl IntoIterator<Item = &'k Key>) -> Result<()> {
        self.clear_signers();
        keys.into_iter().try_for_each(|key| self.add_signer(key))
    }

    /// Installs a provider consulted whenever the engine needs a passphrase,
    /// replacing any previous one.
    ///
    /// Loopback pinentry (see [`PinentryMode::Loopback`]) is usually required
    /// for GnuPG 2.1 and later to consult the provider.
    ///
    /// Upstream documentation:
    /// [`gpgme_set_passphrase_cb`](https://www.gnupg.org/documentation/manuals/gpgme/Passphrase-Callback.html#index-gpgme_005fset_005fpassphrase_005fcb)
    pub fn set_passphrase_provider<P>(&mut self, provider: P)
    where
        P: PassphraseProvider + 'static, {
        let hook = HookSlot::new(provider);
        unsafe {
            ffi::gpgme_set_passphrase_cb(
                self.as_raw(),
                Some(callbacks::passphrase_cb::<P>),
                hook.as_ptr(),
            );
        }
        self.passphrase_hook = Some(hook);
    }

    pub fn clear_passphrase_provider(&mut self) {
        unsafe { ffi::gpgme_set_passphrase_cb(self.as_raw(), None, ptr::null_mut()) }
        self.passphrase_hook = None;
    }

    #[inline]
    pub fn has_passphrase_provider(&self) -> bool {
        self.passphrase_hook.is_some()
    }

    /// Upstream documentation:
    /// [`gpgme_set_progress_cb`](https://www.gnupg.org/documentation/manuals/gpgme/Progress-Meter-Callback.html#index-gpgme_005fset_005fprogress_005fcb)
    pub fn set_progress_reporter<R>(&mut self, reporter: R)
    where
        R: ProgressReporter + 'static, {
        let hook = HookSlot::new(reporter);
        unsafe {
            ffi::gpgme_set_progress_cb(
                self.as_raw(),
                Some(callbacks::progress_cb::<R>),
                hook.as_ptr(),
            );
        }
        self.progress_hook = Some(hook);
    }

    pub fn clear_progress_reporter(&mut self) {
        unsafe { ffi::gpgme_set_progress_cb(self.as_raw(), None, ptr::null_mut()) }
        self.progress_hook = None;
    }

    #[inline]
    pub fn has_progress_reporter(&self) -> bool {
        self.progress_hook.is_some()
    }

    /// Rethrows a panic caught inside a session callback during the last
    /// engine call. The callback that panicked is unregistered first.
    fn resume_hook_panics(&mut self) {
        if let Some(payload) = self.passphrase_hook.as_mut().and_then(HookSlot::take_panic) {
            self.clear_passphrase_provider();
            panic::resume_unwind(payload);
        }
        if let Some(payload) = self.progress_hook.as_mut().and_then(HookSlot::take_panic) {
            self.clear_progress_reporter();
            panic::resume_unwind(payload);
        }
    }

    fn complete<R: OpResult + Default>(
        &mut self, err: ffi::gpgme_error_t,
    ) -> Result<R, OpError<R>> {
        self.resume_hook_panics();
        error::complete(err, unsafe { R::from_context(self.as_raw()) })
    }

    /// Looks up a single key by fingerprint or key id.
    ///
    /// Fails with [`Error::NOT_FOUND`] if no key matches.
    ///
    /// Upstream documentation:
    /// [`gpgme_get_key`](https://www.gnupg.org/documentation/manuals/gpgme/Listing-Keys.html#index-gpgme_005fget_005fkey)
    pub fn get_key(&mut self, fpr: impl CStrArgument, secret: bool) -> Result<Key> {
        let fpr = utils::to_cstr(fpr)?;
        let mut key = ptr::null_mut();
        let err = unsafe {
            ffi::gpgme_get_key(self.as_raw(), fpr.as_ref().as_ptr(), &mut key, secret.into())
        };
        let key = (!key.is_null()).then(|| unsafe { Key::from_raw(key) });
        self.resume_hook_panics();
        match (error::check(err), key) {
            (Some(err), _) if err.code() == Error::EOF.code() => Err(Error::NOT_FOUND),
            (Some(err), _) => Err(err),
            (None, Some(key)) => Ok(key),
            (None, None) => Err(Error::NOT_FOUND),
        }
    }

    /// Lists the keys matching any of `patterns`, or every key if there are
    /// no patterns.
    ///
    /// ```no_run
    /// use gpgme_bridge::{Context, Protocol};
    ///
    /// let mut ctx = Context::from_protocol(Protocol::OpenPgp)?;
    /// for key in ctx.keylist(["alice@example.org", "bob@example.org"], false)? {
    ///     println!("{:?}", key?.id());
    /// }
    /// # Ok::<(), gpgme_bridge::Error>(())
    /// ```
    ///
    /// Upstream documentation:
    /// [`gpgme_op_keylist_ext_start`](https://www.gnupg.org/documentation/manuals/gpgme/Listing-Keys.html#index-gpgme_005fop_005fkeylist_005fext_005fstart)
    pub fn keylist<I>(&mut self, patterns: I, secret_only: bool) -> Result<Keys<'_>>
    where
        I: IntoIterator,
        I::Item: CStrArgument, {
        Keys::start(self, patterns, secret_only)
    }

    /// Encrypts `plaintext` for `recipients`.
    ///
    /// An empty recipient list performs symmetric encryption with a passphrase.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_encrypt`](https://www.gnupg.org/documentation/manuals/gpgme/Encrypting-a-Plaintext.html#index-gpgme_005fop_005fencrypt)
    pub fn encrypt<'k, 'p, 'c>(
        &mut self, recipients: impl IntoIterator<Item = &'k Key>, flags: EncryptFlags,
        plaintext: impl IntoData<'p>, ciphertext: impl IntoData<'c>,
    ) -> Result<EncryptResult, OpError<EncryptResult>> {
        let mut plaintext = plaintext.into_data()?;
        let mut ciphertext = ciphertext.into_data()?;
        let mut recipients = key_array(recipients);
        let err = unsafe {
            ffi::gpgme_op_encrypt(
                self.as_raw(),
                recipients
                    .as_mut()
                    .map_or(ptr::null_mut(), |keys| keys.as_mut_ptr()),
                flags.bits(),
                plaintext.borrow_mut().as_raw(),
                ciphertext.borrow_mut().as_raw(),
            )
        };
        self.complete(err)
    }

    /// Signs with the current signers, then encrypts for `recipients`.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_encrypt_sign`](https://www.gnupg.org/documentation/manuals/gpgme/Encrypting-a-Plaintext.html#index-gpgme_005fop_005fencrypt_005fsign)
    pub fn encrypt_sign<'k, 'p, 'c>(
        &mut self, recipients: impl IntoIterator<Item = &'k Key>, flags: EncryptFlags,
        plaintext: impl IntoData<'p>, ciphertext: impl IntoData<'c>,
    ) -> Result<EncryptSignResult, OpError<EncryptSignResult>> {
        let mut plaintext = plaintext.into_data()?;
        let mut ciphertext = ciphertext.into_data()?;
        let mut recipients = key_array(recipients);
        let err = unsafe {
            ffi::gpgme_op_encrypt_sign(
                self.as_raw(),
                recipients
                    .as_mut()
                    .map_or(ptr::null_mut(), |keys| keys.as_mut_ptr()),
                flags.bits(),
                plaintext.borrow_mut().as_raw(),
                ciphertext.borrow_mut().as_raw(),
            )
        };
        self.complete(err)
    }

    /// Upstream documentation:
    /// [`gpgme_op_decrypt`](https://www.gnupg.org/documentation/manuals/gpgme/Decrypt.html#index-gpgme_005fop_005fdecrypt)
    pub fn decrypt<'c, 'p>(
        &mut self, ciphertext: impl IntoData<'c>, plaintext: impl IntoData<'p>,
    ) -> Result<DecryptResult, OpError<DecryptResult>> {
        let mut ciphertext = ciphertext.into_data()?;
        let mut plaintext = plaintext.into_data()?;
        let err = unsafe {
            ffi::gpgme_op_decrypt(
                self.as_raw(),
                ciphertext.borrow_mut().as_raw(),
                plaintext.borrow_mut().as_raw(),
            )
        };
        self.complete(err)
    }

    /// Decrypts `ciphertext` and verifies any signature it contains.
    ///
    /// The signatures found are reported even if the decryption step fails.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_decrypt_verify`](https://www.gnupg.org/documentation/manuals/gpgme/Decrypt-and-Verify.html#index-gpgme_005fop_005fdecrypt_005fverify)
    pub fn decrypt_verify<'c, 'p>(
        &mut self, ciphertext: impl IntoData<'c>, plaintext: impl IntoData<'p>,
    ) -> Result<DecryptVerifyResult, OpError<DecryptVerifyResult>> {
        let mut ciphertext = ciphertext.into_data()?;
        let mut plaintext = plaintext.into_data()?;
        let err = unsafe {
            ffi::gpgme_op_decrypt_verify(
                self.as_raw(),
                ciphertext.borrow_mut().as_raw(),
                plaintext.borrow_mut().as_raw(),
            )
        };
        self.complete(err)
    }

    /// Signs `plaintext` with the current signers.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_sign`](https://www.gnupg.org/documentation/manuals/gpgme/Creating-a-Signature.html#index-gpgme_005fop_005fsign)
    pub fn sign<'p, 's>(
        &mut self, plaintext: impl IntoData<'p>, signature: impl IntoData<'s>, mode: SignMode,
    ) -> Result<SignResult, OpError<SignResult>> {
        let mut plaintext = plaintext.into_data()?;
        let mut signature = signature.into_data()?;
        let err = unsafe {
            ffi::gpgme_op_sign(
                self.as_raw(),
                plaintext.borrow_mut().as_raw(),
                signature.borrow_mut().as_raw(),
                mode.raw(),
            )
        };
        self.complete(err)
    }

    #[inline]
    pub fn sign_normal<'p, 's>(
        &mut self, plaintext: impl IntoData<'p>, signed: impl IntoData<'s>,
    ) -> Result<SignResult, OpError<SignResult>> {
        self.sign(plaintext, signed, SignMode::Normal)
    }

    #[inline]
    pub fn sign_detached<'p, 's>(
        &mut self, plaintext: impl IntoData<'p>, signature: impl IntoData<'s>,
    ) -> Result<SignResult, OpError<SignResult>> {
        self.sign(plaintext, signature, SignMode::Detached)
    }

    #[inline]
    pub fn sign_clear<'p, 's>(
        &mut self, plaintext: impl IntoData<'p>, signed: impl IntoData<'s>,
    ) -> Result<SignResult, OpError<SignResult>> {
        self.sign(plaintext, signed, SignMode::Clear)
    }

    /// Verifies `signature`.
    ///
    /// For a detached signature pass the signed data as `signed_text`. For a
    /// normal or cleartext signature pass a sink for the recovered text as
    /// `plaintext`, or `None` to discard it.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_verify`](https://www.gnupg.org/documentation/manuals/gpgme/Verify.html#index-gpgme_005fop_005fverify)
    pub fn verify<'s, 't, 'p>(
        &mut self, signature: impl IntoData<'s>, signed_text: Option<impl IntoData<'t>>,
        plaintext: Option<impl IntoData<'p>>,
    ) -> Result<VerifyResult, OpError<VerifyResult>> {
        let mut signature = signature.into_data()?;
        let mut signed_text = signed_text.map(IntoData::into_data).transpose()?;
        let mut plaintext = plaintext.map(IntoData::into_data).transpose()?;
        let err = unsafe {
            ffi::gpgme_op_verify(
                self.as_raw(),
                signature.borrow_mut().as_raw(),
                opt_data(&mut signed_text),
                opt_data(&mut plaintext),
            )
        };
        self.complete(err)
    }

    #[inline]
    pub fn verify_detached<'s, 't>(
        &mut self, signature: impl IntoData<'s>, signed_text: impl IntoData<'t>,
    ) -> Result<VerifyResult, OpError<VerifyResult>> {
        self.verify(signature, Some(signed_text), None::<Data<'_>>)
    }

    #[inline]
    pub fn verify_opaque<'s, 'p>(
        &mut self, signature: impl IntoData<'s>, plaintext: impl IntoData<'p>,
    ) -> Result<VerifyResult, OpError<VerifyResult>> {
        self.verify(signature, None::<Data<'_>>, Some(plaintext))
    }

    /// Upstream documentation:
    /// [`gpgme_op_import`](https://www.gnupg.org/documentation/manuals/gpgme/Importing-Keys.html#index-gpgme_005fop_005fimport)
    pub fn import<'d>(
        &mut self, key_data: impl IntoData<'d>,
    ) -> Result<ImportResult, OpError<ImportResult>> {
        let mut key_data = key_data.into_data()?;
        let err = unsafe { ffi::gpgme_op_import(self.as_raw(), key_data.borrow_mut().as_raw()) };
        self.complete(err)
    }

    /// Writes the keys matching `patterns` to `key_data`. No patterns exports
    /// every key.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_export_ext`](https://www.gnupg.org/documentation/manuals/gpgme/Exporting-Keys.html#index-gpgme_005fop_005fexport_005fext)
    pub fn export<'d, I>(
        &mut self, patterns: I, mode: ExportMode, key_data: impl IntoData<'d>,
    ) -> Result<()>
    where
        I: IntoIterator,
        I::Item: CStrArgument, {
        let patterns = utils::collect_cstrs(patterns)?;
        let mut patterns = utils::null_terminated(&patterns);
        let mut key_data = key_data.into_data()?;
        let err = unsafe {
            ffi::gpgme_op_export_ext(
                self.as_raw(),
                patterns
                    .as_mut()
                    .map_or(ptr::null_mut(), |p| p.as_mut_ptr()),
                mode.bits(),
                key_data.borrow_mut().as_raw(),
            )
        };
        self.resume_hook_panics();
        return_err!(err);
        Ok(())
    }

    /// Generates a key pair from an engine specific parameter block.
    ///
    /// The OpenPGP engine stores the new keys in its keyring and ignores the
    /// sinks; other engines write the generated material to them. `params` may
    /// be omitted for engines that take their parameters from elsewhere; the
    /// OpenPGP engine rejects that.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_genkey`](https://www.gnupg.org/documentation/manuals/gpgme/Generating-Keys.html#index-gpgme_005fop_005fgenkey)
    pub fn genkey(
        &mut self, params: Option<impl CStrArgument>, public: Option<&mut Data<'_>>,
        secret: Option<&mut Data<'_>>,
    ) -> Result<GenkeyResult, OpError<GenkeyResult>> {
        let params = utils::to_opt_cstr(params)?;
        let err = unsafe {
            ffi::gpgme_op_genkey(
                self.as_raw(),
                utils::opt_ptr(params.as_ref()),
                public.map_or(ptr::null_mut(), |d| d.as_raw()),
                secret.map_or(ptr::null_mut(), |d| d.as_raw()),
            )
        };
        self.complete(err)
    }

    /// Removes `key` from the keyring. Keys with secret material are only
    /// removed if `allow_secret` is set.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_delete`](https://www.gnupg.org/documentation/manuals/gpgme/Deleting-Keys.html#index-gpgme_005fop_005fdelete)
    pub fn delete(&mut self, key: &Key, allow_secret: bool) -> Result<()> {
        let err =
            unsafe { ffi::gpgme_op_delete(self.as_raw(), key.as_raw(), allow_secret.into()) };
        self.resume_hook_panics();
        return_err!(err);
        Ok(())
    }

    /// Runs an interactive key edit session, driven by `interactor`.
    ///
    /// Everything the engine prints during the session goes to `out`.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_edit`](https://www.gnupg.org/documentation/manuals/gpgme/Deprecated-Functions.html#index-gpgme_005fop_005fedit)
    pub fn edit<'d, E: EditInteractor>(
        &mut self, key: &Key, interactor: E, out: impl IntoData<'d>,
    ) -> Result<()> {
        let mut out = out.into_data()?;
        let mut hook = Hook::from(interactor);
        let err = unsafe {
            ffi::gpgme_op_edit(
                self.as_raw(),
                key.as_raw(),
                Some(callbacks::edit_cb::<E>),
                ptr::addr_of_mut!(hook).cast(),
                out.borrow_mut().as_raw(),
            )
        };
        drop(hook);
        self.resume_hook_panics();
        return_err!(err);
        Ok(())
    }

    /// Like [`edit`](Context::edit), but edits the smartcard holding `key`.
    ///
    /// Upstream documentation:
    /// [`gpgme_op_card_edit`](https://www.gnupg.org/documentation/manuals/gpgme/Deprecated-Functions.html#index-gpgme_005fop_005fcard_005fedit)
    pub fn card_edit<'d, E: EditInteractor>(
        &mut self, key: &Key, interactor: E, out: impl IntoData<'d>,
    ) -> Result<()> {
        let mut out = out.into_data()?;
        let mut hook = Hook::from(interactor);
        let err = unsafe {
            ffi::gpgme_op_card_edit(
                self.as_raw(),
                key.as_raw(),
                Some(callbacks::edit_cb::<E>),
                ptr::addr_of_mut!(hook).cast(),
                out.borrow_mut().as_raw(),
            )
        };
        drop(hook);
        self.resume_hook_panics();
        return_err!(err);
        Ok(())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("raw", &self.as_raw())
            .field("protocol", &self.protocol())
            .field("armor", &self.armor())
            .field("text_mode", &self.text_mode())
            .field("key_list_mode", &self.key_list_mode())
            .field("pinentry_mode", &self.pinentry_mode())
            .field("has_passphrase_provider", &self.has_passphrase_provider())
            .field("has_progress_reporter", &self.has_progress_reporter())
            .finish()
    }
}

/// Builds the null-terminated recipient array, or nothing for an empty list.
fn key_array<'k>(keys: impl IntoIterator<Item = &'k Key>) -> Option<SmallVec<ffi::gpgme_key_t>> {
    let mut keys: SmallVec<_> = keys.into_iter().map(Key::as_raw).collect();
    if keys.is_empty() {
        return None;
    }
    keys.push(ptr::null_mut());
    Some(keys)
}

fn opt_data<'a, D: BorrowMut<Data<'a>>>(data: &mut Option<D>) -> ffi::gpgme_data_t {
    data.as_mut()
        .map_or(ptr::null_mut(), |d| d.borrow_mut().as_raw())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum KeysState {
    Active,
    Exhausted,
    Closed,
}

/// An iterator over the keys of a listing started by [`Context::keylist`].
///
/// The listing is ended when the iterator is closed or dropped.
pub struct Keys<'ctx> {
    ctx: &'ctx mut Context,
    state: KeysState,
}

impl<'ctx> Keys<'ctx> {
    fn start<I>(ctx: &'ctx mut Context, patterns: I, secret_only: bool) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: CStrArgument, {
        let patterns = utils::collect_cstrs(patterns)?;
        let mut patterns = utils::null_terminated(&patterns);
        let err = unsafe {
            ffi::gpgme_op_keylist_ext_start(
                ctx.as_raw(),
                patterns
                    .as_mut()
                    .map_or(ptr::null_mut(), |p| p.as_mut_ptr()),
                secret_only.into(),
                0,
            )
        };
        ctx.resume_hook_panics();
        return_err!(err);
        Ok(Keys {
            ctx,
            state: KeysState::Active,
        })
    }

    /// Applies the outcome of one engine step. Any error ends the listing;
    /// end of data is not reported as one.
    fn advance(&mut self, err: ffi::gpgme_error_t, key: Option<Key>) -> Option<Result<Key>> {
        match (error::check(err), key) {
            (Some(err), _) => {
                self.state = KeysState::Exhausted;
                if err.code() == Error::EOF.code() {
                    None
                } else {
                    Some(Err(err))
                }
            }
            (None, Some(key)) => Some(Ok(key)),
            (None, None) => {
                self.state = KeysState::Exhausted;
                None
            }
        }
    }

    /// Ends the listing on the engine side.
    ///
    /// Only the first call reaches the engine; later calls succeed without
    /// doing anything.
    pub fn close(&mut self) -> Result<()> {
        if self.state == KeysState::Closed {
            return Ok(());
        }
        self.state = KeysState::Closed;
        log::trace!("ending key listing on context {:p}", self.ctx.as_raw());
        unsafe {
            return_err!(ffi::gpgme_op_keylist_end(self.ctx.as_raw()));
        }
        Ok(())
    }
}

impl Drop for Keys<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("failed to end key listing: {}", err);
        }
    }
}

impl Iterator for Keys<'_> {
    type Item = Result<Key>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != KeysState::Active {
            return None;
        }
        let mut key = ptr::null_mut();
        let err = unsafe { ffi::gpgme_op_keylist_next(self.ctx.as_raw(), &mut key) };
        let key = (!key.is_null()).then(|| unsafe { Key::from_raw(key) });
        self.ctx.resume_hook_panics();
        self.advance(err, key)
    }
}

impl std::iter::FusedIterator for Keys<'_> {}

impl fmt::Debug for Keys<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keys")
            .field("ctx", &self.ctx.as_raw())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::AssertUnwindSafe;

    use super::*;
    use crate::ProgressInfo;

    const UNKNOWN_FPR: &str = "0000000000000000000000000000000000000000";

    // Runs the progress trampoline the way the engine would, leaving the
    // reporter's panic pending on the session.
    fn report_through<R: ProgressReporter + 'static>(ctx: &mut Context, reporter: R) {
        ctx.set_progress_reporter(reporter);
        let hook = ctx
            .progress_hook
            .as_ref()
            .map_or(ptr::null_mut(), HookSlot::as_ptr);
        callbacks::progress_cb::<R>(hook, ptr::null(), 0, 0, 0);
    }

    #[test]
    fn key_lookup_resumes_pending_panic() {
        let mut ctx = Context::new().unwrap();
        report_through(&mut ctx, |_: ProgressInfo<'_>| panic!("reporter failed"));

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = ctx.get_key(UNKNOWN_FPR, false);
        }));
        let payload = caught.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"reporter failed"));
        assert!(!ctx.has_progress_reporter());

        assert!(ctx.get_key(UNKNOWN_FPR, false).is_err());
    }

    #[test]
    fn keylist_error_is_yielded_once() {
        let mut ctx = Context::new().unwrap();
        let mut keys = Keys {
            ctx: &mut ctx,
            state: KeysState::Active,
        };
        let err = keys.advance(Error::GENERAL.raw(), None).unwrap().unwrap_err();
        assert_eq!(err.code(), Error::GENERAL.code());
        assert_eq!(keys.state, KeysState::Exhausted);
        assert!(keys.next().is_none());
        assert!(keys.next().is_none());
    }

    #[test]
    fn keylist_end_is_not_an_error() {
        let mut ctx = Context::new().unwrap();
        let mut keys = Keys {
            ctx: &mut ctx,
            state: KeysState::Active,
        };
        assert!(keys.advance(Error::EOF.raw(), None).is_none());
        assert_eq!(keys.state, KeysState::Exhausted);
        assert!(keys.next().is_none());
    }
}
