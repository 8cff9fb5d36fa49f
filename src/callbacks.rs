use std::{
    any::Any,
    ffi::CStr,
    io::prelude::*,
    panic::{self, UnwindSafe},
    str::Utf8Error,
    thread,
};

use static_assertions::assert_obj_safe;

use crate::{edit::StatusCode, error, utils::FdWriter, CallbackResult};

assert_obj_safe!(PassphraseProvider);
assert_obj_safe!(ProgressReporter);
assert_obj_safe!(EditInteractor);

#[derive(Debug, Copy, Clone)]
pub struct PassphraseRequest<'a> {
    uid_hint: Option<&'a CStr>,
    desc: Option<&'a CStr>,
    pub prev_attempt_failed: bool,
}

impl<'a> PassphraseRequest<'a> {
    pub fn user_id_hint(&self) -> Result<&'a str, Option<Utf8Error>> {
        self.uid_hint
            .map_or(Err(None), |s| s.to_str().map_err(Some))
    }

    pub fn user_id_hint_raw(&self) -> Option<&'a CStr> {
        self.uid_hint
    }

    pub fn description(&self) -> Result<&'a str, Option<Utf8Error>> {
        self.desc.map_or(Err(None), |s| s.to_str().map_err(Some))
    }

    pub fn description_raw(&self) -> Option<&'a CStr> {
        self.desc
    }
}

/// Supplies passphrases on request of the engine.
///
/// The passphrase is written to `out` without a trailing newline. Returning an
/// error aborts the running operation with that error, for example
/// `Err(Error::CANCELED.into())`.
///
/// Upstream documentation:
/// [`gpgme_passphrase_cb_t`](https://www.gnupg.org/documentation/manuals/gpgme/Passphrase-Callback.html#index-gpgme_005fpassphrase_005fcb_005ft)
pub trait PassphraseProvider: UnwindSafe + Send {
    fn get_passphrase(
        &mut self, request: PassphraseRequest<'_>, out: &mut dyn Write,
    ) -> CallbackResult;
}

impl<T: UnwindSafe + Send> PassphraseProvider for T
where T: FnMut(PassphraseRequest<'_>, &mut dyn Write) -> CallbackResult
{
    fn get_passphrase(
        &mut self, request: PassphraseRequest<'_>, out: &mut dyn Write,
    ) -> CallbackResult {
        (*self)(request, out)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct ProgressInfo<'a> {
    what: Option<&'a CStr>,
    pub typ: i64,
    pub current: i64,
    pub total: i64,
}

impl<'a> ProgressInfo<'a> {
    pub fn what(&self) -> Result<&'a str, Option<Utf8Error>> {
        self.what.map_or(Err(None), |s| s.to_str().map_err(Some))
    }

    pub fn what_raw(&self) -> Option<&'a CStr> {
        self.what
    }
}

/// Upstream documentation:
/// [`gpgme_progress_cb_t`](https://www.gnupg.org/documentation/manuals/gpgme/Progress-Meter-Callback.html#index-gpgme_005fprogress_005fcb_005ft)
pub trait ProgressReporter: UnwindSafe + Send {
    fn report(&mut self, info: ProgressInfo<'_>);
}

impl<T: UnwindSafe + Send> ProgressReporter for T
where T: FnMut(ProgressInfo<'_>)
{
    fn report(&mut self, info: ProgressInfo<'_>) {
        (*self)(info);
    }
}

#[derive(Debug, Copy, Clone)]
pub struct EditInteractionStatus<'a> {
    pub code: StatusCode,
    args: Option<&'a CStr>,
}

impl<'a> EditInteractionStatus<'a> {
    pub fn args(&self) -> Result<&'a str, Option<Utf8Error>> {
        self.args.map_or(Err(None), |s| s.to_str().map_err(Some))
    }

    pub fn args_raw(&self) -> Option<&'a CStr> {
        self.args
    }
}

/// Drives an interactive key edit.
///
/// `out` is present only when the engine expects a reply to the status; the
/// reply must be terminated by a newline.
///
/// Upstream documentation:
/// [`gpgme_edit_cb_t`](https://www.gnupg.org/documentation/manuals/gpgme/Deprecated-Functions.html#index-gpgme_005fedit_005fcb_005ft)
pub trait EditInteractor: UnwindSafe + Send {
    fn interact(
        &mut self, status: EditInteractionStatus<'_>, out: Option<&mut dyn Write>,
    ) -> CallbackResult;
}

impl<T: UnwindSafe + Send> EditInteractor for T
where T: FnMut(EditInteractionStatus<'_>, Option<&mut dyn Write>) -> CallbackResult
{
    fn interact(
        &mut self, status: EditInteractionStatus<'_>, out: Option<&mut dyn Write>,
    ) -> CallbackResult {
        (*self)(status, out)
    }
}

pub(crate) struct Hook<T>(Option<thread::Result<T>>);

impl<T> Hook<T> {
    /// Removes a panic caught while running the hook, leaving the hook empty.
    fn take_panic(&mut self) -> Option<Box<dyn Any + Send + 'static>> {
        match self.0.take() {
            Some(Err(payload)) => Some(payload),
            other => {
                self.0 = other;
                None
            }
        }
    }
}

impl<T> From<T> for Hook<T> {
    fn from(hook: T) -> Self {
        Self(Some(Ok(hook)))
    }
}

impl<T> Drop for Hook<T> {
    fn drop(&mut self) {
        if let Some(Err(err)) = self.0.take() {
            panic::resume_unwind(err);
        }
    }
}

/// A hook registered with a session for longer than a single operation.
///
/// The engine only holds a raw pointer to the hook, so the slot owns the
/// allocation and is dropped after the registration has been removed.
pub(crate) struct HookSlot {
    raw: *mut libc::c_void,
    take_panic: unsafe fn(*mut libc::c_void) -> Option<Box<dyn Any + Send + 'static>>,
    release: unsafe fn(*mut libc::c_void),
}

unsafe impl Send for HookSlot {}

impl HookSlot {
    pub fn new<T: Send + 'static>(hook: T) -> Self {
        unsafe fn take_panic<T>(raw: *mut libc::c_void) -> Option<Box<dyn Any + Send + 'static>> {
            (*raw.cast::<Hook<T>>()).take_panic()
        }

        unsafe fn release<T>(raw: *mut libc::c_void) {
            let mut hook = Box::from_raw(raw.cast::<Hook<T>>());
            if hook.take_panic().is_some() {
                log::warn!("discarding panic from callback of released session");
            }
        }

        HookSlot {
            raw: Box::into_raw(Box::new(Hook::from(hook))).cast(),
            take_panic: take_panic::<T>,
            release: release::<T>,
        }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut libc::c_void {
        self.raw
    }

    #[inline]
    pub fn take_panic(&mut self) -> Option<Box<dyn Any + Send + 'static>> {
        unsafe { (self.take_panic)(self.raw) }
    }
}

impl Drop for HookSlot {
    fn drop(&mut self) {
        unsafe { (self.release)(self.raw) }
    }
}

fn update_hook<T, F>(hook: &mut Option<thread::Result<T>>, f: F) -> ffi::gpgme_error_t
where
    T: UnwindSafe,
    F: UnwindSafe + FnOnce(&mut T) -> CallbackResult, {
    let mut provider = match hook.take() {
        Some(Ok(p)) => p,
        other => {
            *hook = other;
            return error::general().raw();
        }
    };

    match panic::catch_unwind(move || {
        let result = f(&mut provider);
        (provider, result)
    }) {
        Ok((provider, result)) => {
            *hook = Some(Ok(provider));
            result.err().map_or(0, |err| error::to_native(&*err).raw())
        }
        Err(err) => {
            *hook = Some(Err(err));
            error::general().raw()
        }
    }
}

pub(crate) extern "C" fn passphrase_cb<P: PassphraseProvider>(
    hook: *mut libc::c_void, uid_hint: *const libc::c_char, info: *const libc::c_char,
    was_bad: libc::c_int, fd: libc::c_int,
) -> ffi::gpgme_error_t {
    let hook = unsafe { &mut *(hook as *mut Hook<P>) };
    update_hook(&mut hook.0, move |h| unsafe {
        let info = PassphraseRequest {
            uid_hint: uid_hint.as_ref().map(|s| CStr::from_ptr(s)),
            desc: info.as_ref().map(|s| CStr::from_ptr(s)),
            prev_attempt_failed: was_bad != 0,
        };
        let mut writer = FdWriter::new(fd);
        h.get_passphrase(info, &mut writer)?;
        writer.write_all(b"\n")?;
        Ok(())
    })
}

pub(crate) extern "C" fn progress_cb<H: ProgressReporter>(
    hook: *mut libc::c_void, what: *const libc::c_char, typ: libc::c_int, current: libc::c_int,
    total: libc::c_int,
) {
    let hook = unsafe { &mut *(hook as *mut Hook<H>) };
    update_hook(&mut hook.0, move |h| unsafe {
        let info = ProgressInfo {
            what: what.as_ref().map(|s| CStr::from_ptr(s)),
            typ: typ.into(),
            current: current.into(),
            total: total.into(),
        };
        h.report(info);
        Ok(())
    });
}

pub(crate) extern "C" fn edit_cb<E: EditInteractor>(
    hook: *mut libc::c_void, status: ffi::gpgme_status_code_t, args: *const libc::c_char,
    fd: libc::c_int,
) -> ffi::gpgme_error_t {
    let hook = unsafe { &mut *(hook as *mut Hook<E>) };
    update_hook(&mut hook.0, move |h| unsafe {
        let status = EditInteractionStatus {
            code: StatusCode::from_raw(status),
            args: args.as_ref().map(|s| CStr::from_ptr(s)),
        };
        if fd < 0 {
            h.interact(status, None)
        } else {
            h.interact(status, Some(&mut FdWriter::new(fd)))
        }
    })
}
