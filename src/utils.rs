use std::{
    ffi::CStr,
    io::{self, prelude::*},
    ptr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

pub(crate) use cstr_argument::CStrArgument;

use crate::{Error, Result};

pub(crate) type SmallVec<T> = smallvec::SmallVec<[T; 4]>;

macro_rules! impl_wrapper {
    (@borrowed $T:ty$(, $Args:expr)*) => {
        #[inline]
        pub unsafe fn from_raw(raw: $T) -> Self {
            debug_assert!(!raw.is_null());
            Self(NonNull::<$T>::new_unchecked(raw)$(, $Args)*)
        }

        #[inline]
        pub fn as_raw(&self) -> $T {
            self.0.as_ptr()
        }
    };
    ($T:ty$(, $Args:expr)*) => {
        impl_wrapper!(@borrowed $T$(, $Args)*);

        #[inline]
        pub fn into_raw(self) -> $T {
            let raw = self.as_raw();
            ::std::mem::forget(self);
            raw
        }
    };
}

macro_rules! ffi_enum_wrapper {
    ($(#[$Attr:meta])* $Vis:vis enum $Name:ident: $T:ty {
        $($(#[$ItemAttr:meta])* $Item:ident = $Value:expr),+ $(,)?
    }) => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash)]
        $(#[$Attr])*
        $Vis enum $Name {
            $($(#[$ItemAttr])* $Item,)+
            Other($T),
        }

        impl $Name {
            #[inline]
            pub unsafe fn from_raw(raw: $T) -> $Name {
                $(if raw == ($Value as $T) {
                    $Name::$Item
                } else )+ {
                    $Name::Other(raw)
                }
            }

            #[inline]
            pub fn raw(&self) -> $T {
                match *self {
                    $($Name::$Item => $Value as $T,)+
                    $Name::Other(other) => other,
                }
            }
        }

        impl ::std::fmt::Debug for $Name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match *self {
                    $($Name::$Item => {
                        write!(f, concat!(stringify!($Name), "::",
                                          stringify!($Item), "({:?})"), self.raw())
                    })+
                    _ => write!(f, concat!(stringify!($Name), "({:?})"), self.raw()),
                }
            }
        }
    };
}

macro_rules! return_err {
    ($e:expr) => {
        if let Some(err) = $crate::error::check($e) {
            return Err(err.into());
        }
    };
}

/// A non-null raw pointer owned by one of the wrapper types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NonNull<T>(T);

impl<T> NonNull<*mut T> {
    #[inline]
    pub fn new(raw: *mut T) -> Option<Self> {
        if raw.is_null() {
            None
        } else {
            Some(NonNull(raw))
        }
    }

    #[inline]
    pub unsafe fn new_unchecked(raw: *mut T) -> Self {
        NonNull(raw)
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.0
    }
}

/// Writes directly to a descriptor handed out by the engine during a callback.
#[derive(Debug, Clone)]
pub(crate) struct FdWriter(libc::c_int);

impl FdWriter {
    pub fn new(fd: libc::c_int) -> FdWriter {
        FdWriter(fd)
    }
}

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = unsafe { ffi::gpgme_io_write(self.0, buf.as_ptr().cast(), buf.len()) };
        if result >= 0 {
            Ok(result as usize)
        } else {
            Err(io::Error::last_os_error())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Converts a string-like argument into a C string, rejecting interior NULs.
pub(crate) fn to_cstr<S: CStrArgument>(arg: S) -> Result<S::Output> {
    arg.try_into_cstr().map_err(|_| Error::INV_VALUE)
}

/// Converts an optional string-like argument, where `None` becomes a null pointer.
pub(crate) fn to_opt_cstr<S: CStrArgument>(arg: Option<S>) -> Result<Option<S::Output>> {
    arg.map(to_cstr).transpose()
}

#[inline]
pub(crate) fn opt_ptr<S: AsRef<CStr>>(arg: Option<&S>) -> *const libc::c_char {
    arg.map_or(ptr::null(), |s| s.as_ref().as_ptr())
}

/// Converts a sequence of strings into owned C strings kept alive for a call.
pub(crate) fn collect_cstrs<I>(items: I) -> Result<SmallVec<<I::Item as CStrArgument>::Output>>
where
    I: IntoIterator,
    I::Item: CStrArgument, {
    items.into_iter().map(to_cstr).collect()
}

/// Builds a null-terminated pointer array over `strings`.
///
/// An empty input yields no array at all so callers can pass a null pointer,
/// which the engine treats as "no restriction".
pub(crate) fn null_terminated<S: AsRef<CStr>>(
    strings: &[S],
) -> Option<SmallVec<*const libc::c_char>> {
    if strings.is_empty() {
        return None;
    }
    let mut ptrs: SmallVec<_> = strings.iter().map(|s| s.as_ref().as_ptr()).collect();
    ptrs.push(ptr::null());
    Some(ptrs)
}

/// Copies a C string owned by the engine into a Rust string.
///
/// Text that is not valid UTF-8 fails with `INV_VALUE` instead of being
/// rewritten.
pub(crate) unsafe fn copy_str(raw: *const libc::c_char) -> Result<Option<String>> {
    raw.as_ref()
        .map(|s| {
            CStr::from_ptr(s)
                .to_str()
                .map(str::to_owned)
                .map_err(|_| Error::INV_VALUE)
        })
        .transpose()
}

#[inline]
pub(crate) unsafe fn borrow_cstr<'a>(raw: *const libc::c_char) -> Option<&'a CStr> {
    raw.as_ref().map(|s| CStr::from_ptr(s))
}

/// Converts an engine timestamp, where zero or a negative value means "not set".
pub(crate) fn to_system_time<T: TryInto<u64>>(secs: T) -> Option<SystemTime> {
    TryInto::<u64>::try_into(secs)
        .ok()
        .filter(|&secs| secs > 0)
        .map(|secs| UNIX_EPOCH + Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;

    use super::*;

    #[test]
    fn empty_pattern_list_is_null() {
        let empty: [CString; 0] = [];
        assert!(null_terminated(&empty).is_none());
    }

    #[test]
    fn pattern_list_is_terminated() {
        let patterns = collect_cstrs(["alice", "bob"]).unwrap();
        let ptrs = null_terminated(&patterns).unwrap();
        assert_eq!(ptrs.len(), 3);
        assert!(ptrs[2].is_null());
        assert_eq!(unsafe { CStr::from_ptr(ptrs[1]) }.to_str(), Ok("bob"));
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = to_cstr("a\0b").unwrap_err();
        assert_eq!(err.code(), Error::INV_VALUE.code());
    }

    #[test]
    fn copied_strings_stay_exact() {
        let valid = CString::new("D8A4 1B0C").unwrap();
        let invalid = CString::new(&b"fpr\xff"[..]).unwrap();
        unsafe {
            assert_eq!(copy_str(ptr::null()), Ok(None));
            assert_eq!(copy_str(valid.as_ptr()), Ok(Some("D8A4 1B0C".to_owned())));
            assert_eq!(
                copy_str(invalid.as_ptr()).unwrap_err().code(),
                Error::INV_VALUE.code()
            );
        }
    }

    #[test]
    fn unset_timestamps() {
        assert_eq!(to_system_time(0i64), None);
        assert_eq!(to_system_time(-1i64), None);
        assert_eq!(
            to_system_time(86_400u64),
            Some(UNIX_EPOCH + Duration::from_secs(86_400))
        );
    }
}
