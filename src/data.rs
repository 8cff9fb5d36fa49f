use std::{
    borrow::BorrowMut,
    error::Error as StdError,
    fmt,
    io::{self, prelude::*, SeekFrom},
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    ptr, slice, thread,
};

use crate::{error, Error, NonNull, Result};

/// A stream construction failure that hands the stream back to the caller.
#[derive(Clone)]
pub struct WrappedError<S>(Error, S);

impl<S> WrappedError<S> {
    #[inline]
    pub fn error(&self) -> Error {
        self.0
    }

    #[inline]
    pub fn into_inner(self) -> S {
        self.1
    }
}

impl<S> fmt::Debug for WrappedError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<S> fmt::Display for WrappedError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S> StdError for WrappedError<S> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

impl<S> From<WrappedError<S>> for Error {
    #[inline]
    fn from(err: WrappedError<S>) -> Self {
        err.0
    }
}

struct CallbackWrapper<S> {
    cbs: ffi::gpgme_data_cbs,
    inner: S,
}

/// A buffer or stream the engine reads input from or writes output to.
///
/// The lifetime ties a data object to any borrowed buffer or stream it was
/// created from.
///
/// Upstream documentation:
/// [`gpgme_data_t`](https://www.gnupg.org/documentation/manuals/gpgme/Exchanging-Data.html#Exchanging-Data)
#[derive(Debug)]
pub struct Data<'data>(NonNull<ffi::gpgme_data_t>, PhantomData<&'data mut ()>);

unsafe impl Send for Data<'_> {}

impl Drop for Data<'_> {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            ffi::gpgme_data_release(self.as_raw());
        }
    }
}

impl<'data> Data<'data> {
    impl_wrapper!(ffi::gpgme_data_t, PhantomData);

    /// Constructs an empty data object backed by engine memory.
    ///
    /// Upstream documentation:
    /// [`gpgme_data_new`](https://www.gnupg.org/documentation/manuals/gpgme/Memory-Based-Data-Buffers.html#index-gpgme_005fdata_005fnew)
    #[inline]
    pub fn new() -> Result<Data<'static>> {
        let mut data = ptr::null_mut();
        unsafe {
            return_err!(ffi::gpgme_data_new(&mut data));
            Ok(Data::from_raw(data))
        }
    }

    /// Constructs a data object and fills it with a copy of `bytes`.
    ///
    /// Upstream documentation:
    /// [`gpgme_data_new_from_mem`](https://www.gnupg.org/documentation/manuals/gpgme/Memory-Based-Data-Buffers.html#index-gpgme_005fdata_005fnew_005ffrom_005fmem)
    #[inline]
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Data<'static>> {
        let bytes = bytes.as_ref();
        let mut data = ptr::null_mut();
        unsafe {
            return_err!(ffi::gpgme_data_new_from_mem(
                &mut data,
                bytes.as_ptr().cast(),
                bytes.len(),
                1,
            ));
            Ok(Data::from_raw(data))
        }
    }

    /// Constructs a data object which reads from `buf` without copying it.
    #[inline]
    pub fn from_buffer<B: AsRef<[u8]> + ?Sized>(buf: &'data B) -> Result<Self> {
        let buf = buf.as_ref();
        let mut data = ptr::null_mut();
        unsafe {
            return_err!(ffi::gpgme_data_new_from_mem(
                &mut data,
                buf.as_ptr().cast(),
                buf.len(),
                0,
            ));
            Ok(Data::from_raw(data))
        }
    }

    unsafe fn from_callbacks<S>(cbs: ffi::gpgme_data_cbs, src: S) -> Result<Self, WrappedError<S>>
    where S: Send + 'data {
        let src = Box::into_raw(Box::new(CallbackWrapper { cbs, inner: src }));
        let cbs = ptr::addr_of_mut!((*src).cbs);
        let mut data = ptr::null_mut();
        let result = ffi::gpgme_data_new_from_cbs(&mut data, cbs, src.cast());
        match error::check(result) {
            None => Ok(Data::from_raw(data)),
            Some(err) => Err(WrappedError(err, Box::from_raw(src).inner)),
        }
    }

    /// Upstream documentation:
    /// [`gpgme_data_new_from_cbs`](https://www.gnupg.org/documentation/manuals/gpgme/Callback-Based-Data-Buffers.html#index-gpgme_005fdata_005fnew_005ffrom_005fcbs)
    #[inline]
    pub fn from_reader<R>(r: R) -> Result<Self, WrappedError<R>>
    where R: Read + Send + 'data {
        let cbs = ffi::gpgme_data_cbs {
            read: Some(read_callback::<R>),
            write: None,
            seek: None,
            release: Some(release_callback::<R>),
        };
        unsafe { Data::from_callbacks(cbs, r) }
    }

    #[inline]
    pub fn from_seekable_reader<R>(r: R) -> Result<Self, WrappedError<R>>
    where R: Read + Seek + Send + 'data {
        let cbs = ffi::gpgme_data_cbs {
            read: Some(read_callback::<R>),
            write: None,
            seek: Some(seek_callback::<R>),
            release: Some(release_callback::<R>),
        };
        unsafe { Data::from_callbacks(cbs, r) }
    }

    #[inline]
    pub fn from_writer<W>(w: W) -> Result<Self, WrappedError<W>>
    where W: Write + Send + 'data {
        let cbs = ffi::gpgme_data_cbs {
            read: None,
            write: Some(write_callback::<W>),
            seek: None,
            release: Some(release_callback::<W>),
        };
        unsafe { Data::from_callbacks(cbs, w) }
    }

    #[inline]
    pub fn from_seekable_writer<W>(w: W) -> Result<Self, WrappedError<W>>
    where W: Write + Seek + Send + 'data {
        let cbs = ffi::gpgme_data_cbs {
            read: None,
            write: Some(write_callback::<W>),
            seek: Some(seek_callback::<W>),
            release: Some(release_callback::<W>),
        };
        unsafe { Data::from_callbacks(cbs, w) }
    }

    #[inline]
    pub fn from_stream<S>(s: S) -> Result<Self, WrappedError<S>>
    where S: Read + Write + Send + 'data {
        let cbs = ffi::gpgme_data_cbs {
            read: Some(read_callback::<S>),
            write: Some(write_callback::<S>),
            seek: None,
            release: Some(release_callback::<S>),
        };
        unsafe { Data::from_callbacks(cbs, s) }
    }

    #[inline]
    pub fn from_seekable_stream<S>(s: S) -> Result<Self, WrappedError<S>>
    where S: Read + Write + Seek + Send + 'data {
        let cbs = ffi::gpgme_data_cbs {
            read: Some(read_callback::<S>),
            write: Some(write_callback::<S>),
            seek: Some(seek_callback::<S>),
            release: Some(release_callback::<S>),
        };
        unsafe { Data::from_callbacks(cbs, s) }
    }

    /// Releases the data object and returns the contents of its memory
    /// buffer.
    ///
    /// Returns `None` for data objects that are not backed by engine memory.
    ///
    /// Upstream documentation:
    /// [`gpgme_data_release_and_get_mem`](https://www.gnupg.org/documentation/manuals/gpgme/Destroying-Data-Buffers.html#index-gpgme_005fdata_005frelease_005fand_005fget_005fmem)
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        unsafe {
            let mut len = 0;
            let buf = ffi::gpgme_data_release_and_get_mem(self.into_raw(), &mut len);
            if buf.is_null() {
                return None;
            }
            let bytes = slice::from_raw_parts(buf.cast::<u8>(), len).to_vec();
            ffi::gpgme_free(buf.cast());
            Some(bytes)
        }
    }
}

impl Read for Data<'_> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result =
            unsafe { ffi::gpgme_data_read(self.as_raw(), buf.as_mut_ptr().cast(), buf.len()) };
        if result >= 0 {
            Ok(result as usize)
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Write for Data<'_> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result =
            unsafe { ffi::gpgme_data_write(self.as_raw(), buf.as_ptr().cast(), buf.len()) };
        if result >= 0 {
            Ok(result as usize)
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for Data<'_> {
    #[inline]
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (off, whence) = match pos {
            SeekFrom::Start(off) => (to_offset(off)?, libc::SEEK_SET),
            SeekFrom::End(off) => (to_offset(off)?, libc::SEEK_END),
            SeekFrom::Current(off) => (to_offset(off)?, libc::SEEK_CUR),
        };
        let result = unsafe { ffi::gpgme_data_seek(self.as_raw(), off, whence) };
        if result >= 0 {
            Ok(result as u64)
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

fn to_offset<T: TryInto<ffi::gpgme_off_t>>(off: T) -> io::Result<ffi::gpgme_off_t> {
    off.try_into()
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}

/// Lets operations accept data objects, byte buffers and output vectors
/// alike.
///
/// A `&mut Vec<u8>` used as an output is cleared first, so it holds exactly
/// what the operation wrote.
pub trait IntoData<'a> {
    type Output: BorrowMut<Data<'a>>;

    fn into_data(self) -> Result<Self::Output>;
}

impl<'a> IntoData<'a> for &mut Data<'a> {
    type Output = Self;

    #[inline]
    fn into_data(self) -> Result<Self> {
        Ok(self)
    }
}

impl<'a> IntoData<'a> for Data<'a> {
    type Output = Self;

    #[inline]
    fn into_data(self) -> Result<Self> {
        Ok(self)
    }
}

impl<'a> IntoData<'a> for &'a [u8] {
    type Output = Data<'a>;

    #[inline]
    fn into_data(self) -> Result<Data<'a>> {
        Data::from_buffer(self)
    }
}

impl<'a, const N: usize> IntoData<'a> for &'a [u8; N] {
    type Output = Data<'a>;

    #[inline]
    fn into_data(self) -> Result<Data<'a>> {
        Data::from_buffer(&self[..])
    }
}

impl<'a> IntoData<'a> for &'a str {
    type Output = Data<'a>;

    #[inline]
    fn into_data(self) -> Result<Data<'a>> {
        Data::from_buffer(self)
    }
}

impl<'a> IntoData<'a> for &'a Vec<u8> {
    type Output = Data<'a>;

    #[inline]
    fn into_data(self) -> Result<Data<'a>> {
        Data::from_buffer(self)
    }
}

impl<'a> IntoData<'a> for &'a mut Vec<u8> {
    type Output = Data<'a>;

    #[inline]
    fn into_data(self) -> Result<Data<'a>> {
        self.clear();
        Data::from_seekable_writer(io::Cursor::new(self)).map_err(Error::from)
    }
}

fn errno_of(err: &io::Error) -> libc::c_int {
    err.raw_os_error().unwrap_or(libc::EINVAL)
}

/// Converts the outcome of a stream call into the engine's convention of
/// `-1` plus errno.
fn complete<T>(result: thread::Result<io::Result<T>>, failed: T) -> T {
    let errno = match result {
        Ok(Ok(value)) => return value,
        Ok(Err(err)) => errno_of(&err),
        Err(_) => {
            log::error!("panic inside data stream callback");
            libc::EIO
        }
    };
    unsafe {
        ffi::gpgme_err_set_errno(errno);
    }
    failed
}

extern "C" fn read_callback<S: Read>(
    handle: *mut libc::c_void, buffer: *mut libc::c_void, size: libc::size_t,
) -> libc::ssize_t {
    let handle = handle.cast::<CallbackWrapper<S>>();
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        let slice = slice::from_raw_parts_mut(buffer.cast::<u8>(), size);
        (*handle).inner.read(slice).map(|n| n as libc::ssize_t)
    }));
    complete(result, -1)
}

extern "C" fn write_callback<S: Write>(
    handle: *mut libc::c_void, buffer: *const libc::c_void, size: libc::size_t,
) -> libc::ssize_t {
    let handle = handle.cast::<CallbackWrapper<S>>();
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        let slice = slice::from_raw_parts(buffer.cast::<u8>(), size);
        (*handle).inner.write(slice).map(|n| n as libc::ssize_t)
    }));
    complete(result, -1)
}

extern "C" fn seek_callback<S: Seek>(
    handle: *mut libc::c_void, offset: ffi::gpgme_off_t, whence: libc::c_int,
) -> ffi::gpgme_off_t {
    let handle = handle.cast::<CallbackWrapper<S>>();
    let pos = match whence {
        libc::SEEK_SET => u64::try_from(offset).ok().map(SeekFrom::Start),
        libc::SEEK_END => i64::try_from(offset).ok().map(SeekFrom::End),
        libc::SEEK_CUR => i64::try_from(offset).ok().map(SeekFrom::Current),
        _ => None,
    };
    let Some(pos) = pos else {
        return complete(Ok(Err(io::ErrorKind::InvalidInput.into())), -1);
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        (*handle).inner.seek(pos).and_then(|n| {
            ffi::gpgme_off_t::try_from(n)
                .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))
        })
    }));
    complete(result, -1)
}

extern "C" fn release_callback<S>(handle: *mut libc::c_void) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        drop(Box::from_raw(handle.cast::<CallbackWrapper<S>>()));
    }));
    if result.is_err() {
        log::warn!("panic while dropping data stream");
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct Failing(libc::c_int);

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(self.0))
        }
    }

    struct Panicking;

    impl Read for Panicking {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            panic!("stream exploded");
        }
    }

    #[test]
    fn memory_round_trip() {
        let mut data = Data::new().unwrap();
        data.write_all(b"hello world").unwrap();
        data.seek(SeekFrom::Start(6)).unwrap();
        let mut tail = String::new();
        data.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "world");
        assert_eq!(data.into_bytes().as_deref(), Some(&b"hello world"[..]));
    }

    #[test]
    fn borrowed_buffer_is_readable() {
        let buf = b"borrowed bytes".to_vec();
        let mut data = Data::from_buffer(&buf).unwrap();
        let mut out = Vec::new();
        data.read_to_end(&mut out).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn reader_stream_is_read_through_callbacks() {
        let mut data = Data::from_reader(Cursor::new(b"streamed".to_vec())).unwrap();
        let mut out = Vec::new();
        data.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"streamed");
    }

    #[test]
    fn seekable_stream_seeks() {
        let mut data = Data::from_seekable_stream(Cursor::new(Vec::new())).unwrap();
        data.write_all(b"0123456789").unwrap();
        assert_eq!(data.seek(SeekFrom::Current(-4)).unwrap(), 6);
        let mut out = String::new();
        data.read_to_string(&mut out).unwrap();
        assert_eq!(out, "6789");
    }

    #[test]
    fn writer_receives_output() {
        let mut sink = Vec::new();
        {
            let mut data = Data::from_writer(&mut sink).unwrap();
            data.write_all(b"abc").unwrap();
        }
        assert_eq!(sink, b"abc");
    }

    #[test]
    fn output_vec_is_replaced() {
        let mut out = vec![b'X'; 64];
        {
            let mut data = (&mut out).into_data().unwrap();
            data.write_all(b"short").unwrap();
        }
        assert_eq!(out, b"short");
    }

    #[test]
    fn stream_errors_keep_errno() {
        let mut data = Data::from_reader(Failing(libc::EPIPE)).unwrap();
        let err = data.read(&mut [0; 8]).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
    }

    #[test]
    fn stream_panics_become_io_errors() {
        let mut data = Data::from_reader(Panicking).unwrap();
        let err = data.read(&mut [0; 8]).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EIO));
    }

    #[test]
    fn callback_data_has_no_memory_buffer() {
        let data = Data::from_reader(io::empty()).unwrap();
        assert!(data.into_bytes().is_none());
    }
}
