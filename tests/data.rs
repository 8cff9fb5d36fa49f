use std::io::{self, prelude::*, Cursor};

use gpgme_bridge::{Data, EncryptFlags};

#[macro_use]
mod common;

/// A reader that hands out at most `chunk` bytes per call.
struct Trickle<'a> {
    data: &'a [u8],
    chunk: usize,
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.chunk.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

test_case! {
    test_stream_round_trip(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let key = ctx.get_key(&*fprs.alpha, false).unwrap();
        let message = b"streamed through callbacks\n".repeat(100);

        let input = Data::from_reader(Trickle { data: &message, chunk: 7 }).unwrap();
        let mut ciphertext = Vec::new();
        let output = Data::from_writer(&mut ciphertext).unwrap();
        ctx.encrypt([&key], EncryptFlags::ALWAYS_TRUST, input, output).unwrap();
        assert!(!ciphertext.is_empty());

        let input = Data::from_seekable_stream(Cursor::new(ciphertext)).unwrap();
        let mut plaintext = Data::new().unwrap();
        ctx.decrypt(input, &mut plaintext).unwrap();
        assert_eq!(plaintext.into_bytes().unwrap(), message);
    }

    test_borrowed_buffer(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let key = ctx.get_key(&*fprs.alpha, false).unwrap();

        let message = String::from("borrowed, not copied");
        let input = Data::from_buffer(message.as_bytes()).unwrap();
        let mut ciphertext = Data::new().unwrap();
        ctx.encrypt([&key], EncryptFlags::ALWAYS_TRUST, input, &mut ciphertext).unwrap();

        ciphertext.rewind().unwrap();
        let mut plaintext = Vec::new();
        ctx.decrypt(&mut ciphertext, &mut plaintext).unwrap();
        assert_eq!(plaintext, message.as_bytes());
    }

    test_reused_output_vec(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let key = ctx.get_key(&*fprs.alpha, false).unwrap();

        let mut ciphertext = Vec::new();
        ctx.encrypt([&key], EncryptFlags::ALWAYS_TRUST, &b"short"[..], &mut ciphertext)
            .unwrap();

        let mut plaintext = vec![b'X'; 4096];
        ctx.decrypt(&ciphertext, &mut plaintext).unwrap();
        assert_eq!(plaintext, b"short");

        ctx.decrypt(&ciphertext, &mut plaintext).unwrap();
        assert_eq!(plaintext, b"short");
    }

    test_failing_reader(test) {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from_raw_os_error(libc::EPIPE))
            }
        }

        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let key = ctx.get_key(&*fprs.alpha, false).unwrap();

        let input = Data::from_reader(Broken).unwrap();
        let mut ciphertext = Vec::new();
        let err = ctx
            .encrypt([&key], EncryptFlags::ALWAYS_TRUST, input, &mut ciphertext)
            .unwrap_err();
        assert_ne!(err.error().code(), 0);
    }
}
