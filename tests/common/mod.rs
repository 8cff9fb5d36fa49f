#![allow(dead_code)]
use std::{
    env, fs,
    io::prelude::*,
    path::Path,
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
};

use gpgme_bridge::{
    CallbackResult, Context, ExportMode, PassphraseRequest, PinentryMode, Protocol,
};

pub const PASSPHRASE: &str = "abc";

pub const ALPHA_EMAIL: &str = "alpha@example.net";
pub const BRAVO_EMAIL: &str = "bravo@example.net";
pub const CHARLIE_EMAIL: &str = "charlie@example.net";

macro_rules! count {
    () => {0usize};
    ($_head:tt $($tail:tt)*) => {1usize + count!($($tail)*)};
}

macro_rules! test_case {
    (@impl $name:ident($tester:ident) $body:block) => {
        #[test]
        fn $name() {
            let $tester = TEST_CASE.new_test();
            $body
        }
    };
    ($($name:ident($tester:ident) $body:block)+) => {
        static TEST_CASE: ::once_cell::sync::Lazy<$crate::common::TestCase>
            = ::once_cell::sync::Lazy::new(|| $crate::common::TestCase::new(count!($($name)+)));
        $(test_case!(@impl $name($tester) $body);)+
    };
}

pub fn passphrase_cb(_req: PassphraseRequest<'_>, out: &mut dyn Write) -> CallbackResult {
    out.write_all(PASSPHRASE.as_bytes())?;
    Ok(())
}

fn gpg() -> Command {
    let mut cmd = Command::new(env::var_os("GPG").unwrap_or("gpg".into()));
    cmd.arg("--batch").arg("--no-permission-warning");
    cmd
}

fn generate_key(params: &str) {
    let mut child = gpg()
        .arg("--pinentry-mode")
        .arg("loopback")
        .arg("--gen-key")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(params.as_bytes())
        .unwrap();
    assert!(child.wait().unwrap().success());
}

fn fingerprint_of(email: &str) -> String {
    let output = gpg()
        .arg("--with-colons")
        .arg("--fingerprint")
        .arg(email)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .find_map(|line| line.strip_prefix("fpr:::::::::"))
        .and_then(|rest| rest.split(':').next())
        .map(str::to_owned)
        .unwrap()
}

fn setup_home(dir: &Path) {
    env::set_var("GNUPGHOME", dir);
    env::set_var("GPG_AGENT_INFO", "");

    fs::write(dir.join("gpg.conf"), "no-auto-key-locate\n").unwrap();
    fs::write(
        dir.join("gpg-agent.conf"),
        "allow-loopback-pinentry\n\
         default-cache-ttl 0\n\
         max-cache-ttl 0\n",
    )
    .unwrap();
}

/// Keys shared by every test of one test binary.
#[derive(Debug, Clone)]
pub struct Fingerprints {
    /// Unprotected sign and encrypt key.
    pub alpha: String,
    /// Sign and encrypt key protected with [`PASSPHRASE`].
    pub bravo: String,
    /// Unprotected key without an encryption subkey.
    pub charlie: String,
}

pub struct TestCase {
    count: AtomicUsize,
    homedir: RwLock<Option<tempfile::TempDir>>,
    fingerprints: Fingerprints,
}

impl TestCase {
    pub fn new(count: usize) -> TestCase {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::TempDir::new().unwrap();
        setup_home(dir.path());
        generate_key(&format!(
            "Key-Type: EDDSA\n\
             Key-Curve: ed25519\n\
             Subkey-Type: ECDH\n\
             Subkey-Curve: cv25519\n\
             Name-Real: Alpha Test\n\
             Name-Comment: demo key\n\
             Name-Email: {ALPHA_EMAIL}\n\
             Expire-Date: 0\n\
             %no-protection\n\
             %commit\n"
        ));
        generate_key(&format!(
            "Key-Type: EDDSA\n\
             Key-Curve: ed25519\n\
             Subkey-Type: ECDH\n\
             Subkey-Curve: cv25519\n\
             Name-Real: Bravo Test\n\
             Name-Email: {BRAVO_EMAIL}\n\
             Expire-Date: 0\n\
             Passphrase: {PASSPHRASE}\n\
             %commit\n"
        ));
        generate_key(&format!(
            "Key-Type: EDDSA\n\
             Key-Curve: ed25519\n\
             Key-Usage: sign\n\
             Name-Real: Charlie Test\n\
             Name-Email: {CHARLIE_EMAIL}\n\
             Expire-Date: 0\n\
             %no-protection\n\
             %commit\n"
        ));
        let fingerprints = Fingerprints {
            alpha: fingerprint_of(ALPHA_EMAIL),
            bravo: fingerprint_of(BRAVO_EMAIL),
            charlie: fingerprint_of(CHARLIE_EMAIL),
        };
        TestCase {
            count: AtomicUsize::new(count),
            homedir: RwLock::new(Some(dir)),
            fingerprints,
        }
    }

    pub fn new_test(&self) -> Test<'_> {
        Test { parent: self }
    }

    pub fn kill_agent(&self) {
        let socket = {
            let homedir = self.homedir.read().unwrap();
            homedir.as_ref().unwrap().path().join("S.gpg-agent")
        };
        let mut child = match Command::new("gpg-connect-agent")
            .arg("-S")
            .arg(socket)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                println!("Unable to kill agent: {}", err);
                return;
            }
        };
        if let Some(ref mut stdin) = child.stdin {
            let _ = stdin.write_all(b"KILLAGENT\nBYE\n");
            let _ = stdin.flush();
        }
        if let Err(err) = child.wait() {
            println!("Unable to kill agent: {}", err);
        }
    }

    fn drop(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.kill_agent();
            self.homedir.write().unwrap().take();
        }
    }
}

/// A session on a throwaway keyring that holds public keys only.
pub struct PublicKeyring {
    pub ctx: Context,
    home: tempfile::TempDir,
}

impl Drop for PublicKeyring {
    fn drop(&mut self) {
        let _ = Command::new("gpgconf")
            .arg("--homedir")
            .arg(self.home.path())
            .arg("--kill")
            .arg("gpg-agent")
            .status();
    }
}

pub struct Test<'a> {
    parent: &'a TestCase,
}

impl Drop for Test<'_> {
    fn drop(&mut self) {
        self.parent.drop();
    }
}

impl Test<'_> {
    pub fn fingerprints(&self) -> &Fingerprints {
        &self.parent.fingerprints
    }

    pub fn create_context(&self) -> Context {
        let mut ctx = Context::from_protocol(Protocol::OpenPgp).unwrap();
        let _ = ctx.set_pinentry_mode(PinentryMode::Loopback);
        ctx
    }

    /// Copies the public parts of `fprs` into a fresh keyring.
    pub fn public_keyring(&self, fprs: &[&str]) -> PublicKeyring {
        let mut exported = Vec::new();
        self.create_context()
            .export(fprs.iter().copied(), ExportMode::empty(), &mut exported)
            .unwrap();

        let home = tempfile::TempDir::new().unwrap();
        let mut ctx = self.create_context();
        ctx.set_engine_info(Protocol::OpenPgp, None::<&str>, home.path().to_str())
            .unwrap();
        let result = ctx.import(&exported).unwrap();
        assert_eq!(result.imported as usize, fprs.len());
        PublicKeyring { ctx, home }
    }
}
