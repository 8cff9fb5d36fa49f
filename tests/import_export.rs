use gpgme_bridge::{Data, Error, ExportMode, ImportFlags};

#[macro_use]
mod common;

test_case! {
    test_export_then_import(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        ctx.set_armor(true);

        let mut exported = Vec::new();
        ctx.export(Some(&*fprs.alpha), ExportMode::empty(), &mut exported).unwrap();
        assert!(exported.starts_with(b"-----BEGIN PGP PUBLIC KEY BLOCK-----"));

        let result = ctx.import(&exported).unwrap();
        assert_eq!(result.considered, 1);
        assert_eq!(result.unchanged, 1);
        assert_eq!(result.imported, 0);
        assert_eq!(result.imports.len(), 1);
        let status = &result.imports[0];
        assert_eq!(status.fingerprint.as_deref(), Some(&*fprs.alpha));
        assert_eq!(status.result, None);
        assert!(!status.status.contains(ImportFlags::NEW));
    }

    test_import_twice(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let mut exported = Data::new().unwrap();
        ctx.export(Some(&*fprs.charlie), ExportMode::MINIMAL, &mut exported).unwrap();
        let exported = exported.into_bytes().unwrap();

        // A fresh keyring so the first import actually adds the key.
        let home = tempfile::TempDir::new().unwrap();
        let home_path = home.path().to_str().unwrap();
        let mut other = test.create_context();
        other
            .set_engine_info(gpgme_bridge::Protocol::OpenPgp, None::<&str>, Some(home_path))
            .unwrap();

        let first = other.import(&exported).unwrap();
        assert_eq!(first.considered, 1);
        assert_eq!(first.imported, 1);
        assert_eq!(first.unchanged, 0);
        assert!(first.imports[0].status.contains(ImportFlags::NEW));

        let second = other.import(&exported).unwrap();
        assert_eq!(second.considered, 1);
        assert_eq!(second.imported, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.imports[0].fingerprint.as_deref(), Some(&*fprs.charlie));

        drop(other);
        let _ = std::process::Command::new("gpgconf")
            .arg("--homedir")
            .arg(home.path())
            .arg("--kill")
            .arg("gpg-agent")
            .status();
    }

    test_export_all(test) {
        let mut ctx = test.create_context();
        let mut all = Vec::new();
        ctx.export(None::<&str>, ExportMode::empty(), &mut all).unwrap();

        let mut alpha = Vec::new();
        ctx.export(Some(common::ALPHA_EMAIL), ExportMode::empty(), &mut alpha).unwrap();
        assert!(!alpha.is_empty());
        assert!(all.len() > alpha.len());
    }

    test_import_garbage(test) {
        let mut ctx = test.create_context();
        match ctx.import(&b"this is not a key"[..]) {
            Ok(result) => {
                assert_eq!(result.imported, 0);
                assert!(result.imports.is_empty());
            }
            Err(err) => assert_ne!(err.error().code(), Error::NO_ERROR.code()),
        }
    }
}
