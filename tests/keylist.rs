use std::collections::BTreeSet;

use gpgme_bridge::{Error, KeyAlgorithm, KeyListMode, Protocol, Validity};

use self::common::{ALPHA_EMAIL, BRAVO_EMAIL, CHARLIE_EMAIL};

#[macro_use]
mod common;

test_case! {
    test_keylist_all_matches_patterns(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();

        let all: BTreeSet<String> = ctx
            .keylist(None::<&str>, false)
            .unwrap()
            .map(|k| k.unwrap().fingerprint().unwrap().to_owned())
            .collect();
        let expected: BTreeSet<String> =
            [fprs.alpha.clone(), fprs.bravo.clone(), fprs.charlie.clone()].into();
        assert_eq!(all, expected);

        let matched: BTreeSet<String> = ctx
            .keylist([ALPHA_EMAIL, BRAVO_EMAIL, CHARLIE_EMAIL], false)
            .unwrap()
            .map(|k| k.unwrap().fingerprint().unwrap().to_owned())
            .collect();
        assert_eq!(all, matched);

        let single: Vec<_> = ctx
            .keylist(Some(ALPHA_EMAIL), false)
            .unwrap()
            .map(|k| k.unwrap().fingerprint().unwrap().to_owned())
            .collect();
        assert_eq!(single, [fprs.alpha.clone()]);
    }

    test_keylist_secret_only(test) {
        let mut ctx = test.create_context();
        let keys: Vec<_> = ctx
            .keylist(None::<&str>, true)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|k| k.has_secret()));
    }

    test_keylist_no_match(test) {
        let mut ctx = test.create_context();
        let mut keys = ctx.keylist(Some("nobody@example.invalid"), false).unwrap();
        assert!(keys.next().is_none());
        assert!(keys.next().is_none());
        keys.close().unwrap();
        keys.close().unwrap();
    }

    test_keylist_drop_early(test) {
        let mut ctx = test.create_context();
        {
            let mut keys = ctx.keylist(None::<&str>, false).unwrap();
            assert!(keys.next().unwrap().is_ok());
        }
        // The first listing was ended when it was dropped.
        assert_eq!(ctx.keylist(None::<&str>, false).unwrap().count(), 3);
    }

    test_keylist_bad_pattern(test) {
        let mut ctx = test.create_context();
        let err = ctx.keylist(Some("a\0b"), false).unwrap_err();
        assert_eq!(err.code(), Error::INV_VALUE.code());
    }

    test_get_key(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let key = ctx.get_key(&*fprs.alpha, false).unwrap();
        assert_eq!(key.fingerprint(), Ok(&*fprs.alpha));

        let err = ctx
            .get_key("0000000000000000000000000000000000000000", false)
            .unwrap_err();
        assert_eq!(err.code(), Error::NOT_FOUND.code());
    }

    test_key_views(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        ctx.set_key_list_mode(KeyListMode::LOCAL | KeyListMode::SIGS).unwrap();
        let key = ctx.get_key(&*fprs.alpha, true).unwrap();

        assert_eq!(key.protocol(), Protocol::OpenPgp);
        assert_eq!(key.owner_trust(), Validity::Ultimate);
        assert!(key.key_list_mode().contains(KeyListMode::SIGS));
        assert!(!key.is_revoked());
        assert!(!key.is_expired());
        assert!(!key.is_disabled());
        assert!(!key.is_invalid());
        assert!(key.can_sign());
        assert!(key.can_encrypt());
        assert!(key.can_certify());
        assert!(key.has_secret());
        assert!(fprs.alpha.ends_with(key.id().unwrap()));
        assert!(key.issuer_serial_raw().is_none());

        let subkeys = key.subkeys();
        assert_eq!(subkeys.len(), 2);
        let primary = key.primary_key().unwrap();
        assert_eq!(primary.fingerprint(), subkeys[0].fingerprint());
        assert_eq!(primary.algorithm(), KeyAlgorithm::Eddsa);
        assert!(primary.can_sign());
        assert!(primary.is_secret());
        assert!(primary.creation_time().is_some());
        assert!(primary.expiration_time().is_none());
        assert!(!subkeys[1].can_sign());
        assert!(subkeys[1].can_encrypt());
        assert!(subkeys[1].length() > 0);

        let uids = key.user_ids();
        assert_eq!(uids.len(), 1);
        let uid = &uids[0];
        assert_eq!(uid.name(), Ok("Alpha Test"));
        assert_eq!(uid.email(), Ok(ALPHA_EMAIL));
        assert_eq!(uid.comment(), Ok("demo key"));
        assert_eq!(uid.id(), Ok("Alpha Test (demo key) <alpha@example.net>"));
        assert_eq!(uid.to_string(), "Alpha Test (demo key) <alpha@example.net>");
        assert_eq!(uid.validity(), Validity::Ultimate);
        assert!(!uid.is_revoked());

        let sigs = uid.signatures();
        assert!(!sigs.is_empty());
        let selfsig = &sigs[0];
        assert!(fprs.alpha.ends_with(selfsig.signer_key_id().unwrap()));
        assert_eq!(selfsig.signer_email(), Ok(ALPHA_EMAIL));
        assert!(selfsig.status().is_ok());
        assert!(selfsig.creation_time().is_some());
        assert!(!selfsig.is_revocation());
    }

    test_key_clone_outlives_listing(test) {
        let fprs = test.fingerprints().clone();
        let mut ctx = test.create_context();
        let copy = {
            let key = ctx.get_key(&*fprs.bravo, false).unwrap();
            key.clone()
        };
        drop(ctx);
        assert_eq!(copy.fingerprint(), Ok(&*fprs.bravo));
        assert_eq!(copy.user_ids()[0].email(), Ok(BRAVO_EMAIL));
    }
}
