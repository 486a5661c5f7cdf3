mod common;

use std::fs;

use backuptool_lib::crypto::{DecryptionError, Encryption};

use common::FakeRunner;

fn gpg() -> Encryption {
    Encryption::Gpg {
        key_id: "backup@example.com".to_string(),
    }
}

#[test]
fn decrypting_an_encrypted_archive_yields_the_original() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("backup-db1-20240101000000.tar.gz");
    let content: Vec<u8> = (0..=255).cycle().take(4096).collect();
    fs::write(&archive, &content).unwrap();
    let runner = FakeRunner::default();

    let encrypted = gpg().encrypt(&runner, &archive).unwrap();
    assert_eq!(
        encrypted.file_name().unwrap(),
        "backup-db1-20240101000000.tar.gz.gpg"
    );
    assert_ne!(fs::read(&encrypted).unwrap(), content);

    fs::remove_file(&archive).unwrap();
    let decrypted = gpg().decrypt(&runner, &encrypted).unwrap();

    assert_eq!(decrypted, archive);
    assert_eq!(fs::read(decrypted).unwrap(), content);
}

#[test]
fn disabled_encryption_passes_through() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("backup-db1-20240101000000.tar.gz");
    fs::write(&archive, "tarball").unwrap();
    let runner = FakeRunner::default();

    assert_eq!(Encryption::Disabled.encrypt(&runner, &archive).unwrap(), archive);
    assert_eq!(Encryption::Disabled.decrypt(&runner, &archive).unwrap(), archive);
    assert!(runner.commands().is_empty());
}

#[test]
fn encrypted_download_is_decrypted_even_if_encryption_is_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("backup-db1-20240101000000.tar.gz");
    fs::write(&archive, "tarball").unwrap();
    let runner = FakeRunner::default();
    let encrypted = gpg().encrypt(&runner, &archive).unwrap();

    let decrypted = Encryption::Disabled.decrypt(&runner, &encrypted).unwrap();

    assert_eq!(fs::read_to_string(decrypted).unwrap(), "tarball");
}

#[test]
fn corrupt_archive_fails_to_decrypt() {
    let tmp = tempfile::tempdir().unwrap();
    let encrypted = tmp.path().join("backup-db1-20240101000000.tar.gz.gpg");
    fs::write(&encrypted, "garbage").unwrap();
    let runner = FakeRunner::default();

    let err = gpg().decrypt(&runner, &encrypted).unwrap_err();

    assert!(matches!(err, DecryptionError::Gpg(_)));
}
