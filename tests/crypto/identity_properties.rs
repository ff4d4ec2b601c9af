//! Properties of long-term identities and their signatures (§4.1).

use overlaycore::crypto::identity::Identity;

#[test]
fn two_generated_identities_have_distinct_peer_ids() {
    let a = Identity::generate().unwrap();
    let b = Identity::generate().unwrap();
    assert_ne!(a.peer_id(), b.peer_id());
}

#[test]
fn a_public_only_identity_shares_its_owners_peer_id() {
    let owner = Identity::generate().unwrap();
    let public_only = Identity::from_public_key(owner.public_key().clone());
    assert_eq!(owner.peer_id(), public_only.peer_id());
}

#[test]
fn public_only_identity_cannot_sign() {
    let owner = Identity::generate().unwrap();
    let public_only = Identity::from_public_key(owner.public_key().clone());
    assert!(public_only.sign(b"anything").is_err());
}

#[test]
fn public_only_identity_cannot_decrypt() {
    let owner = Identity::generate().unwrap();
    let public_only = Identity::from_public_key(owner.public_key().clone());
    let blob = owner.encrypt_session_key(&[1u8; 32]).unwrap();
    assert!(public_only.decrypt_session_key(&blob).is_err());
}

#[test]
fn signature_from_one_identity_does_not_verify_under_another() {
    let a = Identity::generate().unwrap();
    let b = Identity::generate().unwrap();
    let signature = a.sign(b"set-key purpose region").unwrap();
    assert!(b.verify(b"set-key purpose region", &signature).is_err());
}
