//! Content digests over ordered input streams

use super::{RegistryError, RegistryResult};
use crate::adapter::InputSet;
use crate::graph::DataSourceId;
use sha1::{Digest, Sha1};
use std::io::{ErrorKind, Read};

const CHUNK: usize = 64 * 1024;

/// SHA-1 over the stored bytes of `names`, in the given order.
///
/// Each stream is followed by its length as 8 big-endian bytes, so moving
/// bytes across a stream boundary changes the digest. Input names are not
/// hashed: identical content under other names is the same source.
///
/// Every input is checked for presence before any byte is read.
pub fn digest_inputs(input: &InputSet, names: &[String]) -> RegistryResult<DataSourceId> {
    if names.is_empty() {
        return Err(RegistryError::MissingInput {
            input: input.origin(),
        });
    }
    if let Some(missing) = names.iter().find(|n| !input.contains(n)) {
        return Err(RegistryError::MissingInput {
            input: missing.clone(),
        });
    }

    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; CHUNK];
    for name in names {
        let corrupt = |source| RegistryError::CorruptStream {
            input: name.clone(),
            source,
        };
        let mut reader = input.open_raw(name).map_err(corrupt)?;
        let mut length: u64 = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(corrupt(e)),
            };
            hasher.update(&buf[..n]);
            length += n as u64;
        }
        hasher.update(length.to_be_bytes());
    }
    Ok(DataSourceId::from_hex(hex::encode(hasher.finalize())))
}

/// Check a caller-supplied digest (full or prefix, any case) against the computed one
pub fn verify(expected: &str, actual: &DataSourceId) -> RegistryResult<()> {
    let expected = expected.trim();
    if actual.matches_prefix(expected) {
        Ok(())
    } else {
        Err(RegistryError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn digest_is_stable_and_name_independent() {
        let a = InputSet::memory(vec![("x.txt", b"hello".to_vec())]);
        let b = InputSet::memory(vec![("y.txt", b"hello".to_vec())]);
        let da = digest_inputs(&a, &names(&["x.txt"])).unwrap();
        let db = digest_inputs(&b, &names(&["y.txt"])).unwrap();
        assert_eq!(da, db);
        assert_eq!(da.as_str().len(), 40);
    }

    #[test]
    fn stream_boundaries_are_part_of_the_digest() {
        let split1 = InputSet::memory(vec![("a", b"ab".to_vec()), ("b", b"c".to_vec())]);
        let split2 = InputSet::memory(vec![("a", b"a".to_vec()), ("b", b"bc".to_vec())]);
        let order = names(&["a", "b"]);
        assert_ne!(
            digest_inputs(&split1, &order).unwrap(),
            digest_inputs(&split2, &order).unwrap()
        );
    }

    #[test]
    fn declared_order_not_listing_order_decides() {
        let one = InputSet::memory(vec![("a", b"1".to_vec()), ("b", b"2".to_vec())]);
        let two = InputSet::memory(vec![("b", b"2".to_vec()), ("a", b"1".to_vec())]);
        let order = names(&["a", "b"]);
        assert_eq!(
            digest_inputs(&one, &order).unwrap(),
            digest_inputs(&two, &order).unwrap()
        );
    }

    #[test]
    fn missing_input_fails_before_digesting() {
        let input = InputSet::memory(vec![("Products.txt", b"x".to_vec())]);
        let err = digest_inputs(&input, &names(&["Products.txt", "Submissions.txt"])).unwrap_err();
        assert!(matches!(err, RegistryError::MissingInput { ref input } if input == "Submissions.txt"));
    }

    #[test]
    fn verify_accepts_prefixes_and_rejects_mismatch() {
        let input = InputSet::memory(vec![("x", b"hello".to_vec())]);
        let id = digest_inputs(&input, &names(&["x"])).unwrap();
        assert!(verify(&id.short(9).to_uppercase(), &id).is_ok());
        assert!(matches!(
            verify("0000000000", &id),
            Err(RegistryError::DigestMismatch { .. })
        ));
    }
}
