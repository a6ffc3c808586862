// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Ingress validation of candidate packages.

Given a candidate `.deb` and a reference repository, decide whether the
candidate is new, an identical re-upload, or a conflicting rebuild of a
published version. The decision uses the semantic content digest, so
archive framing differences between builds do not register as conflicts.
*/

use {
    crate::{error::Result, package::Package, repository::Repository},
    std::path::Path,
};

/// Verdict for a candidate package against a reference repository.
#[derive(Debug)]
pub enum Admission {
    /// The identity triple is absent from the reference.
    Fresh(Package),

    /// The triple exists with an equal content digest; admitting the
    /// candidate is a no-op.
    DuplicateIdentical(Package),

    /// The triple exists with different content. The caller decides whether
    /// to fail, bump the version, or overwrite.
    Conflict {
        candidate: Package,
        existing_digest: String,
    },
}

impl Admission {
    /// The candidate package, whatever the verdict.
    pub fn candidate(&self) -> &Package {
        match self {
            Self::Fresh(p) | Self::DuplicateIdentical(p) => p,
            Self::Conflict { candidate, .. } => candidate,
        }
    }
}

/// Assess an already-parsed candidate against a reference repository.
pub fn assess_package(candidate: Package, reference: &Repository) -> Admission {
    let existing = reference.get(
        &candidate.metadata.name,
        &candidate.metadata.version,
        &candidate.metadata.architecture,
    );

    match existing {
        None => Admission::Fresh(candidate),
        Some(existing) => {
            let existing_digest = existing.digest();

            if existing_digest == candidate.digest() {
                Admission::DuplicateIdentical(candidate)
            } else {
                Admission::Conflict {
                    candidate,
                    existing_digest,
                }
            }
        }
    }
}

/// Parse a candidate `.deb` from disk and assess it against a reference
/// repository.
pub fn assess_file(path: impl AsRef<Path>, reference: &Repository) -> Result<Admission> {
    let data = std::fs::read(path.as_ref())
        .map_err(|e| crate::error::RepoError::IoPath(path.as_ref().display().to_string(), e))?;
    let candidate = Package::parse_bytes(&data)?;

    Ok(assess_package(candidate, reference))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::package::PayloadFile,
    };

    fn hello_package() -> Package {
        let mut p = Package::new("hello", "1.0-1", "amd64").unwrap();
        p.metadata.maintainer = "Dev <d@e>".to_string();
        p.metadata.description = "Greets".to_string();
        p.files.push(PayloadFile {
            dest_path: "/usr/bin/hello".to_string(),
            mode: 0o755,
            data: b"#!/bin/sh\necho hi\n".to_vec(),
            is_conffile: false,
            mtime: 0,
        });
        p
    }

    #[test]
    fn fresh_when_absent() {
        let reference = Repository::default();

        assert!(matches!(
            assess_package(hello_package(), &reference),
            Admission::Fresh(_)
        ));
    }

    #[test]
    fn duplicate_identical_when_content_matches() -> Result<()> {
        let mut reference = Repository::default();
        reference.append(hello_package())?;

        assert!(matches!(
            assess_package(hello_package(), &reference),
            Admission::DuplicateIdentical(_)
        ));

        Ok(())
    }

    #[test]
    fn conflict_when_content_differs() -> Result<()> {
        let mut reference = Repository::default();
        reference.append(hello_package())?;

        let mut changed = hello_package();
        changed.files[0].data[0] ^= 1;

        match assess_package(changed, &reference) {
            Admission::Conflict {
                candidate,
                existing_digest,
            } => {
                assert_eq!(existing_digest, hello_package().digest());
                assert_ne!(candidate.digest(), existing_digest);
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        Ok(())
    }

    #[test]
    fn assess_file_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("hello_1.0-1_amd64.deb");
        std::fs::write(&path, hello_package().to_bytes()?)?;

        let mut reference = Repository::default();
        reference.append(hello_package())?;

        assert!(matches!(
            assess_file(&path, &reference)?,
            Admission::DuplicateIdentical(_)
        ));

        Ok(())
    }
}
