// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Generation of repository index artifacts.

The `Packages` index lists, for every package, its control stanza verbatim
followed by `Filename`, `Size`, and `SHA256` fields. The `Release` manifest
then binds the checksums of the index files, and is optionally clearsigned
into `InRelease`.
*/

use {
    crate::{
        deb::gzip_bytes,
        error::Result,
        repository::release::{ArchiveInfo, ReleaseEntry},
        signing,
    },
    pgp::SignedSecretKey,
    sha2::{Digest, Sha256},
    std::path::Path,
};

/// One package's entry in a `Packages` index.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    /// The package control stanza, verbatim.
    pub control: String,

    /// Path or URL of the `.deb`, relative to the repository root when not
    /// absolute.
    pub filename: String,

    /// Size of the `.deb` in bytes.
    pub size: u64,

    /// Hex sha256 of the `.deb` bytes.
    pub sha256: String,
}

impl IndexEntry {
    /// Render this entry as a `Packages` stanza, blank-line terminated.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.control.len() + 128);

        out.push_str(&self.control);
        if !self.control.ends_with('\n') {
            out.push('\n');
        }

        out.push_str(&format!(
            "Filename: {}\nSize: {}\nSHA256: {}\n\n",
            self.filename, self.size, self.sha256
        ));

        out
    }
}

/// Render the `Packages` index for a sequence of entries, in order.
pub fn render_packages(entries: &[IndexEntry]) -> Vec<u8> {
    entries
        .iter()
        .map(|e| e.render())
        .collect::<String>()
        .into_bytes()
}

/// The standard index artifacts of a flat repository.
#[derive(Clone, Debug, Default)]
pub struct IndexFiles {
    pub packages: Vec<u8>,
    pub packages_gz: Vec<u8>,
    pub release: Vec<u8>,
    pub in_release: Option<Vec<u8>>,
    pub public_gpg: Option<Vec<u8>>,
    pub public_asc: Option<Vec<u8>>,
}

impl IndexFiles {
    /// Build index artifacts from package entries and archive metadata.
    ///
    /// With a signing key, `Release` is clearsigned into `InRelease` and the
    /// public key is exported in binary and armored forms.
    pub fn build(
        entries: &[IndexEntry],
        info: &ArchiveInfo,
        signing_key: Option<&SignedSecretKey>,
    ) -> Result<Self> {
        let packages = render_packages(entries);
        let packages_gz = gzip_bytes(&packages)?;

        let release = info.render_release(&[
            ReleaseEntry {
                path: "Packages".to_string(),
                size: packages.len() as u64,
                sha256: hex::encode(Sha256::digest(&packages)),
            },
            ReleaseEntry {
                path: "Packages.gz".to_string(),
                size: packages_gz.len() as u64,
                sha256: hex::encode(Sha256::digest(&packages_gz)),
            },
        ]);

        let (in_release, public_gpg, public_asc) = if let Some(key) = signing_key {
            (
                Some(signing::clearsign(key, &release)?.into_bytes()),
                Some(signing::public_key_bytes(key)?),
                Some(signing::public_key_armored(key)?.into_bytes()),
            )
        } else {
            (None, None, None)
        };

        Ok(Self {
            packages,
            packages_gz,
            release,
            in_release,
            public_gpg,
            public_asc,
        })
    }

    /// The artifacts paired with their standard filenames, in emission
    /// order.
    pub fn iter_named<'a>(&'a self) -> impl Iterator<Item = (&'static str, &'a [u8])> {
        [
            Some(("Packages", self.packages.as_slice())),
            Some(("Packages.gz", self.packages_gz.as_slice())),
            Some(("Release", self.release.as_slice())),
            self.in_release.as_deref().map(|d| ("InRelease", d)),
            self.public_gpg.as_deref().map(|d| ("public.gpg", d)),
            self.public_asc.as_deref().map(|d| ("public.asc", d)),
        ]
        .into_iter()
        .flatten()
    }

    /// Write the artifacts into a directory with mode 0644, creating the
    /// directory if missing.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        crate::repository::filesystem::write_files(dir, self.iter_named())
    }
}
