// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Hierarchical repository layout.

The standard layout places package files under
`pool/<component>/<first-letter>/<name>/` and per-architecture indices under
`dists/<codename>/<component>/binary-<arch>/`. A single `Release` at
`dists/<codename>/Release` enumerates every `Packages` file; per-component
`Release` files are not emitted.
*/

use {
    crate::{
        error::{RepoError, Result},
        repository::{
            filesystem,
            index::{render_packages, IndexEntry},
            release::{ArchiveInfo, ReleaseEntry},
            tarball, Repository,
        },
        signing,
    },
    pgp::SignedSecretKey,
    sha2::{Digest, Sha256},
    std::{
        collections::HashSet,
        io::Write,
        path::Path,
    },
};

/// A hierarchical repository aggregating per-component, per-architecture
/// parts.
///
/// Each part is a [Repository] whose archive metadata names exactly one
/// component and one architecture.
#[derive(Debug, Default)]
pub struct HierarchicalRepository {
    /// Metadata for the top-level `Release` file.
    pub archive_info: ArchiveInfo,

    /// Private key used to clearsign the top-level `Release`.
    pub signing_key: Option<SignedSecretKey>,

    /// Component/architecture parts.
    pub parts: Vec<Repository>,
}

/// The pool path for a package file: `pool/<component>/<first-letter>/<name>/<filename>`.
fn pool_path(component: &str, package_name: &str, filename: &str) -> String {
    let letter = package_name.chars().next().unwrap_or('0');

    format!("pool/{}/{}/{}/{}", component, letter, package_name, filename)
}

impl HierarchicalRepository {
    /// Serialize all parts into the hierarchical member list, in emission
    /// order.
    pub fn build_artifacts(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let codename = &self.archive_info.codename;
        let mut members: Vec<(String, Vec<u8>)> = vec![];
        let mut pool_files: HashSet<String> = HashSet::new();
        let mut release_entries: Vec<ReleaseEntry> = vec![];

        for part in &self.parts {
            let component = part.archive_info.components.trim();
            let architecture = part.archive_info.architectures.trim();

            if component.is_empty() || architecture.is_empty() {
                return Err(RepoError::Config(
                    "hierarchical part missing component or architecture".to_string(),
                ));
            }

            let mut entries = vec![];

            for package in part.iter() {
                let data = package.to_bytes()?;
                let path = pool_path(
                    component,
                    &package.metadata.name,
                    &package.standard_filename(),
                );

                entries.push(IndexEntry {
                    control: package.control_text(),
                    filename: path.clone(),
                    size: data.len() as u64,
                    sha256: hex::encode(Sha256::digest(&data)),
                });

                // The same package may appear under several architectures
                // (e.g. `all`); the pool holds one copy.
                if pool_files.insert(path.clone()) {
                    members.push((path, data));
                }
            }

            let packages = render_packages(&entries);
            let packages_gz = crate::deb::gzip_bytes(&packages)?;

            let rel_dir = format!("{}/binary-{}", component, architecture);

            release_entries.push(ReleaseEntry {
                path: format!("{}/Packages", rel_dir),
                size: packages.len() as u64,
                sha256: hex::encode(Sha256::digest(&packages)),
            });
            release_entries.push(ReleaseEntry {
                path: format!("{}/Packages.gz", rel_dir),
                size: packages_gz.len() as u64,
                sha256: hex::encode(Sha256::digest(&packages_gz)),
            });

            members.push((format!("dists/{}/{}/Packages", codename, rel_dir), packages));
            members.push((
                format!("dists/{}/{}/Packages.gz", codename, rel_dir),
                packages_gz,
            ));
        }

        // Deterministic manifest regardless of part order.
        release_entries.sort_by(|a, b| a.path.cmp(&b.path));

        let release = self.archive_info.render_release(&release_entries);
        members.push((format!("dists/{}/Release", codename), release.clone()));

        if let Some(key) = &self.signing_key {
            members.push((
                format!("dists/{}/InRelease", codename),
                signing::clearsign(key, &release)?.into_bytes(),
            ));
            members.push(("public.gpg".to_string(), signing::public_key_bytes(key)?));
            members.push((
                "public.asc".to_string(),
                signing::public_key_armored(key)?.into_bytes(),
            ));
        }

        Ok(members)
    }

    /// Write the hierarchical repository into a directory.
    pub fn write_to_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        let members = self.build_artifacts()?;

        filesystem::write_files(
            path.as_ref(),
            members.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
        )
    }

    /// Stream the hierarchical repository as a gzip-compressed tarball.
    pub fn write_tarball<W: Write>(&self, writer: W) -> Result<()> {
        let members = self.build_artifacts()?;

        tarball::write_members(
            writer,
            members.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
        )
    }
}
