// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository model.

A [Repository] owns an ordered collection of packages keyed by
`(name, version, architecture)` with append semantics enforcing content
immutability: re-inserting a package whose semantic digest matches the
stored record is a no-op, while inserting different content under an
existing key fails.

Repositories emit the canonical flat layout (`Packages`, `Packages.gz`,
`Release`, optionally `InRelease` and public key artifacts alongside the
`.deb` files) to a directory or a gzip-compressed tarball. [pool] provides
the hierarchical `dists/` + `pool/` layout.
*/

pub mod filesystem;
pub mod index;
pub mod pool;
pub mod release;
pub mod tarball;

use {
    crate::{
        error::{RepoError, Result},
        package::Package,
        package_version::{compare_version_strings, split_upstream},
        repository::{index::IndexEntry, release::ArchiveInfo},
    },
    pgp::SignedSecretKey,
    sha2::{Digest, Sha256},
    std::{
        collections::HashMap,
        io::{Read, Write},
        path::Path,
    },
};

/// The identity triple of a package within a repository.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PackageKey {
    pub name: String,
    pub version: String,
    pub architecture: String,
}

impl PackageKey {
    fn of(package: &Package) -> Self {
        Self {
            name: package.metadata.name.clone(),
            version: package.metadata.version.clone(),
            architecture: package.metadata.architecture.clone(),
        }
    }
}

impl std::fmt::Display for PackageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.name, self.version, self.architecture)
    }
}

/// Outcome of [Repository::append].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppendOutcome {
    /// The package was not present and has been inserted.
    Inserted,

    /// A package with the same key and equal content digest already exists;
    /// the repository is unchanged.
    Identical,
}

/// An ordered collection of packages plus archive metadata.
#[derive(Debug, Default)]
pub struct Repository {
    /// Metadata emitted into the `Release` file.
    pub archive_info: ArchiveInfo,

    /// Private key used to clearsign `Release`, when configured.
    pub signing_key: Option<SignedSecretKey>,

    packages: Vec<Package>,

    /// Parallel index from identity triple to position, rebuilt on append.
    key_index: HashMap<PackageKey, usize>,
}

impl Repository {
    /// Create an empty repository with the given archive metadata.
    pub fn new(archive_info: ArchiveInfo) -> Self {
        Self {
            archive_info,
            ..Default::default()
        }
    }

    /// Number of packages held.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the repository holds no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate packages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    /// Find a package by its identity triple.
    pub fn get(&self, name: &str, version: &str, architecture: &str) -> Option<&Package> {
        let key = PackageKey {
            name: name.to_string(),
            version: version.to_string(),
            architecture: architecture.to_string(),
        };

        self.key_index.get(&key).map(|i| &self.packages[*i])
    }

    /// Add a package, enforcing the content immutability contract.
    ///
    /// Returns [AppendOutcome::Inserted] when the key was absent and
    /// [AppendOutcome::Identical] when the existing record has an equal
    /// content digest. Fails with [RepoError::ConflictDifferentContent]
    /// otherwise.
    pub fn append(&mut self, package: Package) -> Result<AppendOutcome> {
        let key = PackageKey::of(&package);

        if let Some(&pos) = self.key_index.get(&key) {
            return if self.packages[pos].same_content(&package) {
                Ok(AppendOutcome::Identical)
            } else {
                Err(RepoError::ConflictDifferentContent(
                    key.name,
                    key.version,
                    key.architecture,
                ))
            };
        }

        self.key_index.insert(key, self.packages.len());
        self.packages.push(package);

        Ok(AppendOutcome::Inserted)
    }

    /// Add a package, replacing any existing record with the same triple.
    pub fn overwrite(&mut self, package: Package) {
        let key = PackageKey::of(&package);

        if let Some(&pos) = self.key_index.get(&key) {
            self.packages[pos] = package;
        } else {
            self.key_index.insert(key, self.packages.len());
            self.packages.push(package);
        }
    }

    /// All packages matching a name, upstream version and architecture,
    /// sorted by version descending (most recent first).
    pub fn by_upstream(
        &self,
        name: &str,
        upstream_version: &str,
        architecture: &str,
    ) -> Vec<&Package> {
        let mut matches = self
            .packages
            .iter()
            .filter(|p| {
                p.metadata.name == name
                    && p.metadata.architecture == architecture
                    && split_upstream(&p.metadata.version).0 == upstream_version
            })
            .collect::<Vec<_>>();

        matches.sort_by(|a, b| {
            compare_version_strings(&b.metadata.version, &a.metadata.version)
        });

        matches
    }

    /// Serialize every package and the index artifacts, in emission order.
    ///
    /// The returned members are `.deb` files under their standard filenames
    /// followed by `Packages`, `Packages.gz`, `Release` and, when a signing
    /// key is configured, `InRelease`, `public.gpg` and `public.asc`.
    pub fn build_artifacts(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut members = vec![];
        let mut entries = vec![];

        for package in &self.packages {
            let data = package.to_bytes()?;
            let filename = package.standard_filename();

            entries.push(IndexEntry {
                control: package.control_text(),
                filename: filename.clone(),
                size: data.len() as u64,
                sha256: hex::encode(Sha256::digest(&data)),
            });

            members.push((filename, data));
        }

        let index_files =
            index::IndexFiles::build(&entries, &self.archive_info, self.signing_key.as_ref())?;

        for (name, data) in index_files.iter_named() {
            members.push((name.to_string(), data.to_vec()));
        }

        Ok(members)
    }

    /// Write the flat repository into a directory, creating it if missing.
    pub fn write_to_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        let members = self.build_artifacts()?;

        filesystem::write_files(
            path.as_ref(),
            members.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
        )
    }

    /// Stream the flat repository as a gzip-compressed tarball.
    pub fn write_tarball<W: Write>(&self, writer: W) -> Result<()> {
        let members = self.build_artifacts()?;

        tarball::write_members(
            writer,
            members.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
        )
    }

    /// Load a repository from a gzip-compressed tarball.
    ///
    /// `Release` populates the archive metadata and each `.deb` member is
    /// parsed into a full package. Index files are regenerated on write and
    /// are not consulted.
    pub fn from_tarball<R: Read>(reader: R) -> Result<Self> {
        let members = tarball::read_members(reader)?;

        let mut repository = Repository::default();

        for (name, data) in members {
            repository.load_member(&name, &data)?;
        }

        Ok(repository)
    }

    /// Load a flat repository from a directory. See [Self::from_tarball].
    pub fn from_directory(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut names = vec![];

        for entry in std::fs::read_dir(path)
            .map_err(|e| RepoError::IoPath(path.display().to_string(), e))?
        {
            let entry = entry.map_err(|e| RepoError::IoPath(path.display().to_string(), e))?;
            if entry
                .file_type()
                .map_err(|e| RepoError::IoPath(path.display().to_string(), e))?
                .is_file()
            {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        // Directory iteration order is platform dependent.
        names.sort();

        let mut repository = Repository::default();

        for name in names {
            let full = path.join(&name);
            let data =
                std::fs::read(&full).map_err(|e| RepoError::IoPath(full.display().to_string(), e))?;
            repository.load_member(&name, &data)?;
        }

        Ok(repository)
    }

    fn load_member(&mut self, name: &str, data: &[u8]) -> Result<()> {
        if name == "Release" {
            self.archive_info = ArchiveInfo::parse(&String::from_utf8_lossy(data))?;
        } else if name.ends_with(".deb") {
            let package = Package::parse_bytes(data)?;
            self.append(package)?;
        }

        Ok(())
    }
}
