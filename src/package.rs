// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binary package model.

[Package] is the structured representation of one binary package: control
metadata, maintainer scripts, auxiliary control files and the payload file
tree. Instances are built in memory or parsed from `.deb` bytes, and
serialize back to `.deb` archives.

Content equality between packages is decided by [Package::digest], a sha256
over package *meaning*: archive framing and file modification times do not
participate.
*/

use {
    crate::{
        control::ControlParagraph,
        deb::{
            builder::{build_inner_tar_gz, write_deb_archive, TarMember},
            reader::{check_magic, read_inner_entries, ArchiveMembers},
            CONTROL_FILE_CONFFILES, CONTROL_FILE_CONTROL, CONTROL_FILE_MD5SUMS,
            MEMBER_DEBIAN_BINARY, RESERVED_CONTROL_FILES,
        },
        error::{RepoError, Result},
        package_version::split_upstream,
    },
    md5::Md5,
    sha2::{Digest, Sha256},
    std::{
        collections::{BTreeMap, HashSet},
        io::Read,
        time::SystemTime,
    },
};

/// The closed set of recognized control field names.
///
/// This is the single source of truth consulted by both the control parser
/// and [Package::set]; any name outside this set routes to the user-defined
/// field map.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FieldTag {
    Package,
    Version,
    Architecture,
    Maintainer,
    Description,
    Section,
    Priority,
    Homepage,
    Essential,
    Depends,
    PreDepends,
    Recommends,
    Suggests,
    Enhances,
    Conflicts,
    Breaks,
    Replaces,
    Provides,
    BuiltUsing,
    Source,
    InstalledSize,
}

impl FieldTag {
    /// Canonical field name as it appears in control files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "Package",
            Self::Version => "Version",
            Self::Architecture => "Architecture",
            Self::Maintainer => "Maintainer",
            Self::Description => "Description",
            Self::Section => "Section",
            Self::Priority => "Priority",
            Self::Homepage => "Homepage",
            Self::Essential => "Essential",
            Self::Depends => "Depends",
            Self::PreDepends => "Pre-Depends",
            Self::Recommends => "Recommends",
            Self::Suggests => "Suggests",
            Self::Enhances => "Enhances",
            Self::Conflicts => "Conflicts",
            Self::Breaks => "Breaks",
            Self::Replaces => "Replaces",
            Self::Provides => "Provides",
            Self::BuiltUsing => "Built-Using",
            Self::Source => "Source",
            Self::InstalledSize => "Installed-Size",
        }
    }

    /// Resolve a field name to its tag, if recognized. Matching is exact.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Package" => Some(Self::Package),
            "Version" => Some(Self::Version),
            "Architecture" => Some(Self::Architecture),
            "Maintainer" => Some(Self::Maintainer),
            "Description" => Some(Self::Description),
            "Section" => Some(Self::Section),
            "Priority" => Some(Self::Priority),
            "Homepage" => Some(Self::Homepage),
            "Essential" => Some(Self::Essential),
            "Depends" => Some(Self::Depends),
            "Pre-Depends" => Some(Self::PreDepends),
            "Recommends" => Some(Self::Recommends),
            "Suggests" => Some(Self::Suggests),
            "Enhances" => Some(Self::Enhances),
            "Conflicts" => Some(Self::Conflicts),
            "Breaks" => Some(Self::Breaks),
            "Replaces" => Some(Self::Replaces),
            "Provides" => Some(Self::Provides),
            "Built-Using" => Some(Self::BuiltUsing),
            "Source" => Some(Self::Source),
            "Installed-Size" => Some(Self::InstalledSize),
            _ => None,
        }
    }
}

/// Control metadata for one binary package.
///
/// Field semantics follow
/// <https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control>.
#[derive(Clone, Debug, Default)]
pub struct PackageMetadata {
    /// Package name. Lowercase alphanumerics plus `+`, `-`, `.`; at least
    /// two characters; starts alphanumeric.
    pub name: String,

    /// Version string: `[epoch:]upstream_version[-debian_revision]`.
    pub version: String,

    /// Hardware architecture, e.g. `amd64`, `arm64`, or `all`.
    pub architecture: String,

    /// `Name <email>` of the responsible party.
    pub maintainer: String,

    /// Logical description: the first line is the synopsis, subsequent lines
    /// form the extended body with blank lines kept as empty strings. The
    /// control file encoding (leading spaces, ` .` paragraph breaks) is
    /// applied on emission and removed on parse.
    pub description: String,

    /// Category such as `utils` or `devel`.
    pub section: String,

    /// Importance, e.g. `optional` or `required`.
    pub priority: String,

    /// Upstream project home page URL.
    pub homepage: String,

    /// Whether the package is essential for system operation.
    pub essential: bool,

    pub depends: Vec<String>,
    pub pre_depends: Vec<String>,
    pub recommends: Vec<String>,
    pub suggests: Vec<String>,
    pub enhances: Vec<String>,
    pub conflicts: Vec<String>,
    pub breaks: Vec<String>,
    pub replaces: Vec<String>,
    pub provides: Vec<String>,

    /// Source packages used to build this binary.
    pub built_using: String,

    /// Source package name, when it differs from the binary name.
    pub source: String,

    /// User-defined fields, serialized in key order.
    pub extra_fields: BTreeMap<String, String>,
}

/// Maintainer scripts, keyed by lifecycle phase.
///
/// An empty string means the script is absent.
#[derive(Clone, Debug, Default)]
pub struct MaintainerScripts {
    pub preinst: String,
    pub postinst: String,
    pub prerm: String,
    pub postrm: String,
    pub config: String,
}

impl MaintainerScripts {
    /// Scripts paired with their control archive filename, in lifecycle
    /// order.
    pub fn iter_named(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("preinst", self.preinst.as_str()),
            ("postinst", self.postinst.as_str()),
            ("prerm", self.prerm.as_str()),
            ("postrm", self.postrm.as_str()),
            ("config", self.config.as_str()),
        ]
        .into_iter()
    }
}

/// A single file installed by a package.
#[derive(Clone, Debug)]
pub struct PayloadFile {
    /// Absolute installation path, e.g. `/usr/bin/app`.
    pub dest_path: String,

    /// Permission bits, e.g. `0o755`.
    pub mode: u32,

    /// File contents.
    pub data: Vec<u8>,

    /// Whether the file is registered in `conffiles`.
    pub is_conffile: bool,

    /// Modification time recorded in the archive. Zero means the archive
    /// write time is used.
    pub mtime: u64,
}

/// A structured binary package.
#[derive(Clone, Debug, Default)]
pub struct Package {
    pub metadata: PackageMetadata,
    pub scripts: MaintainerScripts,
    pub files: Vec<PayloadFile>,

    /// Auxiliary control archive files, e.g. `templates` or `triggers`.
    /// Reserved names are skipped on write.
    pub extra_control_files: BTreeMap<String, Vec<u8>>,

    parsed_digest: Option<String>,
    file_sha256: Option<String>,
}

/// Validate a package name against the policy grammar.
pub fn validate_package_name(name: &str) -> Result<()> {
    let valid = name.len() >= 2
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .unwrap_or(false)
        && name.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '-' | '.')
        });

    if valid {
        Ok(())
    } else {
        Err(RepoError::IllegalPackageName(name.to_string()))
    }
}

/// Split a comma-separated relationship value, trimming elements and
/// dropping empty ones.
fn split_relationship_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

/// Decode a control file `Description` value into its logical form.
///
/// Continuation lines lose their single leading space and ` .` lines become
/// empty lines.
fn decode_description(raw: &str) -> String {
    let mut lines = raw.lines();

    let mut out = match lines.next() {
        Some(synopsis) => vec![synopsis.to_string()],
        None => return String::new(),
    };

    for line in lines {
        let line = line.strip_prefix(' ').unwrap_or(line);
        if line == "." {
            out.push(String::new());
        } else {
            out.push(line.to_string());
        }
    }

    out.join("\n")
}

impl Package {
    /// Create a package with the identity triple set.
    ///
    /// The name is validated against the policy grammar; the version must
    /// parse as a Debian version.
    pub fn new(name: &str, version: &str, architecture: &str) -> Result<Self> {
        validate_package_name(name)?;
        crate::package_version::PackageVersion::parse(version)?;

        Ok(Self {
            metadata: PackageMetadata {
                name: name.to_string(),
                version: version.to_string(),
                architecture: architecture.to_string(),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    /// The canonical filename: `{name}_{version}_{architecture}.deb`.
    pub fn standard_filename(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.metadata.name, self.metadata.version, self.metadata.architecture
        )
    }

    /// The upstream part of the version (everything before the last hyphen).
    pub fn upstream_version(&self) -> &str {
        split_upstream(&self.metadata.version).0
    }

    /// The iteration part of the version (everything after the last hyphen,
    /// empty when there is none).
    pub fn iteration(&self) -> &str {
        split_upstream(&self.metadata.version).1
    }

    /// Installed size in kilobytes: the ceiling of the payload byte total
    /// divided by 1024. Derived, never stored.
    pub fn installed_size_kib(&self) -> u64 {
        let total: u64 = self.files.iter().map(|f| f.data.len() as u64).sum();

        (total + 1023) / 1024
    }

    /// The content digest recorded when this package was parsed from bytes.
    pub fn parsed_digest(&self) -> Option<&str> {
        self.parsed_digest.as_deref()
    }

    /// The sha256 of the original file bytes, recorded at parse time.
    pub fn file_sha256(&self) -> Option<&str> {
        self.file_sha256.as_deref()
    }

    /// Update a metadata field by control file key.
    ///
    /// Recognized keys route to structured fields, with relationship fields
    /// split on commas. Unrecognized keys land in the user-defined map.
    /// `Installed-Size` is silently ignored; it is always recomputed.
    pub fn set(&mut self, key: &str, value: &str) {
        let m = &mut self.metadata;

        match FieldTag::from_name(key) {
            Some(FieldTag::Package) => m.name = value.to_string(),
            Some(FieldTag::Version) => m.version = value.to_string(),
            Some(FieldTag::Architecture) => m.architecture = value.to_string(),
            Some(FieldTag::Maintainer) => m.maintainer = value.to_string(),
            Some(FieldTag::Description) => m.description = value.to_string(),
            Some(FieldTag::Section) => m.section = value.to_string(),
            Some(FieldTag::Priority) => m.priority = value.to_string(),
            Some(FieldTag::Homepage) => m.homepage = value.to_string(),
            Some(FieldTag::Essential) => m.essential = value == "yes",
            Some(FieldTag::Depends) => m.depends = split_relationship_list(value),
            Some(FieldTag::PreDepends) => m.pre_depends = split_relationship_list(value),
            Some(FieldTag::Recommends) => m.recommends = split_relationship_list(value),
            Some(FieldTag::Suggests) => m.suggests = split_relationship_list(value),
            Some(FieldTag::Enhances) => m.enhances = split_relationship_list(value),
            Some(FieldTag::Conflicts) => m.conflicts = split_relationship_list(value),
            Some(FieldTag::Breaks) => m.breaks = split_relationship_list(value),
            Some(FieldTag::Replaces) => m.replaces = split_relationship_list(value),
            Some(FieldTag::Provides) => m.provides = split_relationship_list(value),
            Some(FieldTag::BuiltUsing) => m.built_using = value.to_string(),
            Some(FieldTag::Source) => m.source = value.to_string(),
            Some(FieldTag::InstalledSize) => {}
            None => {
                m.extra_fields.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Populate metadata from a parsed control paragraph.
    pub fn apply_control_paragraph(&mut self, paragraph: &ControlParagraph<'_>) {
        for field in paragraph.iter_fields() {
            if matches!(FieldTag::from_name(field.name()), Some(FieldTag::Description)) {
                self.metadata.description = decode_description(field.value_str());
            } else {
                self.set(field.name(), field.value_str());
            }
        }
    }

    /// Render the control file for this package.
    ///
    /// Fields appear in canonical order with `Description` last; empty
    /// values are omitted entirely and `Installed-Size` is recomputed from
    /// the payload.
    pub fn control_text(&self) -> String {
        let m = &self.metadata;
        let mut out = String::new();

        let mut field = |tag: FieldTag, value: &str| {
            if !value.is_empty() {
                out.push_str(tag.as_str());
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        };

        field(FieldTag::Package, &m.name);
        field(FieldTag::Version, &m.version);
        field(FieldTag::Architecture, &m.architecture);
        field(FieldTag::Maintainer, &m.maintainer);
        field(
            FieldTag::InstalledSize,
            &self.installed_size_kib().to_string(),
        );
        field(FieldTag::Section, &m.section);
        field(FieldTag::Priority, &m.priority);
        field(FieldTag::Homepage, &m.homepage);

        if m.essential {
            field(FieldTag::Essential, "yes");
        }

        let mut relationship = |tag: FieldTag, items: &[String]| {
            if !items.is_empty() {
                field(tag, &items.join(", "));
            }
        };

        relationship(FieldTag::Depends, &m.depends);
        relationship(FieldTag::PreDepends, &m.pre_depends);
        relationship(FieldTag::Recommends, &m.recommends);
        relationship(FieldTag::Suggests, &m.suggests);
        relationship(FieldTag::Enhances, &m.enhances);
        relationship(FieldTag::Conflicts, &m.conflicts);
        relationship(FieldTag::Breaks, &m.breaks);
        relationship(FieldTag::Replaces, &m.replaces);
        relationship(FieldTag::Provides, &m.provides);

        field(FieldTag::BuiltUsing, &m.built_using);
        field(FieldTag::Source, &m.source);

        for (key, value) in &m.extra_fields {
            if !value.is_empty() {
                out.push_str(key);
                out.push_str(": ");
                out.push_str(value);
                out.push('\n');
            }
        }

        if !m.description.is_empty() {
            let mut lines = m.description.split('\n');

            if let Some(synopsis) = lines.next() {
                out.push_str("Description: ");
                out.push_str(synopsis);
                out.push('\n');
            }

            for line in lines {
                if line.trim().is_empty() {
                    out.push_str(" .\n");
                } else if line.starts_with(' ') {
                    out.push_str(line);
                    out.push('\n');
                } else {
                    out.push(' ');
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }

        out
    }

    /// Compute the semantic content digest of this package.
    ///
    /// The digest binds metadata (with the installed size recomputed from
    /// the payload), scripts, auxiliary control files and payload contents.
    /// File modification times and archive framing do not participate, and
    /// every record is length-prefixed so adjacent values cannot alias.
    pub fn digest(&self) -> String {
        let m = &self.metadata;
        let mut hasher = Sha256::new();

        let mut absorb = |data: &[u8]| {
            hasher.update(data.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(data);
            hasher.update(b"\x00");
        };

        absorb(m.name.as_bytes());
        absorb(m.version.as_bytes());
        absorb(m.architecture.as_bytes());
        absorb(m.maintainer.as_bytes());
        absorb(self.installed_size_kib().to_string().as_bytes());
        absorb(m.section.as_bytes());
        absorb(m.priority.as_bytes());
        absorb(m.homepage.as_bytes());
        absorb(if m.essential { b"true" } else { b"false" });
        absorb(m.built_using.as_bytes());
        absorb(m.source.as_bytes());
        absorb(m.description.as_bytes());

        // Element order within a relationship list is semantic.
        for list in [
            &m.depends,
            &m.pre_depends,
            &m.recommends,
            &m.suggests,
            &m.enhances,
            &m.conflicts,
            &m.breaks,
            &m.replaces,
            &m.provides,
        ] {
            absorb(list.len().to_string().as_bytes());
            for item in list {
                absorb(item.as_bytes());
            }
        }

        for (key, value) in &m.extra_fields {
            absorb(key.as_bytes());
            absorb(value.as_bytes());
        }

        for (_, body) in self.scripts.iter_named() {
            absorb(body.as_bytes());
        }

        for (name, body) in &self.extra_control_files {
            absorb(name.as_bytes());
            absorb(body);
        }

        let mut files = self.files.iter().collect::<Vec<_>>();
        files.sort_by(|a, b| a.dest_path.cmp(&b.dest_path));

        for f in files {
            absorb(f.dest_path.as_bytes());
            absorb(f.mode.to_string().as_bytes());
            absorb(if f.is_conffile { b"true" } else { b"false" });
            absorb(&f.data);
        }

        hex::encode(hasher.finalize())
    }

    /// Whether another package has equal content.
    pub fn same_content(&self, other: &Package) -> bool {
        self.digest() == other.digest()
    }

    /// Parse a package from a reader over `.deb` bytes.
    pub fn parse<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = vec![];
        reader.read_to_end(&mut data)?;

        Self::parse_bytes(&data)
    }

    /// Parse a package from `.deb` bytes.
    ///
    /// The returned package records its content digest and the sha256 of the
    /// input bytes for downstream reconciliation.
    pub fn parse_bytes(data: &[u8]) -> Result<Self> {
        check_magic(data)?;

        let mut package = Package::default();
        let mut conffile_paths: HashSet<String> = HashSet::new();
        let mut saw_control_file = false;

        for member in ArchiveMembers::new(std::io::Cursor::new(data)) {
            let member = member?;

            if member.name == MEMBER_DEBIAN_BINARY {
                continue;
            } else if member.name.starts_with("control.tar") {
                for entry in read_inner_entries(&member.name, &member.data)? {
                    let name = entry
                        .path
                        .rsplit('/')
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    if name.is_empty() {
                        continue;
                    }

                    match name.as_str() {
                        CONTROL_FILE_CONTROL => {
                            saw_control_file = true;
                            let text = String::from_utf8_lossy(&entry.data);
                            let paragraphs = crate::control::parse_paragraphs(&text)?;
                            if let Some(p) = paragraphs.first() {
                                package.apply_control_paragraph(p);
                            }
                        }
                        CONTROL_FILE_CONFFILES => {
                            let text = String::from_utf8_lossy(&entry.data);
                            conffile_paths.extend(
                                text.lines()
                                    .map(|l| l.trim())
                                    .filter(|l| !l.is_empty())
                                    .map(|l| l.to_string()),
                            );
                        }
                        CONTROL_FILE_MD5SUMS => {}
                        "preinst" => {
                            package.scripts.preinst =
                                String::from_utf8_lossy(&entry.data).into_owned()
                        }
                        "postinst" => {
                            package.scripts.postinst =
                                String::from_utf8_lossy(&entry.data).into_owned()
                        }
                        "prerm" => {
                            package.scripts.prerm =
                                String::from_utf8_lossy(&entry.data).into_owned()
                        }
                        "postrm" => {
                            package.scripts.postrm =
                                String::from_utf8_lossy(&entry.data).into_owned()
                        }
                        "config" => {
                            package.scripts.config =
                                String::from_utf8_lossy(&entry.data).into_owned()
                        }
                        _ => {
                            if !name.starts_with('.') {
                                package.extra_control_files.insert(name, entry.data);
                            }
                        }
                    }
                }
            } else if member.name.starts_with("data.tar") {
                for entry in read_inner_entries(&member.name, &member.data)? {
                    let dest_path = format!("/{}", entry.path).replace("//", "/");

                    package.files.push(PayloadFile {
                        dest_path,
                        mode: entry.mode,
                        data: entry.data,
                        is_conffile: false,
                        mtime: entry.mtime,
                    });
                }
            }
        }

        if !saw_control_file {
            return Err(RepoError::ControlFileMissing);
        }

        for file in package.files.iter_mut() {
            if conffile_paths.contains(&file.dest_path) {
                file.is_conffile = true;
            }
        }

        package.parsed_digest = Some(package.digest());
        package.file_sha256 = Some(hex::encode(Sha256::digest(data)));

        Ok(package)
    }

    /// Serialize this package to `.deb` bytes using the current time for
    /// archive members.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mtime = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.to_bytes_at(mtime)
    }

    /// Serialize this package to `.deb` bytes with an explicit member
    /// modification time, making the archive framing deterministic.
    pub fn to_bytes_at(&self, mtime: u64) -> Result<Vec<u8>> {
        // The data archive is built first so payload checksums exist when
        // the control archive is assembled.
        let mut md5sums: Vec<(String, String)> = vec![];

        let data_members = self
            .files
            .iter()
            .map(|f| {
                let digest = Md5::digest(&f.data);
                md5sums.push((
                    f.dest_path.trim_start_matches('/').to_string(),
                    hex::encode(digest),
                ));

                TarMember {
                    path: f.dest_path.trim_start_matches('/').to_string(),
                    mode: f.mode,
                    mtime: if f.mtime == 0 { mtime } else { f.mtime },
                    data: &f.data,
                }
            })
            .collect::<Vec<_>>();

        let data_tar_gz = build_inner_tar_gz(&data_members)?;

        let control_text = self.control_text();

        md5sums.sort_by(|a, b| a.0.cmp(&b.0));
        let md5sums_text = md5sums
            .iter()
            .map(|(path, digest)| format!("{}  {}\n", digest, path))
            .collect::<String>();

        let conffiles = self
            .files
            .iter()
            .filter(|f| f.is_conffile)
            .map(|f| f.dest_path.as_str())
            .collect::<Vec<_>>();
        let conffiles_text = if conffiles.is_empty() {
            None
        } else {
            Some(format!("{}\n", conffiles.join("\n")))
        };

        let mut control_members = vec![TarMember {
            path: CONTROL_FILE_CONTROL.to_string(),
            mode: 0o644,
            mtime,
            data: control_text.as_bytes(),
        }];

        control_members.push(TarMember {
            path: CONTROL_FILE_MD5SUMS.to_string(),
            mode: 0o644,
            mtime,
            data: md5sums_text.as_bytes(),
        });

        if let Some(text) = conffiles_text.as_deref() {
            control_members.push(TarMember {
                path: CONTROL_FILE_CONFFILES.to_string(),
                mode: 0o644,
                mtime,
                data: text.as_bytes(),
            });
        }

        for (name, body) in self.scripts.iter_named() {
            if !body.is_empty() {
                control_members.push(TarMember {
                    path: name.to_string(),
                    mode: 0o755,
                    mtime,
                    data: body.as_bytes(),
                });
            }
        }

        for (name, body) in &self.extra_control_files {
            if RESERVED_CONTROL_FILES.contains(&name.as_str()) || body.is_empty() {
                continue;
            }

            control_members.push(TarMember {
                path: name.clone(),
                mode: 0o644,
                mtime,
                data: body,
            });
        }

        let control_tar_gz = build_inner_tar_gz(&control_members)?;

        let mut out = vec![];
        write_deb_archive(&mut out, &control_tar_gz, &data_tar_gz, mtime)?;

        Ok(out)
    }

    /// Serialize this package to a writer. See [Self::to_bytes].
    pub fn write_to<W: std::io::Write>(&self, writer: &mut W) -> Result<u64> {
        let data = self.to_bytes()?;
        writer.write_all(&data)?;

        Ok(data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn name_validation() {
        assert!(validate_package_name("hello").is_ok());
        assert!(validate_package_name("libstdc++6").is_ok());
        assert!(validate_package_name("0ad").is_ok());
        assert!(validate_package_name("x").is_err());
        assert!(validate_package_name("+x").is_err());
        assert!(validate_package_name("Hello").is_err());
        assert!(validate_package_name("foo_bar").is_err());
    }

    #[test]
    fn mint_from_scratch_round_trip() -> Result<()> {
        let p = hello_package();
        assert_eq!(p.standard_filename(), "hello_1.0-1_amd64.deb");

        let bytes = p.to_bytes()?;
        let parsed = Package::parse_bytes(&bytes)?;

        assert_eq!(parsed.metadata.name, "hello");
        assert_eq!(parsed.metadata.version, "1.0-1");
        assert_eq!(parsed.metadata.architecture, "amd64");
        assert_eq!(parsed.metadata.maintainer, "Dev <d@e>");
        assert_eq!(parsed.metadata.description, "Greets");
        assert_eq!(parsed.files.len(), 1);
        assert_eq!(parsed.files[0].dest_path, "/usr/bin/hello");
        assert_eq!(parsed.files[0].mode & 0o777, 0o755);
        assert_eq!(parsed.files[0].data, b"#!/bin/sh\necho hi\n");

        // 18 payload bytes round up to 1 KiB.
        assert_eq!(parsed.installed_size_kib(), 1);
        assert_eq!(parsed.standard_filename(), "hello_1.0-1_amd64.deb");

        Ok(())
    }

    #[test]
    fn parse_records_digests() -> Result<()> {
        let bytes = hello_package().to_bytes()?;
        let parsed = Package::parse_bytes(&bytes)?;

        assert_eq!(parsed.parsed_digest(), Some(parsed.digest().as_str()));
        assert_eq!(
            parsed.file_sha256(),
            Some(hex::encode(Sha256::digest(&bytes)).as_str())
        );

        Ok(())
    }

    #[test]
    fn digest_survives_serialization() -> Result<()> {
        let p = hello_package();
        let parsed = Package::parse_bytes(&p.to_bytes()?)?;

        assert_eq!(p.digest(), parsed.digest());

        Ok(())
    }

    #[test]
    fn digest_ignores_mtime_and_framing() -> Result<()> {
        let p = hello_package();

        let mut other = p.clone();
        other.files[0].mtime = 1234567;

        assert_eq!(p.digest(), other.digest());

        // Different archive write times do not change the parsed digest.
        let a = Package::parse_bytes(&p.to_bytes_at(1000)?)?;
        let b = Package::parse_bytes(&p.to_bytes_at(2000)?)?;
        assert_eq!(a.digest(), b.digest());

        Ok(())
    }

    #[test]
    fn digest_is_sensitive_to_payload() {
        let p = hello_package();

        let mut other = p.clone();
        other.files[0].data[0] ^= 1;

        assert_ne!(p.digest(), other.digest());
    }

    #[test]
    fn digest_ignores_supplied_installed_size() {
        let mut p = hello_package();
        let digest = p.digest();

        p.set("Installed-Size", "99999");

        assert_eq!(p.digest(), digest);
    }

    #[test]
    fn control_text_shape() {
        let mut p = hello_package();
        p.metadata.depends = vec!["libc6".to_string(), "git".to_string()];
        p.metadata.section = "utils".to_string();
        p.metadata
            .extra_fields
            .insert("Bugs".to_string(), "mailto:d@e".to_string());

        let text = p.control_text();

        assert_eq!(
            text,
            "Package: hello\nVersion: 1.0-1\nArchitecture: amd64\nMaintainer: Dev <d@e>\nInstalled-Size: 1\nSection: utils\nDepends: libc6, git\nBugs: mailto:d@e\nDescription: Greets\n"
        );
    }

    #[test]
    fn description_blank_line_encoding() -> Result<()> {
        let mut p = hello_package();
        p.metadata.description = "Synopsis\nbody one\n\nbody two".to_string();

        let text = p.control_text();
        assert!(text.ends_with("Description: Synopsis\n body one\n .\n body two\n"));

        let parsed = Package::parse_bytes(&p.to_bytes()?)?;
        assert_eq!(parsed.metadata.description, "Synopsis\nbody one\n\nbody two");
        assert_eq!(parsed.digest(), p.digest());

        Ok(())
    }

    #[test]
    fn empty_payload_package() -> Result<()> {
        let mut p = Package::new("empty-pkg", "1.0", "all")?;
        p.metadata.maintainer = "Dev <d@e>".to_string();

        assert_eq!(p.installed_size_kib(), 0);
        assert!(p.control_text().contains("Installed-Size: 0\n"));

        let bytes = p.to_bytes()?;
        let parsed = Package::parse_bytes(&bytes)?;

        assert!(parsed.files.is_empty());
        assert_eq!(parsed.digest(), p.digest());

        // The conffiles member must be absent.
        for member in ArchiveMembers::new(std::io::Cursor::new(bytes.as_slice())) {
            let member = member?;
            if member.name.starts_with("control.tar") {
                let names = read_inner_entries(&member.name, &member.data)?
                    .into_iter()
                    .map(|e| e.path)
                    .collect::<Vec<_>>();
                assert!(!names.contains(&"conffiles".to_string()));
            }
        }

        Ok(())
    }

    #[test]
    fn single_conffile_emission() -> Result<()> {
        let mut p = hello_package();
        p.files.push(PayloadFile {
            dest_path: "/etc/hello.conf".to_string(),
            mode: 0o644,
            data: b"greeting=hi\n".to_vec(),
            is_conffile: true,
            mtime: 0,
        });

        let bytes = p.to_bytes()?;

        let mut conffiles_body = None;
        for member in ArchiveMembers::new(std::io::Cursor::new(bytes.as_slice())) {
            let member = member?;
            if member.name.starts_with("control.tar") {
                for entry in read_inner_entries(&member.name, &member.data)? {
                    if entry.path == "conffiles" {
                        conffiles_body = Some(entry.data);
                    }
                }
            }
        }

        assert_eq!(conffiles_body.as_deref(), Some(b"/etc/hello.conf\n".as_ref()));

        // The flag survives a round trip.
        let parsed = Package::parse_bytes(&bytes)?;
        let conf = parsed
            .files
            .iter()
            .find(|f| f.dest_path == "/etc/hello.conf")
            .unwrap();
        assert!(conf.is_conffile);
        assert!(!parsed
            .files
            .iter()
            .find(|f| f.dest_path == "/usr/bin/hello")
            .unwrap()
            .is_conffile);
        assert_eq!(parsed.digest(), p.digest());

        Ok(())
    }

    #[test]
    fn md5sums_are_sorted_by_path() -> Result<()> {
        let mut p = hello_package();
        p.files.insert(
            0,
            PayloadFile {
                dest_path: "/usr/share/z".to_string(),
                mode: 0o644,
                data: b"z".to_vec(),
                is_conffile: false,
                mtime: 0,
            },
        );
        p.files.push(PayloadFile {
            dest_path: "/usr/share/a".to_string(),
            mode: 0o644,
            data: b"a".to_vec(),
            is_conffile: false,
            mtime: 0,
        });

        let bytes = p.to_bytes()?;

        for member in ArchiveMembers::new(std::io::Cursor::new(bytes.as_slice())) {
            let member = member?;
            if member.name.starts_with("control.tar") {
                for entry in read_inner_entries(&member.name, &member.data)? {
                    if entry.path == "md5sums" {
                        let text = String::from_utf8(entry.data).unwrap();
                        let paths = text
                            .lines()
                            .map(|l| l.split("  ").nth(1).unwrap().to_string())
                            .collect::<Vec<_>>();
                        assert_eq!(paths, vec!["usr/bin/hello", "usr/share/a", "usr/share/z"]);
                    }
                }
            }
        }

        Ok(())
    }

    #[test]
    fn set_routes_unknown_keys_to_extra_fields() {
        let mut p = hello_package();

        p.set("Depends", "libc6 , git,,");
        assert_eq!(p.metadata.depends, vec!["libc6", "git"]);

        p.set("X-Custom", "value");
        assert_eq!(p.metadata.extra_fields.get("X-Custom").unwrap(), "value");

        p.set("Essential", "yes");
        assert!(p.metadata.essential);
        p.set("Essential", "no");
        assert!(!p.metadata.essential);
    }

    #[test]
    fn reserved_extra_control_files_are_skipped() -> Result<()> {
        let mut p = hello_package();
        p.extra_control_files
            .insert("control".to_string(), b"bogus".to_vec());
        p.extra_control_files
            .insert("triggers".to_string(), b"interest /usr/share\n".to_vec());

        let parsed = Package::parse_bytes(&p.to_bytes()?)?;

        assert_eq!(
            parsed.extra_control_files.get("triggers").map(|v| v.as_slice()),
            Some(b"interest /usr/share\n".as_ref())
        );
        assert!(!parsed.extra_control_files.contains_key("control"));
        assert_eq!(parsed.metadata.name, "hello");

        Ok(())
    }

    #[test]
    fn missing_control_archive_errors() {
        let mut buffer = vec![];
        {
            let mut builder = ar::Builder::new(&mut buffer);
            let data: &[u8] = b"2.0\n";
            let mut header = ar::Header::new(b"debian-binary".to_vec(), data.len() as u64);
            header.set_mode(0o644);
            builder.append(&header, data).unwrap();
        }

        assert!(matches!(
            Package::parse_bytes(&buffer),
            Err(RepoError::ControlFileMissing)
        ));
    }

    #[test]
    fn non_deb_input_is_rejected() {
        assert!(matches!(
            Package::parse_bytes(b"hello world"),
            Err(RepoError::NotADebArchive)
        ));
    }
}
