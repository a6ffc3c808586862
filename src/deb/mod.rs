// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading and writing .deb package files.

A `.deb` file is an `ar` archive with exactly three members, in order:

1. `debian-binary`, whose body is the literal `2.0\n`.
2. `control.tar*`, a compressed tar with the control file, checksums and
   maintainer scripts.
3. `data.tar*`, a compressed tar with the payload file tree.

[reader] consumes these archives into [crate::package::Package] instances and
[builder] materializes packages back into archives.
*/

pub mod builder;
pub mod reader;

use {
    crate::error::{RepoError, Result},
    std::io::Read,
};

/// Name of the member carrying the format version.
pub const MEMBER_DEBIAN_BINARY: &str = "debian-binary";

/// Name of the gzip-compressed control member emitted by the builder.
pub const MEMBER_CONTROL_TAR_GZ: &str = "control.tar.gz";

/// Name of the gzip-compressed data member emitted by the builder.
pub const MEMBER_DATA_TAR_GZ: &str = "data.tar.gz";

/// Body of the `debian-binary` member.
pub const DEBIAN_BINARY_BODY: &[u8] = b"2.0\n";

/// The main control file inside `control.tar`.
pub const CONTROL_FILE_CONTROL: &str = "control";

/// The payload checksum list inside `control.tar`.
pub const CONTROL_FILE_MD5SUMS: &str = "md5sums";

/// The configuration file list inside `control.tar`.
pub const CONTROL_FILE_CONFFILES: &str = "conffiles";

/// Maintainer script names, in lifecycle order.
pub const MAINTAINER_SCRIPTS: [&str; 5] = ["preinst", "postinst", "prerm", "postrm", "config"];

/// Control archive filenames that are managed explicitly and can never be
/// supplied as auxiliary control files.
pub const RESERVED_CONTROL_FILES: [&str; 8] = [
    CONTROL_FILE_CONTROL,
    CONTROL_FILE_MD5SUMS,
    CONTROL_FILE_CONFFILES,
    "preinst",
    "postinst",
    "prerm",
    "postrm",
    "config",
];

/// Compression format of an inner archive member.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// No compression (plain `.tar`).
    None,

    /// Gzip compression (`.gz` extension).
    Gzip,

    /// XZ compression (`.xz` extension).
    Xz,

    /// Zstandard compression (`.zst` extension).
    Zstd,
}

impl Compression {
    /// Filename extension for members compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Xz => ".xz",
            Self::Zstd => ".zst",
        }
    }

    /// Resolve the compression for an inner member from its archive name.
    ///
    /// Member names may carry a trailing slash, which some `ar` writers
    /// append.
    pub fn from_member_name(name: &str) -> Result<Self> {
        let name = name.trim_end_matches('/');

        if name.ends_with(".tar") {
            Ok(Self::None)
        } else if name.ends_with(".tar.gz") {
            Ok(Self::Gzip)
        } else if name.ends_with(".tar.xz") {
            Ok(Self::Xz)
        } else if name.ends_with(".tar.zst") {
            Ok(Self::Zstd)
        } else {
            Err(RepoError::UnsupportedCompression(name.to_string()))
        }
    }

    /// Wrap a reader with transparent decompression for this format.
    pub fn decode<'a>(&self, reader: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(reader),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Self::Zstd => Box::new(
                zstd::stream::read::Decoder::new(reader)
                    .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?,
            ),
        })
    }
}

/// Gzip-compress a byte slice with default settings.
pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    std::io::Write::write_all(&mut encoder, data)?;

    Ok(encoder.finish()?)
}
