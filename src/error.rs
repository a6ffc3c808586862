// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("PGP error: {0:?}")]
    Pgp(#[from] pgp::errors::Error),

    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("I/O error on path {0}: {1:?}")]
    IoPath(String, std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("input is not a .deb archive")]
    NotADebArchive,

    #[error("malformed .deb container: {0}")]
    MalformedContainer(String),

    #[error("malformed archive inside .deb member: {0}")]
    MalformedInnerArchive(String),

    #[error("unsupported compression in .deb member: {0}")]
    UnsupportedCompression(String),

    #[error("no control file found in control.tar archive")]
    ControlFileMissing,

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("illegal package name: {0}")]
    IllegalPackageName(String),

    #[error("package {0} {1} for {2} already exists with different content")]
    ConflictDifferentContent(String, String, String),

    #[error("duplicate package during harvest: {0}")]
    DuplicateKey(String),

    #[error("supplied keyring contains no private key")]
    NoPrivateKey,

    #[error("clearsign operation failed: {0:?}")]
    SigningFailed(pgp::errors::Error),

    #[error("fetch of {url} failed: {reason}")]
    HarvestFetchFailed { url: String, reason: String },

    #[error("version string error: {0}")]
    Version(#[from] crate::package_version::VersionError),

    #[error("release asset operation failed: {0}")]
    ReleaseAsset(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, RepoError>;
