// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Reading .deb package archives. */

use {
    crate::{
        deb::Compression,
        error::{RepoError, Result},
    },
    std::io::Read,
};

/// Magic bytes at the start of the outer `ar` container.
pub const AR_MAGIC: &[u8] = b"!<arch>\n";

/// A member of the outer `ar` container.
pub struct ArchiveMember {
    /// Member name, with any trailing slash stripped.
    pub name: String,

    /// Member body bytes.
    pub data: Vec<u8>,
}

/// Iterate the members of a `.deb` outer container.
///
/// The stream must begin with the `ar` magic; [RepoError::NotADebArchive] is
/// raised otherwise. Truncated headers and other structural damage surface as
/// [RepoError::MalformedContainer].
pub struct ArchiveMembers<R: Read> {
    archive: ar::Archive<R>,
}

impl<R: Read> ArchiveMembers<R> {
    /// Create a new instance over a stream positioned at the magic bytes.
    pub fn new(reader: R) -> Self {
        Self {
            archive: ar::Archive::new(reader),
        }
    }
}

impl<R: Read> Iterator for ArchiveMembers<R> {
    type Item = Result<ArchiveMember>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.archive.next_entry()? {
            Ok(mut entry) => {
                let name = String::from_utf8_lossy(entry.header().identifier())
                    .trim_end_matches('/')
                    .to_string();

                let mut data = Vec::with_capacity(entry.header().size() as usize);
                if let Err(e) = entry.read_to_end(&mut data) {
                    return Some(Err(RepoError::MalformedContainer(e.to_string())));
                }

                Some(Ok(ArchiveMember { name, data }))
            }
            Err(e) => Some(Err(RepoError::MalformedContainer(e.to_string()))),
        }
    }
}

/// A regular file entry extracted from an inner tar archive.
pub struct InnerEntry {
    /// Entry path with any leading `./` or `/` stripped.
    pub path: String,

    /// Permission bits from the tar header.
    pub mode: u32,

    /// Modification time from the tar header, seconds since the epoch.
    pub mtime: u64,

    /// File contents.
    pub data: Vec<u8>,
}

/// Read the regular file entries of a compressed inner tar member.
///
/// Directory and link entries are skipped. The compression format is derived
/// from the member name.
pub fn read_inner_entries(member_name: &str, data: &[u8]) -> Result<Vec<InnerEntry>> {
    let compression = Compression::from_member_name(member_name)?;
    let reader = compression.decode(std::io::Cursor::new(data))?;

    let mut archive = tar::Archive::new(reader);
    let mut entries = vec![];

    for entry in archive
        .entries()
        .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let path = normalize_entry_path(&path);
        if path.is_empty() {
            continue;
        }

        let mode = entry
            .header()
            .mode()
            .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?;
        let mtime = entry
            .header()
            .mtime()
            .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?;

        let mut data = vec![];
        entry
            .read_to_end(&mut data)
            .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?;

        entries.push(InnerEntry {
            path,
            mode,
            mtime,
            data,
        });
    }

    Ok(entries)
}

/// Strip the leading `./` or `/` from a tar entry path.
pub fn normalize_entry_path(path: &str) -> String {
    path.trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

/// Verify that a byte stream begins with the `ar` container magic.
pub fn check_magic(data: &[u8]) -> Result<()> {
    if data.len() >= AR_MAGIC.len() && &data[..AR_MAGIC.len()] == AR_MAGIC {
        Ok(())
    } else {
        Err(RepoError::NotADebArchive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ar_with_members(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = vec![];
        {
            let mut builder = ar::Builder::new(&mut buffer);
            for (name, body) in members {
                let mut header = ar::Header::new(name.as_bytes().to_vec(), body.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(0);
                builder.append(&header, *body).unwrap();
            }
        }
        buffer
    }

    #[test]
    fn iterates_members_in_order() -> Result<()> {
        let data = ar_with_members(&[("debian-binary", b"2.0\n"), ("other", b"abcd")]);
        check_magic(&data)?;

        let members = ArchiveMembers::new(std::io::Cursor::new(data))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "debian-binary");
        assert_eq!(members[0].data, b"2.0\n");
        assert_eq!(members[1].name, "other");

        Ok(())
    }

    #[test]
    fn odd_sized_member_padding_is_skipped() -> Result<()> {
        // 5 byte body forces a padding byte before the next member header.
        let data = ar_with_members(&[("first", b"12345"), ("second", b"abcdef")]);

        let members = ArchiveMembers::new(std::io::Cursor::new(data))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].data, b"12345");
        assert_eq!(members[1].name, "second");
        assert_eq!(members[1].data, b"abcdef");

        Ok(())
    }

    #[test]
    fn missing_magic_is_rejected() {
        assert!(matches!(
            check_magic(b"not an archive"),
            Err(RepoError::NotADebArchive)
        ));
        assert!(matches!(check_magic(b""), Err(RepoError::NotADebArchive)));
    }

    #[test]
    fn truncated_header_is_malformed() {
        let data = ar_with_members(&[("first", b"1234567890"), ("second", b"abcdef")]);

        // Cut into the middle of the second member's 60-byte header:
        // 8 bytes of magic, 60 bytes of header, 10 bytes of body, then 10
        // bytes of the next header.
        let truncated = &data[..8 + 60 + 10 + 10];

        let result = ArchiveMembers::new(std::io::Cursor::new(truncated))
            .collect::<Result<Vec<_>>>();

        assert!(matches!(result, Err(RepoError::MalformedContainer(_))));
    }

    #[test]
    fn entry_path_normalization() {
        assert_eq!(normalize_entry_path("./usr/bin/x"), "usr/bin/x");
        assert_eq!(normalize_entry_path("/usr/bin/x"), "usr/bin/x");
        assert_eq!(normalize_entry_path("usr/bin/x"), "usr/bin/x");
        assert_eq!(normalize_entry_path("./"), "");
    }
}
