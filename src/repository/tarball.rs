// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Gzip-compressed tarball emission target. */

use {
    crate::error::{RepoError, Result},
    std::{
        io::{Read, Write},
        time::SystemTime,
    },
};

/// Stream named members into a gzip-compressed tar archive.
///
/// Members are written in the given order with mode 0644 and the current
/// time as modification time. The stream is either fully written or the
/// consumer observes truncation.
pub fn write_members<'a, W: Write>(
    writer: W,
    members: impl Iterator<Item = (&'a str, &'a [u8])>,
) -> Result<()> {
    let mtime = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(mtime);
        header.set_size(data.len() as u64);
        builder.append_data(&mut header, name, data)?;
    }

    builder.into_inner()?.finish()?;

    Ok(())
}

/// Read every member of a gzip-compressed tar archive into memory.
pub fn read_members<R: Read>(reader: R) -> Result<Vec<(String, Vec<u8>)>> {
    let decoder = flate2::read::GzDecoder::new(reader);
    let mut archive = tar::Archive::new(decoder);

    let mut members = vec![];

    for entry in archive
        .entries()
        .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry
            .path()
            .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();

        let mut data = vec![];
        entry
            .read_to_end(&mut data)
            .map_err(|e| RepoError::MalformedInnerArchive(e.to_string()))?;

        members.push((name, data));
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_round_trip_preserves_order() -> Result<()> {
        let members: Vec<(String, Vec<u8>)> = vec![
            ("hello_1.0-1_amd64.deb".to_string(), vec![1, 2, 3]),
            ("Packages".to_string(), b"index".to_vec()),
            ("dists/bookworm/Release".to_string(), b"release".to_vec()),
        ];

        let mut buffer = vec![];
        write_members(
            &mut buffer,
            members.iter().map(|(n, d)| (n.as_str(), d.as_slice())),
        )?;

        let read_back = read_members(std::io::Cursor::new(buffer))?;

        assert_eq!(read_back, members);

        Ok(())
    }
}
