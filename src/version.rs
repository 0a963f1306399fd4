//! Debian package version ordering.
//!
//! A version is `[epoch:]upstream[-revision]`. Epochs compare numerically;
//! upstream and revision compare with the dpkg algorithm, where `~` sorts
//! before anything (even the end of the string), letters sort before other
//! characters, and runs of digits compare as numbers.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone)]
pub struct DebVersion<'a> {
    epoch: u64,
    upstream: &'a str,
    revision: &'a str,
}

impl<'a> DebVersion<'a> {
    pub fn parse(value: &'a str) -> Self {
        let value = value.trim();
        let (epoch, rest) = match value.split_once(':') {
            Some((epoch, rest))
                if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) =>
            {
                (epoch.parse().unwrap_or(u64::MAX), rest)
            }
            _ => (0, value),
        };
        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, revision),
            None => (rest, ""),
        };
        Self {
            epoch,
            upstream,
            revision,
        }
    }
}

impl Ord for DebVersion<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_part(self.upstream, other.upstream))
            .then_with(|| compare_part(self.revision, other.revision))
    }
}

impl PartialEq for DebVersion<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DebVersion<'_> {}

impl PartialOrd for DebVersion<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DebVersion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if !self.revision.is_empty() {
            write!(f, "-{}", self.revision)?;
        }
        Ok(())
    }
}

/// Compares two version strings under Debian ordering.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    DebVersion::parse(left).cmp(&DebVersion::parse(right))
}

fn char_weight(ch: Option<u8>) -> i32 {
    match ch {
        None => 0,
        Some(b'~') => -1,
        Some(ch) if ch.is_ascii_digit() => 0,
        Some(ch) if ch.is_ascii_alphabetic() => i32::from(ch),
        Some(ch) => i32::from(ch) + 256,
    }
}

fn compare_part(left: &str, right: &str) -> Ordering {
    let left = left.as_bytes();
    let right = right.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    while i < left.len() || j < right.len() {
        while (i < left.len() && !left[i].is_ascii_digit())
            || (j < right.len() && !right[j].is_ascii_digit())
        {
            let lw = char_weight(left.get(i).copied().filter(|b| !b.is_ascii_digit()));
            let rw = char_weight(right.get(j).copied().filter(|b| !b.is_ascii_digit()));
            if lw != rw {
                return lw.cmp(&rw);
            }
            if i < left.len() && !left[i].is_ascii_digit() {
                i += 1;
            }
            if j < right.len() && !right[j].is_ascii_digit() {
                j += 1;
            }
        }

        while i < left.len() && left[i] == b'0' {
            i += 1;
        }
        while j < right.len() && right[j] == b'0' {
            j += 1;
        }

        let mut first_diff = Ordering::Equal;
        while i < left.len()
            && left[i].is_ascii_digit()
            && j < right.len()
            && right[j].is_ascii_digit()
        {
            if first_diff == Ordering::Equal {
                first_diff = left[i].cmp(&right[j]);
            }
            i += 1;
            j += 1;
        }
        if i < left.len() && left[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < right.len() && right[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lt(left: &str, right: &str) {
        assert_eq!(compare_versions(left, right), Ordering::Less, "{left} < {right}");
        assert_eq!(compare_versions(right, left), Ordering::Greater, "{right} > {left}");
    }

    #[test]
    fn numeric_runs() {
        lt("1.2", "1.10");
        lt("1.9", "1.10");
        lt("1.10", "2.0");
        lt("1.0", "1.0.1");
    }

    #[test]
    fn tilde_sorts_first() {
        lt("1.0~rc1", "1.0");
        lt("1.0~~", "1.0~");
        lt("1.0~rc1", "1.0~rc2");
    }

    #[test]
    fn letters_before_symbols() {
        lt("1.0a", "1.0+");
        lt("1.0", "1.0a");
        lt("1.0+b1", "1.0.1");
    }

    #[test]
    fn epoch_dominates() {
        lt("9.9", "1:0.1");
        lt("1:1.0", "2:0.1");
    }

    #[test]
    fn revision_compared_last() {
        lt("1.0-1", "1.0-2");
        lt("1.0-2", "1.0-10");
        lt("1.0-9", "1.1-1");
        lt("1.2-3-1", "1.2-3-2");
    }

    #[test]
    fn equal_forms() {
        assert_eq!(compare_versions("1.0", "1.0-0"), Ordering::Equal);
        assert_eq!(compare_versions("0:1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn parts_split() {
        let version = DebVersion::parse("2:1.4.2-3ubuntu1");
        assert_eq!(version.epoch, 2);
        assert_eq!(version.upstream, "1.4.2");
        assert_eq!(version.revision, "3ubuntu1");
        assert_eq!(version.to_string(), "2:1.4.2-3ubuntu1");
    }
}
