//! Per-entry behavior flags.
//!
//! A manifest entry carries a short string of single-letter markers, for
//! example `"gs"` or `"sd"`. Known letters map to [`Flag`]; unknown
//! alphanumeric letters are kept so they round-trip through rendering but
//! select no behavior.
use std::fmt;

use thiserror::Error;

/// A flag with post-copy behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// `g`: strip host-only keys from the copied git configuration.
    GitFilter,
    /// `s`: harden the copied path to owner-only permissions.
    Secret,
    /// `d`: with `s`, recurse into the copied directory.
    SecretDir,
}

impl Flag {
    /// Order in which post-copy effects are evaluated.
    pub const EVALUATION_ORDER: [Self; 3] = [Self::GitFilter, Self::Secret, Self::SecretDir];

    /// The marker letter for this flag.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::GitFilter => 'g',
            Self::Secret => 's',
            Self::SecretDir => 'd',
        }
    }

    /// Map a marker letter to its flag.
    #[must_use]
    pub const fn from_letter(c: char) -> Option<Self> {
        match c {
            'g' => Some(Self::GitFilter),
            's' => Some(Self::Secret),
            'd' => Some(Self::SecretDir),
            _ => None,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::GitFilter => 1,
            Self::Secret => 1 << 1,
            Self::SecretDir => 1 << 2,
        }
    }
}

/// Invalid flag strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
    /// A character outside `[A-Za-z0-9]`.
    #[error("malformed flag character {0:?}")]
    Malformed(char),
    /// A combination of known flags with no meaning.
    #[error("flag 'd' requires 's'")]
    DirectoryWithoutSecret,
}

/// Case-sensitive, order-independent set of entry flags.
///
/// ```
/// use devbox_cli::config::flags::{Flag, FlagSet};
///
/// let flags = FlagSet::parse("sgx").unwrap();
/// assert!(flags.contains(Flag::GitFilter));
/// assert!(flags.contains(Flag::Secret));
/// assert!(!flags.contains(Flag::SecretDir));
/// assert_eq!(flags.to_string(), "gsx");
/// assert!(FlagSet::parse("d").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    known: u8,
    unknown: Vec<char>,
}

impl FlagSet {
    /// Parse a flag string. Repeated letters are accepted once.
    ///
    /// # Errors
    ///
    /// Returns [`FlagError::Malformed`] for any non-alphanumeric character
    /// (including whitespace) and [`FlagError::DirectoryWithoutSecret`] for
    /// `d` without `s`.
    pub fn parse(raw: &str) -> Result<Self, FlagError> {
        let mut set = Self::default();
        for c in raw.chars() {
            if !c.is_ascii_alphanumeric() {
                return Err(FlagError::Malformed(c));
            }
            match Flag::from_letter(c) {
                Some(flag) => set.known |= flag.bit(),
                None if !set.unknown.contains(&c) => set.unknown.push(c),
                None => {}
            }
        }
        if set.contains(Flag::SecretDir) && !set.contains(Flag::Secret) {
            return Err(FlagError::DirectoryWithoutSecret);
        }
        Ok(set)
    }

    /// Whether `flag` is set.
    #[must_use]
    pub const fn contains(&self, flag: Flag) -> bool {
        self.known & flag.bit() != 0
    }

    /// Known flags in [`Flag::EVALUATION_ORDER`].
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::EVALUATION_ORDER
            .into_iter()
            .filter(|f| self.contains(*f))
    }

    /// Unknown markers, in first-seen order.
    #[must_use]
    pub fn unknown(&self) -> &[char] {
        &self.unknown
    }

    /// Whether no flag (known or unknown) is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known == 0 && self.unknown.is_empty()
    }
}

impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flag in self.iter() {
            write!(f, "{}", flag.letter())?;
        }
        for c in &self.unknown {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
