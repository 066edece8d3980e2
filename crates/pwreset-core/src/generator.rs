//! Random password generation.
//!
//! Passwords are drawn from four disjoint character classes. Every password contains at least
//! one character of each class, which satisfies the default Active Directory complexity rule
//! regardless of length.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

use crate::error::{Error, Result};

/// Shortest password that can hold one character of every class.
pub const MIN_PASSWORD_LENGTH: usize = 4;
/// Length used when nothing else is configured.
pub const DEFAULT_PASSWORD_LENGTH: usize = 8;

/// Uppercase letters.
pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
/// Lowercase letters.
pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
/// Decimal digits.
pub const DIGITS: &str = "0123456789";
/// Symbols accepted by every directory we target.
pub const SYMBOLS: &str = "!@#$%&*?";
/// Glyphs that are easily confused with one another when read aloud or copied by hand.
pub const AMBIGUOUS_GLYPHS: &str = "0Oo1lI|5S2Z8B";

const CHARACTER_CLASSES: [&str; 4] = [UPPERCASE, LOWERCASE, DIGITS, SYMBOLS];

/// Options that restrict the characters a generated password may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Remove [`AMBIGUOUS_GLYPHS`] from every class.
    pub exclude_ambiguous: bool,
    /// Never use the same character twice.
    pub exclude_duplicates: bool,
}

impl GenerationOptions {
    /// Options with no restrictions.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            exclude_ambiguous: false,
            exclude_duplicates: false,
        }
    }

    /// Enables or disables the ambiguous glyph filter.
    #[must_use]
    pub const fn with_exclude_ambiguous(mut self, exclude: bool) -> Self {
        self.exclude_ambiguous = exclude;
        self
    }

    /// Enables or disables the no-repeat rule.
    #[must_use]
    pub const fn with_exclude_duplicates(mut self, exclude: bool) -> Self {
        self.exclude_duplicates = exclude;
        self
    }
}

impl Default for GenerationOptions {
    /// Both restrictions enabled, as used for issued passwords.
    fn default() -> Self {
        Self {
            exclude_ambiguous: true,
            exclude_duplicates: true,
        }
    }
}

/// A freshly generated plaintext password.
///
/// The value is held in a [`SecretString`], so it is zeroized on drop and redacted from `Debug`.
pub struct PasswordCandidate(SecretString);

impl PasswordCandidate {
    /// Wraps an already generated password.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(SecretString::from(password.into()))
    }

    /// Borrows the plaintext.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for PasswordCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordCandidate([REDACTED])")
    }
}

/// Source of new passwords for the reset flow.
pub trait PasswordGenerator: Send + Sync {
    /// Generates a password of `length` characters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when `length` is below [`MIN_PASSWORD_LENGTH`] and
    /// [`Error::GenerationExhausted`] when duplicates are excluded and the filtered pool has
    /// fewer than `length` characters.
    fn generate(&self, length: usize, options: GenerationOptions) -> Result<PasswordCandidate>;
}

/// Generator backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPasswordGenerator;

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self, length: usize, options: GenerationOptions) -> Result<PasswordCandidate> {
        generate_with(&mut OsRng, length, options)
    }
}

/// Number of distinct characters available under `options`.
#[must_use]
pub fn pool_size(options: GenerationOptions) -> usize {
    character_classes(options).iter().map(Vec::len).sum()
}

/// Generates a password using the supplied cryptographically secure generator.
///
/// One character is taken from each class first, the remainder from the union of all classes,
/// and the result is shuffled so the mandatory characters have no fixed position.
///
/// # Errors
///
/// See [`PasswordGenerator::generate`].
pub fn generate_with<R>(
    rng: &mut R,
    length: usize,
    options: GenerationOptions,
) -> Result<PasswordCandidate>
where
    R: Rng + CryptoRng + ?Sized,
{
    if length < MIN_PASSWORD_LENGTH {
        return Err(Error::InvalidRequest(format!(
            "password length must be at least {MIN_PASSWORD_LENGTH}, got {length}"
        )));
    }

    let classes = character_classes(options);
    let available = classes.iter().map(Vec::len).sum();
    if options.exclude_duplicates && length > available {
        return Err(Error::GenerationExhausted {
            requested: length,
            available,
        });
    }

    let mut password = Vec::with_capacity(length);
    for class in &classes {
        let ch = class.choose(rng).copied().ok_or(Error::GenerationExhausted {
            requested: length,
            available,
        })?;
        password.push(ch);
    }

    let mut pool = classes.concat();
    if options.exclude_duplicates {
        pool.retain(|ch| !password.contains(ch));
    }

    while password.len() < length {
        let index = rng.gen_range(0..pool.len());
        let ch = if options.exclude_duplicates {
            pool.swap_remove(index)
        } else {
            pool[index]
        };
        password.push(ch);
    }

    password.shuffle(rng);
    Ok(PasswordCandidate::new(password.into_iter().collect::<String>()))
}

fn character_classes(options: GenerationOptions) -> [Vec<char>; 4] {
    CHARACTER_CLASSES.map(|class| {
        class
            .chars()
            .filter(|ch| !(options.exclude_ambiguous && AMBIGUOUS_GLYPHS.contains(*ch)))
            .collect()
    })
}
