//! Identifier management using string interning for efficient string storage and comparison
//!
//! This module provides the [`Id`] type used for element ids, type names and
//! field names, and the [`IdGenerator`] trait for minting fresh element ids.

use std::{
    fmt,
    sync::{Mutex, OnceLock},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Global string interner for efficient identifier storage.
///
/// # Thread Safety
///
/// This uses `Mutex` for thread-safe access to the string interner.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn with_interner<R>(f: impl FnOnce(&mut DefaultStringInterner) -> R) -> R {
    let mut interner = INTERNER
        .get_or_init(|| Mutex::new(DefaultStringInterner::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut interner)
}

/// Efficient identifier type using string interning
///
/// Element ids, type names and field names are all `Id`s: copying and
/// comparing them is a single integer operation.
///
/// # Examples
///
/// ```
/// use armillary_core::identifier::Id;
///
/// let class_id = Id::new("AAAAAAFF+h6SjaM2Hec=");
/// let type_name = Id::new("Class");
///
/// assert_eq!(type_name, "Class");
/// assert_ne!(class_id, type_name);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(DefaultSymbol);

impl Id {
    /// Creates an `Id` from &str.
    ///
    /// # Arguments
    ///
    /// * `name` - The string representation of the identifier
    pub fn new(name: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(name)))
    }

    /// Returns the `Id` for `name` if it has been interned, without
    /// interning it.
    ///
    /// A miss means no element, type or field was ever named `name`.
    pub fn lookup(name: &str) -> Option<Self> {
        with_interner(|interner| interner.get(name)).map(Self)
    }

    /// Returns the interned string as an owned `String`.
    pub fn as_string(&self) -> String {
        with_interner(|interner| {
            interner
                .resolve(self.0)
                .map(str::to_owned)
                .unwrap_or_default()
        })
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl std::str::FromStr for Id {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Id {
    /// Creates an `Id` from a string slice
    ///
    /// This is a convenience implementation that calls `Id::new`.
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Id {
    /// Allows direct comparison with string slices: `id == "string"`
    fn eq(&self, other: &str) -> bool {
        with_interner(|interner| interner.resolve(self.0) == Some(other))
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Id::new(&name))
    }
}

/// Source of fresh, globally unique element ids.
pub trait IdGenerator {
    /// Produces an id that has never been produced by this generator before.
    fn generate(&mut self) -> Id;
}

/// Generates ids of the form `{prefix}{counter}`.
///
/// The default prefix is derived from the wall clock at construction time so
/// that two generators created in different sessions do not collide.
#[derive(Debug, Clone)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: u64,
}

impl SequentialIdGenerator {
    /// Creates a generator with an explicit prefix, starting at zero.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        Self::with_prefix(format!("{nanos:x}-"))
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&mut self) -> Id {
        let id = Id::new(&format!("{}{}", self.prefix, self.next));
        self.next += 1;
        id
    }
}
