//! Version numbers embedded in helper artifact file names

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TRAILING_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)$").expect("static regex is valid"));

/// Integer version taken from the numeric suffix of an artifact file name
///
/// `wrapper-5.jar` is version 5. Names without a suffix rank as [`Self::LOWEST`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactVersion(pub u64);

impl ArtifactVersion {
    /// Sentinel for names without a parseable version
    pub const LOWEST: Self = Self(0);

    /// Read the digit run that ends the file stem (the name minus its last extension)
    ///
    /// Returns `None` when the stem does not end in digits or the number overflows.
    #[must_use]
    pub fn try_from_file_name(name: &str) -> Option<Self> {
        let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let stem = match file.rfind('.') {
            Some(dot) if dot > 0 => &file[..dot],
            _ => file,
        };

        TRAILING_DIGITS
            .captures(stem)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .map(Self)
    }

    /// Like [`Self::try_from_file_name`], falling back to [`Self::LOWEST`]
    #[must_use]
    pub fn from_file_name(name: &str) -> Self {
        Self::try_from_file_name(name).unwrap_or(Self::LOWEST)
    }
}

impl fmt::Display for ArtifactVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
