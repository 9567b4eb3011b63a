// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {std::path::PathBuf, thiserror::Error};

/// Unified error type for bundle mutation.
#[derive(Debug, Error)]
pub enum TweakError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("binary parsing error: {0}")]
    Goblin(#[from] goblin::error::Error),

    #[error("directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("{0} is not a dictionary")]
    InfoPlistNotDictionary(PathBuf),

    #[error("Info.plist key {0} is not present")]
    InfoPlistMissingKey(String),

    #[error("Info.plist key {key} is not a {expected}")]
    InfoPlistKeyType { key: String, expected: &'static str },

    #[error("unable to locate {0}; install it or set its path explicitly")]
    ToolNotFound(&'static str),

    #[error("{tool} failed: {output}")]
    ToolFailed { tool: String, output: String },

    #[error("{0} is encrypted")]
    EncryptedExecutable(PathBuf),

    #[error("tweak source {0} does not exist")]
    TweakSourceMissing(PathBuf),

    #[error("tweak name {0} is not a plain file name")]
    BadTweakName(String),

    #[error("refusing to install over {0}: not inside the bundle")]
    InstallOutsideBundle(PathBuf),

    #[error("refusing to copy {0} into itself")]
    CopyIntoSelf(PathBuf),

    #[error("image processing error: {0}")]
    Image(String),
}

#[cfg(feature = "icons")]
impl From<image::ImageError> for TweakError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}
