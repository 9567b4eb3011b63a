// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capabilities of executables that can be mutated.

use {
    crate::error::TweakError,
    std::path::{Path, PathBuf},
};

/// A Mach-O file on disk that can be signed, thinned and injected into.
///
/// Load command edits made with [Executable::inject_load_command] are
/// accumulated and only written by [Executable::persist]. They must be
/// persisted before any signing operation runs against the file.
pub trait Executable {
    /// Filesystem path of the binary.
    fn path(&self) -> &Path;

    /// Whether any slice of the binary carries encrypted (FairPlay) content.
    fn is_encrypted(&self) -> Result<bool, TweakError>;

    /// Remove the embedded code signature.
    fn remove_signature(&mut self) -> Result<(), TweakError>;

    /// Apply an ad-hoc signature, preserving existing entitlements.
    ///
    /// Returns whether the signature was applied.
    fn fakesign(&mut self) -> Result<bool, TweakError>;

    /// Reduce the binary to a single architecture slice.
    ///
    /// Returns whether the binary is now single-architecture.
    fn thin(&mut self) -> Result<bool, TweakError>;

    /// Write the binary's entitlements to `dest`.
    ///
    /// Returns `false` if the binary has no entitlements, in which case
    /// nothing is written.
    fn write_entitlements(&mut self, dest: &Path) -> Result<bool, TweakError>;

    /// Sign the binary ad-hoc using the entitlements stored at `entitlements`.
    fn sign_with_entitlements(&mut self, entitlements: &Path) -> Result<(), TweakError>;

    /// Queue an `LC_LOAD_DYLIB` command referencing `reference`.
    fn inject_load_command(&mut self, reference: &str) -> Result<(), TweakError>;

    /// Write queued load commands to the file.
    fn persist(&mut self) -> Result<(), TweakError>;

    /// File name of the binary, used in reports.
    fn display_name(&self) -> String {
        self.path()
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path().display().to_string())
    }
}

/// Something that can open [Executable] instances for paths.
pub trait ExecutableEngine {
    type Executable: Executable;

    /// Obtain an executable handle for a path.
    ///
    /// Opening should not do any expensive work. The file does not have
    /// to be parsed until a capability is invoked.
    fn open(&self, path: PathBuf) -> Result<Self::Executable, TweakError>;
}

/// A capability applied to every executable of a bundle in one sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MassOperation {
    Fakesign,
    Thin,
}

impl MassOperation {
    /// Invoke this capability on an executable.
    pub fn apply(&self, executable: &mut impl Executable) -> Result<bool, TweakError> {
        match self {
            Self::Fakesign => executable.fakesign(),
            Self::Thin => executable.thin(),
        }
    }

    /// Past tense verb describing the operation, for reports.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Fakesign => "fakesigned",
            Self::Thin => "thinned",
        }
    }
}

impl std::fmt::Display for MassOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fakesign => "fakesign",
            Self::Thin => "thin",
        })
    }
}
