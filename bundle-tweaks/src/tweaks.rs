// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tweaks and the load command references pointing at them.

use {
    crate::error::TweakError,
    std::{
        collections::BTreeMap,
        ffi::OsStr,
        path::{Component, Path, PathBuf},
    },
};

/// File name suffix of dynamic libraries.
pub const DYLIB_SUFFIX: &str = ".dylib";

/// File name suffix of framework bundles.
pub const FRAMEWORK_SUFFIX: &str = ".framework";

/// File name suffix of app extension bundles.
pub const APPEX_SUFFIX: &str = ".appex";

/// The kind of a tweak, derived from its file name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TweakKind {
    /// A `.dylib` file. Receives a load command.
    DynamicLibrary,
    /// A `.framework` directory. Receives a load command.
    Framework,
    /// An `.appex` bundle. Installed as a plug-in without a load command.
    Extension,
    /// Anything else. Copied into the bundle root.
    Resource,
}

impl TweakKind {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(DYLIB_SUFFIX) {
            Self::DynamicLibrary
        } else if name.ends_with(FRAMEWORK_SUFFIX) {
            Self::Framework
        } else if name.ends_with(APPEX_SUFFIX) {
            Self::Extension
        } else {
            Self::Resource
        }
    }
}

/// How injected load commands locate their dependency.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PathStrategy {
    /// Reference dependencies through the dynamic linker's run-path search list.
    ///
    /// Dynamic libraries are installed into the bundle's `Frameworks/` directory.
    #[default]
    RunPath,

    /// Reference dependencies relative to the running executable.
    ///
    /// Dynamic libraries are installed into the bundle root, next to the main
    /// executable.
    ExecutablePath,
}

impl PathStrategy {
    /// Load command reference for a dynamic library injected into the main executable.
    pub fn main_reference(&self, name: &str) -> String {
        match self {
            Self::RunPath => format!("@rpath/{}", name),
            Self::ExecutablePath => format!("@executable_path/{}", name),
        }
    }

    /// Load command reference for a dynamic library injected into an extension.
    ///
    /// Extensions live at `<root>/PlugIns/X.appex/` or `<root>/Extensions/X.appex/`,
    /// two directories below the bundle root holding the library.
    pub fn extension_reference(&self, name: &str) -> String {
        match self {
            Self::RunPath => format!("@rpath/{}", name),
            Self::ExecutablePath => format!("@executable_path/../../{}", name),
        }
    }

    /// Directory, relative to the bundle root, dynamic libraries are installed into.
    pub fn dylib_install_dir(&self) -> Option<&'static str> {
        match self {
            Self::RunPath => Some("Frameworks"),
            Self::ExecutablePath => None,
        }
    }
}

/// Load command reference for an injected framework.
///
/// `name` is the framework directory name, e.g. `Foo.framework`.
pub fn framework_reference(name: &str) -> String {
    let stem = name.strip_suffix(FRAMEWORK_SUFFIX).unwrap_or(name);

    format!("@rpath/{}/{}", name, stem)
}

/// Tweaks to inject, keyed by the file name they are installed as.
#[derive(Clone, Debug, Default)]
pub struct TweakSet {
    tweaks: BTreeMap<String, PathBuf>,
}

impl TweakSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct an instance from source paths, keyed by their file names.
    pub fn from_paths(
        paths: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Result<Self, TweakError> {
        let mut res = Self::new();

        for path in paths {
            let path = path.into();
            let name = path
                .file_name()
                .ok_or_else(|| TweakError::BadTweakName(path.display().to_string()))?
                .to_string_lossy()
                .to_string();

            res.insert(name, path)?;
        }

        Ok(res)
    }

    /// Register a tweak installed as `name` and sourced from `source`.
    ///
    /// `name` must be a bare file name. `.`, `..` and anything containing a
    /// path separator are rejected.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Result<(), TweakError> {
        let name = name.into();

        let mut components = Path::new(&name).components();
        let plain = match (components.next(), components.next()) {
            (Some(Component::Normal(x)), None) => x == OsStr::new(&name),
            _ => false,
        };

        if !plain || name.contains('/') || name.contains('\\') {
            return Err(TweakError::BadTweakName(name));
        }

        self.tweaks.insert(name, source.into());

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tweaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tweaks.is_empty()
    }

    /// Iterate over `(name, source path)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.tweaks.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }

    /// Iterate over tweaks of a given kind.
    pub fn of_kind(&self, kind: TweakKind) -> impl Iterator<Item = (&str, &Path)> {
        self.iter()
            .filter(move |(name, _)| TweakKind::from_name(name) == kind)
    }

    /// The subset of tweaks that are dynamic libraries.
    ///
    /// Only dynamic libraries are ever injected into extensions.
    pub fn dynamic_libraries(&self) -> Vec<&str> {
        self.of_kind(TweakKind::DynamicLibrary)
            .map(|(name, _)| name)
            .collect()
    }
}
