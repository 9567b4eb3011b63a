// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Settings controlling bundle mutation.

use {
    crate::{error::TweakError, tweaks::PathStrategy},
    log::info,
    std::path::PathBuf,
};

/// Default name of the file entitlements are preserved in during re-signing.
pub const DEFAULT_ENTITLEMENTS_FILE_NAME: &str = "cyan.entitlements";

/// Default architecture binaries are thinned to.
pub const DEFAULT_THIN_ARCHITECTURE: &str = "arm64";

/// Settings for tweak injection.
#[derive(Clone, Debug)]
pub struct InjectionSettings {
    path_strategy: PathStrategy,
    inject_extensions: bool,
    entitlements_file_name: String,
}

impl Default for InjectionSettings {
    fn default() -> Self {
        Self {
            path_strategy: PathStrategy::default(),
            inject_extensions: false,
            entitlements_file_name: DEFAULT_ENTITLEMENTS_FILE_NAME.to_string(),
        }
    }
}

impl InjectionSettings {
    /// How load commands reference injected dynamic libraries.
    pub fn path_strategy(&self) -> PathStrategy {
        self.path_strategy
    }

    pub fn set_path_strategy(&mut self, strategy: PathStrategy) {
        self.path_strategy = strategy;
    }

    /// Whether app extensions are injected in addition to the main executable.
    pub fn inject_extensions(&self) -> bool {
        self.inject_extensions
    }

    pub fn set_inject_extensions(&mut self, value: bool) {
        self.inject_extensions = value;
    }

    /// File name, relative to a bundle root, entitlements are preserved in.
    pub fn entitlements_file_name(&self) -> &str {
        &self.entitlements_file_name
    }

    pub fn set_entitlements_file_name(&mut self, name: impl ToString) {
        self.entitlements_file_name = name.to_string();
    }
}

/// An external program used by [crate::ToolchainEngine].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tool {
    Ldid,
    Lipo,
    InsertDylib,
}

impl Tool {
    /// Executable name searched for on `PATH`.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Ldid => "ldid",
            Self::Lipo => "lipo",
            Self::InsertDylib => "insert_dylib",
        }
    }

    /// Environment variable that overrides the tool's location.
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Ldid => "LDID",
            Self::Lipo => "LIPO",
            Self::InsertDylib => "INSERT_DYLIB",
        }
    }
}

/// Settings for the external tools backing [crate::ToolchainEngine].
#[derive(Clone, Debug)]
pub struct ToolchainSettings {
    ldid: Option<PathBuf>,
    lipo: Option<PathBuf>,
    insert_dylib: Option<PathBuf>,
    thin_architecture: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            ldid: None,
            lipo: None,
            insert_dylib: None,
            thin_architecture: DEFAULT_THIN_ARCHITECTURE.to_string(),
        }
    }
}

impl ToolchainSettings {
    /// Explicitly configured path of a tool.
    pub fn tool_path(&self, tool: Tool) -> Option<&PathBuf> {
        match tool {
            Tool::Ldid => self.ldid.as_ref(),
            Tool::Lipo => self.lipo.as_ref(),
            Tool::InsertDylib => self.insert_dylib.as_ref(),
        }
    }

    pub fn set_tool_path(&mut self, tool: Tool, path: impl Into<PathBuf>) {
        let path = Some(path.into());

        match tool {
            Tool::Ldid => self.ldid = path,
            Tool::Lipo => self.lipo = path,
            Tool::InsertDylib => self.insert_dylib = path,
        }
    }

    /// Architecture retained when thinning.
    pub fn thin_architecture(&self) -> &str {
        &self.thin_architecture
    }

    pub fn set_thin_architecture(&mut self, arch: impl ToString) {
        self.thin_architecture = arch.to_string();
    }

    /// Locate a tool.
    ///
    /// An explicitly configured path wins. Then the tool's environment variable
    /// is consulted. Finally `PATH` is searched.
    pub fn resolve_tool(&self, tool: Tool) -> Result<PathBuf, TweakError> {
        if let Some(path) = self.tool_path(tool) {
            return Ok(path.clone());
        }

        if let Ok(env) = std::env::var(tool.env_var()) {
            if !env.is_empty() {
                info!("using {} from {}", tool.program(), tool.env_var());
                return Ok(PathBuf::from(env));
            }
        }

        which::which(tool.program()).map_err(|_| TweakError::ToolNotFound(tool.program()))
    }
}
