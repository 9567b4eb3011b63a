// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{
        error::TweakError,
        executable::{Executable, ExecutableEngine},
    },
    std::{
        cell::RefCell,
        collections::{BTreeMap, HashSet},
        path::{Path, PathBuf},
        rc::Rc,
    },
};

pub fn temp_dir() -> Result<(tempfile::TempDir, PathBuf), TweakError> {
    let td = tempfile::Builder::new()
        .prefix("bundle-tweaks-")
        .tempdir()?;
    let path = td.path().to_path_buf();

    Ok((td, path))
}

/// Write an `Info.plist` into `dir`, optionally declaring an executable.
pub fn write_info_plist(dir: &Path, executable: Option<&str>) -> Result<(), TweakError> {
    let mut dict = plist::Dictionary::new();
    dict.insert(
        "CFBundleIdentifier".to_string(),
        plist::Value::String("com.example.test".into()),
    );
    if let Some(executable) = executable {
        dict.insert(
            "CFBundleExecutable".to_string(),
            plist::Value::String(executable.into()),
        );
    }

    plist::Value::Dictionary(dict).to_file_xml(dir.join("Info.plist"))?;

    Ok(())
}

/// Create a bundle directory with an `Info.plist` and an empty executable.
pub fn make_bundle(path: &Path, executable: &str) -> Result<PathBuf, TweakError> {
    std::fs::create_dir_all(path)?;
    write_info_plist(path, Some(executable))?;
    std::fs::write(path.join(executable), b"")?;

    Ok(path.to_path_buf())
}

/// An invocation recorded by [MockEngine].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    RemoveSignature,
    Fakesign,
    Thin,
    WriteEntitlements(PathBuf),
    SignWithEntitlements(PathBuf),
    InjectLoadCommand(String),
    Persist,
}

#[derive(Debug, Default)]
struct MockState {
    encrypted: HashSet<PathBuf>,
    entitled: HashSet<PathBuf>,
    failing: HashSet<PathBuf>,
    erroring: HashSet<PathBuf>,
    calls: Vec<(PathBuf, Call)>,
    persisted: BTreeMap<PathBuf, Vec<String>>,
}

/// An [ExecutableEngine] that records calls instead of touching binaries.
#[derive(Clone, Debug, Default)]
pub struct MockEngine {
    state: Rc<RefCell<MockState>>,
}

impl MockEngine {
    /// Report the executable at `path` as encrypted.
    pub fn set_encrypted(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().encrypted.insert(path.into());
    }

    /// Give the executable at `path` entitlements.
    pub fn set_entitled(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().entitled.insert(path.into());
    }

    /// Make fakesign and thin report failure for `path`.
    pub fn set_failing(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().failing.insert(path.into());
    }

    /// Make every capability return an error for `path`.
    pub fn set_erroring(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().erroring.insert(path.into());
    }

    /// Calls recorded against one executable, in order.
    pub fn calls(&self, path: &Path) -> Vec<Call> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Executables a given call was recorded against, in order.
    pub fn paths_with(&self, call: &Call) -> Vec<PathBuf> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|(_, c)| c == call)
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Load command references persisted to an executable.
    pub fn persisted(&self, path: &Path) -> Vec<String> {
        self.state
            .borrow()
            .persisted
            .get(path)
            .cloned()
            .unwrap_or_default()
    }

    /// Every persisted load command reference across all executables.
    pub fn all_persisted(&self) -> Vec<String> {
        self.state
            .borrow()
            .persisted
            .values()
            .flatten()
            .cloned()
            .collect()
    }
}

impl ExecutableEngine for MockEngine {
    type Executable = MockExecutable;

    fn open(&self, path: PathBuf) -> Result<Self::Executable, TweakError> {
        Ok(MockExecutable {
            path,
            state: self.state.clone(),
            pending: vec![],
        })
    }
}

pub struct MockExecutable {
    path: PathBuf,
    state: Rc<RefCell<MockState>>,
    pending: Vec<String>,
}

impl MockExecutable {
    fn record(&self, call: Call) -> Result<(), TweakError> {
        let mut state = self.state.borrow_mut();
        state.calls.push((self.path.clone(), call));

        if state.erroring.contains(&self.path) {
            Err(TweakError::ToolFailed {
                tool: "mock".to_string(),
                output: format!("{} is set to error", self.path.display()),
            })
        } else {
            Ok(())
        }
    }

    fn succeeds(&self) -> bool {
        !self.state.borrow().failing.contains(&self.path)
    }
}

impl Executable for MockExecutable {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_encrypted(&self) -> Result<bool, TweakError> {
        Ok(self.state.borrow().encrypted.contains(&self.path))
    }

    fn remove_signature(&mut self) -> Result<(), TweakError> {
        self.record(Call::RemoveSignature)
    }

    fn fakesign(&mut self) -> Result<bool, TweakError> {
        self.record(Call::Fakesign)?;

        Ok(self.succeeds())
    }

    fn thin(&mut self) -> Result<bool, TweakError> {
        self.record(Call::Thin)?;

        Ok(self.succeeds())
    }

    fn write_entitlements(&mut self, dest: &Path) -> Result<bool, TweakError> {
        self.record(Call::WriteEntitlements(dest.to_path_buf()))?;

        if self.state.borrow().entitled.contains(&self.path) {
            std::fs::write(dest, b"<plist/>")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn sign_with_entitlements(&mut self, entitlements: &Path) -> Result<(), TweakError> {
        assert!(
            self.pending.is_empty(),
            "signing with unpersisted load commands"
        );
        self.record(Call::SignWithEntitlements(entitlements.to_path_buf()))
    }

    fn inject_load_command(&mut self, reference: &str) -> Result<(), TweakError> {
        self.record(Call::InjectLoadCommand(reference.to_string()))?;
        self.pending.push(reference.to_string());

        Ok(())
    }

    fn persist(&mut self) -> Result<(), TweakError> {
        self.record(Call::Persist)?;

        let pending = std::mem::take(&mut self.pending);
        self.state
            .borrow_mut()
            .persisted
            .entry(self.path.clone())
            .or_default()
            .extend(pending);

        Ok(())
    }
}
