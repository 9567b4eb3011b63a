// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [Executable] implemented by invoking `ldid`, `lipo` and `insert_dylib`.

use {
    crate::{
        error::TweakError,
        executable::{Executable, ExecutableEngine},
        macho,
        settings::{Tool, ToolchainSettings},
    },
    log::{info, warn},
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Opens [ToolchainExecutable] instances sharing one [ToolchainSettings].
#[derive(Clone, Debug, Default)]
pub struct ToolchainEngine {
    settings: Arc<ToolchainSettings>,
}

impl ToolchainEngine {
    pub fn new(settings: ToolchainSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ToolchainSettings {
        &self.settings
    }
}

impl ExecutableEngine for ToolchainEngine {
    type Executable = ToolchainExecutable;

    fn open(&self, path: PathBuf) -> Result<Self::Executable, TweakError> {
        Ok(ToolchainExecutable {
            path,
            settings: self.settings.clone(),
            pending_load_commands: vec![],
        })
    }
}

/// Output of a finished tool invocation.
struct ToolOutput {
    success: bool,
    stdout: String,
}

/// A Mach-O file mutated through external tools.
#[derive(Debug)]
pub struct ToolchainExecutable {
    path: PathBuf,
    settings: Arc<ToolchainSettings>,
    pending_load_commands: Vec<String>,
}

impl ToolchainExecutable {
    /// Load command references queued but not yet persisted.
    pub fn pending_load_commands(&self) -> &[String] {
        &self.pending_load_commands
    }

    fn run(
        &self,
        tool: Tool,
        args: Vec<OsString>,
        merge_stderr: bool,
    ) -> Result<ToolOutput, TweakError> {
        let program = self.settings.resolve_tool(tool)?;

        let mut expression = duct::cmd(program, args);
        if merge_stderr {
            expression = expression.stderr_to_stdout();
        } else {
            expression = expression.stderr_capture();
        }

        let output = expression.stdout_capture().unchecked().run()?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            warn!("{} failed on {}", tool.program(), self.path.display());
            for line in stdout
                .lines()
                .chain(String::from_utf8_lossy(&output.stderr).lines())
            {
                warn!("{}", line);
            }
        }

        Ok(ToolOutput {
            success: output.status.success(),
            stdout,
        })
    }

    fn run_checked(&self, tool: Tool, args: Vec<OsString>) -> Result<String, TweakError> {
        let output = self.run(tool, args, true)?;

        if output.success {
            Ok(output.stdout)
        } else {
            Err(TweakError::ToolFailed {
                tool: tool.program().to_string(),
                output: output.stdout.trim().to_string(),
            })
        }
    }

    fn path_arg(&self) -> OsString {
        self.path.as_os_str().to_os_string()
    }
}

impl Executable for ToolchainExecutable {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_encrypted(&self) -> Result<bool, TweakError> {
        let data = std::fs::read(&self.path)?;

        macho::is_encrypted(&data)
    }

    fn remove_signature(&mut self) -> Result<(), TweakError> {
        self.run_checked(Tool::Ldid, vec!["-R".into(), self.path_arg()])?;

        Ok(())
    }

    fn fakesign(&mut self) -> Result<bool, TweakError> {
        Ok(self
            .run(
                Tool::Ldid,
                vec!["-S".into(), "-M".into(), self.path_arg()],
                true,
            )?
            .success)
    }

    fn thin(&mut self) -> Result<bool, TweakError> {
        let data = std::fs::read(&self.path)?;

        if !macho::is_universal(&data)? {
            return Ok(true);
        }

        let arch = self.settings.thin_architecture().to_string();
        let archs = macho::architectures(&data)?;
        if !archs.iter().any(|x| x == &arch) {
            warn!(
                "{} has no {} slice (found {})",
                self.path.display(),
                arch,
                archs.join(", ")
            );
            return Ok(false);
        }

        Ok(self
            .run(
                Tool::Lipo,
                vec![
                    "-thin".into(),
                    arch.into(),
                    self.path_arg(),
                    "-output".into(),
                    self.path_arg(),
                ],
                true,
            )?
            .success)
    }

    fn write_entitlements(&mut self, dest: &Path) -> Result<bool, TweakError> {
        let output = self.run(Tool::Ldid, vec!["-e".into(), self.path_arg()], false)?;

        if !output.success {
            return Err(TweakError::ToolFailed {
                tool: Tool::Ldid.program().to_string(),
                output: format!("unable to extract entitlements of {}", self.path.display()),
            });
        }

        if output.stdout.trim().is_empty() {
            return Ok(false);
        }

        std::fs::write(dest, output.stdout.as_bytes())?;

        Ok(true)
    }

    fn sign_with_entitlements(&mut self, entitlements: &Path) -> Result<(), TweakError> {
        let mut flag = OsString::from("-S");
        flag.push(entitlements.as_os_str());

        self.run_checked(Tool::Ldid, vec![flag, self.path_arg()])?;

        Ok(())
    }

    fn inject_load_command(&mut self, reference: &str) -> Result<(), TweakError> {
        if !self.pending_load_commands.iter().any(|x| x == reference) {
            self.pending_load_commands.push(reference.to_string());
        }

        Ok(())
    }

    /// References are dequeued one at a time as `insert_dylib` succeeds. On
    /// failure the failed reference and everything after it stay queued.
    fn persist(&mut self) -> Result<(), TweakError> {
        while let Some(reference) = self.pending_load_commands.first().cloned() {
            info!("adding load command {} to {}", reference, self.path.display());
            self.run_checked(
                Tool::InsertDylib,
                vec![
                    "--inplace".into(),
                    "--all-yes".into(),
                    "--no-strip-codesig".into(),
                    reference.into(),
                    self.path_arg(),
                ],
            )?;

            self.pending_load_commands.remove(0);
        }

        Ok(())
    }
}
