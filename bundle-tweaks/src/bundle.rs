// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mutation of application bundles.

use {
    crate::{
        artifact::{injectable_extensions, top_level_extensions, ArtifactCache, EXTENSION_DIRS},
        error::TweakError,
        executable::{Executable, ExecutableEngine, MassOperation},
        icon::{render_icons, IconRenderer},
        info_plist::{InfoPlist, KEY_ICONS, KEY_ICONS_IPAD},
        settings::InjectionSettings,
        tweaks::{framework_reference, TweakKind, TweakSet},
    },
    log::{info, warn},
    std::path::{Component, Path, PathBuf},
};

/// Entries at a bundle root holding companion watch apps.
pub const WATCH_APP_NAMES: [&str; 3] = ["Watch", "WatchKit", "com.apple.WatchPlaceholder"];

/// Result of a [MassOperation] sweep.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MassOperationReport {
    pub operation: MassOperation,
    /// Executables the operation was attempted on, including the main executable.
    pub attempted: usize,
    /// Executables the operation reported success for.
    pub succeeded: usize,
}

/// What happened when injecting into one app extension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExtensionInjection {
    /// Load commands were added. `re_signed` is true if preserved
    /// entitlements were applied afterwards.
    Injected { load_commands: usize, re_signed: bool },
    /// The extension's `Info.plist` could not be read.
    SkippedUnreadable,
    /// The extension's executable is encrypted.
    SkippedEncrypted,
    /// No tweak is a dynamic library.
    SkippedNoDynamicLibraries,
    /// A signing or injection primitive failed.
    Failed(String),
}

/// Injection outcome for one app extension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtensionReport {
    pub path: PathBuf,
    pub outcome: ExtensionInjection,
}

/// Result of [AppBundle::inject_tweaks].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InjectionReport {
    /// Load commands added to the main executable.
    pub main_load_commands: usize,
    /// Per extension outcomes. Empty unless extension injection was requested.
    pub extensions: Vec<ExtensionReport>,
}

/// An application bundle on disk whose executables can be mutated.
///
/// Nested bundles such as app extensions are opened as their own short-lived
/// instances when needed; they are not tracked by the parent.
///
/// Operations mutate the filesystem directly. Perform removals and injection
/// before the first [AppBundle::mass_operate] call: the list of nested
/// artifacts is computed once, on that first call.
pub struct AppBundle<'e, E: ExecutableEngine> {
    root: PathBuf,
    info_plist: InfoPlist,
    executable: E::Executable,
    engine: &'e E,
    artifacts: ArtifactCache,
}

impl<'e, E: ExecutableEngine> AppBundle<'e, E> {
    /// Open the bundle rooted at `path`.
    ///
    /// Errors if `Info.plist` cannot be parsed or doesn't declare `CFBundleExecutable`.
    pub fn new_from_path(path: impl AsRef<Path>, engine: &'e E) -> Result<Self, TweakError> {
        let root = path.as_ref().to_path_buf();

        let info_plist = InfoPlist::from_bundle_root(&root)?;
        let executable = engine.open(root.join(info_plist.executable_name()?))?;

        Ok(Self {
            root,
            info_plist,
            executable,
            engine,
            artifacts: ArtifactCache::default(),
        })
    }

    /// The root directory of this bundle.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn info_plist(&self) -> &InfoPlist {
        &self.info_plist
    }

    /// The main executable.
    pub fn executable(&self) -> &E::Executable {
        &self.executable
    }

    /// Whether nested artifacts have been enumerated yet.
    pub fn artifacts_enumerated(&self) -> bool {
        self.artifacts.is_populated()
    }

    fn resolve_name(&self, name: &Path) -> PathBuf {
        if name.is_absolute() || name.starts_with(&self.root) {
            name.to_path_buf()
        } else {
            self.root.join(name)
        }
    }

    fn warn_if_enumerated(&self, action: &str) {
        if self.artifacts.is_populated() {
            warn!(
                "{} after artifacts were enumerated; later sweeps use the old list",
                action
            );
        }
    }

    /// Delete entries from the bundle.
    ///
    /// Names are relative to the bundle root unless absolute. Directories are
    /// removed recursively. Absent names are ignored.
    ///
    /// Returns whether any of the names existed.
    pub fn remove(
        &mut self,
        names: impl IntoIterator<Item = impl AsRef<Path>>,
    ) -> Result<bool, TweakError> {
        let mut existed = false;

        for name in names {
            let path = self.resolve_name(name.as_ref());

            let metadata = match path.symlink_metadata() {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            self.warn_if_enumerated("removing files");

            if metadata.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }

            existed = true;
        }

        Ok(existed)
    }

    /// Remove companion watch apps.
    pub fn remove_watch_apps(&mut self) -> Result<bool, TweakError> {
        let removed = self.remove(WATCH_APP_NAMES)?;

        if removed {
            info!("removed watch app");
        } else {
            info!("watch app not present");
        }

        Ok(removed)
    }

    /// Remove the `Extensions` and `PlugIns` directories.
    pub fn remove_all_extensions(&mut self) -> Result<bool, TweakError> {
        let removed = self.remove(EXTENSION_DIRS)?;

        if removed {
            info!("removed app extensions");
        } else {
            info!("no app extensions");
        }

        Ok(removed)
    }

    /// Remove app extensions whose executables are encrypted.
    ///
    /// Extensions whose `Info.plist` can't be read, or whose encryption state
    /// can't be determined, are left in place.
    ///
    /// Returns the executable names of removed extensions.
    pub fn remove_encrypted_extensions(&mut self) -> Result<Vec<String>, TweakError> {
        let mut removed = vec![];

        for path in top_level_extensions(&self.root)? {
            let extension = match AppBundle::new_from_path(&path, self.engine) {
                Ok(bundle) => bundle,
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            match extension.executable.is_encrypted() {
                Ok(true) => {
                    self.remove([&path])?;
                    removed.push(extension.executable.display_name());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                }
            }
        }

        if removed.is_empty() {
            info!("no encrypted plugins");
        } else {
            info!("removed encrypted plugins: {}", removed.join(", "));
        }

        Ok(removed)
    }

    /// Apply an operation to the main executable and every nested artifact.
    ///
    /// Artifacts are enumerated on the first call and reused afterwards.
    /// Artifacts reporting failure are excluded from the success count but
    /// don't stop the sweep. A nested bundle without a readable `Info.plist`
    /// aborts the sweep with an error.
    pub fn mass_operate(
        &mut self,
        operation: MassOperation,
    ) -> Result<MassOperationReport, TweakError> {
        let mut attempted = 1;
        let mut succeeded = 0;

        if apply_operation(operation, &mut self.executable) {
            succeeded += 1;
        }

        for artifact in self.artifacts.get_or_populate(&self.root)? {
            let mut executable = self.engine.open(artifact.executable_path()?)?;

            attempted += 1;
            if apply_operation(operation, &mut executable) {
                succeeded += 1;
            }
        }

        info!("{} {} item(s)", operation.verb(), succeeded);

        Ok(MassOperationReport {
            operation,
            attempted,
            succeeded,
        })
    }

    /// Fake sign every executable in the bundle.
    pub fn fakesign_all(&mut self) -> Result<MassOperationReport, TweakError> {
        self.mass_operate(MassOperation::Fakesign)
    }

    /// Thin every executable in the bundle.
    pub fn thin_all(&mut self) -> Result<MassOperationReport, TweakError> {
        self.mass_operate(MassOperation::Thin)
    }

    /// Inject tweaks into the main executable and, if requested, every app extension.
    ///
    /// Failure to inject into the main executable is an error. Failures in an
    /// individual extension are recorded in the report and don't stop the others.
    pub fn inject_tweaks(
        &mut self,
        tweaks: &TweakSet,
        settings: &InjectionSettings,
    ) -> Result<InjectionReport, TweakError> {
        self.warn_if_enumerated("injecting tweaks");

        let mut report = InjectionReport {
            main_load_commands: self.inject_main(tweaks, settings)?,
            extensions: vec![],
        };

        if !settings.inject_extensions() {
            return Ok(report);
        }

        let extensions = injectable_extensions(&self.root)?;
        if extensions.is_empty() {
            info!("no app extensions found to inject into");
            return Ok(report);
        }

        for path in extensions {
            let outcome = match self.inject_into_extension(&path, tweaks, settings) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("failed to inject into {}: {}", path.display(), e);
                    ExtensionInjection::Failed(e.to_string())
                }
            };

            report.extensions.push(ExtensionReport { path, outcome });
        }

        Ok(report)
    }

    /// Install tweaks into the bundle and add load commands to the main executable.
    ///
    /// Dynamic libraries are installed per the configured path strategy.
    /// Frameworks go into `Frameworks/` and extensions into `PlugIns/`, and
    /// any other file is copied into the bundle root. Only dynamic libraries
    /// and frameworks receive load commands.
    ///
    /// Every tweak is copied before the executable is touched, so a failed
    /// copy leaves the executable's signature and load commands intact.
    /// Tweaks already at their install location are not copied.
    ///
    /// Returns the number of load commands added.
    pub fn inject_main(
        &mut self,
        tweaks: &TweakSet,
        settings: &InjectionSettings,
    ) -> Result<usize, TweakError> {
        for (_, source) in tweaks.iter() {
            if source.symlink_metadata().is_err() {
                return Err(TweakError::TweakSourceMissing(source.to_path_buf()));
            }
        }

        if self.executable.is_encrypted()? {
            return Err(TweakError::EncryptedExecutable(
                self.executable.path().to_path_buf(),
            ));
        }

        let strategy = settings.path_strategy();

        let installs = tweaks
            .iter()
            .map(|(name, source)| {
                let (dest, reference) = match TweakKind::from_name(name) {
                    TweakKind::DynamicLibrary => {
                        let dir = match strategy.dylib_install_dir() {
                            Some(dir) => self.root.join(dir),
                            None => self.root.clone(),
                        };

                        (dir.join(name), Some(strategy.main_reference(name)))
                    }
                    TweakKind::Framework => (
                        self.root.join("Frameworks").join(name),
                        Some(framework_reference(name)),
                    ),
                    TweakKind::Extension => (self.root.join("PlugIns").join(name), None),
                    TweakKind::Resource => (self.root.join(name), None),
                };

                (name, source, dest, reference)
            })
            .collect::<Vec<_>>();

        for (_, _, dest, _) in &installs {
            ensure_inside(&self.root, dest)?;
        }

        for (name, source, dest, _) in &installs {
            info!("installing {} to {}", name, dest.display());
            copy_path(source, dest)?;
        }

        let entitlements = self.root.join(settings.entitlements_file_name());

        let has_entitlements = self.executable.write_entitlements(&entitlements)?;
        self.executable.remove_signature()?;

        let mut load_commands = 0;

        for reference in installs.iter().filter_map(|(_, _, _, reference)| reference.as_ref()) {
            self.executable.inject_load_command(reference)?;
            load_commands += 1;
        }

        self.executable.persist()?;

        if has_entitlements {
            self.executable.sign_with_entitlements(&entitlements)?;
        }

        info!(
            "injected {} load command(s) into {}",
            load_commands,
            self.executable.display_name()
        );

        Ok(load_commands)
    }

    /// Inject the dynamic library tweaks into one app extension.
    ///
    /// The extension's entitlements are preserved next to its executable,
    /// its signature removed, load commands added and persisted, and the
    /// preserved entitlements re-applied. Extensions without entitlements
    /// are left unsigned.
    ///
    /// Extensions that can't be read, are encrypted, or have nothing to
    /// inject are skipped. Errors from signing or injection primitives
    /// are returned.
    pub fn inject_into_extension(
        &self,
        path: &Path,
        tweaks: &TweakSet,
        settings: &InjectionSettings,
    ) -> Result<ExtensionInjection, TweakError> {
        let name = path
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut extension = match AppBundle::new_from_path(path, self.engine) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("skipping {}: couldn't read Info.plist: {}", name, e);
                return Ok(ExtensionInjection::SkippedUnreadable);
            }
        };

        if extension.executable.is_encrypted()? {
            warn!("skipping {}: encrypted", name);
            return Ok(ExtensionInjection::SkippedEncrypted);
        }

        let dylibs = tweaks.dynamic_libraries();
        if dylibs.is_empty() {
            return Ok(ExtensionInjection::SkippedNoDynamicLibraries);
        }

        let entitlements = path.join(settings.entitlements_file_name());
        let executable = &mut extension.executable;

        let has_entitlements = executable.write_entitlements(&entitlements)?;
        executable.remove_signature()?;

        for dylib in &dylibs {
            executable.inject_load_command(&settings.path_strategy().extension_reference(dylib))?;
        }

        executable.persist()?;

        if has_entitlements {
            executable.sign_with_entitlements(&entitlements)?;
        }

        info!("injected into extension: {}", name);

        Ok(ExtensionInjection::Injected {
            load_commands: dylibs.len(),
            re_signed: has_entitlements,
        })
    }

    /// Replace the app icon with the image at `source`.
    ///
    /// `tmpdir` receives a PNG working copy. Without a renderer, nothing is
    /// changed and `Ok(None)` is returned. Otherwise the new icon asset name
    /// is returned.
    pub fn change_icon(
        &mut self,
        source: &Path,
        tmpdir: &Path,
        renderer: Option<&dyn IconRenderer>,
    ) -> Result<Option<String>, TweakError> {
        let renderer = match renderer {
            Some(renderer) => renderer,
            None => {
                warn!("no image renderer available; app icon not changed");
                return Ok(None);
            }
        };

        let assets = render_icons(renderer, source, tmpdir, &self.root)?;

        self.info_plist.merge_primary_icon(KEY_ICONS, &assets.iphone)?;
        self.info_plist
            .merge_primary_icon(KEY_ICONS_IPAD, &assets.ipad)?;
        self.info_plist.save()?;

        info!("updated app icon");

        Ok(Some(assets.id))
    }
}

fn apply_operation(operation: MassOperation, executable: &mut impl Executable) -> bool {
    match operation.apply(executable) {
        Ok(true) => true,
        Ok(false) => {
            warn!("unable to {} {}", operation, executable.path().display());
            false
        }
        Err(e) => {
            warn!("unable to {} {}: {}", operation, executable.path().display(), e);
            false
        }
    }
}

/// Require `dest` to name an entry strictly below `root`.
fn ensure_inside(root: &Path, dest: &Path) -> Result<(), TweakError> {
    let relative = dest
        .strip_prefix(root)
        .map_err(|_| TweakError::InstallOutsideBundle(dest.to_path_buf()))?;

    let mut components = relative.components().peekable();
    if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
        return Err(TweakError::InstallOutsideBundle(dest.to_path_buf()));
    }

    Ok(())
}

/// Copy a file, symlink or directory tree to `dest`, replacing whatever is there.
///
/// Nothing happens if `dest` already is `source`.
fn copy_path(source: &Path, dest: &Path) -> Result<(), TweakError> {
    let canonical_source = std::fs::canonicalize(source)?;

    if let Ok(metadata) = dest.symlink_metadata() {
        if let Ok(canonical_dest) = std::fs::canonicalize(dest) {
            if canonical_dest == canonical_source {
                info!("{} is already installed", dest.display());
                return Ok(());
            }

            if metadata.is_dir() && canonical_source.starts_with(&canonical_dest) {
                return Err(TweakError::CopyIntoSelf(source.to_path_buf()));
            }
        }

        if metadata.is_dir() {
            std::fs::remove_dir_all(dest)?;
        } else {
            std::fs::remove_file(dest)?;
        }
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;

        if source.is_dir() && std::fs::canonicalize(parent)?.starts_with(&canonical_source) {
            return Err(TweakError::CopyIntoSelf(source.to_path_buf()));
        }
    }

    if !source.is_dir() {
        std::fs::copy(source, dest)?;
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        let dest_path = dest.join(entry.path().strip_prefix(source).map_err(|_| {
            TweakError::TweakSourceMissing(entry.path().to_path_buf())
        })?);

        let file_type = entry.file_type();

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest_path)?;
        } else if file_type.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> Result<(), TweakError> {
    std::os::unix::fs::symlink(std::fs::read_link(source)?, dest)?;

    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> Result<(), TweakError> {
    if source.is_dir() {
        copy_path(source, dest)
    } else {
        std::fs::copy(source, dest)?;
        Ok(())
    }
}
