// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Discovery of executable-bearing artifacts nested in a bundle.

use {
    crate::{
        error::TweakError,
        info_plist::InfoPlist,
        tweaks::{APPEX_SUFFIX, DYLIB_SUFFIX, FRAMEWORK_SUFFIX},
    },
    std::path::{Path, PathBuf},
};

/// Directories directly under a bundle root that hold app extensions.
pub const EXTENSION_DIRS: [&str; 2] = ["Extensions", "PlugIns"];

/// A nested artifact carrying a Mach-O executable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Artifact {
    /// A `.dylib` file. The artifact is the executable.
    DynamicLibrary(PathBuf),
    /// An `.appex` bundle. Its `Info.plist` names the executable.
    Extension(PathBuf),
    /// A `.framework` bundle. Its `Info.plist` names the executable.
    Framework(PathBuf),
}

impl Artifact {
    /// Classify a filesystem path.
    ///
    /// Returns `None` if the path is not an artifact.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();

        if name.ends_with(DYLIB_SUFFIX) && path.is_file() {
            Some(Self::DynamicLibrary(path.to_path_buf()))
        } else if name.ends_with(APPEX_SUFFIX) && path.is_dir() {
            Some(Self::Extension(path.to_path_buf()))
        } else if name.ends_with(FRAMEWORK_SUFFIX) && path.is_dir() {
            Some(Self::Framework(path.to_path_buf()))
        } else {
            None
        }
    }

    /// Path of the artifact itself.
    pub fn path(&self) -> &Path {
        match self {
            Self::DynamicLibrary(p) | Self::Extension(p) | Self::Framework(p) => p,
        }
    }

    /// Resolve the path of the Mach-O executable this artifact carries.
    ///
    /// Bundle artifacts must have a readable `Info.plist` declaring
    /// `CFBundleExecutable`. Errors otherwise.
    pub fn executable_path(&self) -> Result<PathBuf, TweakError> {
        match self {
            Self::DynamicLibrary(path) => Ok(path.clone()),
            Self::Extension(path) | Self::Framework(path) => {
                let info = InfoPlist::from_bundle_root(path)?;

                Ok(path.join(info.executable_name()?))
            }
        }
    }
}

/// Recursively find all dynamic libraries, extensions and frameworks under `root`.
///
/// The root itself is never emitted. Order is deterministic for a given
/// filesystem state.
pub fn enumerate_artifacts(root: &Path) -> Result<Vec<Artifact>, TweakError> {
    let mut res = vec![];

    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;

        if let Some(artifact) = Artifact::from_path(entry.path()) {
            res.push(artifact);
        }
    }

    Ok(res)
}

fn child_extensions(dir: &Path) -> Result<Vec<PathBuf>, TweakError> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }

    let mut res = vec![];
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if matches!(Artifact::from_path(&path), Some(Artifact::Extension(_))) {
            res.push(path);
        }
    }

    res.sort();

    Ok(res)
}

/// Find extensions directly inside `Extensions/` and `PlugIns/`.
///
/// Nothing deeper is searched, so extensions of a nested watch app are
/// never returned.
pub fn injectable_extensions(root: &Path) -> Result<Vec<PathBuf>, TweakError> {
    let mut res = vec![];

    for dir in EXTENSION_DIRS {
        res.extend(child_extensions(&root.join(dir))?);
    }

    Ok(res)
}

/// Find extensions exactly one directory below the bundle root (`<root>/*/*.appex`).
pub fn top_level_extensions(root: &Path) -> Result<Vec<PathBuf>, TweakError> {
    let mut dirs = vec![];
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();

        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();

    let mut res = vec![];
    for dir in dirs {
        res.extend(child_extensions(&dir)?);
    }

    Ok(res)
}

/// Lazily computed list of a bundle's artifacts.
///
/// The list is computed on first access and never recomputed. Any operation
/// adding or removing nested artifacts must run before the first access,
/// otherwise later sweeps operate on a stale list.
#[derive(Clone, Debug, Default)]
pub struct ArtifactCache {
    artifacts: Option<Vec<Artifact>>,
}

impl ArtifactCache {
    /// Whether the list has been computed.
    pub fn is_populated(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Obtain the artifacts of the bundle at `root`, computing them on first call.
    pub fn get_or_populate(&mut self, root: &Path) -> Result<&[Artifact], TweakError> {
        if self.artifacts.is_none() {
            self.artifacts = Some(enumerate_artifacts(root)?);
        }

        Ok(self.artifacts.as_deref().unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::testutil::*,
        std::fs::{create_dir_all, write},
    };

    fn relative(root: &Path, artifacts: &[Artifact]) -> Vec<String> {
        artifacts
            .iter()
            .map(|a| {
                a.path()
                    .strip_prefix(root)
                    .expect("artifact under root")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn enumerate_nested() -> anyhow::Result<()> {
        let (_temp, td) = temp_dir()?;
        let root = td.join("MyApp.app");

        create_dir_all(root.join("Frameworks/Foo.framework"))?;
        write(root.join("Frameworks/libbar.dylib"), b"")?;
        write(root.join("Frameworks/Foo.framework/libinner.dylib"), b"")?;
        create_dir_all(root.join("PlugIns/Share.appex"))?;
        write(root.join("PlugIns/Share.appex/libshare.dylib"), b"")?;
        write(root.join("Info.plist"), b"")?;
        // A directory named like a dylib is not an artifact.
        create_dir_all(root.join("odd.dylib"))?;

        let artifacts = enumerate_artifacts(&root)?;
        assert_eq!(
            relative(&root, &artifacts),
            vec![
                "Frameworks/Foo.framework",
                "Frameworks/Foo.framework/libinner.dylib",
                "Frameworks/libbar.dylib",
                "PlugIns/Share.appex",
                "PlugIns/Share.appex/libshare.dylib",
            ]
        );
        assert!(matches!(artifacts[0], Artifact::Framework(_)));
        assert!(matches!(artifacts[2], Artifact::DynamicLibrary(_)));
        assert!(matches!(artifacts[3], Artifact::Extension(_)));

        // Deterministic.
        assert_eq!(enumerate_artifacts(&root)?, artifacts);

        Ok(())
    }

    #[test]
    fn executable_resolution() -> anyhow::Result<()> {
        let (_temp, td) = temp_dir()?;

        let dylib = td.join("a.dylib");
        write(&dylib, b"")?;
        assert_eq!(
            Artifact::DynamicLibrary(dylib.clone()).executable_path()?,
            dylib
        );

        let appex = td.join("B.appex");
        create_dir_all(&appex)?;
        write_info_plist(&appex, Some("B"))?;
        assert_eq!(
            Artifact::Extension(appex.clone()).executable_path()?,
            appex.join("B")
        );

        let framework = td.join("C.framework");
        create_dir_all(&framework)?;
        assert!(Artifact::Framework(framework.clone())
            .executable_path()
            .is_err());

        write_info_plist(&framework, None)?;
        assert!(matches!(
            Artifact::Framework(framework).executable_path(),
            Err(TweakError::InfoPlistMissingKey(_))
        ));

        Ok(())
    }

    #[test]
    fn extension_queries() -> anyhow::Result<()> {
        let (_temp, td) = temp_dir()?;
        let root = td.join("MyApp.app");

        create_dir_all(root.join("PlugIns/B.appex"))?;
        create_dir_all(root.join("PlugIns/A.appex"))?;
        create_dir_all(root.join("Extensions/C.appex"))?;
        create_dir_all(root.join("Other/D.appex"))?;
        create_dir_all(root.join("Watch/W.app/PlugIns/WK.appex"))?;
        write(root.join("PlugIns/E.appex.txt"), b"")?;

        let injectable = injectable_extensions(&root)?
            .into_iter()
            .map(|p| p.strip_prefix(&root).map(|x| x.to_path_buf()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            injectable,
            vec![
                PathBuf::from("Extensions/C.appex"),
                PathBuf::from("PlugIns/A.appex"),
                PathBuf::from("PlugIns/B.appex"),
            ]
        );

        let top = top_level_extensions(&root)?
            .into_iter()
            .map(|p| p.strip_prefix(&root).map(|x| x.to_path_buf()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(
            top,
            vec![
                PathBuf::from("Extensions/C.appex"),
                PathBuf::from("Other/D.appex"),
                PathBuf::from("PlugIns/A.appex"),
                PathBuf::from("PlugIns/B.appex"),
            ]
        );

        // Bundles without extension directories have none.
        let empty = td.join("Empty.app");
        create_dir_all(&empty)?;
        assert!(injectable_extensions(&empty)?.is_empty());
        assert!(top_level_extensions(&empty)?.is_empty());

        Ok(())
    }

    #[test]
    fn cache_is_computed_once() -> anyhow::Result<()> {
        let (_temp, td) = temp_dir()?;
        write(td.join("a.dylib"), b"")?;

        let mut cache = ArtifactCache::default();
        assert!(!cache.is_populated());

        let first = cache.get_or_populate(&td)?.to_vec();
        assert_eq!(first.len(), 1);
        assert!(cache.is_populated());

        write(td.join("b.dylib"), b"")?;
        assert_eq!(cache.get_or_populate(&td)?, first.as_slice());
        assert_eq!(enumerate_artifacts(&td)?.len(), 2);

        Ok(())
    }
}
