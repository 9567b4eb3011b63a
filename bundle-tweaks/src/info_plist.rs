// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Info.plist` documents.

use {
    crate::error::TweakError,
    std::path::{Path, PathBuf},
};

/// Key holding the file name of the bundle's main executable.
pub const KEY_EXECUTABLE: &str = "CFBundleExecutable";

/// Key holding the iPhone icon declarations.
pub const KEY_ICONS: &str = "CFBundleIcons";

/// Key holding the iPad icon declarations.
pub const KEY_ICONS_IPAD: &str = "CFBundleIcons~ipad";

const KEY_PRIMARY_ICON: &str = "CFBundlePrimaryIcon";
const KEY_ICON_FILES: &str = "CFBundleIconFiles";
const KEY_ICON_NAME: &str = "CFBundleIconName";

/// Leading bytes of a binary property list.
const BINARY_PLIST_MAGIC: &[u8] = b"bplist00";

/// Serialization of a property list file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlistFormat {
    Binary,
    Xml,
}

/// A parsed `Info.plist` file bound to its location on disk.
///
/// The document is read once on construction. Mutations are held in memory
/// until [InfoPlist::save] is called, which writes the format that was read.
#[derive(Clone, Debug)]
pub struct InfoPlist {
    path: PathBuf,
    format: PlistFormat,
    dict: plist::Dictionary,
}

impl InfoPlist {
    /// Read the `Info.plist` of a bundle rooted at `root`.
    ///
    /// Frameworks with no `Info.plist` at their root are probed for
    /// `Resources/Info.plist`.
    pub fn from_bundle_root(root: &Path) -> Result<Self, TweakError> {
        let path = root.join("Info.plist");

        if path.is_file() {
            return Self::from_path(path);
        }

        let resources = root.join("Resources").join("Info.plist");
        if resources.is_file() {
            Self::from_path(resources)
        } else {
            Self::from_path(path)
        }
    }

    /// Read an `Info.plist` from an explicit path.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, TweakError> {
        let path = path.into();

        let data = std::fs::read(&path)?;
        let format = if data.starts_with(BINARY_PLIST_MAGIC) {
            PlistFormat::Binary
        } else {
            PlistFormat::Xml
        };

        let value = plist::Value::from_reader(std::io::Cursor::new(data))?;
        let dict = value
            .into_dictionary()
            .ok_or_else(|| TweakError::InfoPlistNotDictionary(path.clone()))?;

        Ok(Self { path, format, dict })
    }

    /// Path this document was read from and will be saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format the document was read in and will be saved in.
    pub fn format(&self) -> PlistFormat {
        self.format
    }

    /// The raw dictionary.
    pub fn dictionary(&self) -> &plist::Dictionary {
        &self.dict
    }

    /// Obtain a key as a string.
    ///
    /// Returns `None` if the key doesn't exist. Errors if the value is not a string.
    pub fn string(&self, key: &str) -> Result<Option<&str>, TweakError> {
        match self.dict.get(key) {
            Some(value) => Ok(Some(value.as_string().ok_or_else(|| {
                TweakError::InfoPlistKeyType {
                    key: key.to_string(),
                    expected: "string",
                }
            })?)),
            None => Ok(None),
        }
    }

    /// The declared main executable file name (`CFBundleExecutable`).
    pub fn executable_name(&self) -> Result<&str, TweakError> {
        self.string(KEY_EXECUTABLE)?
            .ok_or_else(|| TweakError::InfoPlistMissingKey(KEY_EXECUTABLE.to_string()))
    }

    /// Merge a primary icon declaration into the icon dictionary at `key`.
    ///
    /// The `CFBundlePrimaryIcon` entry is replaced. Every other entry already
    /// present under `key` is retained. A missing `key` is created.
    pub fn merge_primary_icon(&mut self, key: &str, icon: &PrimaryIcon) -> Result<(), TweakError> {
        if !self.dict.contains_key(key) {
            self.dict.insert(
                key.to_string(),
                plist::Value::Dictionary(plist::Dictionary::new()),
            );
        }

        let icons = self
            .dict
            .get_mut(key)
            .and_then(|x| x.as_dictionary_mut())
            .ok_or_else(|| TweakError::InfoPlistKeyType {
                key: key.to_string(),
                expected: "dictionary",
            })?;

        icons.insert(KEY_PRIMARY_ICON.to_string(), icon.to_value());

        Ok(())
    }

    /// Obtain the primary icon declared under an icon dictionary key.
    pub fn primary_icon(&self, key: &str) -> Result<Option<PrimaryIcon>, TweakError> {
        let icons = match self.dict.get(key) {
            Some(value) => value
                .as_dictionary()
                .ok_or_else(|| TweakError::InfoPlistKeyType {
                    key: key.to_string(),
                    expected: "dictionary",
                })?,
            None => return Ok(None),
        };

        match icons.get(KEY_PRIMARY_ICON) {
            Some(value) => Ok(Some(PrimaryIcon::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Write the document back to where it was read from.
    pub fn save(&self) -> Result<(), TweakError> {
        let value = plist::Value::Dictionary(self.dict.clone());

        match self.format {
            PlistFormat::Binary => value.to_file_binary(&self.path)?,
            PlistFormat::Xml => value.to_file_xml(&self.path)?,
        }

        Ok(())
    }
}

/// The `CFBundlePrimaryIcon` record of an icon declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrimaryIcon {
    /// Base names of icon image files (`CFBundleIconFiles`).
    pub icon_files: Vec<String>,

    /// Asset name (`CFBundleIconName`).
    pub icon_name: String,
}

impl PrimaryIcon {
    fn to_value(&self) -> plist::Value {
        let mut dict = plist::Dictionary::new();
        dict.insert(
            KEY_ICON_FILES.to_string(),
            plist::Value::Array(
                self.icon_files
                    .iter()
                    .map(|x| plist::Value::String(x.clone()))
                    .collect(),
            ),
        );
        dict.insert(
            KEY_ICON_NAME.to_string(),
            plist::Value::String(self.icon_name.clone()),
        );

        plist::Value::Dictionary(dict)
    }

    fn from_value(value: &plist::Value) -> Result<Self, TweakError> {
        let type_error = |key: &str, expected| TweakError::InfoPlistKeyType {
            key: key.to_string(),
            expected,
        };

        let dict = value
            .as_dictionary()
            .ok_or_else(|| type_error(KEY_PRIMARY_ICON, "dictionary"))?;

        let icon_files = match dict.get(KEY_ICON_FILES) {
            Some(files) => files
                .as_array()
                .ok_or_else(|| type_error(KEY_ICON_FILES, "array"))?
                .iter()
                .map(|x| {
                    x.as_string()
                        .map(|s| s.to_string())
                        .ok_or_else(|| type_error(KEY_ICON_FILES, "string array"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![],
        };

        let icon_name = match dict.get(KEY_ICON_NAME) {
            Some(name) => name
                .as_string()
                .ok_or_else(|| type_error(KEY_ICON_NAME, "string"))?
                .to_string(),
            None => String::new(),
        };

        Ok(Self {
            icon_files,
            icon_name,
        })
    }
}
