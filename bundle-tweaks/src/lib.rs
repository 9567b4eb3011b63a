// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Mutate iOS application bundles.

This crate operates on an unpacked `.app` directory. It can strip companion
watch apps and app extensions, remove extensions carrying encrypted
executables, fake sign or thin every executable in the bundle, inject
tweaks (dynamic libraries, frameworks, extensions and loose files) into the
main executable and its extensions, and replace the app icon.

The entry point is [AppBundle]. Binary mutation is delegated to an
[ExecutableEngine]. [ToolchainEngine] drives the `ldid`, `lipo` and
`insert_dylib` command line tools.

Operations mutate the bundle in place. Removals and injection should run
before the first sweep performed by [AppBundle::mass_operate], because the
list of nested artifacts is computed only once.
*/

mod artifact;
pub use artifact::{
    enumerate_artifacts, injectable_extensions, top_level_extensions, Artifact, ArtifactCache,
    EXTENSION_DIRS,
};
mod bundle;
pub use bundle::{
    AppBundle, ExtensionInjection, ExtensionReport, InjectionReport, MassOperationReport,
    WATCH_APP_NAMES,
};
mod error;
pub use error::TweakError;
mod executable;
pub use executable::{Executable, ExecutableEngine, MassOperation};
mod icon;
#[cfg(feature = "icons")]
pub use icon::ImageIconRenderer;
pub use icon::{
    default_icon_renderer, generate_icon_id, render_icons, IconAssets, IconRenderer,
    IPAD_ICON_SIZE, IPHONE_ICON_SIZE,
};
mod info_plist;
pub use info_plist::{
    InfoPlist, PlistFormat, PrimaryIcon, KEY_EXECUTABLE, KEY_ICONS, KEY_ICONS_IPAD,
};
mod macho;
pub use macho::{architectures, is_encrypted, is_universal};
mod settings;
pub use settings::{
    InjectionSettings, Tool, ToolchainSettings, DEFAULT_ENTITLEMENTS_FILE_NAME,
    DEFAULT_THIN_ARCHITECTURE,
};
#[cfg(test)]
mod testutil;
mod toolchain;
pub use toolchain::{ToolchainEngine, ToolchainExecutable};
mod tweaks;
pub use tweaks::{
    framework_reference, PathStrategy, TweakKind, TweakSet, APPEX_SUFFIX, DYLIB_SUFFIX,
    FRAMEWORK_SUFFIX,
};
