// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! App icon generation.

use {
    crate::{error::TweakError, info_plist::PrimaryIcon},
    log::info,
    std::path::{Path, PathBuf},
};

/// Pixel size of the `60x60@2x` iPhone icon.
pub const IPHONE_ICON_SIZE: u32 = 120;

/// Pixel size of the `76x76@2x~ipad` iPad icon.
pub const IPAD_ICON_SIZE: u32 = 152;

/// Raster operations needed to produce icon files.
pub trait IconRenderer {
    /// Re-encode the image at `source` as PNG at `dest`.
    fn convert_to_png(&self, source: &Path, dest: &Path) -> Result<(), TweakError>;

    /// Write a `size` x `size` PNG rendition of the PNG at `source` to `dest`.
    fn resize_png(&self, source: &Path, dest: &Path, size: u32) -> Result<(), TweakError>;
}

/// [IconRenderer] backed by the `image` crate.
#[cfg(feature = "icons")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageIconRenderer;

#[cfg(feature = "icons")]
impl IconRenderer for ImageIconRenderer {
    fn convert_to_png(&self, source: &Path, dest: &Path) -> Result<(), TweakError> {
        let img = image::open(source)?;
        img.save_with_format(dest, image::ImageFormat::Png)?;

        Ok(())
    }

    fn resize_png(&self, source: &Path, dest: &Path, size: u32) -> Result<(), TweakError> {
        let img = image::open(source)?;
        img.resize_exact(size, size, image::imageops::FilterType::Lanczos3)
            .save_with_format(dest, image::ImageFormat::Png)?;

        Ok(())
    }
}

/// Obtain the renderer compiled into this crate, if any.
pub fn default_icon_renderer() -> Option<Box<dyn IconRenderer>> {
    #[cfg(feature = "icons")]
    {
        Some(Box::new(ImageIconRenderer))
    }

    #[cfg(not(feature = "icons"))]
    {
        None
    }
}

/// Generate a unique icon asset name.
///
/// Asset names must not end with a digit, so a letter is always appended.
pub fn generate_icon_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();

    format!("cyan_{}a", &uuid[..7])
}

/// Icon files generated into a bundle and their `Info.plist` declarations.
#[derive(Clone, Debug)]
pub struct IconAssets {
    /// Asset name shared by all renditions.
    pub id: String,

    /// Declaration for `CFBundleIcons`.
    pub iphone: PrimaryIcon,

    /// Declaration for `CFBundleIcons~ipad`.
    pub ipad: PrimaryIcon,

    /// Image files written into the bundle.
    pub files: Vec<PathBuf>,
}

/// Render icon files for the image at `source` into the bundle at `root`.
///
/// A PNG working copy is made at `<tmpdir>/icon.png`. Sources without a
/// `.png` suffix are converted; PNGs are copied verbatim.
pub fn render_icons(
    renderer: &dyn IconRenderer,
    source: &Path,
    tmpdir: &Path,
    root: &Path,
) -> Result<IconAssets, TweakError> {
    let working = tmpdir.join("icon.png");

    let is_png = source
        .extension()
        .map(|x| x.eq_ignore_ascii_case("png"))
        .unwrap_or(false);

    if is_png {
        std::fs::copy(source, &working)?;
    } else {
        info!("converting {} to PNG", source.display());
        renderer.convert_to_png(source, &working)?;
    }

    let id = generate_icon_id();
    let i60 = format!("{}60x60", id);
    let i76 = format!("{}76x76", id);

    let iphone_file = root.join(format!("{}@2x.png", i60));
    let ipad_file = root.join(format!("{}@2x~ipad.png", i76));

    renderer.resize_png(&working, &iphone_file, IPHONE_ICON_SIZE)?;
    renderer.resize_png(&working, &ipad_file, IPAD_ICON_SIZE)?;

    Ok(IconAssets {
        iphone: PrimaryIcon {
            icon_files: vec![i60.clone()],
            icon_name: id.clone(),
        },
        ipad: PrimaryIcon {
            icon_files: vec![i60, i76],
            icon_name: id.clone(),
        },
        id,
        files: vec![iphone_file, ipad_file],
    })
}
