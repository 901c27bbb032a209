//! The images task: WebP siblings for raster sources, then optimised originals.

mod svg;

pub use svg::minify_svg;

use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat};
use rayon::prelude::*;

use crate::builder::BuildConfig;
use crate::paths::AssetKind;
use crate::task::{collect_sources, read_source, AssetTask, OutputFile, SourceFile, TaskError};

/// Optimises every matched image and adds `.webp` copies of PNG and JPEG files.
pub struct ImagesTask;

/// Outputs for one source image.
struct Processed {
    webp: Option<OutputFile>,
    optimized: OutputFile,
}

impl AssetTask for ImagesTask {
    fn kind(&self) -> AssetKind {
        AssetKind::Img
    }

    fn transform(&self, config: &BuildConfig) -> Result<Vec<OutputFile>, TaskError> {
        let out_dir = config.build_dir(AssetKind::Img);
        let sources = collect_sources(config, AssetKind::Img)?;

        let processed: Vec<Processed> = sources
            .par_iter()
            .map(|source| process(source, &out_dir))
            .collect::<Result<_, _>>()?;

        // Conversions are written first so an optimised original with the
        // same name replaces them.
        let (webps, originals): (Vec<_>, Vec<_>) = processed
            .into_iter()
            .map(|p| (p.webp, p.optimized))
            .unzip();

        Ok(webps.into_iter().flatten().chain(originals).collect())
    }
}

fn process(source: &SourceFile, out_dir: &Path) -> Result<Processed, TaskError> {
    let bytes = read_source(&source.path)?;
    let target = out_dir.join(&source.relative);
    let image_error = |message: String| TaskError::Image {
        path: source.path.clone(),
        message,
    };

    let extension = source
        .path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let processed = match extension.as_str() {
        "png" => {
            let image = decode(&bytes, ImageFormat::Png).map_err(image_error)?;
            let webp = encode_webp(&image).map_err(image_error)?;
            let png = optimize_png(&image, &bytes).map_err(image_error)?;
            Processed {
                webp: Some(OutputFile::new(webp_path(&target), webp)),
                optimized: OutputFile::new(target, png),
            }
        }
        "jpg" | "jpeg" => {
            let image = decode(&bytes, ImageFormat::Jpeg).map_err(image_error)?;
            let webp = encode_webp(&image).map_err(image_error)?;
            Processed {
                webp: Some(OutputFile::new(webp_path(&target), webp)),
                optimized: OutputFile::new(target, bytes),
            }
        }
        "svg" => Processed {
            webp: None,
            optimized: OutputFile::new(target, minify_svg(&bytes).map_err(image_error)?),
        },
        _ => Processed {
            webp: None,
            optimized: OutputFile::new(target, bytes),
        },
    };

    tracing::debug!("Processed {}", source.relative.display());
    Ok(processed)
}

fn decode(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, String> {
    image::load_from_memory_with_format(bytes, format).map_err(|e| e.to_string())
}

fn webp_path(target: &Path) -> PathBuf {
    target.with_extension("webp")
}

/// Encode as lossless WebP, keeping alpha only when the source has it.
fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let encoder = WebPEncoder::new_lossless(&mut out);
    let (width, height) = (image.width(), image.height());

    let result = if image.color().has_alpha() {
        encoder.encode(&image.to_rgba8(), width, height, ExtendedColorType::Rgba8)
    } else {
        encoder.encode(&image.to_rgb8(), width, height, ExtendedColorType::Rgb8)
    };
    result.map_err(|e| e.to_string())?;

    Ok(out)
}

/// Re-encode with maximum compression; keep whichever is smaller.
fn optimize_png(image: &DynamicImage, original: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    image.write_with_encoder(encoder).map_err(|e| e.to_string())?;

    if out.len() < original.len() {
        Ok(out)
    } else {
        Ok(original.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn png_bytes() -> Vec<u8> {
        let image = RgbaImage::from_fn(16, 8, |x, y| {
            Rgba([(x * 16) as u8, (y * 32) as u8, 0, 255])
        });
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn jpeg_bytes() -> Vec<u8> {
        let image = RgbImage::from_fn(8, 8, |x, _| Rgb([(x * 30) as u8, 90, 200]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    fn site(files: &[(&str, Vec<u8>)]) -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        for (path, contents) in files {
            let path = temp.path().join("src/images").join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        temp
    }

    fn config(root: &Path) -> BuildConfig {
        BuildConfig {
            root: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn png_gets_webp_sibling_and_never_grows() {
        let original = png_bytes();
        let temp = site(&[("icons/logo.png", original.clone())]);

        let report = ImagesTask.run(&config(temp.path())).unwrap();

        let out = temp.path().join("dist/images/icons");
        assert_eq!(
            report.files,
            vec![out.join("logo.webp"), out.join("logo.png")]
        );
        assert!(fs::read(out.join("logo.png")).unwrap().len() <= original.len());

        let webp = fs::read(out.join("logo.webp")).unwrap();
        let decoded = image::load_from_memory_with_format(&webp, ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn jpeg_is_copied_with_webp_sibling() {
        let original = jpeg_bytes();
        let temp = site(&[("photo.jpg", original.clone())]);

        ImagesTask.run(&config(temp.path())).unwrap();

        let out = temp.path().join("dist/images");
        assert_eq!(fs::read(out.join("photo.jpg")).unwrap(), original);
        assert!(out.join("photo.webp").exists());
    }

    #[test]
    fn other_formats_are_copied_and_svg_is_minified() {
        let temp = site(&[
            ("anim.gif", b"GIF89a-not-decoded".to_vec()),
            ("icon.svg", b"<svg>\n  <!-- c -->\n  <g/>\n</svg>\n".to_vec()),
        ]);

        ImagesTask.run(&config(temp.path())).unwrap();

        let out = temp.path().join("dist/images");
        assert_eq!(fs::read(out.join("anim.gif")).unwrap(), b"GIF89a-not-decoded");
        assert_eq!(fs::read_to_string(out.join("icon.svg")).unwrap(), "<svg><g/></svg>");
    }

    #[test]
    fn source_webp_wins_over_conversion() {
        let temp = site(&[
            ("logo.png", png_bytes()),
            ("logo.webp", b"hand-tuned".to_vec()),
        ]);

        let report = ImagesTask.run(&config(temp.path())).unwrap();

        let out = temp.path().join("dist/images");
        assert_eq!(fs::read(out.join("logo.webp")).unwrap(), b"hand-tuned");
        assert_eq!(report.files.len(), 2);
    }

    #[test]
    fn corrupt_raster_fails_without_writing() {
        let temp = site(&[
            ("good.gif", b"gif".to_vec()),
            ("broken.png", b"not a png".to_vec()),
        ]);

        let err = ImagesTask.run(&config(temp.path())).unwrap_err();

        assert!(matches!(err, TaskError::Image { .. }));
        assert!(!temp.path().join("dist/images").exists());
    }
}
