//! On-disk tile tree layouts.
//!
//! Deep-zoom trees follow the DZI convention: a `{name}.dzi` descriptor
//! next to a `{name}_files/{level}/{col}_{row}.{ext}` tree. XYZ trees use
//! the slippy-map `{zoom}/{x}/{y}.{ext}` convention.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::TilePyramid;
use crate::encode::encode_tile;
use crate::error::TileResult;

/// Write a deep-zoom tree for `pyramid` under `out_dir` and return the
/// manifest path.
pub fn write_dzi(pyramid: &TilePyramid, out_dir: &Path, name: &str) -> TileResult<PathBuf> {
    let files_dir = out_dir.join(format!("{name}_files"));

    for level in &pyramid.levels {
        let level_dir = files_dir.join(level.level.to_string());
        fs::create_dir_all(&level_dir)?;
        for tile in &level.tiles {
            let path = level_dir.join(format!(
                "{}_{}.{}",
                tile.col,
                tile.row,
                pyramid.format.extension()
            ));
            fs::write(path, encode_tile(&tile.image, pyramid.format)?)?;
        }
    }

    let manifest_path = out_dir.join(format!("{name}.dzi"));
    fs::write(&manifest_path, pyramid.dzi_manifest())?;
    debug!(
        manifest = %manifest_path.display(),
        tiles = pyramid.tile_count(),
        "deep-zoom tree written"
    );
    Ok(manifest_path)
}

/// Write an XYZ tree for `pyramid` under `out_dir`.
pub fn write_xyz(pyramid: &TilePyramid, out_dir: &Path) -> TileResult<()> {
    for level in &pyramid.levels {
        for tile in &level.tiles {
            let tile_dir = out_dir
                .join(level.level.to_string())
                .join(tile.col.to_string());
            fs::create_dir_all(&tile_dir)?;
            let path = tile_dir.join(format!("{}.{}", tile.row, pyramid.format.extension()));
            fs::write(path, encode_tile(&tile.image, pyramid.format)?)?;
        }
    }
    debug!(tiles = pyramid.tile_count(), "xyz tree written");
    Ok(())
}
