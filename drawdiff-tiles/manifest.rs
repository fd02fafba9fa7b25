//! Deep-zoom descriptor emitted next to the tile tree.

use crate::encode::TileFormat;

/// Render the DZI XML descriptor understood by OpenSeadragon and friends.
pub fn dzi_manifest(
    width: u32,
    height: u32,
    tile_size: u32,
    overlap: u32,
    format: TileFormat,
) -> String {
    let format = format.extension();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
       Format="{format}"
       Overlap="{overlap}"
       TileSize="{tile_size}">
    <Size Width="{width}" Height="{height}"/>
</Image>
"#
    )
}
