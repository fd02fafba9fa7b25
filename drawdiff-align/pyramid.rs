use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

/// Smallest octave dimension still useful for corner detection.
const MIN_OCTAVE_DIM: u32 = 32;

/// Blur applied before each halving step to avoid aliasing.
const OCTAVE_SIGMA: f32 = 1.0;

/// One octave of the detection pyramid.
pub struct Octave {
    pub image: GrayImage,
    /// Factor mapping octave coordinates back to base-image coordinates.
    pub scale: f32,
}

/// Half-resolution Gaussian octave pyramid for scale-invariant detection.
pub struct GaussianPyramid {
    pub octaves: Vec<Octave>,
}

impl GaussianPyramid {
    /// Build up to `max_octaves` octaves, stopping once the image gets too
    /// small for the corner detector to see anything.
    pub fn build(base: &GrayImage, max_octaves: usize) -> Self {
        let mut octaves = Vec::with_capacity(max_octaves);
        octaves.push(Octave {
            image: base.clone(),
            scale: 1.0,
        });

        while octaves.len() < max_octaves {
            let prev = &octaves[octaves.len() - 1].image;
            let (w, h) = (prev.width() / 2, prev.height() / 2);
            if w < MIN_OCTAVE_DIM || h < MIN_OCTAVE_DIM {
                break;
            }
            let blurred = gaussian_blur_f32(prev, OCTAVE_SIGMA);
            let halved = downsample_2x(&blurred, w, h);
            let scale = octaves.last().map(|o| o.scale).unwrap_or(1.0) * 2.0;
            octaves.push(Octave {
                image: halved,
                scale,
            });
        }

        Self { octaves }
    }
}

/// Take every second pixel of an already-blurred image.
fn downsample_2x(img: &GrayImage, out_w: u32, out_h: u32) -> GrayImage {
    GrayImage::from_fn(out_w, out_h, |x, y| *img.get_pixel(x * 2, y * 2))
}
