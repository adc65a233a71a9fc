use candle_core::{DType, Device, Tensor};
use image::{DynamicImage, ImageReader};
use std::path::Path;

use shopsearch_core::{Error, Result};

const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_5, 0.261_302_6, 0.275_777_1];

/// Opens and fully decodes an image, guessing the format from its bytes.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| Error::Encoding(format!("cannot open image {}: {e}", path.display())))?
        .with_guessed_format()
        .map_err(|e| Error::Encoding(format!("cannot read image {}: {e}", path.display())))?;
    reader
        .decode()
        .map_err(|e| Error::Encoding(format!("cannot decode image {}: {e}", path.display())))
}

/// Resizes to `size`x`size`, converts to RGB and normalizes with the CLIP
/// mean/std. Output shape is `[1, 3, size, size]`.
pub fn to_clip_tensor(img: &DynamicImage, size: usize, device: &Device) -> Result<Tensor> {
    let side = u32::try_from(size).map_err(|e| Error::Encoding(e.to_string()))?;
    let rgb = img
        .resize_exact(side, side, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let enc = |e: candle_core::Error| Error::Encoding(e.to_string());

    let pixels = Tensor::from_vec(rgb.into_raw(), (size, size, 3), device).map_err(enc)?;
    let mean = Tensor::new(&CLIP_MEAN, device).map_err(enc)?.reshape((1, 1, 3)).map_err(enc)?;
    let std = Tensor::new(&CLIP_STD, device).map_err(enc)?.reshape((1, 1, 3)).map_err(enc)?;

    pixels
        .to_dtype(DType::F32)
        .and_then(|t| t.affine(1.0 / 255.0, 0.0))
        .and_then(|t| t.broadcast_sub(&mean))
        .and_then(|t| t.broadcast_div(&std))
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.unsqueeze(0))
        .map_err(enc)
}
