//! Image preparations tried in turn on the receipt header.

use image::GrayImage;
use imageproc::contrast::{adaptive_threshold, otsu_level};
use imageproc::filter::median_filter;

use receiptly_core::config::LocationConfig;
use receiptly_core::LocationStrategy;

use crate::imaging::{clahe, invert_if_dark, stretch_contrast, threshold_at, upscale_gray};

pub const STRATEGIES: [LocationStrategy; 3] =
    [LocationStrategy::Enhanced, LocationStrategy::Simple, LocationStrategy::HighContrast];

pub fn prepare(strategy: LocationStrategy, header: &GrayImage, config: &LocationConfig) -> GrayImage {
    match strategy {
        LocationStrategy::Enhanced => enhanced(header, config),
        LocationStrategy::Simple => upscale_gray(header, config.simple_min_width),
        LocationStrategy::HighContrast => high_contrast(header, config.simple_min_width),
    }
}

/// Denoise, equalize locally, then binarize with a local threshold.
fn enhanced(header: &GrayImage, config: &LocationConfig) -> GrayImage {
    let upscaled = upscale_gray(header, config.enhanced_min_width);
    let denoised = median_filter(&upscaled, 1, 1);
    let equalized = clahe(&denoised, config.clahe_clip_limit, config.clahe_tiles);
    let mut binary = median_filter(&adaptive_threshold(&equalized, 5), 1, 1);
    invert_if_dark(&mut binary);
    binary
}

/// Full-range stretch, then a global Otsu threshold.
fn high_contrast(header: &GrayImage, min_width: u32) -> GrayImage {
    let stretched = stretch_contrast(&upscale_gray(header, min_width));
    let mut binary = threshold_at(&stretched, otsu_level(&stretched));
    invert_if_dark(&mut binary);
    binary
}
