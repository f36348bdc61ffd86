use image::{Rgb, RgbImage};
use serde::Deserialize;

pub type Lab = (f64, f64, f64);

/// Binarize an image around a reference color before OCR: pixels close to
/// the color become black, everything else white.
#[derive(Debug, PartialEq, Clone, Copy, Deserialize)]
pub struct ThresholdFilter {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub threshold: f64,
}

impl ThresholdFilter {
    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        threshold_color_distance(image, &Rgb([self.r, self.g, self.b]), self.threshold)
    }
}

/** https://en.wikipedia.org/wiki/CIELAB_color_space */
pub fn rgb2lab(rgb: &Rgb<u8>) -> Lab {
    let linear = |c: u8| {
        let c = c as f64 / 255_f64;
        if c > 0.04045 {
            f64::powf((c + 0.055) / 1.055, 2.4)
        } else {
            c / 12.92
        }
    };
    let pivot = |t: f64| {
        if t > 0.008856 {
            f64::powf(t, 1.0 / 3.0)
        } else {
            (7.787 * t) + 16.0 / 116.0
        }
    };
    let [r, g, b] = rgb.0;
    let (r, g, b) = (linear(r), linear(g), linear(b));
    let x = pivot((r * 0.4124 + g * 0.3576 + b * 0.1805) / 0.95047);
    let y = pivot((r * 0.2126 + g * 0.7152 + b * 0.0722) / 1.00000);
    let z = pivot((r * 0.0193 + g * 0.1192 + b * 0.9505) / 1.08883);
    ((116.0 * y) - 16.0, 500.0 * (x - y), 200.0 * (y - z))
}

/** https://en.wikipedia.org/wiki/Color_difference (CIE94) */
pub fn delta_e(color_a: &Rgb<u8>, color_b: &Rgb<u8>) -> f64 {
    let lab_a = rgb2lab(color_a);
    let lab_b = rgb2lab(color_b);
    let delta_l = lab_a.0 - lab_b.0;
    let delta_a = lab_a.1 - lab_b.1;
    let delta_b = lab_a.2 - lab_b.2;
    let c1 = (lab_a.1 * lab_a.1 + lab_a.2 * lab_a.2).sqrt();
    let c2 = (lab_b.1 * lab_b.1 + lab_b.2 * lab_b.2).sqrt();
    let delta_c = c1 - c2;
    let mut delta_h = delta_a * delta_a + delta_b * delta_b - delta_c * delta_c;
    delta_h = if delta_h < 0.0 { 0.0 } else { delta_h.sqrt() };
    let sc = 1.0 + 0.045 * c1;
    let sh = 1.0 + 0.015 * c1;
    let delta_ckcsc = delta_c / sc;
    let delta_hkhsh = delta_h / sh;
    let i = delta_l * delta_l + delta_ckcsc * delta_ckcsc + delta_hkhsh * delta_hkhsh;
    if i < 0.0 {
        0.0
    } else {
        i.sqrt()
    }
}

/// Custom thresholding function which uses the color distance from a given color
pub fn threshold_color_distance(image: &RgbImage, color: &Rgb<u8>, threshold: f64) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (x, y, px) in image.enumerate_pixels() {
        let v = if delta_e(px, color) >= threshold {
            255u8
        } else {
            0u8
        };
        out.put_pixel(x, y, Rgb([v, v, v]));
    }
    out
}
