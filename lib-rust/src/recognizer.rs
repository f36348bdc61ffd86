//! Text recognition: the [`TextRecognizer`] seam, OCR preprocessing, and the
//! tesseract backend (behind the `tesseract` feature).

use crate::{
    error::Result,
    events::{classify, GameEvent},
    threshold::ThresholdFilter,
};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};

/// Tesseract struggles to recognize text below this size.
pub const MIN_TESSERACT_IMAGE_SIZE: u32 = 32;

/// Pixel rectangle of a recognized fragment within the recognized image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = (self.left + self.width).max(other.left + other.width);
        let bottom = (self.top + self.height).max(other.top + other.height);
        BoundingBox {
            left,
            top,
            width: right - left,
            height: bottom - top,
        }
    }
}

/// One line of recognized text.
#[derive(Clone, Debug, PartialEq)]
pub struct TextFragment {
    pub bbox: BoundingBox,
    pub text: String,
    /// 0-100
    pub confidence: f32,
}

/// Maps an image to the text fragments found in it.
pub trait TextRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<TextFragment>>;
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for &mut T {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<TextFragment>> {
        (**self).recognize(image)
    }
}

impl<T: TextRecognizer + ?Sized> TextRecognizer for Box<T> {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<TextFragment>> {
        (**self).recognize(image)
    }
}

/// Recognize the text in `image` and classify it.
pub fn detect_events<R: TextRecognizer + ?Sized>(
    recognizer: &mut R,
    image: &RgbImage,
) -> Result<Vec<GameEvent>> {
    let fragments = recognizer.recognize(image)?;
    let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
    Ok(classify(&texts))
}

/// Group tesseract's word-level TSV output into line fragments.
///
/// Columns: `level page_num block_num par_num line_num word_num left top
/// width height conf text`. Only level-5 (word) rows with text are used.
pub fn parse_tsv(tsv: &str) -> Vec<TextFragment> {
    struct Line {
        key: (u32, u32, u32, u32),
        words: Vec<String>,
        bbox: BoundingBox,
        confidence_sum: f32,
    }

    let mut lines: Vec<Line> = Vec::new();
    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }
        let num = |i: usize| cols[i].trim().parse::<u32>().unwrap_or(0);
        let key = (num(1), num(2), num(3), num(4));
        let bbox = BoundingBox {
            left: num(6),
            top: num(7),
            width: num(8),
            height: num(9),
        };
        let confidence = cols[10].trim().parse::<f32>().unwrap_or(0.0).max(0.0);

        match lines.iter_mut().find(|line| line.key == key) {
            Some(line) => {
                line.words.push(text.to_string());
                line.bbox = line.bbox.union(&bbox);
                line.confidence_sum += confidence;
            }
            None => lines.push(Line {
                key,
                words: vec![text.to_string()],
                bbox,
                confidence_sum: confidence,
            }),
        }
    }

    lines
        .into_iter()
        .map(|line| TextFragment {
            confidence: line.confidence_sum / line.words.len() as f32,
            text: line.words.join(" "),
            bbox: line.bbox,
        })
        .collect()
}

/// 1. (optional) Resize if smaller than 32px in either dimension
/// 2. (optional) Apply threshold filter if present
/// 3. Add 32px padding to all sides for better OCR results
pub fn preprocess_image_for_tesseract(
    image: &RgbImage,
    filter: Option<&ThresholdFilter>,
) -> RgbImage {
    let mut new_image = ensure_minimum_size(image, MIN_TESSERACT_IMAGE_SIZE);
    if let Some(filter) = filter {
        new_image = filter.apply(&new_image);
    }
    padding_uniform(&new_image, MIN_TESSERACT_IMAGE_SIZE, Rgb([255, 255, 255]))
}

/// Upscale (preserving aspect ratio) so both sides are at least `min_size`.
pub fn ensure_minimum_size(image: &RgbImage, min_size: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || (width >= min_size && height >= min_size) {
        return image.clone();
    }
    let scale = (min_size as f32 / width as f32).max(min_size as f32 / height as f32);
    let new_width = (width as f32 * scale).ceil() as u32;
    let new_height = (height as f32 * scale).ceil() as u32;
    imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

/// Surround the image with `padding` pixels of `background` on every side.
pub fn padding_uniform(image: &RgbImage, padding: u32, background: Rgb<u8>) -> RgbImage {
    let mut padded = RgbImage::from_pixel(
        image.width() + padding * 2,
        image.height() + padding * 2,
        background,
    );
    imageops::replace(&mut padded, image, padding, padding);
    padded
}

#[cfg(feature = "tesseract")]
pub use self::tesseract_backend::{
    download_tesseract_traineddata, init_tesseract, TesseractRecognizer,
};

#[cfg(feature = "tesseract")]
mod tesseract_backend {
    use super::{parse_tsv, preprocess_image_for_tesseract, TextFragment, TextRecognizer};
    use crate::{
        config::OcrConfig,
        error::{Error, NoneError, Result},
        threshold::ThresholdFilter,
    };
    use image::RgbImage;
    use std::{
        fs::{self, File},
        io::Write,
        path::{Path, PathBuf},
    };
    use tesseract::Tesseract;

    /// OCR backed by a single long-lived tesseract instance.
    pub struct TesseractRecognizer {
        /// Taken out while tesseract's consuming builder API runs.
        tesseract: Option<Tesseract>,
        datapath: PathBuf,
        language: String,
        filter: Option<ThresholdFilter>,
    }

    impl TesseractRecognizer {
        pub fn new(config: &OcrConfig) -> Result<Self> {
            let datapath = match &config.tessdata_dir {
                Some(dir) => dir.clone(),
                None => std::env::current_exe()?
                    .parent()
                    .ok_or(NoneError)?
                    .to_path_buf(),
            };
            let tesseract = init_tesseract(&datapath, &config.language)?;
            Ok(Self {
                tesseract: Some(tesseract),
                datapath,
                language: config.language.clone(),
                filter: config.threshold,
            })
        }
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(&mut self, image: &RgbImage) -> Result<Vec<TextFragment>> {
            let image = preprocess_image_for_tesseract(image, self.filter.as_ref());
            let channels = 3;

            // A failed call consumes the instance; start over with a new one.
            let model = match self.tesseract.take() {
                Some(model) => model,
                None => init_tesseract(&self.datapath, &self.language)?,
            };
            let mut model = model
                .set_frame(
                    image.as_raw(),
                    image.width() as i32,
                    image.height() as i32,
                    channels,
                    image.width() as i32 * channels,
                )
                .map_err(Error::from_display)?
                .set_source_resolution(96);
            let tsv = model.get_tsv_text(0).map_err(Error::from_display);
            self.tesseract = Some(model);

            Ok(parse_tsv(&tsv?))
        }
    }

    /// Attempts to download the latest traineddata file from Github
    pub fn download_tesseract_traineddata(download_path: &Path) -> Result<()> {
        let filename = download_path
            .file_name()
            .ok_or(NoneError)?
            .to_str()
            .ok_or(NoneError)?;
        let url = format!(
            "https://github.com/tesseract-ocr/tessdata/raw/4.00/{}",
            filename
        );
        let body = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;

        if let Some(parent) = download_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(download_path)?;
        Ok(file.write_all(body.as_ref())?)
    }

    /// Initialize a Tesseract instance, automatically downloading traineddata if needed
    pub fn init_tesseract(datapath: &Path, language: &str) -> Result<Tesseract> {
        log::info!("[tesseract] using datapath {}", datapath.display());
        log::info!("[tesseract] using language {}", language);

        let traineddata_path = datapath.join(format!("{}.traineddata", language));
        if !traineddata_path.exists() {
            log::info!(
                "[tesseract] could not find traineddata at {}, downloading",
                traineddata_path.display()
            );
            download_tesseract_traineddata(&traineddata_path)?;
            log::info!("[tesseract] traineddata downloaded");
        }

        let datapath = datapath.to_str().ok_or(NoneError)?;
        Ok(Tesseract::new(Some(datapath), Some(language))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t784\t99\t-1\t
4\t1\t1\t1\t1\t0\t40\t34\t300\t20\t-1\t
5\t1\t1\t1\t1\t1\t40\t34\t60\t20\t91.5\tYOU
5\t1\t1\t1\t1\t2\t110\t34\t120\t22\t88.5\tKNOCKED
5\t1\t1\t1\t1\t3\t240\t35\t100\t20\t90.0\tDOWN
5\t1\t1\t1\t2\t1\t40\t60\t80\t20\t70.0\tWRAITH
5\t1\t1\t1\t2\t2\t130\t60\t10\t20\t-1\t ";

    #[test]
    fn tsv_words_group_into_lines() {
        let fragments = parse_tsv(TSV);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "YOU KNOCKED DOWN");
        assert_eq!(
            fragments[0].bbox,
            BoundingBox {
                left: 40,
                top: 34,
                width: 300,
                height: 22
            }
        );
        assert!((fragments[0].confidence - 90.0).abs() < 1e-3);
        assert_eq!(fragments[1].text, "WRAITH");
    }

    #[test]
    fn garbage_tsv_is_ignored() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("not\ttsv").is_empty());
    }

    #[test]
    fn small_images_are_upscaled_and_padded() {
        let image = RgbImage::from_pixel(64, 8, Rgb([0, 0, 0]));
        let out = preprocess_image_for_tesseract(&image, None);
        // 8px high -> scaled x4 to 256x32, then 32px padding each side
        assert_eq!(out.dimensions(), (256 + 64, 32 + 64));
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(40, 40), &Rgb([0, 0, 0]));
    }

    struct Fixed(Vec<&'static str>);

    impl TextRecognizer for Fixed {
        fn recognize(&mut self, _image: &RgbImage) -> Result<Vec<TextFragment>> {
            Ok(self
                .0
                .iter()
                .map(|text| TextFragment {
                    bbox: BoundingBox::default(),
                    text: text.to_string(),
                    confidence: 100.0,
                })
                .collect())
        }
    }

    #[test]
    fn detect_events_classifies_recognized_text() -> Result<()> {
        let mut recognizer = Fixed(vec!["WRAITH", "SQUAD WIPE", "ASSIST"]);
        let events = detect_events(&mut recognizer, &RgbImage::new(1, 1))?;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].text, "SQUAD WIPE");
        Ok(())
    }
}
