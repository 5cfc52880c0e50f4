use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use lesionscan::classifier::{LesionModel, ModelLoader};
use lesionscan::error::{Error, Result};
use lesionscan::models::{ModelKind, NUM_CLASSES, PreprocessedTensor};
use lesionscan::{Classifier, DiagnosisService, NarrativeEnricher, Preprocessor, UploadPolicy, UploadStore};
use tempfile::{NamedTempFile, TempDir};

/// Plain white 64x64 image.
pub fn white_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([255, 255, 255])))
}

/// Dark brown disc of `radius` centred on a light skin-toned background.
pub fn disc_image(size: u32, radius: f64) -> DynamicImage {
    let centre = f64::from(size) / 2.0;
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        let dx = f64::from(x) + 0.5 - centre;
        let dy = f64::from(y) + 0.5 - centre;
        if (dx * dx + dy * dy).sqrt() <= radius {
            Rgb([60, 30, 20])
        } else {
            Rgb([235, 200, 180])
        }
    }))
}

pub fn gray_image(value: u8) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 32, Luma([value])))
}

pub fn rgba_image() -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 30, Rgba([200, 120, 90, 128])))
}

/// Encode `img` as PNG bytes.
pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes.into_inner()
}

/// Save `img` as a temporary PNG. The file is removed when dropped.
pub fn save_temp_png(img: &DynamicImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Loader that always fails, as a missing or corrupt artifact would.
pub struct FailingLoader;

impl ModelLoader for FailingLoader {
    fn name(&self) -> &str {
        "failing"
    }

    fn load(&self) -> Result<Box<dyn LesionModel>> {
        Err(Error::ModelLoad {
            name: "failing".to_string(),
            reason: "no artifact".to_string(),
        })
    }
}

/// Loader producing a model with fixed raw output.
pub struct FixedLoader(pub Vec<f32>);

pub struct FixedModel(Vec<f32>);

impl ModelLoader for FixedLoader {
    fn name(&self) -> &str {
        "fixed"
    }

    fn load(&self) -> Result<Box<dyn LesionModel>> {
        Ok(Box::new(FixedModel(self.0.clone())))
    }
}

impl LesionModel for FixedModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Onnx
    }

    fn forward(&self, _input: &PreprocessedTensor) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

/// A distribution that puts `p` on class `index` and spreads the rest evenly.
pub fn peaked_distribution(index: usize, p: f32) -> Vec<f32> {
    let rest = (1.0 - p) / (NUM_CLASSES - 1) as f32;
    (0..NUM_CLASSES).map(|i| if i == index { p } else { rest }).collect()
}

/// Service storing uploads under `dir`, with enrichment disabled.
pub fn make_service(dir: &Path, classifier: Classifier, features: bool) -> DiagnosisService {
    let uploads =
        UploadStore::new(dir.join("uploads"), UploadPolicy::default()).expect("Failed to create upload store");
    DiagnosisService::with_parts(
        uploads,
        Arc::new(classifier),
        NarrativeEnricher::disabled(),
        Preprocessor::new((32, 32)),
    )
    .with_features(features)
}

/// Temp directory kept alive by the caller.
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Answer one HTTP request on a local port with `status` and a JSON `body`.
///
/// Returns the endpoint URL and a handle yielding the raw request text.
pub fn serve_once(status: &'static str, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
    let endpoint = format!(
        "http://{}/openai/v1/chat/completions",
        listener.local_addr().expect("Failed to read test server address")
    );
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Failed to accept request");
        let request = read_request(&mut stream).unwrap_or_default();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = stream.write_all(response.as_bytes());
        request
    });
    (endpoint, handle)
}

/// Accept one connection and hold it open for `hold` without answering.
pub fn serve_silently(hold: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test server");
    let endpoint = format!(
        "http://{}/openai/v1/chat/completions",
        listener.local_addr().expect("Failed to read test server address")
    );
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            thread::sleep(hold);
            drop(stream);
        }
    });
    endpoint
}

/// Read request line, headers and a `Content-Length` body.
fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request = String::new();
    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
        request.push_str(&line);
    }
    let mut body = vec![0; content_length];
    reader.read_exact(&mut body)?;
    request.push_str("\r\n");
    request.push_str(&String::from_utf8_lossy(&body));
    Ok(request)
}
