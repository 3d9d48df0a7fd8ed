use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Pixel layouts the camera may hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
    Rgb,
    Yuyv,
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"RGB3" => Some(Self::Rgb),
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    fn to_rgb(self, width: u32, height: u32, data: &[u8]) -> Result<Vec<u8>> {
        let pixels = (width * height) as usize;
        match self {
            Self::Rgb => {
                anyhow::ensure!(data.len() >= pixels * 3, "short RGB buffer");
                Ok(data[..pixels * 3].to_vec())
            }
            Self::Yuyv => {
                anyhow::ensure!(data.len() >= pixels * 2, "short YUYV buffer");
                let mut out = Vec::with_capacity(pixels * 3);
                for chunk in data[..pixels * 2].chunks_exact(4) {
                    let u = chunk[1] as f32 - 128.0;
                    let v = chunk[3] as f32 - 128.0;
                    for y in [chunk[0] as f32, chunk[2] as f32] {
                        out.extend_from_slice(&[
                            to_u8(y + 1.402 * v),
                            to_u8(y - 0.344136 * u - 0.714136 * v),
                            to_u8(y + 1.772 * u),
                        ]);
                    }
                }
                Ok(out)
            }
            Self::Grey => {
                anyhow::ensure!(data.len() >= pixels, "short GREY buffer");
                Ok(data[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
            }
        }
    }
}

fn to_u8(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

/// V4L2 camera used to take nose photos.
pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device)
            .with_context(|| format!("open camera {}", device))?;
        let mut fmt = dev.format().context("get format")?;
        // Prefer RGB, then YUYV, else keep whatever the device reports
        for fourcc in [b"RGB3", b"YUYV"] {
            if PixelFormat::from_fourcc(fmt.fourcc) == Some(PixelFormat::Rgb) {
                break;
            }
            let desired = Format::new(fmt.width, fmt.height, FourCC::new(fourcc));
            fmt = dev.set_format(&desired).unwrap_or(fmt);
        }
        let format = PixelFormat::from_fourcc(fmt.fourcc)
            .with_context(|| format!("unsupported pixel format {:?}", fmt.fourcc))?;
        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        log::info!(
            "camera {} opened: {}x{} {:?}",
            device,
            fmt.width,
            fmt.height,
            format
        );
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            format,
        })
    }

    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!("captured frame seq={} len={}", meta.sequence, data.len());
        let buf = self.format.to_rgb(self.width, self.height, data)?;
        RgbImage::from_raw(self.width, self.height, buf)
            .context("failed to build image buffer")
    }

    /// Capture one frame and save it as `nose_{epochMillis}.jpg` in `dir`.
    pub fn capture_to(&mut self, dir: &Path) -> Result<PathBuf> {
        let frame = self.frame()?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = dir.join(format!("nose_{}.jpg", millis));
        frame
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
