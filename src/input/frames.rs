//! 视频帧输入 (Decoded frame sources)
//!
//! 帧源按顺序逐帧产出, 只向前读取; 句柄由调用方按值持有,
//! 任何退出路径上 drop 即释放。

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};

/// 已解码帧
#[derive(Debug, Clone)]
pub struct Frame {
    /// 帧序号 (从0开始)
    pub index: u32,
    pub image: RgbImage,
}

/// 帧源统一接口
pub trait FrameSource {
    /// 读取下一帧, 读完返回 `None`
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// 帧数 (已知时)
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// 支持的图像扩展名
const FRAME_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// 图像序列目录 (按文件名排序, 每个文件一帧)
pub struct ImageSequence {
    dir: PathBuf,
    paths: VecDeque<PathBuf>,
    total: usize,
    next_index: u32,
}

impl ImageSequence {
    /// 打开帧目录
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| AnalysisError::Decode(format!("cannot open {}: {}", dir.display(), e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_frame {
                paths.push(path);
            }
        }
        paths.sort();

        info!("📹 帧序列: {} ({} 帧)", dir.display(), paths.len());
        Ok(Self {
            dir,
            total: paths.len(),
            paths: paths.into(),
            next_index: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .map_err(|e| AnalysisError::Decode(format!("{}: {}", path.display(), e)))?
            .to_rgb8();

        let index = self.next_index;
        self.next_index += 1;
        debug!(index, path = %path.display(), "decoded frame");
        Ok(Some(Frame { index, image }))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}

impl Drop for ImageSequence {
    fn drop(&mut self) {
        debug!(
            "帧序列关闭: {} (已读 {} / {})",
            self.dir.display(),
            self.next_index,
            self.total
        );
    }
}

/// 内存帧源
#[derive(Debug, Default)]
pub struct MemoryFrames {
    frames: VecDeque<RgbImage>,
    total: usize,
    next_index: u32,
}

impl MemoryFrames {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            total: frames.len(),
            frames: frames.into(),
            next_index: 0,
        }
    }

    /// 已读取帧数
    pub fn consumed(&self) -> u32 {
        self.next_index
    }
}

impl FrameSource for MemoryFrames {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(image) = self.frames.pop_front() else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(Frame { index, image }))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.total)
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn len_hint(&self) -> Option<usize> {
        (**self).len_hint()
    }
}
