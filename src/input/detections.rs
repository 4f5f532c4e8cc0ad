//! 检测点输入 (Detection sources)
//!
//! 逐帧粒子定位由外部检测器完成, 这里只负责读取其输出。

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::tracking::Detection;

/// 检测点来源
pub trait DetectionSource {
    /// 读取整段视频的全部检测点
    fn detections(&mut self) -> Result<Vec<Detection>>;
}

impl DetectionSource for Vec<Detection> {
    fn detections(&mut self) -> Result<Vec<Detection>> {
        Ok(std::mem::take(self))
    }
}

/// CSV 检测点表: `frame,x,y,signal` (`mass` 视为 `signal`)
pub struct CsvDetections {
    path: PathBuf,
}

impl CsvDetections {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DetectionSource for CsvDetections {
    fn detections(&mut self) -> Result<Vec<Detection>> {
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let detections = rdr
            .deserialize::<Detection>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let unordered = detections.windows(2).filter(|w| w[1].frame < w[0].frame).count();
        if unordered > 0 {
            warn!("⚠️ 检测点帧号非单调 ({} 处), 按帧重新分组", unordered);
        }

        info!(
            "📥 检测点已加载: {} ({} 个)",
            self.path.display(),
            detections.len()
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_mass_as_signal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "frame,x,y,mass").unwrap();
        writeln!(file, "0,1.5,2.5,300").unwrap();
        writeln!(file, "1,2.0,3.0,250").unwrap();
        file.flush().unwrap();

        let dets = CsvDetections::new(file.path()).detections().unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0], Detection::new(0, 1.5, 2.5, 300.0));
    }
}
