/// 裁剪工具模块
/// 以检测点为中心的正方形裁剪, 越界部分复制边缘 (类似 cv2::BORDER_REPLICATE)
use image::{GenericImageView, ImageBuffer, Pixel};

/// 以 (cx, cy) 为中心裁剪 size×size 区域, 越界部分复制边缘像素
///
/// 左上角为 `floor(cx) - size/2`, 覆盖 `[x0, x0+size)`。
pub fn crop_centered<I>(
    src: &I,
    cx: f32,
    cy: f32,
    size: u32,
) -> ImageBuffer<I::Pixel, Vec<<I::Pixel as Pixel>::Subpixel>>
where
    I: GenericImageView,
    I::Pixel: Pixel<Subpixel = u8>,
{
    let (width, height) = src.dimensions();
    let half = (size / 2) as i32;
    let x0 = cx.floor() as i32 - half;
    let y0 = cy.floor() as i32 - half;

    ImageBuffer::from_fn(size, size, |dx, dy| {
        let (sx, sy) = replicate_border(x0 + dx as i32, y0 + dy as i32, width, height);
        src.get_pixel(sx, sy)
    })
}

/// 中心点是否在图像内
pub fn contains(width: u32, height: u32, cx: f32, cy: f32) -> bool {
    cx.is_finite() && cy.is_finite() && cx >= 0.0 && cy >= 0.0 && cx < width as f32 && cy < height as f32
}

/// 越界坐标夹到最近的边缘像素
fn replicate_border(x: i32, y: i32, width: u32, height: u32) -> (u32, u32) {
    let (w, h) = (width as i32, height as i32);
    (x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([(x + 10 * y) as u8]))
    }

    #[test]
    fn test_interior_crop() {
        let img = gradient(20, 20);
        let crop = crop_centered(&img, 10.4, 10.9, 4);
        assert_eq!(crop.dimensions(), (4, 4));
        // 左上角 = (8, 8)
        assert_eq!(crop.get_pixel(0, 0)[0], 8 + 80);
        assert_eq!(crop.get_pixel(3, 3)[0], 11 + 110);
    }

    #[test]
    fn test_replicate_at_corner() {
        let img = gradient(20, 20);
        let crop = crop_centered(&img, 0.0, 0.0, 6);
        // 越界部分复制边缘像素
        for y in 0..=3 {
            for x in 0..=3 {
                assert_eq!(crop.get_pixel(x, y)[0], 0);
            }
        }
        assert_eq!(crop.get_pixel(5, 3)[0], 2);
        assert_eq!(crop.get_pixel(3, 5)[0], 20);
    }

    #[test]
    fn test_replicate_past_far_edge() {
        let img = gradient(5, 5);
        let crop = crop_centered(&img, 4.0, 4.0, 4);
        // 左上角 = (2, 2), 右下越界复制 (4, 4)
        assert_eq!(crop.get_pixel(0, 0)[0], 2 + 20);
        assert_eq!(crop.get_pixel(3, 3)[0], 4 + 40);
        assert_eq!(crop.get_pixel(3, 0)[0], 4 + 20);
    }

    #[test]
    fn test_contains() {
        assert!(contains(10, 10, 0.0, 9.9));
        assert!(!contains(10, 10, 10.0, 5.0));
        assert!(!contains(10, 10, f32::NAN, 5.0));
    }
}
