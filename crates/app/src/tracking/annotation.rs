use anyhow::{Result, anyhow};
use face_core::IrisRatio;
use image::{ImageBuffer, Rgb, RgbImage};
use video_ingest::Frame;

use super::data::Overlay;

const AXIS_LENGTH: f64 = 80.0;
const AXIS_THICKNESS: i32 = 3;
const IRIS_RADIUS: i32 = 4;
const IRIS_THICKNESS: i32 = 2;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

/// Copy a BGR8 frame into an RGB image.
pub fn frame_to_rgb(frame: &Frame) -> Result<RgbImage> {
    ImageBuffer::from_vec(
        frame.width as u32,
        frame.height as u32,
        bgr_to_rgb(&frame.data),
    )
    .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
}

/// Draw the head axes and both iris markers.
pub fn draw_overlay(image: &mut RgbImage, overlay: &Overlay) {
    let [cx, cy] = overlay.centroid;
    let origin = (cx as i32, cy as i32);
    for (axis, color) in head_axes(overlay.head_rotation)
        .into_iter()
        .zip([RED, GREEN, BLUE])
    {
        let end = (
            (cx + axis[0] * AXIS_LENGTH) as i32,
            (cy + axis[1] * AXIS_LENGTH) as i32,
        );
        draw_line(image, origin, end, AXIS_THICKNESS, color);
    }

    let (width, height) = image.dimensions();
    for (ratio, color) in [(overlay.left_iris, RED), (overlay.right_iris, YELLOW)] {
        let center = iris_position(ratio, width, height);
        draw_circle(image, center, IRIS_RADIUS, IRIS_THICKNESS, color);
    }
}

/// Image-plane directions of the head's x, y and z axes for pitch, yaw and
/// roll in degrees.
pub fn head_axes(rotation: [f64; 3]) -> [[f64; 2]; 3] {
    let [pitch, yaw, roll] = rotation.map(f64::to_radians);
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();
    let (sr, cr) = roll.sin_cos();
    [
        [cy * cr, cp * sr + cr * sp * sy],
        [-cy * sr, cp * cr - sp * sy * sr],
        [sy, -cy * sp],
    ]
}

/// Marker position for an iris ratio: the frame centre plus a third of the
/// frame per unit.
pub fn iris_position(ratio: IrisRatio, width: u32, height: u32) -> (i32, i32) {
    let w = width as f64;
    let h = height as f64;
    (
        (ratio.x * (w / 3.0)) as i32 + (width / 2) as i32,
        (ratio.y * (h / 3.0)) as i32 + (height / 2) as i32,
    )
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
    }
    output
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if right < 0 || bottom < 0 || left >= width || top >= height {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_line(
    image: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).max(1);
    let lo = (thickness - 1) / 2;
    let hi = thickness / 2;
    for step in 0..=steps {
        let t = step as f64 / steps as f64;
        let x = from.0 + (dx as f64 * t).round() as i32;
        let y = from.1 + (dy as f64 * t).round() as i32;
        fill_rect(image, x - lo, y - lo, x + hi, y + hi, color);
    }
}

fn draw_circle(
    image: &mut RgbImage,
    center: (i32, i32),
    radius: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let half = thickness as f64 / 2.0;
    let reach = radius + thickness;
    for y in -reach..=reach {
        for x in -reach..=reach {
            let distance = ((x * x + y * y) as f64).sqrt();
            if (distance - radius as f64).abs() <= half {
                fill_rect(
                    image,
                    center.0 + x,
                    center.1 + y,
                    center.0 + x,
                    center.1 + y,
                    color,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 2], b: [f64; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-12 && (a[1] - b[1]).abs() < 1e-12
    }

    #[test]
    fn zero_rotation_axes_are_image_aligned() {
        let axes = head_axes([0.0, 0.0, 0.0]);
        assert!(close(axes[0], [1.0, 0.0]));
        assert!(close(axes[1], [0.0, 1.0]));
        assert!(close(axes[2], [0.0, 0.0]));
    }

    #[test]
    fn yaw_turns_the_depth_axis_sideways() {
        let axes = head_axes([0.0, 90.0, 0.0]);
        assert!(close(axes[0], [0.0, 0.0]));
        assert!(close(axes[2], [1.0, 0.0]));
    }

    #[test]
    fn iris_marker_positions() {
        assert_eq!(iris_position(IrisRatio::ZERO, 640, 480), (320, 240));
        assert_eq!(iris_position(IrisRatio::new(1.0, -1.0), 640, 480), (533, 80));
        assert_eq!(iris_position(IrisRatio::new(-0.5, 0.5), 640, 480), (214, 320));
    }

    #[test]
    fn bgr_frames_are_swapped_to_rgb() {
        let frame = Frame::bgr_at(vec![10, 20, 30, 40, 50, 60], 2, 1, 0).unwrap();
        let image = frame_to_rgb(&frame).unwrap();
        assert_eq!(image.get_pixel(0, 0), &Rgb([30, 20, 10]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([60, 50, 40]));
    }

    #[test]
    fn overlay_draws_inside_bounds_only() {
        let mut image = RgbImage::new(64, 48);
        let overlay = Overlay {
            centroid: [60.0, 5.0],
            head_rotation: [12.0, 5.0, 0.12],
            left_iris: IrisRatio::new(0.1, 0.0),
            right_iris: IrisRatio::new(5.0, 5.0),
        };
        draw_overlay(&mut image, &overlay);

        // the x axis runs right from the centroid, clipped at the edge
        assert_eq!(image.get_pixel(62, 5), &RED);
        assert_eq!(image.get_pixel(63, 5), &RED);
        // left iris ring passes through (centre.x + 4, centre.y)
        let (lx, ly) = iris_position(overlay.left_iris, 64, 48);
        assert_eq!(image.get_pixel((lx + IRIS_RADIUS) as u32, ly as u32), &RED);
        assert_eq!(image.get_pixel(lx as u32, ly as u32), &Rgb([0, 0, 0]));
    }
}
