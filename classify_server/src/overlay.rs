use common::protocol::Prediction;
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
    rect::Rect,
};

const BAR_HEIGHT: u32 = 12;
const MARGIN: u32 = 8;

/// Draw a confidence bar proportional to the prediction's confidence at the bottom of the frame.
pub fn draw_confidence_bar(frame: &mut RgbImage, prediction: &Prediction) {
    let (width, height) = frame.dimensions();
    if width <= 2 * MARGIN || height <= BAR_HEIGHT + MARGIN {
        return;
    }

    let track_width = width - 2 * MARGIN;
    let y = (height - BAR_HEIGHT - MARGIN) as i32;
    let filled = (track_width as f32 * prediction.confidence / 100.0).round() as u32;

    let track = Rect::at(MARGIN as i32, y).of_size(track_width, BAR_HEIGHT);
    draw_hollow_rect_mut(frame, track, Rgb([255, 255, 255]));

    if filled > 0 {
        let bar = Rect::at(MARGIN as i32, y).of_size(filled, BAR_HEIGHT);
        draw_filled_rect_mut(frame, bar, Rgb([0, 255, 0]));
    }
}
