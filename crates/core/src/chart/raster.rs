use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::chart::layout::{Anchor, GanttLayout, TextItem};
use crate::chart::palette::Color;

const BACKGROUND: Color = Color::rgb(0xff, 0xff, 0xff);
const PLOT_BACKGROUND: Color = Color::rgb(0xfa, 0xfa, 0xfa);
const BAND_SHADE: Color = Color::rgb(0xf0, 0xf3, 0xf4);
const GRID: Color = Color::rgb(0xe5, 0xe8, 0xe8);
const SPINE: Color = Color::rgb(0xbd, 0xc3, 0xc7);
const TODAY: Color = Color::rgb(0xe7, 0x4c, 0x3c);

const METERS_PER_INCH: f64 = 0.0254;

fn rgb(color: Color) -> Rgb<u8> {
    Rgb(color.to_array())
}

/// Paints the layout onto an RGB canvas. Text is skipped when `font` is `None`.
pub fn rasterize(layout: &GanttLayout, font: Option<&FontArc>) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(layout.width, layout.height, rgb(BACKGROUND));
    let plot = layout.plot;

    fill_rect(&mut canvas, plot.left, plot.top, plot.right, plot.bottom, PLOT_BACKGROUND);

    for band in layout.bands.iter().filter(|band| band.shaded) {
        fill_rect(&mut canvas, plot.left, band.y_top, plot.right, band.y_bottom, BAND_SHADE);
    }

    for tick in &layout.ticks {
        draw_line_segment_mut(&mut canvas, (tick.x, plot.top), (tick.x, plot.bottom), rgb(GRID));
    }

    for y in &layout.separators {
        dashed_line(&mut canvas, (plot.left, *y), (plot.right, *y), 6.0, SPINE);
    }

    for row in &layout.rows {
        fill_rect(&mut canvas, row.x_start, row.y_top, row.x_end, row.y_bottom, row.color);
    }

    if let Some(x) = layout.today_x {
        dashed_line(&mut canvas, (x, plot.top), (x, plot.bottom), 8.0, TODAY);
        dashed_line(&mut canvas, (x + 1.0, plot.top), (x + 1.0, plot.bottom), 8.0, TODAY);
    }

    draw_line_segment_mut(&mut canvas, (plot.left, plot.top), (plot.left, plot.bottom), rgb(SPINE));
    draw_line_segment_mut(
        &mut canvas,
        (plot.left, plot.bottom),
        (plot.right, plot.bottom),
        rgb(SPINE),
    );

    for entry in &layout.legend {
        fill_rect(
            &mut canvas,
            entry.swatch_x,
            entry.swatch_y,
            entry.swatch_x + entry.swatch_size,
            entry.swatch_y + entry.swatch_size,
            entry.color,
        );
    }

    if let Some(font) = font {
        let texts = std::iter::once(&layout.title)
            .chain(layout.ticks.iter().map(|tick| &tick.label))
            .chain(layout.bands.iter().filter_map(|band| band.header.as_ref()))
            .chain(layout.rows.iter().map(|row| &row.name_label))
            .chain(layout.rows.iter().filter_map(|row| row.bar_label.as_ref()))
            .chain(layout.legend.iter().map(|entry| &entry.text))
            .chain(layout.today_label.iter())
            .chain(layout.annotation.iter());
        for item in texts {
            draw_text(&mut canvas, font, item);
        }
    }

    canvas
}

fn fill_rect(canvas: &mut RgbImage, left: f32, top: f32, right: f32, bottom: f32, color: Color) {
    let x = left.round() as i32;
    let y = top.round() as i32;
    let width = (right.round() as i32 - x).max(1) as u32;
    let height = (bottom.round() as i32 - y).max(1) as u32;
    draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(width, height), rgb(color));
}

fn dashed_line(canvas: &mut RgbImage, from: (f32, f32), to: (f32, f32), dash: f32, color: Color) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length <= f32::EPSILON {
        return;
    }

    let (ux, uy) = (dx / length, dy / length);
    let mut offset = 0.0;
    while offset < length {
        let end = (offset + dash).min(length);
        draw_line_segment_mut(
            canvas,
            (from.0 + ux * offset, from.1 + uy * offset),
            (from.0 + ux * end, from.1 + uy * end),
            rgb(color),
        );
        offset += dash * 2.0;
    }
}

fn draw_text(canvas: &mut RgbImage, font: &FontArc, item: &TextItem) {
    if item.text.is_empty() {
        return;
    }

    let scale = PxScale::from(item.size_px);
    let (text_width, text_height) = text_size(scale, font, &item.text);
    let x = match item.anchor {
        Anchor::Start => item.x,
        Anchor::Middle => item.x - text_width as f32 / 2.0,
        Anchor::End => item.x - text_width as f32,
    };
    let y = item.y - text_height as f32 / 2.0;
    draw_text_mut(canvas, rgb(item.color), x.round() as i32, y.round() as i32, scale, font, &item.text);
}

/// Encodes an RGB canvas as PNG with the DPI recorded in the `pHYs` chunk.
pub fn encode_png(canvas: &RgbImage, dpi: u32) -> Result<Vec<u8>, png::EncodingError> {
    let mut bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut bytes, canvas.width(), canvas.height());
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let pixels_per_meter = (f64::from(dpi) / METERS_PER_INCH).round() as u32;
        encoder.set_pixel_dims(Some(png::PixelDimensions {
            xppu: pixels_per_meter,
            yppu: pixels_per_meter,
            unit: png::Unit::Meter,
        }));

        let mut writer = encoder.write_header()?;
        writer.write_image_data(canvas.as_raw())?;
        writer.finish()?;
    }
    Ok(bytes)
}
