use ndarray::Array2;
use solex_core::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use solex_core::convert::debayer::{demosaic, site_channel};
use solex_core::convert::{create_converter, ImageConverter};
use solex_core::frame::{ColorMode, Geometry};

fn geometry(width: usize, height: usize, depth: u32, mode: ColorMode) -> Geometry {
    Geometry {
        width,
        height,
        pixel_depth: depth,
        color_mode: mode,
        little_endian: true,
    }
}

#[test]
fn mono_8bit_scales_to_16bit_range() {
    let geometry = geometry(3, 1, 8, ColorMode::Mono);
    let converter = create_converter(ColorMode::Mono);
    let mut out = converter.create_buffer(&geometry);
    converter
        .convert(0, &[0u8, 128, 255], &geometry, &mut out)
        .unwrap();
    assert_eq!(out[[0, 0]], 0.0);
    assert_eq!(out[[0, 1]], 128.0 * 256.0);
    assert_eq!(out[[0, 2]], 255.0 * 256.0);
    assert!(out.iter().all(|&v| (0.0..=65535.0).contains(&v)));
}

#[test]
fn mono_16bit_honors_endianness() {
    let mut le = geometry(2, 1, 16, ColorMode::Mono);
    let converter = create_converter(ColorMode::Mono);
    let bytes: Vec<u8> = [1000u16, 65535]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    let mut out = converter.create_buffer(&le);
    converter.convert(0, &bytes, &le, &mut out).unwrap();
    assert_eq!(out[[0, 0]], 1000.0);
    assert_eq!(out[[0, 1]], 65535.0);

    le.little_endian = false;
    let bytes: Vec<u8> = [1000u16, 42]
        .iter()
        .flat_map(|v| v.to_be_bytes())
        .collect();
    converter.convert(0, &bytes, &le, &mut out).unwrap();
    assert_eq!(out[[0, 0]], 1000.0);
    assert_eq!(out[[0, 1]], 42.0);
}

#[test]
fn rgb_frames_collapse_to_weighted_luminance() {
    let geometry = geometry(1, 1, 8, ColorMode::RGB);
    let converter = create_converter(ColorMode::RGB);
    let mut out = converter.create_buffer(&geometry);
    converter
        .convert(0, &[100u8, 50, 10], &geometry, &mut out)
        .unwrap();
    let expected =
        LUMINANCE_R * 100.0 * 256.0 + LUMINANCE_G * 50.0 * 256.0 + LUMINANCE_B * 10.0 * 256.0;
    assert!((out[[0, 0]] - expected).abs() < 1e-2);
}

#[test]
fn bgr_frames_swap_channels() {
    let g = geometry(1, 1, 8, ColorMode::BGR);
    let converter = create_converter(ColorMode::BGR);
    let mut out = converter.create_buffer(&g);
    converter.convert(0, &[10u8, 50, 100], &g, &mut out).unwrap();
    let expected =
        LUMINANCE_R * 100.0 * 256.0 + LUMINANCE_G * 50.0 * 256.0 + LUMINANCE_B * 10.0 * 256.0;
    assert!((out[[0, 0]] - expected).abs() < 1e-2);
}

/// Scatter a mosaic into an interleaved RGB buffer the way the converter
/// does before demosaicing.
fn scatter(mosaic: &Array2<f32>, mode: ColorMode) -> Vec<f32> {
    let (h, w) = mosaic.dim();
    let mut rgb = vec![0.0f32; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let channel = site_channel(x, y, mode).unwrap();
            rgb[3 * (y * w + x) + channel] = mosaic[[y, x]];
        }
    }
    rgb
}

#[test]
fn demosaic_green_at_red_sites_is_mean_of_cross_neighbors() {
    let w = 6;
    let h = 6;
    // RGGB: red sites at even/even, green neighbors on the cross.
    let mosaic = Array2::from_shape_fn((h, w), |(y, x)| {
        match site_channel(x, y, ColorMode::BayerRGGB).unwrap() {
            0 => 20000.0,
            1 => 100.0 + (y * w + x) as f32,
            _ => 0.0,
        }
    });
    let mut rgb = scatter(&mosaic, ColorMode::BayerRGGB);
    demosaic(&mut rgb, ColorMode::BayerRGGB, w, h).unwrap();

    for y in (2..h - 1).step_by(2) {
        for x in (2..w - 1).step_by(2) {
            let expected = (mosaic[[y - 1, x]]
                + mosaic[[y, x - 1]]
                + mosaic[[y, x + 1]]
                + mosaic[[y + 1, x]])
                / 4.0;
            let green = rgb[3 * (y * w + x) + 1];
            assert!(green > 0.0);
            assert!(
                (green - expected).abs() < 1e-3,
                "site ({x},{y}): {green} vs {expected}"
            );
        }
    }
}

#[test]
fn demosaic_leaves_borders_untouched() {
    let w = 8;
    let h = 8;
    let mosaic = Array2::from_elem((h, w), 5000.0f32);
    for mode in [
        ColorMode::BayerRGGB,
        ColorMode::BayerBGGR,
        ColorMode::BayerGBRG,
        ColorMode::BayerGRBG,
    ] {
        let mut rgb = scatter(&mosaic, mode);
        demosaic(&mut rgb, mode, w, h).unwrap();
        for y in 0..h {
            for x in 0..w {
                if y == 0 || y == h - 1 || x == 0 || x == w - 1 {
                    let sensor = site_channel(x, y, mode).unwrap();
                    for channel in 0..3 {
                        if channel != sensor {
                            assert_eq!(
                                rgb[3 * (y * w + x) + channel],
                                0.0,
                                "border ({x},{y}) channel {channel} written for {mode:?}"
                            );
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn demosaic_interior_sites_fully_populated() {
    let w = 6;
    let h = 6;
    let mosaic = Array2::from_elem((h, w), 1000.0f32);
    let mut rgb = scatter(&mosaic, ColorMode::BayerGRBG);
    demosaic(&mut rgb, ColorMode::BayerGRBG, w, h).unwrap();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            for channel in 0..3 {
                assert_eq!(rgb[3 * (y * w + x) + channel], 1000.0);
            }
        }
    }
}

#[test]
fn bayer_converter_produces_luminance_in_range() {
    let g = geometry(6, 6, 8, ColorMode::BayerRGGB);
    let converter = create_converter(ColorMode::BayerRGGB);
    let bytes = vec![200u8; 36];
    let mut out = converter.create_buffer(&g);
    converter.convert(0, &bytes, &g, &mut out).unwrap();
    // Interior pixels see a uniform mosaic: full luminance of the value.
    assert!((out[[3, 3]] - 200.0 * 256.0).abs() < 1.0);
    assert!(out.iter().all(|&v| (0.0..=65535.0).contains(&v)));
}
