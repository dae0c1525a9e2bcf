use crate::error::{Result, SolexError};
use crate::frame::ColorMode;

const RED: usize = 0;
const GREEN: usize = 1;
const BLUE: usize = 2;

/// Channel index of the sensor sample at (x, y) for a Bayer pattern.
pub fn site_channel(x: usize, y: usize, mode: ColorMode) -> Result<usize> {
    let cell = (y % 2, x % 2);
    let channel = match mode {
        ColorMode::BayerRGGB => match cell {
            (0, 0) => RED,
            (1, 1) => BLUE,
            _ => GREEN,
        },
        ColorMode::BayerBGGR => match cell {
            (0, 0) => BLUE,
            (1, 1) => RED,
            _ => GREEN,
        },
        ColorMode::BayerGBRG => match cell {
            (0, 1) => BLUE,
            (1, 0) => RED,
            _ => GREEN,
        },
        ColorMode::BayerGRBG => match cell {
            (0, 1) => RED,
            (1, 0) => BLUE,
            _ => GREEN,
        },
        other => {
            return Err(SolexError::UnsupportedColorMode(format!("{other:?}")));
        }
    };
    Ok(channel)
}

/// Bilinear demosaic over an interleaved (R, G, B) triple buffer.
///
/// The buffer holds one sensor sample per pixel, already scattered into
/// its channel slot; the two missing channels of every interior pixel are
/// reconstructed by neighbor averaging. The first and last rows and
/// columns are never written: callers must accept zero borders.
pub fn demosaic(rgb: &mut [f32], mode: ColorMode, width: usize, height: usize) -> Result<()> {
    if !mode.is_bayer() {
        return Err(SolexError::UnsupportedColorMode(format!("{mode:?}")));
    }
    if width < 3 || height < 3 {
        return Ok(());
    }

    // Sensor sample of the pixel at (x, y).
    let sample = |rgb: &[f32], x: usize, y: usize| -> Result<f32> {
        Ok(rgb[3 * (y * width + x) + site_channel(x, y, mode)?])
    };

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let k = 3 * (y * width + x);
            let (west, east) = (x - 1, x + 1);
            let (north, south) = (y - 1, y + 1);
            let cross = |rgb: &[f32]| -> Result<f32> {
                Ok((sample(rgb, x, north)?
                    + sample(rgb, west, y)?
                    + sample(rgb, east, y)?
                    + sample(rgb, x, south)?)
                    / 4.0)
            };
            let diagonal = |rgb: &[f32]| -> Result<f32> {
                Ok((sample(rgb, west, north)?
                    + sample(rgb, east, north)?
                    + sample(rgb, west, south)?
                    + sample(rgb, east, south)?)
                    / 4.0)
            };

            match site_channel(x, y, mode)? {
                RED => {
                    rgb[k + GREEN] = cross(rgb)?;
                    rgb[k + BLUE] = diagonal(rgb)?;
                }
                BLUE => {
                    rgb[k + GREEN] = cross(rgb)?;
                    rgb[k + RED] = diagonal(rgb)?;
                }
                _ => {
                    // Horizontal neighbors share the row's other color,
                    // vertical neighbors carry the remaining one.
                    let row_color = site_channel(west, y, mode)?;
                    let column_color = site_channel(x, north, mode)?;
                    rgb[k + row_color] =
                        (sample(rgb, west, y)? + sample(rgb, east, y)?) / 2.0;
                    rgb[k + column_color] =
                        (sample(rgb, x, north)? + sample(rgb, x, south)?) / 2.0;
                }
            }
        }
    }
    Ok(())
}
