use std::sync::Arc;

use ndarray::{Array2, ArrayViewMut1, Axis};
use tracing::info;

use crate::consts::MAX_PIXEL_VALUE;
use crate::convert::ImageConverter;
use crate::error::Result;
use crate::event::{Broadcaster, ImageLine, ProcessingEvent};
use crate::io::ser::SerReader;
use crate::math::regression::Parabola;
use crate::sched::{ParallelContext, Semaphore};
use crate::workflow::WorkflowState;

/// Streams frames off the sequential SER reader and rebuilds one output
/// row per (frame, pixel shift) in parallel.
///
/// The reader cursor stays single-owner: frame bytes are copied into a
/// task-owned buffer before any parallel submission, and a semaphore
/// sized to the CPU count keeps the fan-out bounded.
pub struct ReconstructionEngine<'a> {
    converter: &'a dyn ImageConverter,
    main_context: &'a ParallelContext,
    broadcaster: &'a Broadcaster,
    /// Whether partial reconstruction events carry detection annotations.
    annotate_lines: bool,
}

impl<'a> ReconstructionEngine<'a> {
    pub fn new(
        converter: &'a dyn ImageConverter,
        main_context: &'a ParallelContext,
        broadcaster: &'a Broadcaster,
        annotate_lines: bool,
    ) -> Self {
        Self {
            converter,
            main_context,
            broadcaster,
            annotate_lines,
        }
    }

    /// Reconstruct every plane of `states` from frames `[start, end)`.
    ///
    /// Each task writes exclusively to row `i - start` of its own plane;
    /// no two tasks share an output cell.
    pub fn reconstruct(
        &self,
        reader: &mut SerReader,
        start: usize,
        end: usize,
        polynomial: &Parabola,
        states: &mut [WorkflowState],
    ) -> Result<()> {
        info!(
            a = polynomial.a,
            b = polynomial.b,
            c = polynomial.c,
            start,
            end,
            "Starting reconstruction"
        );
        let geometry = reader.geometry();
        let total_rows = end - start;
        let semaphore = Semaphore::cpu_sized();

        let metas: Vec<(f64, bool)> = states
            .iter()
            .map(|s| (s.pixel_shift(), s.is_internal()))
            .collect();
        let mut row_iters: Vec<_> = states
            .iter_mut()
            .map(|s| s.reconstructed.axis_iter_mut(Axis(0)))
            .collect();

        reader.seek(start)?;
        let semaphore = &semaphore;
        self.main_context.blocking(move |scope| -> Result<()> {
            for i in start..end {
                let frame_bytes: Arc<Vec<u8>> = Arc::new(reader.current_frame_bytes()?.to_vec());
                reader.next_frame()?;
                let row = i - start;

                for (state_idx, iter) in row_iters.iter_mut().enumerate() {
                    let out_row = iter
                        .next()
                        .expect("one row per frame in every reconstruction plane");
                    let (pixel_shift, internal) = metas[state_idx];
                    let bytes = Arc::clone(&frame_bytes);
                    let converter = self.converter;
                    let broadcaster = self.broadcaster;
                    let polynomial = *polynomial;
                    let annotate = self.annotate_lines;
                    let permit = semaphore.acquire();

                    scope.spawn(move || {
                        let _permit = permit;
                        let mut buffer = converter.create_buffer(&geometry);
                        converter.convert(i, &bytes, &geometry, &mut buffer)?;
                        let line = reconstruct_row(&buffer, &polynomial, pixel_shift, out_row);
                        if !internal {
                            broadcaster.broadcast(&ProcessingEvent::PartialReconstruction(
                                ImageLine {
                                    pixel_shift,
                                    row,
                                    total_rows,
                                    line,
                                    annotated: annotate,
                                },
                            ));
                        }
                        Ok(())
                    });
                }
            }
            Ok(())
        })?;
        info!("Reconstruction done, generating images");
        Ok(())
    }
}

/// Sample one output row along the distortion polynomial.
///
/// Columns are processed left to right so that an out-of-range polynomial
/// value falls back to the previous column's clamped y.
fn reconstruct_row(
    buffer: &Array2<f32>,
    polynomial: &Parabola,
    pixel_shift: f64,
    mut out_row: ArrayViewMut1<f32>,
) -> Vec<f64> {
    let (height, width) = buffer.dim();
    let mut line = vec![0.0f64; width];
    let mut last_y = 0usize;

    for x in 0..width {
        let mut yd = polynomial.y(x as f64) + pixel_shift;
        let yi = yd.floor() as isize;
        let yi = if yi < 0 || yi >= height as isize {
            yd = last_y as f64;
            last_y
        } else {
            yi as usize
        };

        let frac = yd - yi as f64;
        let value = if frac > 0.0 {
            let lo = buffer[[yi, x]] as f64;
            let hi = buffer[[(yi + 1).min(height - 1), x]] as f64;
            (lo + frac * (hi - lo)) as f32
        } else {
            buffer[[yi, x]]
        };
        // Converter output is bounded, so any excursion is a bug.
        assert!(
            (0.0..=MAX_PIXEL_VALUE).contains(&value),
            "Unexpected value {value} outside the [0..65535] range"
        );

        out_row[x] = value;
        line[x] = value as f64;
        last_y = yi;
    }
    line
}
