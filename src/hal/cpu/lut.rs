use std::sync::{Mutex, PoisonError};

use itertools::Itertools;

use crate::{
    hal::{
        ops::{Binding, OperatorError},
        quant::LookupTable,
    },
    loom::{buffer::RowLayout, pool::ThreadPool},
};

/// Bytes handled by one task when rows are packed back to back.
pub const CONTIGUOUS_TILE: usize = 1024;

/// Maps each byte of `x` through `table` into `y`.
#[inline]
pub fn lut(table: &[u8; 256], x: &[u8], y: &mut [u8]) {
    for (x, y) in x.iter().zip_eq(y.iter_mut()) {
        *y = table[*x as usize];
    }
}

#[inline]
pub fn lut_in_place(table: &[u8; 256], y: &mut [u8]) {
    for y in y.iter_mut() {
        *y = table[*y as usize];
    }
}

/// A run of `rows` rows, starting at the first byte of each slice.
struct Tile<'a, X> {
    input: X,
    output: &'a mut [u8],
    rows: usize,
}

/// Number of rows grouped into one task on the strided path.
#[inline]
fn rows_per_tile(channels: usize) -> usize {
    (CONTIGUOUS_TILE / channels).max(1)
}

/// Runs `f` on every tile, fanning out across `pool` if one with several workers is given.
fn dispatch<T: Send>(tiles: Vec<T>, pool: Option<&dyn ThreadPool>, f: impl Fn(T) + Sync) {
    match pool {
        Some(pool) if pool.threads() > 1 && tiles.len() > 1 => {
            let tiles = tiles
                .into_iter()
                .map(|tile| Mutex::new(Some(tile)))
                .collect_vec();
            pool.parallelize(tiles.len(), &|index| {
                let tile = tiles[index]
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(tile) = tile {
                    f(tile)
                }
            });
        }
        _ => tiles.into_iter().for_each(f),
    }
}

/// Returns the span of `layout` if a buffer of `len` bytes still holds it.
/// Bytes spanned by one strided tile.
///
/// Saturates: a product past `usize::MAX` means the whole span fits in a single tile.
#[inline]
fn tile_bytes(rows: usize, stride: usize) -> usize {
    rows.saturating_mul(stride)
}

fn check_len(side: &str, len: usize, layout: RowLayout) -> Result<usize, OperatorError> {
    let span = layout.span().ok_or_else(|| {
        OperatorError::InvalidParameter(format!("{side} layout {layout} overflows"))
    })?;
    if len < span {
        return Err(OperatorError::InvalidParameter(format!(
            "{side} buffer shrank to {len} bytes, layout {layout} needs {span}"
        )));
    }
    Ok(span)
}

/// Applies `table` to every bound row.
///
/// Bytes past `channels` inside a stride are left untouched. Every row only depends on
/// the matching input row, so the result does not depend on how tiles are scheduled.
pub fn execute(
    table: &LookupTable,
    binding: &Binding,
    pool: Option<&dyn ThreadPool>,
) -> Result<(), OperatorError> {
    let table: &[u8; 256] = table;
    let input_layout = binding.input_layout;
    let output_layout = binding.output_layout;
    let channels = output_layout.channels;

    if binding.is_in_place() {
        let mut data = binding.output.write();
        let span = check_len("output", data.len(), output_layout)?;
        let data = &mut data[..span];

        if output_layout.is_contiguous() {
            let tiles = data.chunks_mut(CONTIGUOUS_TILE).collect_vec();
            dispatch(tiles, pool, |output| lut_in_place(table, output));
            return Ok(());
        }

        let rows = rows_per_tile(channels).min(output_layout.rows);
        let tiles = data
            .chunks_mut(tile_bytes(rows, output_layout.stride))
            .enumerate()
            .map(|(index, output)| Tile {
                input: (),
                output,
                rows: rows.min(output_layout.rows - index * rows),
            })
            .collect_vec();
        dispatch(tiles, pool, |Tile { output, rows, .. }| {
            for row in 0..rows {
                lut_in_place(table, &mut output[output_layout.row(row)]);
            }
        });
        return Ok(());
    }

    let input = binding.input.read();
    let mut output = binding.output.write();
    let input_span = check_len("input", input.len(), input_layout)?;
    let output_span = check_len("output", output.len(), output_layout)?;

    let input = &input[..input_span];
    let output = &mut output[..output_span];

    // rows packed back to back on both sides: one flat run
    if input_layout.is_contiguous() && output_layout.is_contiguous() {
        let tiles = input
            .chunks(CONTIGUOUS_TILE)
            .zip_eq(output.chunks_mut(CONTIGUOUS_TILE))
            .collect_vec();
        dispatch(tiles, pool, |(x, y)| lut(table, x, y));
        return Ok(());
    }

    let rows = rows_per_tile(channels).min(output_layout.rows);
    let tiles = input
        .chunks(tile_bytes(rows, input_layout.stride))
        .zip_eq(output.chunks_mut(tile_bytes(rows, output_layout.stride)))
        .enumerate()
        .map(|(index, (input, output))| Tile {
            input,
            output,
            rows: rows.min(output_layout.rows - index * rows),
        })
        .collect_vec();
    dispatch(tiles, pool, |tile| {
        let Tile {
            input,
            output,
            rows,
        } = tile;
        for row in 0..rows {
            let x = &input[input_layout.row(row)];
            let y = &mut output[output_layout.row(row)];
            lut(table, x, y);
        }
    });
    Ok(())
}
