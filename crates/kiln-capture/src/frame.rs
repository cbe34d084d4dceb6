//! Raw frame buffer copying

use kiln_core::{FrameSize, Rgba8};

/// Copy a region of a raw color buffer into an owned, target-sized buffer.
///
/// Rows and columns are clipped to the smaller of the two sizes; pixels of the
/// target outside the source region stay default-initialized. The source is
/// never read beyond `buffer_size` or the slice it actually provides, so a
/// short buffer yields a partially filled frame rather than a panic.
pub fn copy_frame_region(
    target_size: FrameSize,
    buffer_size: FrameSize,
    buffer: &[Rgba8],
) -> Vec<Rgba8> {
    let mut copied = vec![Rgba8::TRANSPARENT; target_size.area()];

    let max_width = target_size.width.min(buffer_size.width) as usize;
    let max_height = target_size.height.min(buffer_size.height) as usize;
    let src_stride = buffer_size.width as usize;
    let dst_stride = target_size.width as usize;

    for row in 0..max_height {
        let src_start = row * src_stride;
        let src_end = src_start + max_width;
        if src_end > buffer.len() {
            break;
        }
        let dst_start = row * dst_stride;
        copied[dst_start..dst_start + max_width].copy_from_slice(&buffer[src_start..src_end]);
    }

    copied
}
