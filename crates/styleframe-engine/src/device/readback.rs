use std::sync::{Arc, Mutex};

use crate::error::ReadbackError;
use crate::sync::poll_until;

use super::context::GraphicsContext;

type MapSlot = Arc<Mutex<Option<Result<(), wgpu::BufferAsyncError>>>>;

/// Maps a `MAP_READ` buffer and copies its contents to the host.
///
/// The copy that fills `buffer` must already be submitted.
pub(crate) async fn read_buffer(
    context: &GraphicsContext,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, ReadbackError> {
    context
        .check_alive()
        .map_err(|_| ReadbackError::ContextLost(context.id()))?;

    let slice = buffer.slice(..);
    let slot: MapSlot = Arc::default();
    {
        let slot = Arc::clone(&slot);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let mut slot = slot.lock().unwrap_or_else(|p| p.into_inner());
            *slot = Some(result);
        });
    }

    poll_until(context, || {
        slot.lock().map(|s| s.is_some()).unwrap_or(true)
    })
    .await
    .map_err(|e| ReadbackError::Poll(e.to_string()))?;

    let result = slot.lock().unwrap_or_else(|p| p.into_inner()).take();
    match result {
        Some(Ok(())) => {}
        Some(Err(e)) => return Err(ReadbackError::Map(e.to_string())),
        None => return Err(ReadbackError::Map("map callback never ran".into())),
    }

    let bytes = {
        let view = slice.get_mapped_range();
        view.to_vec()
    };
    buffer.unmap();
    Ok(bytes)
}
