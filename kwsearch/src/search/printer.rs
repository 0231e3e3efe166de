use std::sync::Arc;
use tracing::{debug, error};

use super::handler::HandlerContext;
use crate::errors::KwResult;
use crate::results::Item;

/// Body of the printer task.
///
/// Drains the item buffer until every worker's sentinel has arrived, writing
/// each match to the sink. A failed write is reported once the buffer is
/// drained; draining continues so workers blocked on a full buffer can finish.
pub fn run_printer(ctx: Arc<HandlerContext>) -> KwResult<()> {
    let mut first_error = None;

    // The printer is the only task that decrements the count, so while more
    // than one task is active another sentinel is still on its way.
    while ctx.active.get() > 1 {
        match ctx.buffer.take() {
            Item::Done => {
                ctx.metrics.record_sentinel();
                ctx.active.done();
            }
            Item::Match(m) => {
                if first_error.is_some() {
                    continue;
                }
                match ctx.sink.write_record(m.to_output_line().as_bytes()) {
                    Ok(()) => ctx.metrics.record_write(),
                    Err(e) => {
                        error!("Failed to write match for {}: {}", m.filename, e);
                        first_error = Some(e);
                    }
                }
            }
        }
    }

    ctx.active.done();
    debug!("Printer finished");
    first_error.map_or(Ok(()), Err)
}
