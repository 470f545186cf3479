//! POSIX signal wiring for graceful shutdown.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};

use super::error::Result;

/// Register SIGINT and SIGTERM to set the returned flag.
///
/// Hand the flag to [`Supervisor::with_stop_flag`], which honors it as
/// a clean end of stream: the graph drains and tears down the same way
/// it would on EOS.
///
/// [`Supervisor::with_stop_flag`]: crate::core::supervisor::Supervisor::with_stop_flag
pub fn shutdown_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&flag))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&flag))?;
    Ok(flag)
}
