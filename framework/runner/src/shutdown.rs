use crate::executor::Executor;
use crate::manager::AbortSwitch;
use tokio::signal;

/// Abort every active runner on Ctrl-C.
pub(crate) fn start_abort_listener(executor: &Executor, switch: AbortSwitch) {
    executor.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received abort signal, stopping runners...");
                switch.abort_all();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}
