//! Recognizer connection supervisor
//!
//! Keeps the session's recognizer connected. Failed connects are retried with a fixed
//! delay; once the retry budget is spent the session goes through the fatal shutdown.
//! While connected, the supervisor polls liveness to catch recognizers that dropped
//! without reporting an error, and reconnects at once when a restart is requested.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::fatal::{begin_fatal_shutdown, is_fatal_error};
use crate::core::session::Session;

/// Maintain the recognizer connection until the session shuts down
pub async fn run_recognizer_supervisor(session: Arc<Session>) {
    let stt = session.providers().stt.clone();
    let settings = session.settings();
    let mut retries = 0u32;

    loop {
        if session.is_shut_down() || session.is_fatal() {
            break;
        }

        match stt.connect().await {
            Ok(()) => {
                retries = 0;
                session.set_active(true);
                info!(session_id = %session.id(), provider = stt.provider(), "Recognizer connected");

                if !watch_connection(&session).await {
                    break;
                }

                if let Err(e) = stt.stop_connection().await {
                    debug!(session_id = %session.id(), "Failed to stop recognizer: {}", e);
                }
            }
            Err(e) => {
                session.set_active(false);
                let detail = e.to_string();

                if is_fatal_error(&detail) {
                    begin_fatal_shutdown(&session, "ASR", &detail);
                    break;
                }

                retries += 1;
                if retries > settings.recognizer_max_retries {
                    begin_fatal_shutdown(
                        &session,
                        "ASR connection",
                        &format!(
                            "failed after {} retries: {}",
                            settings.recognizer_max_retries, detail
                        ),
                    );
                    break;
                }

                warn!(
                    session_id = %session.id(),
                    attempt = retries,
                    "Recognizer connection failed, retrying in {:?}: {}",
                    settings.recognizer_retry_delay,
                    detail
                );

                tokio::select! {
                    _ = session.scope().cancelled() => break,
                    _ = tokio::time::sleep(settings.recognizer_retry_delay) => {}
                }
            }
        }
    }

    debug!(session_id = %session.id(), "Recognizer supervisor stopped");
}

/// Poll a live connection. Returns `true` when it should be re-established and `false`
/// when the session is ending.
async fn watch_connection(session: &Arc<Session>) -> bool {
    let stt = &session.providers().stt;
    let poll_interval = session.settings().recognizer_poll_interval;

    loop {
        tokio::select! {
            _ = session.scope().cancelled() => return false,
            _ = session.recognizer_restart_requested() => {
                debug!(session_id = %session.id(), "Recognizer restart requested");
                return !session.is_fatal();
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        if session.is_fatal() {
            return false;
        }

        if !stt.is_active() || !session.is_active() {
            warn!(session_id = %session.id(), "Recognizer connection lost, reconnecting");
            session.set_active(false);
            return true;
        }
    }
}
