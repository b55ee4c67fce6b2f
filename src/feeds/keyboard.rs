use super::{FeedHandle, TriggerFeed};
use crate::error::FeedError;
use crate::events::{EventBus, ScanEvent};
use async_trait::async_trait;
use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal confirm button: SPACE confirms a capture, `q`/ESC requests shutdown
pub struct KeyboardTrigger {
    event_bus: Arc<EventBus>,
    cancellation_token: Mutex<Option<CancellationToken>>,
}

impl KeyboardTrigger {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: Mutex::new(None),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.cancellation_token.lock().is_some()
    }
}

#[async_trait]
impl TriggerFeed for KeyboardTrigger {
    fn name(&self) -> &str {
        "keyboard"
    }

    async fn attach(&self, handle: FeedHandle) -> Result<(), FeedError> {
        let cancellation_token = {
            let mut slot = self.cancellation_token.lock();
            if slot.is_some() {
                return Ok(());
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        if let Err(e) = enable_raw_mode() {
            self.cancellation_token.lock().take();
            return Err(FeedError::Input {
                details: format!("failed to enable raw mode: {}", e),
            });
        }
        info!("Keyboard trigger attached - press SPACE to capture, q to quit");

        let event_bus = Arc::clone(&self.event_bus);

        task::spawn_blocking(move || {
            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard trigger stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Terminals that report releases would otherwise double-fire
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        match key_event.code {
                            KeyCode::Char(' ') => {
                                debug!("Space bar pressed - confirming capture");
                                if !handle.on_confirm_pulse() {
                                    break;
                                }
                                handle.on_trigger_edge(false);
                            }
                            KeyCode::Char('q') | KeyCode::Esc => {
                                info!("Quit key pressed - requesting shutdown");
                                let event = ScanEvent::ShutdownRequested {
                                    timestamp: Utc::now(),
                                    reason: "User requested via keyboard".to_string(),
                                };
                                if let Err(e) = event_bus.publish(event) {
                                    warn!("Failed to publish shutdown event: {}", e);
                                }
                                break;
                            }
                            other => debug!("Key pressed: {:?}", other),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard trigger task exited");
        });

        Ok(())
    }

    async fn detach(&self) -> Result<(), FeedError> {
        let Some(token) = self.cancellation_token.lock().take() else {
            return Ok(());
        };

        info!("Detaching keyboard trigger");
        token.cancel();

        // Let the poll loop observe the cancellation and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
